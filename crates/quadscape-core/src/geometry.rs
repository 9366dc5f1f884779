use crate::glam::{DVec2, DVec3};

/// An axis-aligned box given by its minimum and maximum corners.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub fn from_min_and_max(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    pub fn contains_xy(&self, p: DVec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// The corner furthest along `direction`.
    pub fn support(&self, direction: DVec3) -> DVec3 {
        DVec3::new(
            if direction.x >= 0.0 { self.max.x } else { self.min.x },
            if direction.y >= 0.0 { self.max.y } else { self.min.y },
            if direction.z >= 0.0 { self.max.z } else { self.min.z },
        )
    }
}

/// The plane of points `p` where `normal.dot(p) + d == 0`. The normal points into the positive half-space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: DVec3,
    pub d: f64,
}

impl Plane {
    pub fn from_point_and_normal(point: DVec3, normal: DVec3) -> Self {
        let normal = normal.normalize();
        Self {
            normal,
            d: -normal.dot(point),
        }
    }

    pub fn signed_distance(&self, p: DVec3) -> f64 {
        self.normal.dot(p) + self.d
    }
}

/// Six inward-facing planes bounding a perspective view volume.
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Builds the frustum of a symmetric perspective projection.
    ///
    /// `forward` and `up` need not be normalized, but they must not be parallel.
    pub fn perspective(
        eye: DVec3,
        forward: DVec3,
        up: DVec3,
        fov_y: f64,
        aspect: f64,
        near: f64,
        far: f64,
    ) -> Self {
        let forward = forward.normalize();
        let right = forward.cross(up).normalize();
        let up = right.cross(forward);

        let half_v = (fov_y * 0.5).tan();
        let half_h = half_v * aspect;

        // Side plane normals are built from the edge directions of the view volume.
        let left_edge = forward - right * half_h;
        let right_edge = forward + right * half_h;
        let bottom_edge = forward - up * half_v;
        let top_edge = forward + up * half_v;

        Self {
            planes: [
                Plane::from_point_and_normal(eye + forward * near, forward),
                Plane::from_point_and_normal(eye + forward * far, -forward),
                Plane::from_point_and_normal(eye, left_edge.cross(up)),
                Plane::from_point_and_normal(eye, up.cross(right_edge)),
                Plane::from_point_and_normal(eye, right.cross(bottom_edge)),
                Plane::from_point_and_normal(eye, top_edge.cross(right)),
            ],
        }
    }

    /// `true` if `aabb` lies entirely outside of at least one plane.
    pub fn culls(&self, aabb: &Aabb) -> bool {
        self.planes
            .iter()
            .any(|plane| plane.signed_distance(aabb.support(plane.normal)) < 0.0)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
