use quadscape_core::geometry::{Aabb, Frustum};
use quadscape_core::glam::DVec3;

/// The view state that drives level of detail.
///
/// All coordinates are relative to the terrain center, with Z relative to the terrain's minimum elevation.
pub trait LodCamera {
    fn location(&self) -> DVec3;

    fn look_at(&self) -> DVec3;

    /// Ground distance covered by one screen pixel at `point`. Non-positive values disable refinement.
    fn pixel_size_at(&self, point: DVec3) -> f64;

    fn is_culled(&self, bounds: &Aabb) -> bool;
}

/// A symmetric perspective projection looking from `location` towards `look_at`.
#[derive(Clone, Debug)]
pub struct PerspectiveCamera {
    location: DVec3,
    look_at: DVec3,
    /// Vertical field of view in radians.
    fov_y: f64,
    viewport: [u32; 2],
    near: f64,
    far: f64,
    frustum: Frustum,
}

impl PerspectiveCamera {
    pub fn new(
        location: DVec3,
        look_at: DVec3,
        fov_y: f64,
        viewport: [u32; 2],
        near: f64,
        far: f64,
    ) -> Self {
        Self {
            location,
            look_at,
            fov_y,
            viewport,
            near,
            far,
            frustum: view_frustum(location, look_at, fov_y, viewport, near, far),
        }
    }

    pub fn set_view(&mut self, location: DVec3, look_at: DVec3) {
        self.location = location;
        self.look_at = look_at;
        self.rebuild_frustum();
    }

    pub fn set_viewport(&mut self, viewport: [u32; 2]) {
        self.viewport = viewport;
        self.rebuild_frustum();
    }

    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    fn rebuild_frustum(&mut self) {
        self.frustum = view_frustum(
            self.location,
            self.look_at,
            self.fov_y,
            self.viewport,
            self.near,
            self.far,
        );
    }
}

/// Z is up unless the view looks straight along it.
fn view_frustum(
    location: DVec3,
    look_at: DVec3,
    fov_y: f64,
    viewport: [u32; 2],
    near: f64,
    far: f64,
) -> Frustum {
    let forward = (look_at - location).try_normalize().unwrap_or(-DVec3::Z);
    let up = if forward.cross(DVec3::Z).length_squared() < 1e-12 {
        DVec3::Y
    } else {
        DVec3::Z
    };
    let aspect = viewport[0].max(1) as f64 / viewport[1].max(1) as f64;
    Frustum::perspective(location, forward, up, fov_y, aspect, near, far)
}

impl LodCamera for PerspectiveCamera {
    fn location(&self) -> DVec3 {
        self.location
    }

    fn look_at(&self) -> DVec3 {
        self.look_at
    }

    fn pixel_size_at(&self, point: DVec3) -> f64 {
        if self.viewport[1] == 0 {
            return 0.0;
        }
        let distance = self.location.distance(point);
        distance * 2.0 * (0.5 * self.fov_y).tan() / self.viewport[1] as f64
    }

    fn is_culled(&self, bounds: &Aabb) -> bool {
        self.frustum.culls(bounds)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
