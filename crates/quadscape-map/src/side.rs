use crate::key::Quadrant;

/// One of the four borders of a tile.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum Side {
    Left = 0,
    Top = 1,
    Right = 2,
    Bottom = 3,
}

/// Everything the quadtree needs to know about a side, so traversal code never has to branch on it.
#[derive(Clone, Copy, Debug)]
pub struct SideInfo {
    pub opposite: Side,
    /// The two child quadrants that touch this side. The second one lies further along the edge.
    pub bordering: [Quadrant; 2],
    /// For each bordering quadrant of a tile, the quadrant of the neighbor's child that sits across this side.
    pub across: [Quadrant; 2],
    /// `true` if the edge runs along a column of vertices (top to bottom).
    pub vertical: bool,
}

use Quadrant::*;

const SIDE_TABLE: [SideInfo; 4] = [
    // Left
    SideInfo {
        opposite: Side::Right,
        bordering: [UpperLeft, LowerLeft],
        across: [UpperRight, LowerRight],
        vertical: true,
    },
    // Top
    SideInfo {
        opposite: Side::Bottom,
        bordering: [UpperLeft, UpperRight],
        across: [LowerLeft, LowerRight],
        vertical: false,
    },
    // Right
    SideInfo {
        opposite: Side::Left,
        bordering: [UpperRight, LowerRight],
        across: [UpperLeft, LowerLeft],
        vertical: true,
    },
    // Bottom
    SideInfo {
        opposite: Side::Top,
        bordering: [LowerLeft, LowerRight],
        across: [UpperLeft, UpperRight],
        vertical: false,
    },
];

/// Links between the four children of one parent, indexed by `[quadrant][side]`.
pub const SIBLING_NEIGHBORS: [[Option<Quadrant>; 4]; 4] = [
    // left, top, right, bottom
    [None, None, Some(UpperRight), Some(LowerLeft)],
    [Some(UpperLeft), None, None, Some(LowerRight)],
    [None, Some(UpperLeft), Some(LowerRight), None],
    [Some(LowerLeft), Some(UpperRight), None, None],
];

impl Side {
    pub const ALL: [Side; 4] = [Side::Left, Side::Top, Side::Right, Side::Bottom];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn info(self) -> &'static SideInfo {
        &SIDE_TABLE[self.index()]
    }

    #[inline]
    pub fn opposite(self) -> Side {
        self.info().opposite
    }

    #[inline]
    pub fn bordering(self) -> [Quadrant; 2] {
        self.info().bordering
    }

    #[inline]
    pub fn is_vertical(self) -> bool {
        self.info().vertical
    }

    /// The bordering quadrant whose edge starts half way along the parent's edge.
    #[inline]
    pub fn far_quadrant(self) -> Quadrant {
        self.info().bordering[1]
    }

    /// Given a tile's `quadrant` touching this side, returns the quadrant of the neighbor's child across the side.
    pub fn across(self, quadrant: Quadrant) -> Option<Quadrant> {
        let info = self.info();
        info.bordering
            .iter()
            .position(|&q| q == quadrant)
            .map(|i| info.across[i])
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
