use crate::error::TerrainError;

use std::fmt;
use std::str::FromStr;

/// Depth in the tile pyramid. Level 0 is the root tile.
pub type Level = u8;

/// The position a child tile occupies inside its parent.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u8)]
pub enum Quadrant {
    UpperLeft = 0,
    UpperRight = 1,
    LowerLeft = 2,
    LowerRight = 3,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [
        Quadrant::UpperLeft,
        Quadrant::UpperRight,
        Quadrant::LowerLeft,
        Quadrant::LowerRight,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Tile sources number quadrants from 1 to 4.
    #[inline]
    pub const fn source_number(self) -> u8 {
        self as u8 + 1
    }

    pub fn from_source_number(n: u8) -> Option<Self> {
        Self::ALL.get((n as usize).checked_sub(1)?).copied()
    }

    /// Direction from the parent center to this quadrant's center: `(x, y)` with Y pointing up.
    #[inline]
    pub const fn center_direction(self) -> (f64, f64) {
        match self {
            Quadrant::UpperLeft => (-1.0, 1.0),
            Quadrant::UpperRight => (1.0, 1.0),
            Quadrant::LowerLeft => (-1.0, -1.0),
            Quadrant::LowerRight => (1.0, -1.0),
        }
    }
}

/// Identifies a tile by its path of quadrants from the root.
///
/// The text form is `root` followed by one `/n` per level, where `n` is the source quadrant number, e.g. `root/1/4`.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TileKey {
    path: Vec<Quadrant>,
}

impl TileKey {
    pub const ROOT_NAME: &'static str = "root";

    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_path(path: Vec<Quadrant>) -> Self {
        Self { path }
    }

    #[inline]
    pub fn path(&self) -> &[Quadrant] {
        &self.path
    }

    #[inline]
    pub fn level(&self) -> Level {
        self.path.len() as Level
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// The quadrant of this tile in its parent, `None` for the root.
    #[inline]
    pub fn quadrant(&self) -> Option<Quadrant> {
        self.path.last().copied()
    }

    /// The quadrant that this tile's ancestor at `level` occupies in its own parent.
    pub fn quadrant_at_level(&self, level: Level) -> Option<Quadrant> {
        if level == 0 {
            return None;
        }
        self.path.get(level as usize - 1).copied()
    }

    pub fn child(&self, quadrant: Quadrant) -> Self {
        let mut path = Vec::with_capacity(self.path.len() + 1);
        path.extend_from_slice(&self.path);
        path.push(quadrant);
        Self { path }
    }

    pub fn children(&self) -> [Self; 4] {
        Quadrant::ALL.map(|q| self.child(q))
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, parent_path) = self.path.split_last()?;
        Some(Self::from_path(parent_path.to_vec()))
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Self::ROOT_NAME)?;
        for q in self.path.iter() {
            write!(f, "/{}", q.source_number())?;
        }
        Ok(())
    }
}

impl FromStr for TileKey {
    type Err = TerrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TerrainError::InvalidKey(s.to_owned());

        let mut tokens = s.split('/');
        if tokens.next() != Some(Self::ROOT_NAME) {
            return Err(invalid());
        }
        let path = tokens
            .map(|t| {
                t.parse::<u8>()
                    .ok()
                    .and_then(Quadrant::from_source_number)
                    .ok_or_else(invalid)
            })
            .collect::<Result<Vec<_>, _>>()?;
        if path.len() > Level::MAX as usize {
            return Err(invalid());
        }
        Ok(Self { path })
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
