//! Nine-patch autotiling for gba_map_editor brushes.
//!
//! The primary entry point is [`resolve`], which maps an 8-neighbour
//! [`AutoTileMask`] to the [`NinePatchPart`] a cell should show. Masks are
//! built with [`AutoTileMask::from_grid`] using a caller-supplied region
//! predicate.
//!
//! This crate has no Bevy dependency. It operates on plain data from `gba_map_core`.

use gba_map_core::BlockGrid;

/// One of the eight neighbours of a cell, in mask visiting order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Neighbor {
    NorthWest,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
}

impl Neighbor {
    /// Visiting order: the first neighbour becomes the most significant bit
    pub const ALL: [Neighbor; 8] = [
        Neighbor::NorthWest,
        Neighbor::North,
        Neighbor::NorthEast,
        Neighbor::East,
        Neighbor::SouthEast,
        Neighbor::South,
        Neighbor::SouthWest,
        Neighbor::West,
    ];

    /// Grid offset (dx, dy) with y growing downwards
    pub fn offset(self) -> (i32, i32) {
        match self {
            Neighbor::NorthWest => (-1, -1),
            Neighbor::North => (0, -1),
            Neighbor::NorthEast => (1, -1),
            Neighbor::East => (1, 0),
            Neighbor::SouthEast => (1, 1),
            Neighbor::South => (0, 1),
            Neighbor::SouthWest => (-1, 1),
            Neighbor::West => (-1, 0),
        }
    }

    /// The bit this neighbour occupies in an [`AutoTileMask`]
    pub fn bit(self) -> u8 {
        let position = Neighbor::ALL.iter().position(|n| *n == self).unwrap_or(0);
        0x80 >> position
    }
}

const NW: u8 = 0b1000_0000;
const N: u8 = 0b0100_0000;
const NE: u8 = 0b0010_0000;
const E: u8 = 0b0001_0000;
const SE: u8 = 0b0000_1000;
const S: u8 = 0b0000_0100;
const SW: u8 = 0b0000_0010;
const W: u8 = 0b0000_0001;

const NORTH_SIDE: u8 = NW | N | NE;
const EAST_SIDE: u8 = NE | E | SE;
const SOUTH_SIDE: u8 = SE | S | SW;
const WEST_SIDE: u8 = SW | W | NW;

/// Which neighbours of a cell belong to the same region.
/// A set bit means "same region".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AutoTileMask(pub u8);

impl AutoTileMask {
    pub const EMPTY: AutoTileMask = AutoTileMask(0);
    pub const SURROUNDED: AutoTileMask = AutoTileMask(0xFF);

    /// Build a mask from neighbour membership given in visiting order
    pub fn from_neighbors(same_region: [bool; 8]) -> Self {
        let mask = same_region
            .iter()
            .fold(0u8, |mask, same| (mask << 1) | u8::from(*same));
        Self(mask)
    }

    /// Build the mask of cell (x, y) in `grid`.
    ///
    /// Neighbours outside the grid or without a metatile count as outside the
    /// region. Everything else is tested with `in_region`.
    pub fn from_grid(grid: &BlockGrid, x: i32, y: i32, in_region: impl Fn(u16) -> bool) -> Self {
        let same_region = Neighbor::ALL.map(|neighbor| {
            let (dx, dy) = neighbor.offset();
            grid.get_signed(x + dx, y + dy)
                .and_then(|block| block.metatile)
                .is_some_and(&in_region)
        });
        Self::from_neighbors(same_region)
    }

    pub fn contains(self, neighbor: Neighbor) -> bool {
        self.0 & neighbor.bit() != 0
    }
}

/// The nine-patch block a cell resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NinePatchPart {
    /// Edge or center block at (col, row) of the 3x3 panel
    Edge { col: u32, row: u32 },
    /// Inner corner facing the one missing diagonal neighbour
    InnerCorner(Neighbor),
}

impl NinePatchPart {
    pub const CENTER: NinePatchPart = NinePatchPart::Edge { col: 1, row: 1 };

    /// Position of this part inside a nine-patch brush grid
    pub fn block_position(self) -> (u32, u32) {
        match self {
            NinePatchPart::Edge { col, row } => (col, row),
            NinePatchPart::InnerCorner(Neighbor::NorthWest) => (0, 3),
            NinePatchPart::InnerCorner(Neighbor::NorthEast) => (2, 3),
            NinePatchPart::InnerCorner(Neighbor::SouthWest) => (0, 5),
            NinePatchPart::InnerCorner(Neighbor::SouthEast) => (2, 5),
            NinePatchPart::InnerCorner(_) => (1, 1),
        }
    }
}

/// Resolve a mask to the nine-patch part to draw.
///
/// Precedence is fixed: isolated cells draw the center, then inner corners
/// (only with `corners`), then whole empty sides, then single empty
/// orthogonal neighbours, then the center.
pub fn resolve(mask: AutoTileMask, corners: bool) -> NinePatchPart {
    let mask = mask.0;
    if mask == 0 {
        return NinePatchPart::CENTER;
    }

    if corners {
        for diagonal in [
            Neighbor::NorthWest,
            Neighbor::NorthEast,
            Neighbor::SouthEast,
            Neighbor::SouthWest,
        ] {
            if mask == 0xFF & !diagonal.bit() {
                return NinePatchPart::InnerCorner(diagonal);
            }
        }
    }

    let side = |empty: u8| mask & empty == 0;
    if let Some(part) = edge_part(side(NORTH_SIDE), side(SOUTH_SIDE), side(WEST_SIDE), side(EAST_SIDE)) {
        return part;
    }

    let single = |bit: u8| mask & bit == 0;
    edge_part(single(N), single(S), single(W), single(E)).unwrap_or(NinePatchPart::CENTER)
}

fn edge_part(north: bool, south: bool, west: bool, east: bool) -> Option<NinePatchPart> {
    let row = if north {
        0
    } else if south {
        2
    } else {
        1
    };
    let col = if west {
        0
    } else if east {
        2
    } else {
        1
    };
    (row != 1 || col != 1).then_some(NinePatchPart::Edge { col, row })
}
