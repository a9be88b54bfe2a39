//! Layout and tileset records exchanged with the ROM backend

use crate::BlockGrid;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a layout in the ROM's layout table
pub type LayoutId = u16;
/// ROM offset of a tileset
pub type TilesetOffset = u32;

/// A map's address in the ROM's map bank table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MapId {
    pub group: u8,
    pub index: u8,
}

impl MapId {
    pub fn new(group: u8, index: u8) -> Self {
        Self { group, index }
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.index)
    }
}

/// Layout header as stored in the ROM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutHeader {
    pub width: u32,
    pub height: u32,
    pub border_width: u8,
    pub border_height: u8,
    pub primary_tileset: TilesetOffset,
    pub secondary_tileset: TilesetOffset,
}

impl LayoutHeader {
    pub fn tilesets(&self) -> TilesetPair {
        TilesetPair::new(self.primary_tileset, self.secondary_tileset)
    }

    pub fn set_tilesets(&mut self, tilesets: TilesetPair) {
        self.primary_tileset = tilesets.primary;
        self.secondary_tileset = tilesets.secondary;
    }
}

/// A layout with its block data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapLayoutData {
    pub id: LayoutId,
    pub header: LayoutHeader,
    pub map_data: BlockGrid,
    pub border_data: BlockGrid,
}

impl MapLayoutData {
    /// Build an empty layout of the given dimensions
    pub fn new(id: LayoutId, header: LayoutHeader) -> Self {
        Self {
            id,
            map_data: BlockGrid::new(header.width, header.height),
            border_data: BlockGrid::new(header.border_width as u32, header.border_height as u32),
            header,
        }
    }
}

/// The (primary, secondary) tilesets a layout is drawn with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TilesetPair {
    pub primary: TilesetOffset,
    pub secondary: TilesetOffset,
}

impl TilesetPair {
    pub fn new(primary: TilesetOffset, secondary: TilesetOffset) -> Self {
        Self { primary, secondary }
    }
}

/// Metatile counts of a tileset pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TilesetLengths {
    pub primary: usize,
    pub secondary: usize,
}

impl TilesetLengths {
    pub fn new(primary: usize, secondary: usize) -> Self {
        Self { primary, secondary }
    }

    pub fn total(&self) -> usize {
        self.primary + self.secondary
    }
}

/// Summary of the rendering data the backend produced for a tileset pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilesetsRenderData {
    pub tilesets: TilesetPair,
    pub metatiles: usize,
}
