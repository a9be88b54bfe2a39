//! Brush definitions and their persisted form

use crate::{Block, BlockGrid, TilesetOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Runtime identity of a brush.
///
/// Copies of a brush list handed to sibling sessions keep their ids, so the
/// id names the same brush everywhere it is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrushId(pub Uuid);

impl BrushId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BrushId {
    fn default() -> Self {
        Self::new()
    }
}

/// How a brush's blocks are stamped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrushKind {
    /// Stamp the block grid as-is
    Simple,
    /// Resolve each cell against its neighbours.
    ///
    /// With `corners` the grid is 3 wide and 6 tall: the lower 3x3 panel
    /// holds inner corner blocks at (0,3), (2,3), (0,5) and (2,5).
    NinePatch { corners: bool },
}

impl BrushKind {
    /// Grid dimensions the kind expects, or `None` for free-form brushes
    pub fn required_size(&self) -> Option<(u32, u32)> {
        match self {
            BrushKind::Simple => None,
            BrushKind::NinePatch { corners: false } => Some((3, 3)),
            BrushKind::NinePatch { corners: true } => Some((3, 6)),
        }
    }
}

/// A reusable block pattern authored against a tileset pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrushDefinition {
    pub id: BrushId,
    pub name: String,
    pub kind: BrushKind,
    pub blocks: BlockGrid,
    pub pinned: bool,
    pub primary: TilesetOffset,
    /// `None` for brushes that only use primary tileset metatiles
    pub secondary: Option<TilesetOffset>,
}

impl BrushDefinition {
    /// Create a simple brush over the given blocks
    pub fn simple(
        name: impl Into<String>,
        blocks: BlockGrid,
        primary: TilesetOffset,
        secondary: Option<TilesetOffset>,
    ) -> Self {
        Self {
            id: BrushId::new(),
            name: name.into(),
            kind: BrushKind::Simple,
            blocks,
            pinned: false,
            primary,
            secondary,
        }
    }

    /// Create an empty nine-patch brush
    pub fn nine_patch(
        name: impl Into<String>,
        corners: bool,
        primary: TilesetOffset,
        secondary: Option<TilesetOffset>,
    ) -> Self {
        let kind = BrushKind::NinePatch { corners };
        let (width, height) = kind.required_size().unwrap_or((3, 3));
        Self {
            id: BrushId::new(),
            name: name.into(),
            kind,
            blocks: BlockGrid::new(width, height),
            pinned: false,
            primary,
            secondary,
        }
    }

    /// Toggle inner-corner support on a nine-patch brush, resizing its grid.
    /// Simple brushes are left untouched.
    pub fn set_corners(&mut self, corners: bool) {
        let BrushKind::NinePatch { corners: current } = self.kind else {
            return;
        };
        if current == corners {
            return;
        }
        self.kind = BrushKind::NinePatch { corners };
        let height = if corners { 6 } else { 3 };
        self.blocks = self.blocks.resized(3, height, None);
        // Freshly added rows hold nothing until authored
        for y in 3..height {
            for x in 0..3 {
                self.blocks.set(x, y, Block::EMPTY);
            }
        }
    }

    /// Whether `metatile` is part of this brush's region
    pub fn in_region(&self, metatile: u16) -> bool {
        self.blocks.contains_metatile(metatile)
    }

    /// Equal in everything but identity
    pub fn same_content(&self, other: &BrushDefinition) -> bool {
        self.name == other.name
            && self.kind == other.kind
            && self.blocks == other.blocks
            && self.pinned == other.pinned
            && self.primary == other.primary
            && self.secondary == other.secondary
    }

    pub fn to_serialized(&self) -> SerializedBrush {
        let (kind, corners) = match self.kind {
            BrushKind::Simple => (SerializedBrushType::Simple, false),
            BrushKind::NinePatch { corners } => (SerializedBrushType::NinePatch, corners),
        };
        SerializedBrush {
            kind,
            name: self.name.clone(),
            blocks: self.blocks.clone(),
            pinned: self.pinned,
            primary: self.primary,
            secondary: self.secondary,
            corners,
        }
    }

    /// Rebuild a brush from its persisted form with a fresh identity
    pub fn from_serialized(serialized: SerializedBrush) -> Self {
        let kind = match serialized.kind {
            SerializedBrushType::Simple => BrushKind::Simple,
            SerializedBrushType::NinePatch => BrushKind::NinePatch {
                corners: serialized.corners,
            },
        };
        Self {
            id: BrushId::new(),
            name: serialized.name,
            kind,
            blocks: serialized.blocks,
            pinned: serialized.pinned,
            primary: serialized.primary,
            secondary: serialized.secondary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializedBrushType {
    Simple,
    NinePatch,
}

/// Brush as stored in the ROM configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedBrush {
    #[serde(rename = "type")]
    pub kind: SerializedBrushType,
    pub name: String,
    pub blocks: BlockGrid,
    pub pinned: bool,
    pub primary: TilesetOffset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<TilesetOffset>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub corners: bool,
}
