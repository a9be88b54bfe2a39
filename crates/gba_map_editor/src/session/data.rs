//! The data cell a session's changes apply to

use crate::changes::{BrushSlot, GridTarget};
use gba_map_core::{
    BlockGrid, BrushDefinition, LayoutHeader, LayoutId, MapId, MapLayoutData, TilesetLengths,
    TilesetPair,
};
use serde_json::Value;

/// Field of the map header record that names the map's layout
pub const LAYOUT_ID_FIELD: &str = "map_layout_id";

/// Brush lists for the session's tileset pair
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrushLists {
    /// Shared by every session using the same primary tileset
    pub primary: Vec<BrushDefinition>,
    /// Shared by every session using the same tileset pair
    pub secondary: Vec<BrushDefinition>,
}

impl BrushLists {
    pub fn get(&self, slot: BrushSlot) -> &Vec<BrushDefinition> {
        match slot {
            BrushSlot::Primary => &self.primary,
            BrushSlot::Secondary => &self.secondary,
        }
    }

    pub fn get_mut(&mut self, slot: BrushSlot) -> &mut Vec<BrushDefinition> {
        match slot {
            BrushSlot::Primary => &mut self.primary,
            BrushSlot::Secondary => &mut self.secondary,
        }
    }
}

/// Everything one open map shows and edits
#[derive(Debug, Clone, PartialEq)]
pub struct SessionData {
    pub map: MapId,
    /// Map header record as delivered by the backend
    pub header: Value,
    pub layout: MapLayoutData,
    pub lengths: TilesetLengths,
    /// Palette grid: one cell per metatile of the tileset pair, carrying its permission
    pub palette: BlockGrid,
    pub brushes: BrushLists,
    /// Working copy of the brush open in the brush editor
    pub editing_brush: Option<BrushDefinition>,
}

impl SessionData {
    /// Placeholder data for a session that is still loading
    pub fn empty(map: MapId) -> Self {
        let header = LayoutHeader {
            width: 0,
            height: 0,
            border_width: 0,
            border_height: 0,
            primary_tileset: 0,
            secondary_tileset: 0,
        };
        Self {
            map,
            header: Value::Null,
            layout: MapLayoutData::new(0, header),
            lengths: TilesetLengths::default(),
            palette: BlockGrid::new(0, 0),
            brushes: BrushLists::default(),
            editing_brush: None,
        }
    }

    pub fn layout_id(&self) -> LayoutId {
        self.layout.id
    }

    pub fn tilesets(&self) -> TilesetPair {
        self.layout.header.tilesets()
    }

    pub fn grid(&self, target: GridTarget) -> Option<&BlockGrid> {
        match target {
            GridTarget::Map => Some(&self.layout.map_data),
            GridTarget::Border => Some(&self.layout.border_data),
            GridTarget::Palette => Some(&self.palette),
            GridTarget::EditingBrush => self.editing_brush.as_ref().map(|b| &b.blocks),
        }
    }

    pub fn grid_mut(&mut self, target: GridTarget) -> Option<&mut BlockGrid> {
        match target {
            GridTarget::Map => Some(&mut self.layout.map_data),
            GridTarget::Border => Some(&mut self.layout.border_data),
            GridTarget::Palette => Some(&mut self.palette),
            GridTarget::EditingBrush => self.editing_brush.as_mut().map(|b| &mut b.blocks),
        }
    }
}
