//! Whole-resource swaps of a session's layout or tileset pair

use super::Preparation;
use crate::session::{BrushLists, SessionData};
use gba_map_core::{BlockGrid, MapLayoutData, TilesetLengths};
use serde_json::Value;

/// Every piece of session data a layout or tileset swap replaces
#[derive(Debug, Clone, PartialEq)]
pub struct SwapSnapshot {
    pub header: Value,
    pub layout: MapLayoutData,
    pub lengths: TilesetLengths,
    pub palette: BlockGrid,
    pub brushes: BrushLists,
}

impl SwapSnapshot {
    pub fn capture(data: &SessionData) -> Self {
        Self {
            header: data.header.clone(),
            layout: data.layout.clone(),
            lengths: data.lengths,
            palette: data.palette.clone(),
            brushes: data.brushes.clone(),
        }
    }

    pub fn restore(&self, data: &mut SessionData) {
        data.header = self.header.clone();
        data.layout = self.layout.clone();
        data.lengths = self.lengths;
        data.palette = self.palette.clone();
        data.brushes = self.brushes.clone();
    }
}

/// The map now uses a different layout
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateLayoutChange {
    pub before: SwapSnapshot,
    pub after: SwapSnapshot,
}

/// The layout is now drawn with a different tileset pair
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateTilesetsChange {
    pub before: SwapSnapshot,
    pub after: SwapSnapshot,
}

pub(super) fn prepare(before: &SwapSnapshot, after: &SwapSnapshot) -> Preparation {
    if before == after {
        Preparation::Discard
    } else {
        Preparation::Ready
    }
}
