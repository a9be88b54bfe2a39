//! ROM backend commands
//!
//! Every operation is one request/response. A rejected request changes
//! nothing on the backend side and carries a message meant for the user.

mod memory;

pub use memory::MemoryBackend;

use crate::BackendError;
use gba_map_core::{
    LayoutHeader, LayoutId, MapId, MapLayoutData, RomConfig, SerializedBrush, TilesetLengths,
    TilesetOffset, TilesetPair, TilesetsRenderData,
};
use serde_json::Value;

pub type BackendResult<T> = Result<T, BackendError>;

pub trait Backend {
    /// The configuration stored next to the open ROM
    fn get_config(&mut self) -> BackendResult<RomConfig>;

    fn get_map_header_data(&mut self, map: MapId) -> BackendResult<Value>;

    fn update_map_header(&mut self, map: MapId, header: &Value) -> BackendResult<()>;

    /// ROM offset of a layout; rejects ids that do not name a layout
    fn get_layout_offset(&mut self, id: LayoutId) -> BackendResult<usize>;

    fn get_map_layout_data(&mut self, id: LayoutId) -> BackendResult<MapLayoutData>;

    fn update_layout_header(&mut self, id: LayoutId, header: &LayoutHeader) -> BackendResult<()>;

    fn update_map_layout_data(&mut self, layout: &MapLayoutData) -> BackendResult<()>;

    fn get_tilesets_rendering_data(
        &mut self,
        tilesets: TilesetPair,
    ) -> BackendResult<TilesetsRenderData>;

    fn get_tilesets_lengths(&mut self, tilesets: TilesetPair) -> BackendResult<TilesetLengths>;

    /// Store a tileset's encoded permission string
    fn update_tileset_level(&mut self, tileset: TilesetOffset, levels: &str) -> BackendResult<()>;

    /// Store the brushes of a tileset pair. Two empty lists are a no-op.
    fn update_brushes(
        &mut self,
        tilesets: TilesetPair,
        primary: &[SerializedBrush],
        secondary: &[SerializedBrush],
    ) -> BackendResult<()>;
}
