//! In-memory backend for headless use and tests

use super::{Backend, BackendResult};
use crate::BackendError;
use gba_map_core::{
    LayoutHeader, LayoutId, MapId, MapLayoutData, RomConfig, SerializedBrush, TilesetLengths,
    TilesetOffset, TilesetPair, TilesetsRenderData,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

const LAYOUT_TABLE_OFFSET: usize = 0x0834_EB8C;

/// A ROM held entirely in memory.
///
/// Individual commands can be made to fail to exercise rollback paths.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    pub config: RomConfig,
    pub headers: HashMap<MapId, Value>,
    pub layouts: BTreeMap<LayoutId, MapLayoutData>,
    /// Metatile count of every known tileset
    pub tilesets: HashMap<TilesetOffset, usize>,
    failing: HashSet<&'static str>,
    calls: Vec<&'static str>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_map(mut self, map: MapId, header: Value) -> Self {
        self.headers.insert(map, header);
        self
    }

    pub fn with_layout(mut self, layout: MapLayoutData) -> Self {
        self.layouts.insert(layout.id, layout);
        self
    }

    pub fn with_tileset(mut self, offset: TilesetOffset, metatiles: usize) -> Self {
        self.tilesets.insert(offset, metatiles);
        self
    }

    /// Make every later call of `command` fail
    pub fn fail(&mut self, command: &'static str) {
        self.failing.insert(command);
    }

    pub fn recover(&mut self, command: &'static str) {
        self.failing.remove(command);
    }

    /// Names of the commands called so far, in order
    pub fn calls(&self) -> &[&'static str] {
        &self.calls
    }

    pub fn count_calls(&self, command: &str) -> usize {
        self.calls.iter().filter(|c| **c == command).count()
    }

    fn enter(&mut self, command: &'static str) -> BackendResult<()> {
        self.calls.push(command);
        if self.failing.contains(command) {
            return Err(BackendError::new(command, format!("{command} failed")));
        }
        Ok(())
    }

    fn tileset_len(&self, command: &'static str, offset: TilesetOffset) -> BackendResult<usize> {
        self.tilesets
            .get(&offset)
            .copied()
            .ok_or_else(|| BackendError::new(command, format!("Invalid tileset offset {offset:#x}")))
    }

    fn layout(&self, command: &'static str, id: LayoutId) -> BackendResult<&MapLayoutData> {
        self.layouts
            .get(&id)
            .ok_or_else(|| BackendError::new(command, format!("Invalid layout id {id}")))
    }
}

impl Backend for MemoryBackend {
    fn get_config(&mut self) -> BackendResult<RomConfig> {
        self.enter("get_config")?;
        Ok(self.config.clone())
    }

    fn get_map_header_data(&mut self, map: MapId) -> BackendResult<Value> {
        self.enter("get_map_header_data")?;
        self.headers
            .get(&map)
            .cloned()
            .ok_or_else(|| BackendError::new("get_map_header_data", format!("No map {map}")))
    }

    fn update_map_header(&mut self, map: MapId, header: &Value) -> BackendResult<()> {
        self.enter("update_map_header")?;
        let entry = self
            .headers
            .get_mut(&map)
            .ok_or_else(|| BackendError::new("update_map_header", format!("No map {map}")))?;
        *entry = header.clone();
        Ok(())
    }

    fn get_layout_offset(&mut self, id: LayoutId) -> BackendResult<usize> {
        self.enter("get_layout_offset")?;
        self.layout("get_layout_offset", id)?;
        Ok(LAYOUT_TABLE_OFFSET + id as usize * 4)
    }

    fn get_map_layout_data(&mut self, id: LayoutId) -> BackendResult<MapLayoutData> {
        self.enter("get_map_layout_data")?;
        self.layout("get_map_layout_data", id).cloned()
    }

    fn update_layout_header(&mut self, id: LayoutId, header: &LayoutHeader) -> BackendResult<()> {
        self.enter("update_layout_header")?;
        self.tileset_len("update_layout_header", header.primary_tileset)?;
        self.tileset_len("update_layout_header", header.secondary_tileset)?;
        let layout = self
            .layouts
            .get_mut(&id)
            .ok_or_else(|| BackendError::new("update_layout_header", format!("Invalid layout id {id}")))?;
        layout.header = *header;
        Ok(())
    }

    fn update_map_layout_data(&mut self, layout: &MapLayoutData) -> BackendResult<()> {
        self.enter("update_map_layout_data")?;
        self.layout("update_map_layout_data", layout.id)?;
        self.layouts.insert(layout.id, layout.clone());
        Ok(())
    }

    fn get_tilesets_rendering_data(
        &mut self,
        tilesets: TilesetPair,
    ) -> BackendResult<TilesetsRenderData> {
        self.enter("get_tilesets_rendering_data")?;
        let lengths = self.lengths("get_tilesets_rendering_data", tilesets)?;
        Ok(TilesetsRenderData {
            tilesets,
            metatiles: lengths.total(),
        })
    }

    fn get_tilesets_lengths(&mut self, tilesets: TilesetPair) -> BackendResult<TilesetLengths> {
        self.enter("get_tilesets_lengths")?;
        self.lengths("get_tilesets_lengths", tilesets)
    }

    fn update_tileset_level(&mut self, tileset: TilesetOffset, levels: &str) -> BackendResult<()> {
        self.enter("update_tileset_level")?;
        self.tileset_len("update_tileset_level", tileset)?;
        self.config.tileset_levels.insert(tileset, levels.to_string());
        Ok(())
    }

    fn update_brushes(
        &mut self,
        tilesets: TilesetPair,
        primary: &[SerializedBrush],
        secondary: &[SerializedBrush],
    ) -> BackendResult<()> {
        self.enter("update_brushes")?;
        if primary.is_empty() && secondary.is_empty() {
            return Ok(());
        }
        self.config
            .set_brushes(
                tilesets.primary,
                tilesets.secondary,
                primary.to_vec(),
                secondary.to_vec(),
            )
            .map_err(|e| BackendError::new("update_brushes", e.to_string()))
    }
}

impl MemoryBackend {
    fn lengths(&self, command: &'static str, tilesets: TilesetPair) -> BackendResult<TilesetLengths> {
        Ok(TilesetLengths::new(
            self.tileset_len(command, tilesets.primary)?,
            self.tileset_len(command, tilesets.secondary)?,
        ))
    }
}
