//! Persisted per-ROM configuration

use crate::{
    decode_permissions, encode_permissions, BrushDefinition, EncodingError, LayoutId,
    SerializedBrush, TilesetOffset,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Brushes stored for one primary tileset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimaryBrushStore {
    /// Brushes that only use the primary tileset
    pub brushes: Vec<Value>,
    /// Brushes authored against (this primary, key secondary)
    #[serde(default)]
    pub secondary: BTreeMap<TilesetOffset, Vec<Value>>,
}

/// The configuration file that lives next to a ROM.
///
/// Brushes are kept as raw JSON so an entry this version cannot read
/// survives a load/save cycle untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RomConfig {
    #[serde(default)]
    pub layout_names: BTreeMap<LayoutId, String>,
    #[serde(default)]
    pub tileset_names: BTreeMap<TilesetOffset, String>,
    /// Encoded permission string per tileset
    #[serde(default)]
    pub tileset_levels: BTreeMap<TilesetOffset, String>,
    #[serde(default)]
    pub brushes: BTreeMap<TilesetOffset, PrimaryBrushStore>,
}

impl RomConfig {
    /// Decoded permissions of a tileset with `len` metatiles.
    /// Tilesets without a stored string decode to all-empty.
    pub fn tileset_permissions(
        &self,
        tileset: TilesetOffset,
        len: usize,
    ) -> Result<Vec<Option<u16>>, EncodingError> {
        match self.tileset_levels.get(&tileset) {
            Some(encoded) => decode_permissions(encoded, len),
            None => Ok(vec![None; len]),
        }
    }

    /// Store the permissions of a tileset
    pub fn set_tileset_permissions(
        &mut self,
        tileset: TilesetOffset,
        levels: &[Option<u16>],
    ) -> Result<(), EncodingError> {
        let encoded = encode_permissions(levels)?;
        self.tileset_levels.insert(tileset, encoded);
        Ok(())
    }

    /// Brushes of a primary tileset. Entries that fail to parse are skipped.
    pub fn primary_brushes(&self, primary: TilesetOffset) -> Vec<BrushDefinition> {
        self.brushes
            .get(&primary)
            .map(|store| parse_brushes(&store.brushes))
            .unwrap_or_default()
    }

    /// Brushes of a (primary, secondary) pair. Entries that fail to parse are skipped.
    pub fn secondary_brushes(
        &self,
        primary: TilesetOffset,
        secondary: TilesetOffset,
    ) -> Vec<BrushDefinition> {
        self.brushes
            .get(&primary)
            .and_then(|store| store.secondary.get(&secondary))
            .map(|values| parse_brushes(values))
            .unwrap_or_default()
    }

    /// Replace the stored brushes of a tileset pair
    pub fn set_brushes(
        &mut self,
        primary: TilesetOffset,
        secondary: TilesetOffset,
        primary_brushes: Vec<SerializedBrush>,
        secondary_brushes: Vec<SerializedBrush>,
    ) -> Result<(), serde_json::Error> {
        let primary_values = primary_brushes
            .into_iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        let secondary_values = secondary_brushes
            .into_iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;

        let store = self.brushes.entry(primary).or_default();
        store.brushes = primary_values;
        store.secondary.insert(secondary, secondary_values);
        Ok(())
    }
}

fn parse_brushes(values: &[Value]) -> Vec<BrushDefinition> {
    values
        .iter()
        .filter_map(|value| serde_json::from_value::<SerializedBrush>(value.clone()).ok())
        .map(BrushDefinition::from_serialized)
        .collect()
}
