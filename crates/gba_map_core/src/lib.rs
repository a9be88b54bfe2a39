//! Core data structures for gba_map_editor
//!
//! This crate provides the plain-data types shared by every editing surface:
//! - `BlockGrid` - A rectangular grid of (metatile, permission) cells
//! - `CellKey` - The `"{x},{y}"` coordinate hash used to key painted cells
//! - `BrushDefinition` - A reusable simple or nine-patch brush
//! - `encode_permissions` / `decode_permissions` - The compact permission string codec
//! - `MapLayoutData`, `LayoutHeader`, `TilesetPair` - Backend wire records
//! - `RomConfig` - The persisted per-ROM configuration store
//!
//! This crate has no Bevy dependency.

mod blocks;
mod brush;
mod cell;
mod config;
mod error;
mod layout;
mod permissions;

pub use blocks::{Block, BlockGrid, SerializedBlocks, NULL_METATILE, NULL_PERMISSION, PALETTE_WIDTH};
pub use brush::{BrushDefinition, BrushId, BrushKind, SerializedBrush, SerializedBrushType};
pub use cell::CellKey;
pub use config::{PrimaryBrushStore, RomConfig};
pub use error::{BlockGridError, CellKeyError, EncodingError};
pub use layout::{
    LayoutHeader, LayoutId, MapId, MapLayoutData, TilesetLengths, TilesetOffset, TilesetPair,
    TilesetsRenderData,
};
pub use permissions::{decode_permissions, encode_permissions};
