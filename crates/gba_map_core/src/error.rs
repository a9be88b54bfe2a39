//! Error types for the core data crate

use thiserror::Error;

/// Failure while encoding or decoding a permission string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("permission {value} at index {index} cannot be represented as a glyph")]
    UnencodableValue { index: usize, value: u16 },
    #[error("invalid permission glyph {glyph:?} at index {index}")]
    InvalidGlyph { index: usize, glyph: char },
}

/// Failure while parsing a `"{x},{y}"` cell key
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed cell key {0:?}")]
pub struct CellKeyError(pub String);

/// Serialized grid whose arrays disagree with its dimensions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockGridError {
    #[error("grid is {width}x{height} but has {metatiles} metatiles and {permissions} permissions")]
    LengthMismatch {
        width: u32,
        height: u32,
        metatiles: usize,
        permissions: usize,
    },
}
