//! Error types for the editing engine

use crate::changes::{BrushSlot, GridTarget};
use crate::session::SessionId;
use gba_map_core::{CellKey, EncodingError};
use thiserror::Error;

/// A backend command refused the request. The message is shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub command: &'static str,
    pub message: String,
}

impl BackendError {
    pub fn new(command: &'static str, message: impl Into<String>) -> Self {
        Self {
            command,
            message: message.into(),
        }
    }
}

/// A change could not be applied to or reverted from its data cell
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChangeError {
    #[error("value path {path} is blocked at {segment}")]
    PathBlocked { path: String, segment: String },
    #[error("brush position {index} is out of range for the {slot:?} brushes")]
    BrushPosition { slot: BrushSlot, index: usize },
    #[error("no brush is being edited")]
    NoEditingBrush,
    #[error("cell {cell} is outside the {target:?} grid")]
    OutOfBounds { cell: CellKey, target: GridTarget },
}

/// Errors surfaced by workspace operations
#[derive(Debug, Error)]
pub enum EditorError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Change(#[from] ChangeError),
    #[error("could not encode permissions: {0}")]
    Encoding(#[from] EncodingError),
    #[error("no open session {0}")]
    UnknownSession(SessionId),
    #[error("cancelled")]
    Cancelled,
    #[error("no brush edit is in progress")]
    NoBrushEdit,
}
