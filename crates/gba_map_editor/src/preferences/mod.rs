//! Editor preferences
//!
//! Persisted per user, independent of any ROM.

mod file;

pub use file::*;

use serde::{Deserialize, Serialize};

/// Default window within which edits of the same value path merge into one undo step
pub const DEFAULT_COALESCE_WINDOW_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorPreferences {
    /// Successive value edits on one path closer than this merge (milliseconds)
    pub value_coalesce_window_ms: u64,
    /// Let paint strokes write an empty permission instead of keeping the old one
    pub allow_null_permissions: bool,
    /// Refuse to open a brush that another session is already editing
    pub block_duplicate_brush_edit: bool,
    /// Corner support for newly created nine-patch brushes
    pub nine_patch_corners: bool,
}

impl Default for EditorPreferences {
    fn default() -> Self {
        Self {
            value_coalesce_window_ms: DEFAULT_COALESCE_WINDOW_MS,
            allow_null_permissions: false,
            block_duplicate_brush_edit: true,
            nine_patch_corners: false,
        }
    }
}
