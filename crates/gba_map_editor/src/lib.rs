//! gba_map_editor - Multi-session editing engine for GBA map data
//!
//! This crate provides the transactional core of the map editor:
//! - Undoable changes recorded in per-session histories that survive saves
//! - Exclusive layout ownership across sessions sharing a layout
//! - Propagation of tileset permissions and brushes between sibling sessions
//! - Painting tools, including nine-patch autotiling
//! - A backend boundary for ROM reads and writes
//!
//! Everything hangs off a [`Workspace`], which owns the open sessions and the
//! registries they share.
//!
//! # Usage
//!
//! ```rust,ignore
//! use gba_map_editor::{backend::MemoryBackend, EditorPreferences, Workspace};
//!
//! let mut workspace = Workspace::new(EditorPreferences::load());
//! let session = workspace.open_map(&mut backend, &mut prompter, map)?;
//! workspace.set_value(session, "music", json!(7))?;
//! workspace.save(&mut backend, &mut prompter, session)?;
//! ```
//!
//! With the `bevy` feature the workspace is a Bevy resource and
//! [`WorkspacePlugin`] inserts one at startup.

pub mod backend;
pub mod changes;
pub mod error;
pub mod locks;
pub mod preferences;
pub mod session;
pub mod sync;
pub mod tools;
pub mod workspace;

pub use error::{BackendError, ChangeError, EditorError};
pub use preferences::EditorPreferences;
pub use workspace::{BrushEditStart, CloseOutcome, SaveJob, SwapOutcome, Workspace};

// Re-export the data crates
pub use gba_map_autotile;
pub use gba_map_core;

/// Inserts a [`Workspace`] resource built from the user's preferences
///
/// # Example
///
/// ```rust,ignore
/// use bevy::prelude::*;
/// use gba_map_editor::WorkspacePlugin;
///
/// App::new()
///     .add_plugins(MinimalPlugins)
///     .add_plugins(WorkspacePlugin::new())
///     .run();
/// ```
#[cfg(feature = "bevy")]
#[derive(Default)]
pub struct WorkspacePlugin {
    /// Preferences to use instead of the ones stored on disk
    pub preferences: Option<EditorPreferences>,
}

#[cfg(feature = "bevy")]
impl WorkspacePlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preferences(mut self, preferences: EditorPreferences) -> Self {
        self.preferences = Some(preferences);
        self
    }
}

#[cfg(feature = "bevy")]
impl bevy::app::Plugin for WorkspacePlugin {
    fn build(&self, app: &mut bevy::app::App) {
        let preferences = self
            .preferences
            .clone()
            .unwrap_or_else(EditorPreferences::load);
        app.insert_resource(Workspace::new(preferences));
    }
}
