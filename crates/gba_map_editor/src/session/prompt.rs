//! User dialogs the engine needs answered

use gba_map_core::{LayoutId, TilesetPair};

/// Answer to "save before closing?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveChoice {
    Save,
    Discard,
    Cancel,
}

/// Dialogs shown by the host application.
///
/// Pickers return `None` when the user cancels.
pub trait Prompter {
    /// Ask for a replacement layout; `reason` says why the current one is unusable
    fn pick_layout(&mut self, reason: &str, current: Option<LayoutId>) -> Option<LayoutId>;

    /// Ask for a replacement tileset pair
    fn pick_tilesets(&mut self, reason: &str, current: TilesetPair) -> Option<TilesetPair>;

    fn confirm_save(&mut self, session: &str) -> SaveChoice;

    fn show_error(&mut self, title: &str, message: &str);
}
