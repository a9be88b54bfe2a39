//! Undoable changes and the history they are recorded in
//!
//! Every edit a session makes is one [`Change`]: a closed set of variants that
//! each know how to capture their pre-state, apply and revert against the
//! session's [`SessionData`]. Changes are recorded in a [`ChangeStack`].

mod brush;
mod paint;
mod stack;
mod swap;
mod value;

pub use brush::{AddBrushChange, BrushSlot, DeleteBrushChange, EditBrushChange};
pub use paint::{GridTarget, PaintChange, PaintTracker};
pub use stack::{ChangeStack, PushOutcome};
pub use swap::{SwapSnapshot, UpdateLayoutChange, UpdateTilesetsChange};
pub use value::{ValueChange, ValuePath};

use crate::session::SessionData;
use crate::ChangeError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static NEXT_CHANGE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique, monotonically increasing change identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChangeId(pub u64);

impl ChangeId {
    fn next() -> Self {
        Self(NEXT_CHANGE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Which history of a session a change is recorded in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackKind {
    /// Map edits: header values, layout and border paint, brush lists, swaps
    Map,
    /// Permission edits on the palette
    Palette,
    /// Paint on the brush currently open in the brush editor
    Brush,
}

/// What a change touches, used to route follow-up work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeTarget {
    Header,
    Grid(GridTarget),
    Brushes(BrushSlot),
    Layout,
    Tilesets,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeKind {
    Value(ValueChange),
    Paint(PaintChange),
    AddBrush(AddBrushChange),
    DeleteBrush(DeleteBrushChange),
    EditBrush(EditBrushChange),
    UpdateLayout(UpdateLayoutChange),
    UpdateTilesets(UpdateTilesetsChange),
}

/// One undoable edit
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    id: ChangeId,
    timestamp_ms: u64,
    kind: ChangeKind,
}

/// Result of inspecting the history before a change is pushed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Preparation {
    /// The change would do nothing
    Discard,
    Ready,
    /// The change absorbed the current entry, which must be replaced
    Coalesce,
}

/// The part of a history a change may look at while preparing
pub(crate) struct History<'a> {
    pub previous: Option<&'a Change>,
    pub len: usize,
    pub coalesce_window_ms: u64,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl Change {
    pub fn new(kind: ChangeKind) -> Self {
        Self {
            id: ChangeId::next(),
            timestamp_ms: now_ms(),
            kind,
        }
    }

    /// Set a header value
    pub fn value(path: impl Into<ValuePath>, next: serde_json::Value) -> Self {
        Self::new(ChangeKind::Value(ValueChange::new(path, next)))
    }

    /// Remove a header value
    pub fn remove_value(path: impl Into<ValuePath>) -> Self {
        Self::new(ChangeKind::Value(ValueChange {
            path: path.into(),
            prev: None,
            next: None,
        }))
    }

    pub fn add_brush(slot: BrushSlot, brush: gba_map_core::BrushDefinition) -> Self {
        Self::new(ChangeKind::AddBrush(AddBrushChange::new(slot, brush)))
    }

    pub fn delete_brush(slot: BrushSlot, id: gba_map_core::BrushId) -> Self {
        Self::new(ChangeKind::DeleteBrush(DeleteBrushChange::new(slot, id)))
    }

    /// Override the creation time, in milliseconds since the Unix epoch
    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    pub fn id(&self) -> ChangeId {
        self.id
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn kind(&self) -> &ChangeKind {
        &self.kind
    }

    /// Short label for history lists
    pub fn display_name(&self) -> &'static str {
        match &self.kind {
            ChangeKind::Value(_) => "Value Changed",
            ChangeKind::Paint(paint) => match paint.target {
                GridTarget::Map => "Paint Map",
                GridTarget::Border => "Paint Border",
                GridTarget::Palette => "Paint Permissions",
                GridTarget::EditingBrush => "Paint Brush",
            },
            ChangeKind::AddBrush(_) => "Add Brush",
            ChangeKind::DeleteBrush(_) => "Delete Brush",
            ChangeKind::EditBrush(_) => "Edit Brush",
            ChangeKind::UpdateLayout(_) => "Change Layout",
            ChangeKind::UpdateTilesets(_) => "Change Tilesets",
        }
    }

    pub fn target(&self) -> ChangeTarget {
        match &self.kind {
            ChangeKind::Value(_) => ChangeTarget::Header,
            ChangeKind::Paint(paint) => ChangeTarget::Grid(paint.target),
            ChangeKind::AddBrush(change) => ChangeTarget::Brushes(change.slot),
            ChangeKind::DeleteBrush(change) => ChangeTarget::Brushes(change.slot),
            ChangeKind::EditBrush(change) => ChangeTarget::Brushes(change.slot),
            ChangeKind::UpdateLayout(_) => ChangeTarget::Layout,
            ChangeKind::UpdateTilesets(_) => ChangeTarget::Tilesets,
        }
    }

    /// Capture pre-state and decide whether the change is a no-op or merges
    /// with the current history entry
    pub(crate) fn prepare(&mut self, history: &History<'_>, data: &SessionData) -> Preparation {
        let timestamp_ms = self.timestamp_ms;
        match &mut self.kind {
            ChangeKind::Value(change) => change.prepare(timestamp_ms, history, data),
            ChangeKind::Paint(change) => change.prepare(),
            ChangeKind::AddBrush(change) => change.prepare(data),
            ChangeKind::DeleteBrush(change) => change.prepare(data),
            ChangeKind::EditBrush(change) => change.prepare(),
            ChangeKind::UpdateLayout(change) => swap::prepare(&change.before, &change.after),
            ChangeKind::UpdateTilesets(change) => swap::prepare(&change.before, &change.after),
        }
    }

    pub(crate) fn apply(&self, data: &mut SessionData) -> Result<(), ChangeError> {
        match &self.kind {
            ChangeKind::Value(change) => change.apply(data),
            ChangeKind::Paint(change) => change.apply(data),
            ChangeKind::AddBrush(change) => change.apply(data),
            ChangeKind::DeleteBrush(change) => change.apply(data),
            ChangeKind::EditBrush(change) => change.apply(data),
            ChangeKind::UpdateLayout(change) => {
                change.after.restore(data);
                Ok(())
            }
            ChangeKind::UpdateTilesets(change) => {
                change.after.restore(data);
                Ok(())
            }
        }
    }

    pub(crate) fn revert(&self, data: &mut SessionData) -> Result<(), ChangeError> {
        match &self.kind {
            ChangeKind::Value(change) => change.revert(data),
            ChangeKind::Paint(change) => change.revert(data),
            ChangeKind::AddBrush(change) => change.revert(data),
            ChangeKind::DeleteBrush(change) => change.revert(data),
            ChangeKind::EditBrush(change) => change.revert(data),
            ChangeKind::UpdateLayout(change) => {
                change.before.restore(data);
                Ok(())
            }
            ChangeKind::UpdateTilesets(change) => {
                change.before.restore(data);
                Ok(())
            }
        }
    }
}
