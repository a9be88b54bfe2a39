//! Map editing sessions
//!
//! A session is one open map: its data cell, its histories and its view of
//! the shared resources it touches.

mod data;
mod prompt;

pub use data::{BrushLists, SessionData, LAYOUT_ID_FIELD};
pub use prompt::{Prompter, SaveChoice};

use crate::changes::{BrushSlot, Change, ChangeStack, ChangeTarget, PushOutcome, StackKind};
use crate::ChangeError;
use gba_map_core::{BrushDefinition, LayoutId, MapId};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Still querying the backend; invisible to other sessions
    Loading,
    Ready,
}

/// A brush open in the brush editor
#[derive(Debug)]
pub struct BrushEdit {
    pub slot: BrushSlot,
    pub index: usize,
    /// The brush as it was when editing started
    pub original: BrushDefinition,
    pub changes: ChangeStack,
}

/// Which histories the save in flight has locked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SaveScope {
    pub map: bool,
    pub palette: bool,
}

impl SaveScope {
    pub fn any(self) -> bool {
        self.map || self.palette
    }
}

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    state: SessionState,
    pub(crate) data: SessionData,
    pub(crate) changes: ChangeStack,
    pub(crate) palette_changes: ChangeStack,
    pub(crate) brush_edit: Option<BrushEdit>,
    /// Layout this session holds the lock for
    pub(crate) claimed_layout: Option<LayoutId>,
    pub(crate) layout_locked: bool,
    pub(crate) slated_for_close: bool,
    pub(crate) saving: SaveScope,
}

impl Session {
    pub(crate) fn new(map: MapId, coalesce_window_ms: u64) -> Self {
        Self {
            id: SessionId::new(),
            state: SessionState::Loading,
            data: SessionData::empty(map),
            changes: ChangeStack::new(coalesce_window_ms),
            palette_changes: ChangeStack::new(coalesce_window_ms),
            brush_edit: None,
            claimed_layout: None,
            layout_locked: false,
            slated_for_close: false,
            saving: SaveScope::default(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn map(&self) -> MapId {
        self.data.map
    }

    /// Title shown in tabs and dialogs
    pub fn name(&self) -> String {
        format!("Map {}", self.data.map)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    pub(crate) fn mark_ready(&mut self) {
        self.state = SessionState::Ready;
    }

    pub fn data(&self) -> &SessionData {
        &self.data
    }

    /// Whether another session owns this session's layout
    pub fn is_layout_locked(&self) -> bool {
        self.layout_locked
    }

    pub fn is_saving(&self) -> bool {
        self.saving.any()
    }

    pub fn is_slated_for_close(&self) -> bool {
        self.slated_for_close
    }

    pub fn has_unsaved(&self) -> bool {
        self.changes.has_unsaved() || self.palette_changes.has_unsaved()
    }

    pub fn brush_edit(&self) -> Option<&BrushEdit> {
        self.brush_edit.as_ref()
    }

    pub fn stack(&self, kind: StackKind) -> Option<&ChangeStack> {
        match kind {
            StackKind::Map => Some(&self.changes),
            StackKind::Palette => Some(&self.palette_changes),
            StackKind::Brush => self.brush_edit.as_ref().map(|edit| &edit.changes),
        }
    }

    pub(crate) fn push(&mut self, kind: StackKind, change: Change) -> Result<PushOutcome, ChangeError> {
        match kind {
            StackKind::Map => self.changes.push(change, &mut self.data),
            StackKind::Palette => self.palette_changes.push(change, &mut self.data),
            StackKind::Brush => match &mut self.brush_edit {
                Some(edit) => edit.changes.push(change, &mut self.data),
                None => Err(ChangeError::NoEditingBrush),
            },
        }
    }

    /// Undo on one history, returning the target of the reverted change
    pub(crate) fn undo(&mut self, kind: StackKind) -> Result<Option<ChangeTarget>, ChangeError> {
        let (stack, data) = match self.split(kind) {
            Some(parts) => parts,
            None => return Ok(None),
        };
        if !stack.undo(data)? {
            return Ok(None);
        }
        Ok(stack.next_redo().map(Change::target))
    }

    /// Redo on one history, returning the target of the re-applied change
    pub(crate) fn redo(&mut self, kind: StackKind) -> Result<Option<ChangeTarget>, ChangeError> {
        let (stack, data) = match self.split(kind) {
            Some(parts) => parts,
            None => return Ok(None),
        };
        if !stack.redo(data)? {
            return Ok(None);
        }
        Ok(stack.current().map(Change::target))
    }

    fn split(&mut self, kind: StackKind) -> Option<(&mut ChangeStack, &mut SessionData)> {
        match kind {
            StackKind::Map => Some((&mut self.changes, &mut self.data)),
            StackKind::Palette => Some((&mut self.palette_changes, &mut self.data)),
            StackKind::Brush => match &mut self.brush_edit {
                Some(edit) => Some((&mut edit.changes, &mut self.data)),
                None => None,
            },
        }
    }

    /// Lock the histories that have something to save
    pub(crate) fn begin_save(&mut self) -> SaveScope {
        if self.is_saving() {
            return SaveScope::default();
        }
        self.saving = SaveScope {
            map: self.changes.begin_save(),
            palette: self.palette_changes.begin_save(),
        };
        self.saving
    }

    /// Finish the save in flight. On success the saved histories record
    /// their save point; either way queued pushes replay.
    pub(crate) fn end_save(&mut self, succeeded: bool) -> Vec<ChangeTarget> {
        let scope = std::mem::take(&mut self.saving);
        let mut touched = Vec::new();
        for (locked, stack) in [
            (scope.map, &mut self.changes),
            (scope.palette, &mut self.palette_changes),
        ] {
            if !locked {
                continue;
            }
            touched.extend(if succeeded {
                stack.complete_save(&mut self.data)
            } else {
                stack.abort_save(&mut self.data)
            });
        }
        touched
    }
}
