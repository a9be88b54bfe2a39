//! Linear undo/redo history with save locking

use super::{Change, ChangeId, ChangeTarget, History, Preparation};
use crate::preferences::DEFAULT_COALESCE_WINDOW_MS;
use crate::session::SessionData;
use crate::ChangeError;
use std::collections::VecDeque;

/// What happened to a pushed change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Applied and recorded as a new entry
    Applied,
    /// Applied and merged into the previous entry
    Coalesced,
    /// The history is locked by a save; the change runs when the save ends
    Queued,
    /// The change would not have changed anything
    Discarded,
    /// The session may not edit this resource
    Locked,
}

impl PushOutcome {
    /// Whether the session data changed
    pub fn applied(self) -> bool {
        matches!(self, PushOutcome::Applied | PushOutcome::Coalesced)
    }
}

/// An ordered history of changes with a `top` cursor.
///
/// Entries below `top` are applied, entries at or above it are undone and
/// can be redone until the next push discards them.
#[derive(Debug)]
pub struct ChangeStack {
    stack: Vec<Change>,
    top: usize,
    locked: u32,
    queue: VecDeque<Change>,
    last_saved: Option<ChangeId>,
    unsaved: bool,
    saving: bool,
    coalesce_window_ms: u64,
}

impl Default for ChangeStack {
    fn default() -> Self {
        Self::new(DEFAULT_COALESCE_WINDOW_MS)
    }
}

impl ChangeStack {
    pub fn new(coalesce_window_ms: u64) -> Self {
        Self {
            stack: Vec::new(),
            top: 0,
            locked: 0,
            queue: VecDeque::new(),
            last_saved: None,
            unsaved: false,
            saving: false,
            coalesce_window_ms,
        }
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn top(&self) -> usize {
        self.top
    }

    /// The most recently applied change
    pub fn current(&self) -> Option<&Change> {
        self.top.checked_sub(1).and_then(|i| self.stack.get(i))
    }

    /// The change the next redo would apply
    pub fn next_redo(&self) -> Option<&Change> {
        self.stack.get(self.top)
    }

    /// All recorded changes, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.stack.iter()
    }

    pub fn is_locked(&self) -> bool {
        self.locked > 0
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn has_unsaved(&self) -> bool {
        self.unsaved
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn can_undo(&self) -> bool {
        !self.is_locked() && self.top > 0
    }

    pub fn can_redo(&self) -> bool {
        !self.is_locked() && self.top < self.stack.len()
    }

    /// Record and apply a change.
    ///
    /// While locked the change is queued untouched. A change that would do
    /// nothing is dropped. A failed apply leaves history and data as they were.
    pub fn push(
        &mut self,
        mut change: Change,
        data: &mut SessionData,
    ) -> Result<PushOutcome, ChangeError> {
        if self.is_locked() {
            tracing::debug!("Queued {} while saving", change.display_name());
            self.queue.push_back(change);
            return Ok(PushOutcome::Queued);
        }

        let history = History {
            previous: self.current(),
            len: self.stack.len(),
            coalesce_window_ms: self.coalesce_window_ms,
        };
        let preparation = change.prepare(&history, data);
        if preparation == Preparation::Discard {
            return Ok(PushOutcome::Discarded);
        }

        change.apply(data)?;

        self.stack.truncate(self.top);
        if preparation == Preparation::Coalesce {
            self.stack.pop();
        }
        self.stack.push(change);
        self.top = self.stack.len();
        self.refresh_unsaved();

        Ok(if preparation == Preparation::Coalesce {
            PushOutcome::Coalesced
        } else {
            PushOutcome::Applied
        })
    }

    /// Revert the current change. Returns false when there is nothing to undo
    /// or the history is locked. A failed revert keeps `top` where it was.
    pub fn undo(&mut self, data: &mut SessionData) -> Result<bool, ChangeError> {
        if !self.can_undo() {
            return Ok(false);
        }
        self.stack[self.top - 1].revert(data)?;
        self.top -= 1;
        self.refresh_unsaved();
        Ok(true)
    }

    /// Re-apply the last undone change. A failed apply keeps `top` where it was.
    pub fn redo(&mut self, data: &mut SessionData) -> Result<bool, ChangeError> {
        if !self.can_redo() {
            return Ok(false);
        }
        self.stack[self.top].apply(data)?;
        self.top += 1;
        self.refresh_unsaved();
        Ok(true)
    }

    /// Lock the history for a save. Returns false, without locking, when
    /// there is nothing unsaved.
    pub fn begin_save(&mut self) -> bool {
        if !self.unsaved {
            return false;
        }
        self.saving = true;
        self.locked += 1;
        true
    }

    /// Mark the current change as saved, unlock and replay queued pushes.
    /// Returns the targets of the replayed changes that took effect.
    pub fn complete_save(&mut self, data: &mut SessionData) -> Vec<ChangeTarget> {
        self.saving = false;
        self.last_saved = self.current().map(Change::id);
        self.unsaved = false;
        self.unlock(data)
    }

    /// Unlock after a failed save. Unsaved state is kept.
    pub fn abort_save(&mut self, data: &mut SessionData) -> Vec<ChangeTarget> {
        self.saving = false;
        self.unlock(data)
    }

    fn unlock(&mut self, data: &mut SessionData) -> Vec<ChangeTarget> {
        self.locked = self.locked.saturating_sub(1);
        if self.is_locked() {
            return Vec::new();
        }

        let mut touched = Vec::new();
        while let Some(change) = self.queue.pop_front() {
            let target = change.target();
            let name = change.display_name();
            match self.push(change, data) {
                Ok(outcome) if outcome.applied() => touched.push(target),
                Ok(_) => {}
                Err(e) => tracing::warn!("Dropped queued {}: {}", name, e),
            }
        }
        touched
    }

    fn refresh_unsaved(&mut self) {
        self.unsaved = self.current().map(Change::id) != self.last_saved;
    }
}
