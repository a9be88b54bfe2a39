//! Brush list edits, keyed by list position

use super::Preparation;
use crate::session::SessionData;
use crate::ChangeError;
use gba_map_core::{BrushDefinition, BrushId};
use serde::{Deserialize, Serialize};

/// Which of the session's two brush lists an edit targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BrushSlot {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddBrushChange {
    pub slot: BrushSlot,
    pub brush: BrushDefinition,
    pub position: usize,
}

impl AddBrushChange {
    pub fn new(slot: BrushSlot, brush: BrushDefinition) -> Self {
        Self {
            slot,
            brush,
            position: 0,
        }
    }

    pub(super) fn prepare(&mut self, data: &SessionData) -> Preparation {
        self.position = data.brushes.get(self.slot).len();
        Preparation::Ready
    }

    pub(super) fn apply(&self, data: &mut SessionData) -> Result<(), ChangeError> {
        let list = data.brushes.get_mut(self.slot);
        if self.position > list.len() {
            return Err(position_error(self.slot, self.position));
        }
        list.insert(self.position, self.brush.clone());
        Ok(())
    }

    pub(super) fn revert(&self, data: &mut SessionData) -> Result<(), ChangeError> {
        remove_at(data, self.slot, self.position, self.brush.id).map(drop)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteBrushChange {
    pub slot: BrushSlot,
    pub id: BrushId,
    /// Position and content captured when the change was pushed
    pub removed: Option<(usize, BrushDefinition)>,
}

impl DeleteBrushChange {
    pub fn new(slot: BrushSlot, id: BrushId) -> Self {
        Self {
            slot,
            id,
            removed: None,
        }
    }

    pub(super) fn prepare(&mut self, data: &SessionData) -> Preparation {
        let list = data.brushes.get(self.slot);
        match list.iter().position(|brush| brush.id == self.id) {
            Some(position) => {
                self.removed = Some((position, list[position].clone()));
                Preparation::Ready
            }
            None => Preparation::Discard,
        }
    }

    pub(super) fn apply(&self, data: &mut SessionData) -> Result<(), ChangeError> {
        let (position, _) = self.removed.as_ref().ok_or(position_error(self.slot, 0))?;
        remove_at(data, self.slot, *position, self.id).map(drop)
    }

    pub(super) fn revert(&self, data: &mut SessionData) -> Result<(), ChangeError> {
        let (position, brush) = self.removed.as_ref().ok_or(position_error(self.slot, 0))?;
        let list = data.brushes.get_mut(self.slot);
        if *position > list.len() {
            return Err(position_error(self.slot, *position));
        }
        list.insert(*position, brush.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditBrushChange {
    pub slot: BrushSlot,
    pub index: usize,
    pub before: BrushDefinition,
    pub after: BrushDefinition,
}

impl EditBrushChange {
    pub(super) fn prepare(&self) -> Preparation {
        if self.before.same_content(&self.after) {
            Preparation::Discard
        } else {
            Preparation::Ready
        }
    }

    pub(super) fn apply(&self, data: &mut SessionData) -> Result<(), ChangeError> {
        replace_at(data, self.slot, self.index, &self.after)
    }

    pub(super) fn revert(&self, data: &mut SessionData) -> Result<(), ChangeError> {
        replace_at(data, self.slot, self.index, &self.before)
    }
}

fn position_error(slot: BrushSlot, index: usize) -> ChangeError {
    ChangeError::BrushPosition { slot, index }
}

fn remove_at(
    data: &mut SessionData,
    slot: BrushSlot,
    position: usize,
    id: BrushId,
) -> Result<BrushDefinition, ChangeError> {
    let list = data.brushes.get_mut(slot);
    match list.get(position) {
        Some(brush) if brush.id == id => Ok(list.remove(position)),
        _ => Err(position_error(slot, position)),
    }
}

fn replace_at(
    data: &mut SessionData,
    slot: BrushSlot,
    index: usize,
    brush: &BrushDefinition,
) -> Result<(), ChangeError> {
    let entry = data
        .brushes
        .get_mut(slot)
        .get_mut(index)
        .ok_or(position_error(slot, index))?;
    *entry = brush.clone();
    Ok(())
}
