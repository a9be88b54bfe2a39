//! Exclusive layout ownership across sessions
//!
//! Two maps may point at the same layout. Only one session at a time may
//! swap or retile it; the others see it as locked until the owner lets go.

use crate::session::SessionId;
use gba_map_core::LayoutId;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct ResourceLockRegistry {
    owners: HashMap<LayoutId, SessionId>,
}

impl ResourceLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a layout. Succeeds when it is free or already owned by `session`.
    pub fn claim(&mut self, layout: LayoutId, session: SessionId) -> bool {
        let owner = *self.owners.entry(layout).or_insert(session);
        if owner == session {
            tracing::debug!("Session {} owns layout {}", session, layout);
        }
        owner == session
    }

    pub fn owner(&self, layout: LayoutId) -> Option<SessionId> {
        self.owners.get(&layout).copied()
    }

    pub fn is_locked_by_other(&self, layout: LayoutId, session: SessionId) -> bool {
        self.owner(layout).is_some_and(|owner| owner != session)
    }

    /// Release a layout. Only the owner can release; returns whether it did.
    pub fn release(&mut self, layout: LayoutId, session: SessionId) -> bool {
        if self.owner(layout) != Some(session) {
            return false;
        }
        self.owners.remove(&layout);
        tracing::debug!("Session {} released layout {}", session, layout);
        true
    }

    /// Release everything a session owns, returning the freed layouts
    pub fn release_all(&mut self, session: SessionId) -> Vec<LayoutId> {
        let mut freed: Vec<LayoutId> = self
            .owners
            .iter()
            .filter(|(_, owner)| **owner == session)
            .map(|(layout, _)| *layout)
            .collect();
        freed.sort_unstable();
        for layout in &freed {
            self.owners.remove(layout);
        }
        freed
    }
}
