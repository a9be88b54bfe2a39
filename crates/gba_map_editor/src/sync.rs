//! Propagation of shared tileset data between sessions
//!
//! Sessions whose layouts use the same tilesets share those tilesets'
//! permissions and brushes. The bus knows which tileset pair every session
//! shows and turns that into delivery routes.

use crate::changes::BrushSlot;
use crate::session::SessionId;
use gba_map_core::{BrushId, TilesetLengths, TilesetPair};
use std::ops::Range;

/// How two sessions' tileset pairs overlap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlap {
    /// Same primary and secondary tileset
    Both,
    PrimaryOnly,
    SecondaryOnly,
}

impl Overlap {
    pub fn between(a: TilesetPair, b: TilesetPair) -> Option<Overlap> {
        match (a.primary == b.primary, a.secondary == b.secondary) {
            (true, true) => Some(Overlap::Both),
            (true, false) => Some(Overlap::PrimaryOnly),
            (false, true) => Some(Overlap::SecondaryOnly),
            (false, false) => None,
        }
    }

    /// Whether a brush list in `slot` is shared under this overlap.
    /// Secondary brushes belong to a tileset pair, so they need both.
    pub fn shares_brushes(self, slot: BrushSlot) -> bool {
        match slot {
            BrushSlot::Primary => matches!(self, Overlap::Both | Overlap::PrimaryOnly),
            BrushSlot::Secondary => self == Overlap::Both,
        }
    }
}

/// The tileset pair a session currently shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    pub tilesets: TilesetPair,
    pub lengths: TilesetLengths,
}

/// Where a slice of a source session's palette permissions lands in a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRoute {
    pub target: SessionId,
    pub overlap: Overlap,
    /// Linear palette indices read from the source
    pub source: Range<usize>,
    /// First linear palette index written in the target
    pub destination: usize,
}

impl PermissionRoute {
    /// Route from a session showing `from` into `target`, which shows `to`.
    /// Ranges come from tileset lengths, so they follow the pairs as given.
    pub fn between(target: SessionId, from: Subscription, to: Subscription) -> Option<Self> {
        let overlap = Overlap::between(from.tilesets, to.tilesets)?;
        let (source, destination) = match overlap {
            Overlap::Both => (0..from.lengths.total().min(to.lengths.total()), 0),
            Overlap::PrimaryOnly => (0..from.lengths.primary.min(to.lengths.primary), 0),
            Overlap::SecondaryOnly => {
                let len = from.lengths.secondary.min(to.lengths.secondary);
                let start = from.lengths.primary;
                (start..start + len, to.lengths.primary)
            }
        };
        Some(Self {
            target,
            overlap,
            source,
            destination,
        })
    }
}

#[derive(Debug, Default)]
pub struct SiblingSyncBus {
    subscriptions: Vec<(SessionId, Subscription)>,
}

impl SiblingSyncBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a session, or update the pair it shows
    pub fn subscribe(&mut self, session: SessionId, subscription: Subscription) {
        match self.subscriptions.iter_mut().find(|(id, _)| *id == session) {
            Some((_, existing)) => *existing = subscription,
            None => self.subscriptions.push((session, subscription)),
        }
    }

    pub fn unsubscribe(&mut self, session: SessionId) {
        self.subscriptions.retain(|(id, _)| *id != session);
    }

    pub fn subscription(&self, session: SessionId) -> Option<Subscription> {
        self.subscriptions
            .iter()
            .find(|(id, _)| *id == session)
            .map(|(_, subscription)| *subscription)
    }

    /// Every other subscribed session that shares a tileset with `source`
    pub fn siblings(&self, source: SessionId) -> Vec<(SessionId, Overlap)> {
        let Some(origin) = self.subscription(source) else {
            return Vec::new();
        };
        self.subscriptions
            .iter()
            .filter(|(id, _)| *id != source)
            .filter_map(|(id, sub)| Overlap::between(origin.tilesets, sub.tilesets).map(|o| (*id, o)))
            .collect()
    }

    /// Sessions that receive `source`'s brush list in `slot`
    pub fn brush_targets(&self, source: SessionId, slot: BrushSlot) -> Vec<SessionId> {
        self.siblings(source)
            .into_iter()
            .filter(|(_, overlap)| overlap.shares_brushes(slot))
            .map(|(id, _)| id)
            .collect()
    }

    /// Route for copying `source`'s permissions into `target`
    pub fn permission_route(&self, source: SessionId, target: SessionId) -> Option<PermissionRoute> {
        if source == target {
            return None;
        }
        PermissionRoute::between(target, self.subscription(source)?, self.subscription(target)?)
    }

    /// Routes for delivering `source`'s permissions to every sibling
    pub fn permission_routes(&self, source: SessionId) -> Vec<PermissionRoute> {
        self.subscriptions
            .iter()
            .filter_map(|(id, _)| self.permission_route(source, *id))
            .collect()
    }
}

/// Brushes currently open in some session's brush editor
#[derive(Debug, Default)]
pub struct BrushEditRegistry {
    editing: Vec<(BrushId, SessionId)>,
}

impl BrushEditRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, brush: BrushId, session: SessionId) {
        if !self.editing.contains(&(brush, session)) {
            self.editing.push((brush, session));
        }
    }

    pub fn end(&mut self, brush: BrushId, session: SessionId) {
        self.editing.retain(|entry| *entry != (brush, session));
    }

    /// Drop every edit a session had open
    pub fn end_session(&mut self, session: SessionId) {
        self.editing.retain(|(_, id)| *id != session);
    }

    pub fn is_being_edited(&self, brush: BrushId) -> bool {
        self.editing.iter().any(|(id, _)| *id == brush)
    }

    /// Whether a session other than `session` has the brush open
    pub fn is_edited_elsewhere(&self, brush: BrushId, session: SessionId) -> bool {
        self.editing
            .iter()
            .any(|(id, owner)| *id == brush && *owner != session)
    }
}
