//! Open sessions and the registries they share
//!
//! The workspace is the one place that sees every session at once. It routes
//! committed edits to siblings, hands out layout ownership and drives the
//! load, save, swap and close flows against a [`Backend`].

use crate::backend::Backend;
use crate::changes::{
    BrushSlot, Change, ChangeKind, ChangeStack, ChangeTarget, EditBrushChange, GridTarget,
    PaintTracker, PushOutcome, StackKind, SwapSnapshot, UpdateLayoutChange, UpdateTilesetsChange,
    ValuePath,
};
use crate::locks::ResourceLockRegistry;
use crate::session::{
    BrushEdit, BrushLists, Prompter, SaveChoice, SaveScope, Session, SessionId, LAYOUT_ID_FIELD,
};
use crate::sync::{BrushEditRegistry, PermissionRoute, SiblingSyncBus, Subscription};
use crate::{BackendError, ChangeError, EditorError, EditorPreferences};
use gba_map_core::{
    encode_permissions, BlockGrid, BrushDefinition, BrushId, LayoutId, MapId, MapLayoutData,
    RomConfig, SerializedBrush, TilesetLengths, TilesetPair, TilesetsRenderData,
};
use serde_json::{json, Value};

/// Result of asking a session to use another layout or tileset pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    Swapped,
    /// The session already uses the requested resource
    Unchanged,
    /// Another session owns the layout
    Locked,
    /// A save is in flight
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrushEditStart {
    Started,
    /// Another session has the brush open and duplicate edits are refused
    EditedElsewhere,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    /// A save is in flight; the session closes when it completes
    Deferred,
    Cancelled,
}

/// Everything a save writes, captured when the save starts.
///
/// Edits made while the job is in flight are queued and land after it.
#[derive(Debug, Clone)]
pub struct SaveJob {
    session: SessionId,
    scope: SaveScope,
    map: MapId,
    header: Value,
    /// `None` when another session owns the layout
    layout: Option<MapLayoutData>,
    tilesets: TilesetPair,
    lengths: TilesetLengths,
    primary_brushes: Vec<SerializedBrush>,
    secondary_brushes: Vec<SerializedBrush>,
    permissions: Vec<Option<u16>>,
}

impl SaveJob {
    pub fn session(&self) -> SessionId {
        self.session
    }
}

#[derive(Debug, Default)]
#[cfg_attr(feature = "bevy", derive(bevy::prelude::Resource))]
pub struct Workspace {
    sessions: Vec<Session>,
    locks: ResourceLockRegistry,
    bus: SiblingSyncBus,
    brush_edits: BrushEditRegistry,
    preferences: EditorPreferences,
}

impl Workspace {
    pub fn new(preferences: EditorPreferences) -> Self {
        Self {
            preferences,
            ..Default::default()
        }
    }

    pub fn preferences(&self) -> &EditorPreferences {
        &self.preferences
    }

    /// Replace the preferences. Histories created from now on use the new window.
    pub fn set_preferences(&mut self, preferences: EditorPreferences) {
        self.preferences = preferences;
    }

    /// Sessions that finished loading, in opening order
    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter().filter(|s| s.is_ready())
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id() == id)
    }

    pub fn find_by_map(&self, map: MapId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.map() == map)
    }

    /// Ready sessions other than `id` that match `predicate`
    pub fn other_sessions<'a, P>(
        &'a self,
        id: SessionId,
        predicate: P,
    ) -> impl Iterator<Item = &'a Session> + 'a
    where
        P: Fn(&Session) -> bool + 'a,
    {
        self.sessions
            .iter()
            .filter(move |s| s.id() != id && s.is_ready() && predicate(*s))
    }

    pub fn locks(&self) -> &ResourceLockRegistry {
        &self.locks
    }

    pub fn bus(&self) -> &SiblingSyncBus {
        &self.bus
    }

    pub fn brush_edits(&self) -> &BrushEditRegistry {
        &self.brush_edits
    }

    fn position(&self, id: SessionId) -> Option<usize> {
        self.sessions.iter().position(|s| s.id() == id)
    }

    fn index(&self, id: SessionId) -> Result<usize, EditorError> {
        self.position(id).ok_or(EditorError::UnknownSession(id))
    }

    /// Open a map, or return the session that already has it open.
    ///
    /// Broken layout or tileset references are repaired through the
    /// prompter. Failures are shown to the user and drop the session.
    pub fn open_map(
        &mut self,
        backend: &mut dyn Backend,
        prompter: &mut dyn Prompter,
        map: MapId,
    ) -> Result<SessionId, EditorError> {
        if let Some(existing) = self.find_by_map(map) {
            return Ok(existing.id());
        }

        let session = Session::new(map, self.preferences.value_coalesce_window_ms);
        let id = session.id();
        self.sessions.push(session);
        let idx = self.sessions.len() - 1;

        if let Err(e) = self.load(backend, prompter, idx) {
            self.sessions.remove(idx);
            self.bus.unsubscribe(id);
            if let EditorError::Cancelled = e {
                tracing::info!("Opening map {} cancelled", map);
            } else {
                tracing::warn!("Failed to open map {}: {}", map, e);
                prompter.show_error("Failed to open map", &e.to_string());
            }
            return Err(e);
        }

        self.sessions[idx].mark_ready();
        self.reconcile_resources(idx);
        tracing::info!(
            "Opened {} on layout {}",
            self.sessions[idx].name(),
            self.sessions[idx].data.layout_id()
        );
        Ok(id)
    }

    fn load(
        &mut self,
        backend: &mut dyn Backend,
        prompter: &mut dyn Prompter,
        idx: usize,
    ) -> Result<(), EditorError> {
        let map = self.sessions[idx].map();
        let mut header = backend.get_map_header_data(map)?;
        let referenced = header
            .get(LAYOUT_ID_FIELD)
            .and_then(Value::as_u64)
            .and_then(|id| LayoutId::try_from(id).ok());

        let layout_id = query_layout(backend, prompter, referenced)?;
        if referenced != Some(layout_id) {
            ValuePath::parse(LAYOUT_ID_FIELD).set(&mut header, Some(json!(layout_id)))?;
            backend.update_map_header(map, &header)?;
        }

        let (layout, lengths) = fetch_layout(backend, prompter, layout_id)?;
        let config = backend.get_config()?;
        let subscription = Subscription {
            tilesets: layout.header.tilesets(),
            lengths,
        };
        let (palette, brushes) =
            self.shared_resources(self.sessions[idx].id(), subscription, &config)?;

        let data = &mut self.sessions[idx].data;
        data.header = header;
        data.layout = layout;
        data.lengths = lengths;
        data.palette = palette;
        data.brushes = brushes;
        Ok(())
    }

    /// Check a session's layout and tilesets are still valid, asking for
    /// replacements if not. Returns false when the user cancelled and the
    /// session was closed.
    pub fn revalidate(
        &mut self,
        backend: &mut dyn Backend,
        prompter: &mut dyn Prompter,
        id: SessionId,
    ) -> Result<bool, EditorError> {
        let idx = self.index(id)?;
        if self.sessions[idx].is_saving() {
            return Ok(true);
        }

        match self.revalidate_references(backend, prompter, idx) {
            Ok(()) => Ok(true),
            Err(EditorError::Cancelled) => {
                tracing::info!(
                    "Closing {}: no replacement reference chosen",
                    self.sessions[idx].name()
                );
                self.close_at(idx);
                Ok(false)
            }
            Err(e) => {
                tracing::warn!("Could not revalidate {}: {}", self.sessions[idx].name(), e);
                prompter.show_error("Invalid map references", &e.to_string());
                Err(e)
            }
        }
    }

    fn revalidate_references(
        &mut self,
        backend: &mut dyn Backend,
        prompter: &mut dyn Prompter,
        idx: usize,
    ) -> Result<(), EditorError> {
        let data = &self.sessions[idx].data;
        let (layout, tilesets) = (data.layout_id(), data.tilesets());

        let valid_layout = query_layout(backend, prompter, Some(layout))?;
        if valid_layout != layout {
            self.apply_layout_swap(backend, prompter, idx, valid_layout)?;
            return Ok(());
        }

        let (valid_tilesets, lengths) = query_tilesets(backend, prompter, tilesets)?;
        if valid_tilesets != tilesets {
            self.apply_tileset_swap(backend, idx, valid_tilesets, Some(lengths))?;
        }
        Ok(())
    }

    /// Rendering data for the tilesets a session shows
    pub fn render_data(
        &self,
        backend: &mut dyn Backend,
        id: SessionId,
    ) -> Result<TilesetsRenderData, EditorError> {
        let idx = self.index(id)?;
        Ok(backend.get_tilesets_rendering_data(self.sessions[idx].data.tilesets())?)
    }

    /// Push a change onto one of a session's histories
    pub fn push(
        &mut self,
        id: SessionId,
        kind: StackKind,
        change: Change,
    ) -> Result<PushOutcome, EditorError> {
        let idx = self.index(id)?;
        let target = change.target();
        if self.blocks_layout_edit(idx, target) {
            tracing::debug!("{} refused on locked layout", change.display_name());
            return Ok(PushOutcome::Locked);
        }

        let outcome = self.sessions[idx].push(kind, change)?;
        if outcome.applied() {
            self.after_change(idx, target);
        }
        Ok(outcome)
    }

    /// Run a painting tool over one of a session's grids and record the
    /// stroke as a single change
    pub fn paint(
        &mut self,
        id: SessionId,
        target: GridTarget,
        paint: impl FnOnce(&mut PaintTracker, &mut BlockGrid),
    ) -> Result<PushOutcome, EditorError> {
        let idx = self.index(id)?;
        if self.blocks_layout_edit(idx, ChangeTarget::Grid(target)) {
            return Ok(PushOutcome::Locked);
        }

        let mut scratch = self.sessions[idx]
            .data
            .grid(target)
            .ok_or(ChangeError::NoEditingBrush)?
            .clone();
        let mut tracker = PaintTracker::new(target, self.preferences.allow_null_permissions);
        paint(&mut tracker, &mut scratch);
        self.push(id, target.stack_kind(), tracker.finish())
    }

    /// Set a value in the map header
    pub fn set_value(
        &mut self,
        id: SessionId,
        path: &str,
        value: Value,
    ) -> Result<PushOutcome, EditorError> {
        self.push(id, StackKind::Map, Change::value(path, value))
    }

    pub fn remove_value(&mut self, id: SessionId, path: &str) -> Result<PushOutcome, EditorError> {
        self.push(id, StackKind::Map, Change::remove_value(path))
    }

    pub fn add_brush(
        &mut self,
        id: SessionId,
        slot: BrushSlot,
        brush: BrushDefinition,
    ) -> Result<PushOutcome, EditorError> {
        self.push(id, StackKind::Map, Change::add_brush(slot, brush))
    }

    /// Add an empty nine-patch brush authored against the session's tilesets
    pub fn add_nine_patch_brush(
        &mut self,
        id: SessionId,
        slot: BrushSlot,
        name: &str,
    ) -> Result<PushOutcome, EditorError> {
        let idx = self.index(id)?;
        let tilesets = self.sessions[idx].data.tilesets();
        let secondary = match slot {
            BrushSlot::Primary => None,
            BrushSlot::Secondary => Some(tilesets.secondary),
        };
        let brush = BrushDefinition::nine_patch(
            name,
            self.preferences.nine_patch_corners,
            tilesets.primary,
            secondary,
        );
        self.add_brush(id, slot, brush)
    }

    pub fn delete_brush(
        &mut self,
        id: SessionId,
        slot: BrushSlot,
        brush: BrushId,
    ) -> Result<PushOutcome, EditorError> {
        self.push(id, StackKind::Map, Change::delete_brush(slot, brush))
    }

    /// Undo on one history. Returns false when there was nothing to undo.
    pub fn undo(
        &mut self,
        backend: &mut dyn Backend,
        id: SessionId,
        kind: StackKind,
    ) -> Result<bool, EditorError> {
        self.step(backend, id, kind, false)
    }

    /// Redo on one history. Returns false when there was nothing to redo.
    pub fn redo(
        &mut self,
        backend: &mut dyn Backend,
        id: SessionId,
        kind: StackKind,
    ) -> Result<bool, EditorError> {
        self.step(backend, id, kind, true)
    }

    fn step(
        &mut self,
        backend: &mut dyn Backend,
        id: SessionId,
        kind: StackKind,
        forward: bool,
    ) -> Result<bool, EditorError> {
        let idx = self.index(id)?;
        let session = &self.sessions[idx];
        let pending = session
            .stack(kind)
            .and_then(|stack| {
                if forward {
                    stack.next_redo()
                } else {
                    stack.current()
                }
            })
            .map(Change::target);
        let Some(pending) = pending else {
            return Ok(false);
        };
        match pending {
            ChangeTarget::Grid(grid) if grid.is_layout() && session.layout_locked => {
                return Ok(false)
            }
            ChangeTarget::Layout | ChangeTarget::Tilesets if session.is_saving() => {
                return Ok(false)
            }
            // Restoring tilesets writes the layout header, which the owner controls
            ChangeTarget::Tilesets if session.layout_locked => return Ok(false),
            _ => {}
        }

        let stepped = if forward {
            self.sessions[idx].redo(kind)?
        } else {
            self.sessions[idx].undo(kind)?
        };
        let Some(target) = stepped else {
            return Ok(false);
        };

        // The backend must agree with a restored swap before anyone sees it
        if let Err(e) = self.sync_swap(backend, idx, target) {
            tracing::warn!("{}: could not store restored header: {}", self.sessions[idx].name(), e);
            let reversed = if forward {
                self.sessions[idx].undo(kind)
            } else {
                self.sessions[idx].redo(kind)
            };
            if let Err(revert) = reversed {
                tracing::warn!("Could not reverse step on {}: {}", self.sessions[idx].name(), revert);
            }
            return Err(e.into());
        }

        self.after_change(idx, target);
        Ok(true)
    }

    fn sync_swap(
        &self,
        backend: &mut dyn Backend,
        idx: usize,
        target: ChangeTarget,
    ) -> Result<(), BackendError> {
        let data = &self.sessions[idx].data;
        match target {
            ChangeTarget::Layout => backend.update_map_header(data.map, &data.header),
            ChangeTarget::Tilesets => {
                backend.update_layout_header(data.layout_id(), &data.layout.header)
            }
            _ => Ok(()),
        }
    }

    /// Point a session's map at another layout
    pub fn swap_layout(
        &mut self,
        backend: &mut dyn Backend,
        prompter: &mut dyn Prompter,
        id: SessionId,
        layout: LayoutId,
    ) -> Result<SwapOutcome, EditorError> {
        let idx = self.index(id)?;
        if let Some(outcome) = self.swap_blocked(idx) {
            return Ok(outcome);
        }
        if self.sessions[idx].data.layout_id() == layout {
            return Ok(SwapOutcome::Unchanged);
        }
        let result = self.apply_layout_swap(backend, prompter, idx, layout);
        report(prompter, "Failed to change layout", result)
    }

    /// Draw a session's layout with another tileset pair
    pub fn swap_tilesets(
        &mut self,
        backend: &mut dyn Backend,
        prompter: &mut dyn Prompter,
        id: SessionId,
        tilesets: TilesetPair,
    ) -> Result<SwapOutcome, EditorError> {
        let idx = self.index(id)?;
        if let Some(outcome) = self.swap_blocked(idx) {
            return Ok(outcome);
        }
        if self.sessions[idx].data.tilesets() == tilesets {
            return Ok(SwapOutcome::Unchanged);
        }
        let result = self.apply_tileset_swap(backend, idx, tilesets, None);
        report(prompter, "Failed to change tilesets", result)
    }

    fn swap_blocked(&self, idx: usize) -> Option<SwapOutcome> {
        let session = &self.sessions[idx];
        if session.is_saving() {
            Some(SwapOutcome::Busy)
        } else if session.layout_locked {
            Some(SwapOutcome::Locked)
        } else {
            None
        }
    }

    fn apply_layout_swap(
        &mut self,
        backend: &mut dyn Backend,
        prompter: &mut dyn Prompter,
        idx: usize,
        layout: LayoutId,
    ) -> Result<SwapOutcome, EditorError> {
        let session = &self.sessions[idx];
        let (id, map) = (session.id(), session.map());
        let before = SwapSnapshot::capture(&session.data);

        backend.get_layout_offset(layout)?;
        let (new_layout, lengths) = fetch_layout(backend, prompter, layout)?;
        let config = backend.get_config()?;
        let mut header = before.header.clone();
        ValuePath::parse(LAYOUT_ID_FIELD).set(&mut header, Some(json!(layout)))?;
        let subscription = Subscription {
            tilesets: new_layout.header.tilesets(),
            lengths,
        };
        let (palette, brushes) = self.shared_resources(id, subscription, &config)?;

        // Backend write last; a failed push restores the old header
        backend.update_map_header(map, &header)?;
        let restore = before.header.clone();
        let after = SwapSnapshot {
            header,
            layout: new_layout,
            lengths,
            palette,
            brushes,
        };

        let change = Change::new(ChangeKind::UpdateLayout(UpdateLayoutChange { before, after }));
        let outcome = match self.sessions[idx].push(StackKind::Map, change) {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Err(restore_err) = backend.update_map_header(map, &restore) {
                    tracing::warn!("Could not restore header of map {}: {}", map, restore_err);
                }
                return Err(e.into());
            }
        };
        if !outcome.applied() {
            return Ok(SwapOutcome::Unchanged);
        }
        self.after_change(idx, ChangeTarget::Layout);
        tracing::info!("{} now uses layout {}", self.sessions[idx].name(), layout);
        Ok(SwapOutcome::Swapped)
    }

    fn apply_tileset_swap(
        &mut self,
        backend: &mut dyn Backend,
        idx: usize,
        tilesets: TilesetPair,
        lengths: Option<TilesetLengths>,
    ) -> Result<SwapOutcome, EditorError> {
        let lengths = match lengths {
            Some(lengths) => lengths,
            None => backend.get_tilesets_lengths(tilesets)?,
        };
        let config = backend.get_config()?;

        let session = &self.sessions[idx];
        let id = session.id();
        let before = SwapSnapshot::capture(&session.data);
        let mut layout = before.layout.clone();
        layout.header.set_tilesets(tilesets);
        let (palette, brushes) =
            self.shared_resources(id, Subscription { tilesets, lengths }, &config)?;

        // Backend write last; a failed push restores the old header
        backend.update_layout_header(layout.id, &layout.header)?;
        let (layout_id, restore) = (layout.id, before.layout.header);
        let after = SwapSnapshot {
            header: before.header.clone(),
            layout,
            lengths,
            palette,
            brushes,
        };

        let change = Change::new(ChangeKind::UpdateTilesets(UpdateTilesetsChange { before, after }));
        let outcome = match self.sessions[idx].push(StackKind::Map, change) {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Err(restore_err) = backend.update_layout_header(layout_id, &restore) {
                    tracing::warn!("Could not restore header of layout {}: {}", layout_id, restore_err);
                }
                return Err(e.into());
            }
        };
        if !outcome.applied() {
            return Ok(SwapOutcome::Unchanged);
        }
        self.after_change(idx, ChangeTarget::Tilesets);
        tracing::info!(
            "{} now uses tilesets {:#x}/{:#x}",
            self.sessions[idx].name(),
            tilesets.primary,
            tilesets.secondary
        );
        Ok(SwapOutcome::Swapped)
    }

    /// Open a brush in the session's brush editor
    pub fn start_brush_edit(
        &mut self,
        id: SessionId,
        slot: BrushSlot,
        index: usize,
    ) -> Result<BrushEditStart, EditorError> {
        let idx = self.index(id)?;
        let brush = self.sessions[idx]
            .data
            .brushes
            .get(slot)
            .get(index)
            .cloned()
            .ok_or(ChangeError::BrushPosition { slot, index })?;

        if self.brush_edits.is_edited_elsewhere(brush.id, id) {
            if self.preferences.block_duplicate_brush_edit {
                tracing::debug!("Brush {} is open in another session", brush.name);
                return Ok(BrushEditStart::EditedElsewhere);
            }
            tracing::warn!("Brush {} is also being edited in another session", brush.name);
        }

        self.end_brush_edit(idx);
        self.brush_edits.begin(brush.id, id);
        let window = self.preferences.value_coalesce_window_ms;
        let session = &mut self.sessions[idx];
        session.data.editing_brush = Some(brush.clone());
        session.brush_edit = Some(BrushEdit {
            slot,
            index,
            original: brush,
            changes: ChangeStack::new(window),
        });
        Ok(BrushEditStart::Started)
    }

    /// Change the brush being edited outside of painting (name, kind, corners).
    /// A change of grid size clears the brush paint history.
    pub fn update_editing_brush(
        &mut self,
        id: SessionId,
        update: impl FnOnce(&mut BrushDefinition),
    ) -> Result<(), EditorError> {
        let idx = self.index(id)?;
        let window = self.preferences.value_coalesce_window_ms;
        let session = &mut self.sessions[idx];
        let brush = session
            .data
            .editing_brush
            .as_mut()
            .ok_or(EditorError::NoBrushEdit)?;

        let size = (brush.blocks.width(), brush.blocks.height());
        update(brush);
        if size != (brush.blocks.width(), brush.blocks.height()) {
            if let Some(edit) = session.brush_edit.as_mut() {
                edit.changes = ChangeStack::new(window);
            }
        }
        Ok(())
    }

    /// Close the brush editor and record the result as one edit
    pub fn finish_brush_edit(&mut self, id: SessionId) -> Result<PushOutcome, EditorError> {
        let idx = self.index(id)?;
        let (edit, working) = self.end_brush_edit(idx).ok_or(EditorError::NoBrushEdit)?;
        let after = working.ok_or(EditorError::NoBrushEdit)?;

        // Siblings may have moved or updated the brush meanwhile
        let list = self.sessions[idx].data.brushes.get(edit.slot);
        let (index, before) = match list.iter().position(|b| b.id == edit.original.id) {
            Some(index) => (index, list[index].clone()),
            None => (edit.index, edit.original),
        };

        let change = Change::new(ChangeKind::EditBrush(EditBrushChange {
            slot: edit.slot,
            index,
            before,
            after,
        }));
        self.push(id, StackKind::Map, change)
    }

    pub fn cancel_brush_edit(&mut self, id: SessionId) -> Result<(), EditorError> {
        let idx = self.index(id)?;
        self.end_brush_edit(idx)
            .map(drop)
            .ok_or(EditorError::NoBrushEdit)
    }

    fn end_brush_edit(&mut self, idx: usize) -> Option<(BrushEdit, Option<BrushDefinition>)> {
        let session = &mut self.sessions[idx];
        let edit = session.brush_edit.take()?;
        let working = session.data.editing_brush.take();
        self.brush_edits.end(edit.original.id, session.id());
        Some((edit, working))
    }

    /// Lock the session's unsaved histories and capture what to write.
    /// Returns `None` when there is nothing to save or a save is running.
    pub fn begin_save(&mut self, id: SessionId) -> Result<Option<SaveJob>, EditorError> {
        let idx = self.index(id)?;
        let session = &mut self.sessions[idx];
        let scope = session.begin_save();
        if !scope.any() {
            return Ok(None);
        }

        let data = &session.data;
        Ok(Some(SaveJob {
            session: id,
            scope,
            map: data.map,
            header: data.header.clone(),
            layout: (!session.layout_locked).then(|| data.layout.clone()),
            tilesets: data.tilesets(),
            lengths: data.lengths,
            primary_brushes: data.brushes.primary.iter().map(BrushDefinition::to_serialized).collect(),
            secondary_brushes: data
                .brushes
                .secondary
                .iter()
                .map(BrushDefinition::to_serialized)
                .collect(),
            permissions: data.palette.permissions().to_vec(),
        }))
    }

    /// Write a save job to the backend and unlock the session's histories.
    ///
    /// Queued edits replay either way. A session slated for close closes
    /// after a successful save; a failed save cancels the close and is shown
    /// to the user.
    pub fn finish_save(
        &mut self,
        backend: &mut dyn Backend,
        prompter: &mut dyn Prompter,
        job: SaveJob,
    ) -> Result<(), EditorError> {
        let result = write_job(backend, &job);
        let idx = self.index(job.session)?;

        let touched = self.sessions[idx].end_save(result.is_ok());
        for target in touched {
            self.after_change(idx, target);
        }

        let session = &mut self.sessions[idx];
        match result {
            Ok(()) => {
                tracing::info!("Saved {}", session.name());
                if session.slated_for_close {
                    self.close_at(idx);
                }
                Ok(())
            }
            Err(e) => {
                session.slated_for_close = false;
                tracing::warn!("Failed to save {}: {}", session.name(), e);
                prompter.show_error("Failed to save", &e.to_string());
                Err(e)
            }
        }
    }

    /// Save a session in one go. Returns false when there was nothing to save.
    pub fn save(
        &mut self,
        backend: &mut dyn Backend,
        prompter: &mut dyn Prompter,
        id: SessionId,
    ) -> Result<bool, EditorError> {
        match self.begin_save(id)? {
            Some(job) => self.finish_save(backend, prompter, job).map(|()| true),
            None => Ok(false),
        }
    }

    /// Close a session the way the user asked for it: a session that is
    /// saving closes afterwards, unsaved work is confirmed first
    pub fn request_close(
        &mut self,
        backend: &mut dyn Backend,
        prompter: &mut dyn Prompter,
        id: SessionId,
    ) -> Result<CloseOutcome, EditorError> {
        let idx = self.index(id)?;
        let session = &mut self.sessions[idx];
        if session.is_saving() {
            session.slated_for_close = true;
            tracing::info!("{} will close once saved", session.name());
            return Ok(CloseOutcome::Deferred);
        }

        if session.has_unsaved() {
            match prompter.confirm_save(&session.name()) {
                SaveChoice::Cancel => return Ok(CloseOutcome::Cancelled),
                SaveChoice::Discard => {}
                SaveChoice::Save => {
                    if self.save(backend, prompter, id).is_err() {
                        return Ok(CloseOutcome::Cancelled);
                    }
                }
            }
        }

        self.close(id)?;
        Ok(CloseOutcome::Closed)
    }

    /// Close a session without asking. Its layouts go to the next session in line.
    pub fn close(&mut self, id: SessionId) -> Result<(), EditorError> {
        let idx = self.index(id)?;
        self.close_at(idx);
        Ok(())
    }

    /// Drop every session and registry entry, as when the ROM closes
    pub fn close_all(&mut self) {
        self.sessions.clear();
        self.locks = ResourceLockRegistry::new();
        self.bus = SiblingSyncBus::new();
        self.brush_edits = BrushEditRegistry::new();
        tracing::info!("Closed all sessions");
    }

    fn close_at(&mut self, idx: usize) {
        let session = self.sessions.remove(idx);
        let id = session.id();
        self.bus.unsubscribe(id);
        self.brush_edits.end_session(id);
        for layout in self.locks.release_all(id) {
            self.broadcast_lock_release(layout);
        }
        tracing::info!("Closed {}", session.name());
    }

    fn blocks_layout_edit(&self, idx: usize, target: ChangeTarget) -> bool {
        let touches_layout = match target {
            ChangeTarget::Grid(grid) => grid.is_layout(),
            ChangeTarget::Layout | ChangeTarget::Tilesets => true,
            ChangeTarget::Header | ChangeTarget::Brushes(_) => false,
        };
        touches_layout && self.sessions[idx].layout_locked
    }

    /// Follow-up work once a change took effect in session `idx`
    fn after_change(&mut self, idx: usize, target: ChangeTarget) {
        match target {
            ChangeTarget::Header | ChangeTarget::Grid(GridTarget::EditingBrush) => {}
            ChangeTarget::Grid(GridTarget::Map | GridTarget::Border) => self.mirror_layout(idx),
            ChangeTarget::Grid(GridTarget::Palette) => self.propagate_permissions(idx),
            ChangeTarget::Brushes(slot) => self.propagate_brushes(idx, slot),
            ChangeTarget::Layout | ChangeTarget::Tilesets => {
                let id = self.sessions[idx].id();
                let previous = self.bus.subscription(id).map(|s| s.tilesets);
                self.reconcile_resources(idx);
                self.pull_shared(idx);
                if previous != Some(self.sessions[idx].data.tilesets()) {
                    self.sessions[idx].palette_changes =
                        ChangeStack::new(self.preferences.value_coalesce_window_ms);
                }
                if !self.sessions[idx].layout_locked {
                    self.mirror_layout(idx);
                }
            }
        }
    }

    /// Bring lock ownership and the bus subscription in line with the
    /// layout and tilesets the session shows now
    fn reconcile_resources(&mut self, idx: usize) {
        let id = self.sessions[idx].id();
        let layout = self.sessions[idx].data.layout_id();

        if let Some(previous) = self.sessions[idx]
            .claimed_layout
            .filter(|previous| *previous != layout)
        {
            self.sessions[idx].claimed_layout = None;
            if self.locks.release(previous, id) {
                self.broadcast_lock_release(previous);
            }
        }

        if self.locks.claim(layout, id) {
            self.sessions[idx].claimed_layout = Some(layout);
            self.sessions[idx].layout_locked = false;
        } else {
            self.sessions[idx].layout_locked = true;
            if let Some(owner) = self.locks.owner(layout).and_then(|owner| self.position(owner)) {
                self.mirror_layout_into(owner, idx);
            }
        }

        let data = &self.sessions[idx].data;
        let subscription = Subscription {
            tilesets: data.tilesets(),
            lengths: data.lengths,
        };
        self.bus.subscribe(id, subscription);
    }

    /// Hand a released layout to the first session waiting on it
    fn broadcast_lock_release(&mut self, layout: LayoutId) {
        let waiting: Vec<usize> = (0..self.sessions.len())
            .filter(|i| {
                let session = &self.sessions[*i];
                session.is_ready() && session.data.layout_id() == layout
            })
            .collect();

        for idx in waiting {
            let id = self.sessions[idx].id();
            let claimed = self.locks.claim(layout, id);
            let session = &mut self.sessions[idx];
            session.layout_locked = !claimed;
            if claimed {
                session.claimed_layout = Some(layout);
                tracing::debug!("{} took over layout {}", session.name(), layout);
            }
        }
    }

    /// Copy the owner's layout into every other session showing it
    fn mirror_layout(&mut self, idx: usize) {
        let id = self.sessions[idx].id();
        let layout = self.sessions[idx].data.layout_id();
        let targets: Vec<SessionId> = self
            .other_sessions(id, move |s| s.data().layout_id() == layout)
            .map(Session::id)
            .collect();
        for target in targets {
            if let Some(target) = self.position(target) {
                self.mirror_layout_into(idx, target);
            }
        }
    }

    fn mirror_layout_into(&mut self, source: usize, target: usize) {
        if source == target {
            return;
        }
        let from = &self.sessions[source].data;
        let layout = from.layout.clone();
        let retiled = self.sessions[target].data.tilesets() != layout.header.tilesets();
        let shared = retiled.then(|| (from.lengths, from.palette.clone(), from.brushes.clone()));

        let window = self.preferences.value_coalesce_window_ms;
        let session = &mut self.sessions[target];
        session.data.layout = layout;
        if let Some((lengths, palette, brushes)) = shared {
            session.data.lengths = lengths;
            session.data.palette = palette;
            session.data.brushes = brushes;
            session.palette_changes = ChangeStack::new(window);
            let subscription = Subscription {
                tilesets: session.data.tilesets(),
                lengths,
            };
            self.bus.subscribe(session.id(), subscription);
        }
        tracing::debug!("Mirrored layout {} into {}", session.data.layout_id(), session.name());
    }

    fn propagate_permissions(&mut self, idx: usize) {
        let id = self.sessions[idx].id();
        let permissions = self.sessions[idx].data.palette.permissions().to_vec();
        for route in self.bus.permission_routes(id) {
            let (Some(levels), Some(target)) =
                (permissions.get(route.source.clone()), self.position(route.target))
            else {
                continue;
            };
            let written = self.sessions[target]
                .data
                .palette
                .update_permissions(levels, route.destination);
            tracing::debug!(
                "Delivered {} permissions to {} ({:?})",
                written,
                route.target,
                route.overlap
            );
        }
    }

    fn propagate_brushes(&mut self, idx: usize, slot: BrushSlot) {
        let id = self.sessions[idx].id();
        let brushes = self.sessions[idx].data.brushes.get(slot).clone();
        for target in self.bus.brush_targets(id, slot) {
            if let Some(target) = self.position(target) {
                *self.sessions[target].data.brushes.get_mut(slot) = brushes.clone();
                tracing::debug!("Delivered {:?} brushes to {}", slot, self.sessions[target].name());
            }
        }
    }

    /// Refresh a session's shared data from its siblings
    fn pull_shared(&mut self, idx: usize) {
        let id = self.sessions[idx].id();
        let data = &self.sessions[idx].data;
        let subscription = Subscription {
            tilesets: data.tilesets(),
            lengths: data.lengths,
        };
        let mut palette = data.palette.clone();
        let mut brushes = data.brushes.clone();
        self.overlay_shared(id, subscription, &mut palette, &mut brushes);

        let data = &mut self.sessions[idx].data;
        data.palette = palette;
        data.brushes = brushes;
    }

    /// Palette and brushes for a tileset pair: stored values from the
    /// config, overridden by what open siblings currently show
    fn shared_resources(
        &self,
        id: SessionId,
        subscription: Subscription,
        config: &RomConfig,
    ) -> Result<(BlockGrid, BrushLists), EditorError> {
        let TilesetPair { primary, secondary } = subscription.tilesets;
        let lengths = subscription.lengths;

        let mut palette = BlockGrid::palette(lengths.total());
        palette.update_permissions(&config.tileset_permissions(primary, lengths.primary)?, 0);
        palette.update_permissions(
            &config.tileset_permissions(secondary, lengths.secondary)?,
            lengths.primary,
        );
        let mut brushes = BrushLists {
            primary: config.primary_brushes(primary),
            secondary: config.secondary_brushes(primary, secondary),
        };

        self.overlay_shared(id, subscription, &mut palette, &mut brushes);
        Ok((palette, brushes))
    }

    fn overlay_shared(
        &self,
        id: SessionId,
        subscription: Subscription,
        palette: &mut BlockGrid,
        brushes: &mut BrushLists,
    ) {
        let mut shared_primary = false;
        let mut shared_secondary = false;
        for other in self.other_sessions(id, |_| true) {
            let theirs = Subscription {
                tilesets: other.data.tilesets(),
                lengths: other.data.lengths,
            };
            let Some(route) = PermissionRoute::between(id, theirs, subscription) else {
                continue;
            };
            if let Some(levels) = other.data.palette.permissions().get(route.source.clone()) {
                palette.update_permissions(levels, route.destination);
            }
            if !shared_primary && route.overlap.shares_brushes(BrushSlot::Primary) {
                brushes.primary = other.data.brushes.primary.clone();
                shared_primary = true;
            }
            if !shared_secondary && route.overlap.shares_brushes(BrushSlot::Secondary) {
                brushes.secondary = other.data.brushes.secondary.clone();
                shared_secondary = true;
            }
        }
    }
}

fn report<T>(
    prompter: &mut dyn Prompter,
    title: &str,
    result: Result<T, EditorError>,
) -> Result<T, EditorError> {
    if let Err(e) = &result {
        if !matches!(e, EditorError::Cancelled) {
            tracing::warn!("{}: {}", title, e);
            prompter.show_error(title, &e.to_string());
        }
    }
    result
}

/// Ask for layouts until the backend accepts one
fn query_layout(
    backend: &mut dyn Backend,
    prompter: &mut dyn Prompter,
    mut current: Option<LayoutId>,
) -> Result<LayoutId, EditorError> {
    loop {
        let reason = match current {
            Some(id) => match backend.get_layout_offset(id) {
                Ok(_) => return Ok(id),
                Err(e) => e.message,
            },
            None => "The map does not reference a layout".to_string(),
        };
        tracing::warn!("Invalid layout reference: {}", reason);
        current = Some(
            prompter
                .pick_layout(&reason, current)
                .ok_or(EditorError::Cancelled)?,
        );
    }
}

/// Ask for tileset pairs until the backend accepts one
fn query_tilesets(
    backend: &mut dyn Backend,
    prompter: &mut dyn Prompter,
    mut current: TilesetPair,
) -> Result<(TilesetPair, TilesetLengths), EditorError> {
    loop {
        match backend.get_tilesets_lengths(current) {
            Ok(lengths) => return Ok((current, lengths)),
            Err(e) => {
                tracing::warn!("Invalid tileset reference: {}", e);
                current = prompter
                    .pick_tilesets(&e.message, current)
                    .ok_or(EditorError::Cancelled)?;
            }
        }
    }
}

/// Read a layout, repairing its tileset reference if needed
fn fetch_layout(
    backend: &mut dyn Backend,
    prompter: &mut dyn Prompter,
    id: LayoutId,
) -> Result<(MapLayoutData, TilesetLengths), EditorError> {
    let mut layout = backend.get_map_layout_data(id)?;
    let referenced = layout.header.tilesets();
    let (tilesets, lengths) = query_tilesets(backend, prompter, referenced)?;
    if tilesets != referenced {
        layout.header.set_tilesets(tilesets);
        backend.update_layout_header(id, &layout.header)?;
    }
    Ok((layout, lengths))
}

fn write_job(backend: &mut dyn Backend, job: &SaveJob) -> Result<(), EditorError> {
    if job.scope.map {
        if let Some(layout) = &job.layout {
            backend.update_map_layout_data(layout)?;
        }
        backend.update_map_header(job.map, &job.header)?;
        backend.update_brushes(job.tilesets, &job.primary_brushes, &job.secondary_brushes)?;
    }
    if job.scope.palette {
        let lengths = job.lengths;
        let primary = job.permissions.get(..lengths.primary).unwrap_or_default();
        let secondary = job
            .permissions
            .get(lengths.primary..lengths.total())
            .unwrap_or_default();
        backend.update_tileset_level(job.tilesets.primary, &encode_permissions(primary)?)?;
        backend.update_tileset_level(job.tilesets.secondary, &encode_permissions(secondary)?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::tools;
    use gba_map_core::{Block, LayoutHeader};
    use std::collections::VecDeque;

    const PRIMARY_A: u32 = 0x100;
    const SECONDARY_B: u32 = 0x200;
    const SECONDARY_C: u32 = 0x300;
    const PRIMARY_D: u32 = 0x400;

    /// Dialog double that answers from queues
    struct ScriptedPrompter {
        layouts: VecDeque<Option<LayoutId>>,
        tilesets: VecDeque<Option<TilesetPair>>,
        save_choice: SaveChoice,
        layout_requests: usize,
        errors: Vec<String>,
    }

    impl ScriptedPrompter {
        fn new() -> Self {
            Self {
                layouts: VecDeque::new(),
                tilesets: VecDeque::new(),
                save_choice: SaveChoice::Discard,
                layout_requests: 0,
                errors: Vec::new(),
            }
        }
    }

    impl Prompter for ScriptedPrompter {
        fn pick_layout(&mut self, _reason: &str, _current: Option<LayoutId>) -> Option<LayoutId> {
            self.layout_requests += 1;
            self.layouts.pop_front().flatten()
        }

        fn pick_tilesets(&mut self, _reason: &str, _current: TilesetPair) -> Option<TilesetPair> {
            self.tilesets.pop_front().flatten()
        }

        fn confirm_save(&mut self, _session: &str) -> SaveChoice {
            self.save_choice
        }

        fn show_error(&mut self, title: &str, message: &str) {
            self.errors.push(format!("{title}: {message}"));
        }
    }

    fn layout(id: LayoutId, primary: u32, secondary: u32) -> MapLayoutData {
        let header = LayoutHeader {
            width: 4,
            height: 4,
            border_width: 2,
            border_height: 2,
            primary_tileset: primary,
            secondary_tileset: secondary,
        };
        let mut layout = MapLayoutData::new(id, header);
        layout.map_data = BlockGrid::filled(4, 4, Block::new(0, 0));
        layout.border_data = BlockGrid::filled(2, 2, Block::new(1, 0));
        layout
    }

    fn map(index: u8) -> MapId {
        MapId::new(0, index)
    }

    /// Maps 0 and 1 share layout 1 (A+B); map 2 shares both tilesets;
    /// map 3 only the primary; map 4 only the secondary
    fn backend() -> MemoryBackend {
        let mut backend = MemoryBackend::new()
            .with_tileset(PRIMARY_A, 4)
            .with_tileset(SECONDARY_B, 4)
            .with_tileset(SECONDARY_C, 4)
            .with_tileset(PRIMARY_D, 4)
            .with_layout(layout(1, PRIMARY_A, SECONDARY_B))
            .with_layout(layout(2, PRIMARY_A, SECONDARY_B))
            .with_layout(layout(3, PRIMARY_A, SECONDARY_C))
            .with_layout(layout(4, PRIMARY_D, SECONDARY_B))
            .with_layout(layout(5, PRIMARY_A, 0x999));
        for (index, layout_id) in [(0, 1), (1, 1), (2, 2), (3, 3), (4, 4), (5, 99), (6, 5)] {
            backend = backend.with_map(map(index), json!({ "map_layout_id": layout_id, "music": 0 }));
        }
        backend
    }

    fn open(
        workspace: &mut Workspace,
        backend: &mut MemoryBackend,
        prompter: &mut ScriptedPrompter,
        index: u8,
    ) -> SessionId {
        workspace.open_map(backend, prompter, map(index)).unwrap()
    }

    fn session(workspace: &Workspace, id: SessionId) -> &Session {
        workspace.session(id).unwrap()
    }

    fn permission(workspace: &Workspace, id: SessionId, index: u32) -> Option<u16> {
        let palette = &session(workspace, id).data().palette;
        palette
            .get(index % palette.width(), index / palette.width())
            .and_then(|b| b.permission)
    }

    #[test]
    fn test_open_map_loads_and_claims_layout() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let a = open(&mut workspace, &mut backend, &mut prompter, 0);
        let s = session(&workspace, a);
        assert!(s.is_ready());
        assert_eq!(s.data().layout_id(), 1);
        assert_eq!(s.data().lengths, TilesetLengths::new(4, 4));
        assert_eq!(s.data().palette.metatiles()[5], Some(5));
        assert!(!s.is_layout_locked());
        assert_eq!(workspace.locks().owner(1), Some(a));
        assert!(workspace.bus().subscription(a).is_some());

        // A second open returns the same session
        let again = open(&mut workspace, &mut backend, &mut prompter, 0);
        assert_eq!(again, a);
        assert_eq!(workspace.sessions().count(), 1);
    }

    #[test]
    fn test_layout_lock_and_mirroring() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let a = open(&mut workspace, &mut backend, &mut prompter, 0);
        let b = open(&mut workspace, &mut backend, &mut prompter, 1);
        assert!(workspace.locks().is_locked_by_other(1, b));
        assert!(!workspace.locks().is_locked_by_other(1, a));
        assert!(session(&workspace, b).is_layout_locked());

        let outcome = workspace
            .paint(b, GridTarget::Map, |tracker, grid| {
                tracker.set(grid, 0, 0, Block::metatile(9));
            })
            .unwrap();
        assert_eq!(outcome, PushOutcome::Locked);

        workspace
            .paint(a, GridTarget::Map, |tracker, grid| {
                tools::rectangle(tracker, grid, (0, 0), (1, 0), Block::metatile(5));
            })
            .unwrap();
        let mirrored = &session(&workspace, b).data().layout.map_data;
        assert_eq!(mirrored.get(1, 0), Some(Block::new(5, 0)));

        // Closing the owner hands the layout over
        workspace.close(a).unwrap();
        assert_eq!(workspace.locks().owner(1), Some(b));
        assert!(!session(&workspace, b).is_layout_locked());
    }

    #[test]
    fn test_header_edits_are_not_layout_locked() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        open(&mut workspace, &mut backend, &mut prompter, 0);
        let b = open(&mut workspace, &mut backend, &mut prompter, 1);
        let outcome = workspace.set_value(b, "music", json!(3)).unwrap();
        assert_eq!(outcome, PushOutcome::Applied);
        assert_eq!(session(&workspace, b).data().header["music"], 3);
    }

    #[test]
    fn test_other_sessions_skips_self() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let a = open(&mut workspace, &mut backend, &mut prompter, 0);
        let b = open(&mut workspace, &mut backend, &mut prompter, 2);
        let c = open(&mut workspace, &mut backend, &mut prompter, 3);

        let others: Vec<SessionId> = workspace.other_sessions(a, |_| true).map(Session::id).collect();
        assert_eq!(others, vec![b, c]);
        let on_layout_3: Vec<SessionId> = workspace
            .other_sessions(a, |s| s.data().layout_id() == 3)
            .map(Session::id)
            .collect();
        assert_eq!(on_layout_3, vec![c]);
    }

    #[test]
    fn test_permission_sync_by_overlap() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let a = open(&mut workspace, &mut backend, &mut prompter, 0);
        let both = open(&mut workspace, &mut backend, &mut prompter, 2);
        let primary_only = open(&mut workspace, &mut backend, &mut prompter, 3);
        let secondary_only = open(&mut workspace, &mut backend, &mut prompter, 4);

        // Index 1 is in the primary half, index 5 in the secondary half
        workspace
            .paint(a, GridTarget::Palette, |tracker, grid| {
                tracker.set(grid, 1, 0, Block::permission(3));
                tracker.set(grid, 5, 0, Block::permission(7));
            })
            .unwrap();

        assert_eq!(permission(&workspace, both, 1), Some(3));
        assert_eq!(permission(&workspace, both, 5), Some(7));
        assert_eq!(permission(&workspace, primary_only, 1), Some(3));
        assert_eq!(permission(&workspace, primary_only, 5), None);
        assert_eq!(permission(&workspace, secondary_only, 1), None);
        assert_eq!(permission(&workspace, secondary_only, 5), Some(7));
    }

    #[test]
    fn test_new_session_pulls_unsaved_shared_state() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let a = open(&mut workspace, &mut backend, &mut prompter, 0);
        workspace
            .paint(a, GridTarget::Palette, |tracker, grid| {
                tracker.set(grid, 2, 0, Block::permission(4));
            })
            .unwrap();
        let brush = BrushDefinition::simple("Rock", BlockGrid::new(1, 1), PRIMARY_A, None);
        let brush_id = brush.id;
        workspace.add_brush(a, BrushSlot::Primary, brush).unwrap();

        let c = open(&mut workspace, &mut backend, &mut prompter, 2);
        assert_eq!(permission(&workspace, c, 2), Some(4));
        assert_eq!(session(&workspace, c).data().brushes.primary[0].id, brush_id);
    }

    #[test]
    fn test_brush_sync_by_overlap() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let a = open(&mut workspace, &mut backend, &mut prompter, 0);
        let both = open(&mut workspace, &mut backend, &mut prompter, 2);
        let primary_only = open(&mut workspace, &mut backend, &mut prompter, 3);
        let secondary_only = open(&mut workspace, &mut backend, &mut prompter, 4);

        workspace.add_nine_patch_brush(a, BrushSlot::Primary, "Path").unwrap();
        workspace.add_nine_patch_brush(a, BrushSlot::Secondary, "Pond").unwrap();

        let brushes = |id| session(&workspace, id).data().brushes.clone();
        assert_eq!(brushes(both).primary.len(), 1);
        assert_eq!(brushes(both).secondary.len(), 1);
        assert_eq!(brushes(primary_only).primary.len(), 1);
        assert!(brushes(primary_only).secondary.is_empty());
        assert!(brushes(secondary_only).primary.is_empty());
        assert!(brushes(secondary_only).secondary.is_empty());
        assert_eq!(brushes(a).secondary[0].secondary, Some(SECONDARY_B));
    }

    #[test]
    fn test_undo_redo_paint() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let a = open(&mut workspace, &mut backend, &mut prompter, 0);
        workspace
            .paint(a, GridTarget::Border, |tracker, grid| {
                tools::pencil(tracker, grid, Some((0, 0)), (1, 1), Block::metatile(8));
            })
            .unwrap();
        let border = |workspace: &Workspace| session(workspace, a).data().layout.border_data.clone();
        assert_eq!(border(&workspace).get(1, 1), Some(Block::new(8, 0)));

        assert!(workspace.undo(&mut backend, a, StackKind::Map).unwrap());
        assert_eq!(border(&workspace).get(1, 1), Some(Block::new(1, 0)));
        assert!(!workspace.undo(&mut backend, a, StackKind::Map).unwrap());

        assert!(workspace.redo(&mut backend, a, StackKind::Map).unwrap());
        assert_eq!(border(&workspace).get(0, 0), Some(Block::new(8, 0)));
    }

    #[test]
    fn test_save_writes_backend_and_replays_queued_edits() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let a = open(&mut workspace, &mut backend, &mut prompter, 0);
        workspace.set_value(a, "music", json!(1)).unwrap();
        workspace
            .paint(a, GridTarget::Palette, |tracker, grid| {
                tracker.set(grid, 1, 0, Block::permission(3));
            })
            .unwrap();

        let job = workspace.begin_save(a).unwrap().unwrap();
        assert!(session(&workspace, a).is_saving());
        let outcome = workspace.set_value(a, "music", json!(2)).unwrap();
        assert_eq!(outcome, PushOutcome::Queued);
        assert_eq!(session(&workspace, a).data().header["music"], 1);

        workspace.finish_save(&mut backend, &mut prompter, job).unwrap();
        assert_eq!(backend.headers[&map(0)]["music"], 1);
        assert_eq!(backend.config.tileset_levels[&PRIMARY_A], "=B");
        assert_eq!(backend.config.tileset_levels[&SECONDARY_B], "");
        assert_eq!(backend.count_calls("update_map_layout_data"), 1);

        let s = session(&workspace, a);
        assert!(!s.is_saving());
        assert_eq!(s.data().header["music"], 2);
        assert!(s.has_unsaved());

        // Only the header history has anything left to save
        let job = workspace.begin_save(a).unwrap().unwrap();
        workspace.finish_save(&mut backend, &mut prompter, job).unwrap();
        assert_eq!(backend.count_calls("update_tileset_level"), 2);
        assert!(workspace.begin_save(a).unwrap().is_none());
    }

    #[test]
    fn test_close_while_saving_is_deferred() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let a = open(&mut workspace, &mut backend, &mut prompter, 0);
        workspace.set_value(a, "music", json!(1)).unwrap();
        let job = workspace.begin_save(a).unwrap().unwrap();

        let outcome = workspace.request_close(&mut backend, &mut prompter, a).unwrap();
        assert_eq!(outcome, CloseOutcome::Deferred);
        assert!(session(&workspace, a).is_slated_for_close());

        workspace.finish_save(&mut backend, &mut prompter, job).unwrap();
        assert!(workspace.session(a).is_none());
        assert_eq!(workspace.locks().owner(1), None);
        assert!(workspace.bus().subscription(a).is_none());
    }

    #[test]
    fn test_failed_save_keeps_session_open() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let a = open(&mut workspace, &mut backend, &mut prompter, 0);
        workspace.set_value(a, "music", json!(1)).unwrap();
        backend.fail("update_map_header");

        let job = workspace.begin_save(a).unwrap().unwrap();
        workspace.request_close(&mut backend, &mut prompter, a).unwrap();
        assert!(workspace.finish_save(&mut backend, &mut prompter, job).is_err());
        assert_eq!(prompter.errors.len(), 1);

        let s = session(&workspace, a);
        assert!(!s.is_slated_for_close());
        assert!(!s.is_saving());
        assert!(s.has_unsaved());
    }

    #[test]
    fn test_request_close_confirms_unsaved_work() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let a = open(&mut workspace, &mut backend, &mut prompter, 0);
        workspace.set_value(a, "music", json!(5)).unwrap();

        prompter.save_choice = SaveChoice::Cancel;
        let outcome = workspace.request_close(&mut backend, &mut prompter, a).unwrap();
        assert_eq!(outcome, CloseOutcome::Cancelled);
        assert!(workspace.session(a).is_some());

        prompter.save_choice = SaveChoice::Save;
        let outcome = workspace.request_close(&mut backend, &mut prompter, a).unwrap();
        assert_eq!(outcome, CloseOutcome::Closed);
        assert_eq!(backend.headers[&map(0)]["music"], 5);
        assert!(workspace.session(a).is_none());
    }

    #[test]
    fn test_swap_layout_and_undo_resyncs_backend() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let a = open(&mut workspace, &mut backend, &mut prompter, 0);
        let outcome = workspace.swap_layout(&mut backend, &mut prompter, a, 3).unwrap();
        assert_eq!(outcome, SwapOutcome::Swapped);
        assert_eq!(backend.headers[&map(0)]["map_layout_id"], 3);
        assert_eq!(workspace.locks().owner(1), None);
        assert_eq!(workspace.locks().owner(3), Some(a));
        assert_eq!(
            workspace.bus().subscription(a).map(|s| s.tilesets),
            Some(TilesetPair::new(PRIMARY_A, SECONDARY_C))
        );

        assert!(workspace.undo(&mut backend, a, StackKind::Map).unwrap());
        assert_eq!(backend.headers[&map(0)]["map_layout_id"], 1);
        assert_eq!(session(&workspace, a).data().layout_id(), 1);
        assert_eq!(workspace.locks().owner(1), Some(a));
        assert_eq!(workspace.locks().owner(3), None);

        let same = workspace.swap_layout(&mut backend, &mut prompter, a, 1).unwrap();
        assert_eq!(same, SwapOutcome::Unchanged);
    }

    #[test]
    fn test_rejected_swap_changes_nothing() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let a = open(&mut workspace, &mut backend, &mut prompter, 0);
        backend.fail("update_map_header");
        assert!(workspace.swap_layout(&mut backend, &mut prompter, a, 3).is_err());

        let s = session(&workspace, a);
        assert_eq!(s.data().layout_id(), 1);
        assert!(s.stack(StackKind::Map).unwrap().is_empty());
        assert_eq!(prompter.errors.len(), 1);
        assert_eq!(workspace.locks().owner(1), Some(a));
    }

    #[test]
    fn test_failed_swap_undo_restores_history() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let a = open(&mut workspace, &mut backend, &mut prompter, 0);
        workspace.swap_layout(&mut backend, &mut prompter, a, 3).unwrap();
        backend.fail("update_map_header");

        assert!(workspace.undo(&mut backend, a, StackKind::Map).is_err());
        let s = session(&workspace, a);
        assert_eq!(s.data().layout_id(), 3);
        assert_eq!(s.stack(StackKind::Map).unwrap().top(), 1);
        assert!(!s.stack(StackKind::Map).unwrap().can_redo());
    }

    #[test]
    fn test_locked_session_cannot_undo_tileset_swap() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let a = open(&mut workspace, &mut backend, &mut prompter, 0);
        let b = open(&mut workspace, &mut backend, &mut prompter, 1);
        let pair = TilesetPair::new(PRIMARY_A, SECONDARY_C);
        workspace.swap_tilesets(&mut backend, &mut prompter, a, pair).unwrap();

        // Moving away hands layout 1 to b; coming back leaves a locked out of it
        workspace.swap_layout(&mut backend, &mut prompter, a, 2).unwrap();
        assert_eq!(workspace.locks().owner(1), Some(b));
        assert!(workspace.undo(&mut backend, a, StackKind::Map).unwrap());
        assert!(session(&workspace, a).is_layout_locked());

        assert!(!workspace.undo(&mut backend, a, StackKind::Map).unwrap());
        assert_eq!(backend.layouts[&1].header.secondary_tileset, SECONDARY_C);
        assert_eq!(session(&workspace, a).stack(StackKind::Map).unwrap().top(), 1);
        assert_eq!(session(&workspace, b).data().tilesets(), pair);
    }

    #[test]
    fn test_swap_with_unreadable_permissions_leaves_backend_untouched() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let a = open(&mut workspace, &mut backend, &mut prompter, 0);
        backend
            .config
            .tileset_levels
            .insert(SECONDARY_C, "!".to_string());
        let header_writes = backend.count_calls("update_map_header");
        let layout_writes = backend.count_calls("update_layout_header");

        let pair = TilesetPair::new(PRIMARY_A, SECONDARY_C);
        assert!(workspace.swap_tilesets(&mut backend, &mut prompter, a, pair).is_err());
        assert_eq!(backend.layouts[&1].header.secondary_tileset, SECONDARY_B);
        assert_eq!(backend.count_calls("update_layout_header"), layout_writes);

        // Layout 3 is drawn with the same unreadable tileset
        assert!(workspace.swap_layout(&mut backend, &mut prompter, a, 3).is_err());
        assert_eq!(backend.headers[&map(0)]["map_layout_id"], 1);
        assert_eq!(backend.count_calls("update_map_header"), header_writes);

        let s = session(&workspace, a);
        assert_eq!(s.data().tilesets(), TilesetPair::new(PRIMARY_A, SECONDARY_B));
        assert!(s.stack(StackKind::Map).unwrap().is_empty());
        assert_eq!(prompter.errors.len(), 2);
    }

    #[test]
    fn test_swap_tilesets_retiles_layout_sharers() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let a = open(&mut workspace, &mut backend, &mut prompter, 0);
        let b = open(&mut workspace, &mut backend, &mut prompter, 1);
        workspace
            .paint(a, GridTarget::Palette, |tracker, grid| {
                tracker.set(grid, 0, 0, Block::permission(1));
            })
            .unwrap();

        let pair = TilesetPair::new(PRIMARY_A, SECONDARY_C);
        let locked = workspace.swap_tilesets(&mut backend, &mut prompter, b, pair).unwrap();
        assert_eq!(locked, SwapOutcome::Locked);

        let outcome = workspace.swap_tilesets(&mut backend, &mut prompter, a, pair).unwrap();
        assert_eq!(outcome, SwapOutcome::Swapped);
        assert_eq!(backend.layouts[&1].header.secondary_tileset, SECONDARY_C);
        assert!(session(&workspace, a).stack(StackKind::Palette).unwrap().is_empty());
        assert_eq!(session(&workspace, b).data().tilesets(), pair);
        assert_eq!(workspace.bus().subscription(b).map(|s| s.tilesets), Some(pair));

        // The primary half survives the swap
        assert_eq!(permission(&workspace, a, 0), Some(1));
    }

    #[test]
    fn test_swap_while_saving_is_busy() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let a = open(&mut workspace, &mut backend, &mut prompter, 0);
        workspace.set_value(a, "music", json!(1)).unwrap();
        let _job = workspace.begin_save(a).unwrap().unwrap();
        let outcome = workspace.swap_layout(&mut backend, &mut prompter, a, 3).unwrap();
        assert_eq!(outcome, SwapOutcome::Busy);
    }

    #[test]
    fn test_invalid_layout_prompts_until_valid() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        prompter.layouts = VecDeque::from([Some(98), Some(2)]);
        let mut workspace = Workspace::default();

        let s = open(&mut workspace, &mut backend, &mut prompter, 5);
        assert_eq!(prompter.layout_requests, 2);
        assert_eq!(session(&workspace, s).data().layout_id(), 2);
        assert_eq!(backend.headers[&map(5)]["map_layout_id"], 2);
    }

    #[test]
    fn test_invalid_tilesets_are_replaced() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let pair = TilesetPair::new(PRIMARY_A, SECONDARY_B);
        prompter.tilesets = VecDeque::from([Some(pair)]);
        let mut workspace = Workspace::default();

        let s = open(&mut workspace, &mut backend, &mut prompter, 6);
        assert_eq!(session(&workspace, s).data().tilesets(), pair);
        assert_eq!(backend.layouts[&5].header.secondary_tileset, SECONDARY_B);
    }

    #[test]
    fn test_cancelled_picker_drops_session() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let result = workspace.open_map(&mut backend, &mut prompter, map(5));
        assert!(matches!(result, Err(EditorError::Cancelled)));
        assert!(workspace.find_by_map(map(5)).is_none());
        assert!(prompter.errors.is_empty());
    }

    #[test]
    fn test_backend_failure_on_open_is_shown() {
        let mut backend = backend();
        backend.fail("get_config");
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        assert!(workspace.open_map(&mut backend, &mut prompter, map(0)).is_err());
        assert_eq!(prompter.errors.len(), 1);
        assert_eq!(workspace.sessions().count(), 0);
    }

    #[test]
    fn test_revalidate_closes_on_cancel() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let a = open(&mut workspace, &mut backend, &mut prompter, 0);
        assert!(workspace.revalidate(&mut backend, &mut prompter, a).unwrap());

        backend.layouts.remove(&1);
        assert!(!workspace.revalidate(&mut backend, &mut prompter, a).unwrap());
        assert!(workspace.session(a).is_none());
        assert_eq!(workspace.locks().owner(1), None);
    }

    #[test]
    fn test_duplicate_brush_edit() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let a = open(&mut workspace, &mut backend, &mut prompter, 0);
        let c = open(&mut workspace, &mut backend, &mut prompter, 2);
        workspace.add_nine_patch_brush(a, BrushSlot::Primary, "Path").unwrap();

        let started = workspace.start_brush_edit(a, BrushSlot::Primary, 0).unwrap();
        assert_eq!(started, BrushEditStart::Started);
        let refused = workspace.start_brush_edit(c, BrushSlot::Primary, 0).unwrap();
        assert_eq!(refused, BrushEditStart::EditedElsewhere);

        let mut preferences = EditorPreferences::default();
        preferences.block_duplicate_brush_edit = false;
        workspace.set_preferences(preferences);
        let allowed = workspace.start_brush_edit(c, BrushSlot::Primary, 0).unwrap();
        assert_eq!(allowed, BrushEditStart::Started);
    }

    #[test]
    fn test_brush_edit_round_trip() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let a = open(&mut workspace, &mut backend, &mut prompter, 0);
        let c = open(&mut workspace, &mut backend, &mut prompter, 2);
        workspace.add_nine_patch_brush(a, BrushSlot::Primary, "Path").unwrap();

        workspace.start_brush_edit(a, BrushSlot::Primary, 0).unwrap();
        workspace
            .paint(a, GridTarget::EditingBrush, |tracker, grid| {
                tools::rectangle(tracker, grid, (0, 0), (2, 2), Block::new(3, 1));
            })
            .unwrap();
        workspace
            .update_editing_brush(a, |brush| brush.name = "Gravel".to_string())
            .unwrap();
        let outcome = workspace.finish_brush_edit(a).unwrap();
        assert_eq!(outcome, PushOutcome::Applied);
        assert!(!workspace.brush_edits().is_being_edited(
            session(&workspace, a).data().brushes.primary[0].id
        ));

        let synced = &session(&workspace, c).data().brushes.primary[0];
        assert_eq!(synced.name, "Gravel");
        assert_eq!(synced.blocks.get(2, 2), Some(Block::new(3, 1)));

        workspace.undo(&mut backend, a, StackKind::Map).unwrap();
        assert_eq!(session(&workspace, c).data().brushes.primary[0].name, "Path");
    }

    #[test]
    fn test_cancel_brush_edit() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let a = open(&mut workspace, &mut backend, &mut prompter, 0);
        workspace.add_nine_patch_brush(a, BrushSlot::Primary, "Path").unwrap();
        workspace.start_brush_edit(a, BrushSlot::Primary, 0).unwrap();
        workspace.cancel_brush_edit(a).unwrap();

        let s = session(&workspace, a);
        assert!(s.brush_edit().is_none());
        assert!(s.data().editing_brush.is_none());
        assert!(matches!(
            workspace.cancel_brush_edit(a),
            Err(EditorError::NoBrushEdit)
        ));
    }

    #[test]
    fn test_render_data() {
        let mut backend = backend();
        let mut prompter = ScriptedPrompter::new();
        let mut workspace = Workspace::default();

        let a = open(&mut workspace, &mut backend, &mut prompter, 0);
        let render = workspace.render_data(&mut backend, a).unwrap();
        assert_eq!(render.metatiles, 8);
    }
}
