//! Paint strokes over block grids

use super::{Change, ChangeKind, Preparation, StackKind};
use crate::session::SessionData;
use crate::ChangeError;
use gba_map_core::{Block, BlockGrid, CellKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which grid of a session a paint change writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GridTarget {
    Map,
    Border,
    Palette,
    EditingBrush,
}

impl GridTarget {
    /// The history a stroke on this grid is recorded in
    pub fn stack_kind(self) -> StackKind {
        match self {
            GridTarget::Map | GridTarget::Border => StackKind::Map,
            GridTarget::Palette => StackKind::Palette,
            GridTarget::EditingBrush => StackKind::Brush,
        }
    }

    /// Whether the grid belongs to the layout
    pub fn is_layout(self) -> bool {
        matches!(self, GridTarget::Map | GridTarget::Border)
    }
}

/// A finished stroke: the first value each cell had and the last value it got
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaintChange {
    pub target: GridTarget,
    pub before: HashMap<CellKey, Block>,
    pub after: HashMap<CellKey, Block>,
}

impl PaintChange {
    pub fn cell_count(&self) -> usize {
        self.after.len()
    }

    pub(super) fn prepare(&self) -> Preparation {
        if self.after.is_empty() {
            Preparation::Discard
        } else {
            Preparation::Ready
        }
    }

    pub(super) fn apply(&self, data: &mut SessionData) -> Result<(), ChangeError> {
        write_cells(data, self.target, &self.after)
    }

    pub(super) fn revert(&self, data: &mut SessionData) -> Result<(), ChangeError> {
        write_cells(data, self.target, &self.before)
    }
}

fn write_cells(
    data: &mut SessionData,
    target: GridTarget,
    cells: &HashMap<CellKey, Block>,
) -> Result<(), ChangeError> {
    let grid = data.grid_mut(target).ok_or(ChangeError::NoEditingBrush)?;
    if let Some(cell) = cells
        .keys()
        .find(|cell| grid.get(cell.x, cell.y).is_none())
    {
        return Err(ChangeError::OutOfBounds {
            cell: *cell,
            target,
        });
    }
    for (cell, block) in cells {
        grid.set(cell.x, cell.y, *block);
    }
    Ok(())
}

/// Records a stroke while it is painted live onto a grid
#[derive(Debug, Clone)]
pub struct PaintTracker {
    target: GridTarget,
    allow_null_permissions: bool,
    before: HashMap<CellKey, Block>,
    after: HashMap<CellKey, Block>,
}

impl PaintTracker {
    pub fn new(target: GridTarget, allow_null_permissions: bool) -> Self {
        Self {
            target,
            allow_null_permissions,
            before: HashMap::new(),
            after: HashMap::new(),
        }
    }

    pub fn target(&self) -> GridTarget {
        self.target
    }

    pub fn is_empty(&self) -> bool {
        self.after.is_empty()
    }

    /// Paint `block` at (x, y). An empty metatile keeps the old metatile and an
    /// empty permission keeps the old permission unless null permissions are
    /// allowed. Returns whether the cell changed.
    pub fn set(&mut self, grid: &mut BlockGrid, x: i32, y: i32, block: Block) -> bool {
        if !grid.in_bounds(x, y) {
            return false;
        }
        let (x, y) = (x as u32, y as u32);
        let Some(old) = grid.get(x, y) else {
            return false;
        };

        let new = Block {
            metatile: block.metatile.or(old.metatile),
            permission: if block.permission.is_none() && !self.allow_null_permissions {
                old.permission
            } else {
                block.permission
            },
        };
        if new == old {
            return false;
        }

        let key = CellKey::new(x, y);
        self.before.entry(key).or_insert(old);
        self.after.insert(key, new);
        grid.set(x, y, new);
        true
    }

    /// Drop cells that ended the stroke where they started
    pub fn clean(&mut self) {
        let before = &self.before;
        self.after.retain(|cell, block| before.get(cell) != Some(block));
        let after = &self.after;
        self.before.retain(|cell, _| after.contains_key(cell));
    }

    /// Finish the stroke as a change
    pub fn finish(mut self) -> Change {
        self.clean();
        Change::new(ChangeKind::Paint(PaintChange {
            target: self.target,
            before: self.before,
            after: self.after,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_before_latest_after() {
        let mut grid = BlockGrid::filled(4, 4, Block::new(1, 0));
        let mut tracker = PaintTracker::new(GridTarget::Map, false);

        assert!(tracker.set(&mut grid, 1, 1, Block::new(2, 0)));
        assert!(tracker.set(&mut grid, 1, 1, Block::new(3, 0)));
        assert_eq!(grid.get(1, 1), Some(Block::new(3, 0)));

        let ChangeKind::Paint(paint) = tracker.finish().kind else {
            panic!("expected a paint change");
        };
        let key = CellKey::new(1, 1);
        assert_eq!(paint.before[&key], Block::new(1, 0));
        assert_eq!(paint.after[&key], Block::new(3, 0));
    }

    #[test]
    fn test_null_parts_keep_old_values() {
        let mut grid = BlockGrid::filled(2, 2, Block::new(5, 4));
        let mut tracker = PaintTracker::new(GridTarget::Map, false);

        tracker.set(&mut grid, 0, 0, Block::metatile(9));
        assert_eq!(grid.get(0, 0), Some(Block::new(9, 4)));

        tracker.set(&mut grid, 1, 0, Block::permission(1));
        assert_eq!(grid.get(1, 0), Some(Block::new(5, 1)));

        // Nothing to change
        assert!(!tracker.set(&mut grid, 1, 1, Block::EMPTY));
        assert!(!tracker.set(&mut grid, 1, 1, Block::new(5, 4)));
    }

    #[test]
    fn test_allow_null_permissions() {
        let mut grid = BlockGrid::filled(1, 1, Block::new(5, 4));
        let mut tracker = PaintTracker::new(GridTarget::Palette, true);

        tracker.set(&mut grid, 0, 0, Block::metatile(5));
        assert_eq!(grid.get(0, 0), Some(Block::metatile(5)));
    }

    #[test]
    fn test_out_of_bounds_ignored() {
        let mut grid = BlockGrid::new(2, 2);
        let mut tracker = PaintTracker::new(GridTarget::Map, false);
        assert!(!tracker.set(&mut grid, -1, 0, Block::new(1, 1)));
        assert!(!tracker.set(&mut grid, 2, 0, Block::new(1, 1)));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_clean_drops_restored_cells() {
        let mut grid = BlockGrid::filled(2, 1, Block::new(1, 0));
        let mut tracker = PaintTracker::new(GridTarget::Map, false);

        tracker.set(&mut grid, 0, 0, Block::new(2, 0));
        tracker.set(&mut grid, 0, 0, Block::new(1, 0));
        tracker.set(&mut grid, 1, 0, Block::new(2, 0));
        tracker.clean();

        let ChangeKind::Paint(paint) = tracker.finish().kind else {
            panic!("expected a paint change");
        };
        assert_eq!(paint.cell_count(), 1);
        assert!(paint.before.contains_key(&CellKey::new(1, 0)));
        assert!(!paint.before.contains_key(&CellKey::new(0, 0)));
    }
}
