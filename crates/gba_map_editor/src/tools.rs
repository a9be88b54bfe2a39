//! Painting tools
//!
//! Tools write through a [`PaintTracker`] so every stroke ends up as a single
//! undoable change.

use crate::changes::PaintTracker;
use gba_map_autotile::{resolve, AutoTileMask};
use gba_map_core::{Block, BlockGrid, BrushDefinition, BrushKind};
use std::collections::{HashSet, VecDeque};

/// Which cells a fill or replace treats as "the same" as the start cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillMode {
    #[default]
    SameMetatile,
    SamePermission,
    SameMetatileAndPermission,
}

impl FillMode {
    fn matches(self, reference: Block, candidate: Block) -> bool {
        match self {
            FillMode::SameMetatile => candidate.metatile == reference.metatile,
            FillMode::SamePermission => candidate.permission == reference.permission,
            FillMode::SameMetatileAndPermission => candidate == reference,
        }
    }
}

/// Bresenham's line algorithm - generates all cell coordinates along a line
fn bresenham_line(x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<(i32, i32)> {
    let mut points = Vec::new();

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    let (mut x, mut y) = (x0, y0);
    loop {
        points.push((x, y));
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }

    points
}

/// Pencil step: paint from the previous pointer position to `to` without gaps
pub fn pencil(
    tracker: &mut PaintTracker,
    grid: &mut BlockGrid,
    from: Option<(i32, i32)>,
    to: (i32, i32),
    block: Block,
) {
    let (x0, y0) = from.unwrap_or(to);
    for (x, y) in bresenham_line(x0, y0, to.0, to.1) {
        tracker.set(grid, x, y, block);
    }
}

/// Fill the rectangle spanned by two corners (inclusive)
pub fn rectangle(
    tracker: &mut PaintTracker,
    grid: &mut BlockGrid,
    a: (i32, i32),
    b: (i32, i32),
    block: Block,
) {
    for y in a.1.min(b.1)..=a.1.max(b.1) {
        for x in a.0.min(b.0)..=a.0.max(b.0) {
            tracker.set(grid, x, y, block);
        }
    }
}

/// Flood fill the 4-connected area around `start` that matches it under `mode`
pub fn flood_fill(
    tracker: &mut PaintTracker,
    grid: &mut BlockGrid,
    start: (i32, i32),
    block: Block,
    mode: FillMode,
) {
    let Some(reference) = grid.get_signed(start.0, start.1) else {
        return;
    };

    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([start]);
    visited.insert(start);

    while let Some((x, y)) = queue.pop_front() {
        tracker.set(grid, x, y, block);
        for next in [(x + 1, y), (x - 1, y), (x, y + 1), (x, y - 1)] {
            if visited.contains(&next) {
                continue;
            }
            let matches = grid
                .get_signed(next.0, next.1)
                .is_some_and(|cell| mode.matches(reference, cell));
            if matches {
                visited.insert(next);
                queue.push_back(next);
            }
        }
    }
}

/// Replace every cell in the grid that matches `start` under `mode`
pub fn replace_all(
    tracker: &mut PaintTracker,
    grid: &mut BlockGrid,
    start: (i32, i32),
    block: Block,
    mode: FillMode,
) {
    let Some(reference) = grid.get_signed(start.0, start.1) else {
        return;
    };
    let targets: Vec<(u32, u32)> = grid
        .iter()
        .filter(|(_, _, cell)| mode.matches(reference, *cell))
        .map(|(x, y, _)| (x, y))
        .collect();
    for (x, y) in targets {
        tracker.set(grid, x as i32, y as i32, block);
    }
}

/// Stamp a brush grid with its top-left corner at `at`.
/// Empty brush cells leave the map untouched.
pub fn stamp(tracker: &mut PaintTracker, grid: &mut BlockGrid, at: (i32, i32), blocks: &BlockGrid) {
    for (x, y, block) in blocks.iter() {
        if block.is_null() {
            continue;
        }
        tracker.set(grid, at.0 + x as i32, at.1 + y as i32, block);
    }
}

/// Paint `cells` with a brush. Simple brushes stamp their grid at each cell;
/// nine-patch brushes lay down their center and then re-resolve every painted
/// cell and its neighbours against the brush region.
pub fn paint_brush(
    tracker: &mut PaintTracker,
    grid: &mut BlockGrid,
    brush: &BrushDefinition,
    cells: &[(i32, i32)],
) {
    let BrushKind::NinePatch { corners } = brush.kind else {
        for cell in cells {
            stamp(tracker, grid, *cell, &brush.blocks);
        }
        return;
    };

    let Some(center) = brush.blocks.get(1, 1).filter(|b| !b.is_null()) else {
        return;
    };
    for (x, y) in cells {
        tracker.set(grid, *x, *y, center);
    }

    let mut affected: Vec<(i32, i32)> = Vec::new();
    for (x, y) in cells {
        for dy in -1..=1 {
            for dx in -1..=1 {
                let cell = (x + dx, y + dy);
                if !affected.contains(&cell) {
                    affected.push(cell);
                }
            }
        }
    }

    // Resolve against the stamped region before writing any resolved block
    let resolved: Vec<((i32, i32), Block)> = affected
        .into_iter()
        .filter(|(x, y)| {
            grid.get_signed(*x, *y)
                .and_then(|b| b.metatile)
                .is_some_and(|m| brush.in_region(m))
        })
        .filter_map(|(x, y)| {
            let mask = AutoTileMask::from_grid(grid, x, y, |m| brush.in_region(m));
            let (col, row) = resolve(mask, corners).block_position();
            brush
                .blocks
                .get(col, row)
                .filter(|b| !b.is_null())
                .map(|block| ((x, y), block))
        })
        .collect();

    for ((x, y), block) in resolved {
        tracker.set(grid, x, y, block);
    }
}
