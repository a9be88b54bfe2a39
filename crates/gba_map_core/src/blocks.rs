//! Block grids for layouts, borders, palettes and brushes

use crate::BlockGridError;
use serde::{Deserialize, Serialize};

/// Wire value for a cell with no metatile
pub const NULL_METATILE: u16 = 0xFFFF;
/// Wire value for a cell with no permission
pub const NULL_PERMISSION: u16 = 0xFFFF;
/// Number of metatiles per palette row
pub const PALETTE_WIDTH: u32 = 8;

/// A single cell: a metatile and its movement permission.
///
/// `None` is "no value here" and is distinct from a real `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Block {
    pub metatile: Option<u16>,
    pub permission: Option<u16>,
}

impl Block {
    /// A cell with neither metatile nor permission
    pub const EMPTY: Block = Block {
        metatile: None,
        permission: None,
    };

    pub fn new(metatile: u16, permission: u16) -> Self {
        Self {
            metatile: Some(metatile),
            permission: Some(permission),
        }
    }

    /// A block that only carries a metatile
    pub fn metatile(metatile: u16) -> Self {
        Self {
            metatile: Some(metatile),
            permission: None,
        }
    }

    /// A block that only carries a permission
    pub fn permission(permission: u16) -> Self {
        Self {
            metatile: None,
            permission: Some(permission),
        }
    }

    pub fn is_null(&self) -> bool {
        self.metatile.is_none()
    }
}

/// A width x height grid of blocks stored row-major
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SerializedBlocks", into = "SerializedBlocks")]
pub struct BlockGrid {
    width: u32,
    height: u32,
    metatiles: Vec<Option<u16>>,
    permissions: Vec<Option<u16>>,
}

impl BlockGrid {
    /// Create a grid where every cell is empty
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, Block::EMPTY)
    }

    /// Create a grid where every cell holds `block`
    pub fn filled(width: u32, height: u32, block: Block) -> Self {
        let size = (width * height) as usize;
        Self {
            width,
            height,
            metatiles: vec![block.metatile; size],
            permissions: vec![block.permission; size],
        }
    }

    /// Create the palette grid for `count` metatiles: `PALETTE_WIDTH` wide,
    /// metatile `i` at linear index `i`, permissions left empty.
    pub fn palette(count: usize) -> Self {
        let height = (count as u32).div_ceil(PALETTE_WIDTH).max(1);
        let mut grid = Self::new(PALETTE_WIDTH, height);
        for (i, metatile) in grid.metatiles.iter_mut().enumerate().take(count) {
            *metatile = Some(i as u16);
        }
        grid
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.metatiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metatiles.is_empty()
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height).then(|| (y * self.width + x) as usize)
    }

    /// Get the block at (x, y), or `None` outside the grid
    pub fn get(&self, x: u32, y: u32) -> Option<Block> {
        let idx = self.index(x, y)?;
        Some(Block {
            metatile: self.metatiles[idx],
            permission: self.permissions[idx],
        })
    }

    /// Signed lookup used by neighbour scans; outside the grid reads as `None`
    pub fn get_signed(&self, x: i32, y: i32) -> Option<Block> {
        if !self.in_bounds(x, y) {
            return None;
        }
        self.get(x as u32, y as u32)
    }

    /// Set the block at (x, y). Returns false when outside the grid.
    pub fn set(&mut self, x: u32, y: u32, block: Block) -> bool {
        let Some(idx) = self.index(x, y) else {
            return false;
        };
        self.metatiles[idx] = block.metatile;
        self.permissions[idx] = block.permission;
        true
    }

    pub fn metatiles(&self) -> &[Option<u16>] {
        &self.metatiles
    }

    pub fn permissions(&self) -> &[Option<u16>] {
        &self.permissions
    }

    /// Overwrite permissions starting at linear index `start`.
    ///
    /// Values that would land past the end of the grid are dropped.
    /// Returns how many values were written.
    pub fn update_permissions(&mut self, levels: &[Option<u16>], start: usize) -> usize {
        let end = (start + levels.len()).min(self.permissions.len());
        if start >= end {
            return 0;
        }
        let count = end - start;
        self.permissions[start..end].copy_from_slice(&levels[..count]);
        count
    }

    /// Overwrite metatiles starting at linear index `start`
    pub fn update_metatiles(&mut self, metatiles: &[Option<u16>], start: usize) -> usize {
        let end = (start + metatiles.len()).min(self.metatiles.len());
        if start >= end {
            return 0;
        }
        let count = end - start;
        self.metatiles[start..end].copy_from_slice(&metatiles[..count]);
        count
    }

    /// Copy of this grid with new dimensions. Overlapping cells are kept,
    /// new cells get metatile 0 and `fill_permission`.
    pub fn resized(&self, width: u32, height: u32, fill_permission: Option<u16>) -> BlockGrid {
        let mut grid = BlockGrid::filled(
            width,
            height,
            Block {
                metatile: Some(0),
                permission: fill_permission,
            },
        );
        for y in 0..height.min(self.height) {
            for x in 0..width.min(self.width) {
                if let Some(block) = self.get(x, y) {
                    grid.set(x, y, block);
                }
            }
        }
        grid
    }

    /// Iterate over every cell as `(x, y, block)`
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, Block)> + '_ {
        let width = self.width.max(1);
        self.metatiles
            .iter()
            .zip(&self.permissions)
            .enumerate()
            .map(move |(i, (metatile, permission))| {
                let i = i as u32;
                (
                    i % width,
                    i / width,
                    Block {
                        metatile: *metatile,
                        permission: *permission,
                    },
                )
            })
    }

    /// Whether any cell holds `metatile`
    pub fn contains_metatile(&self, metatile: u16) -> bool {
        self.metatiles.contains(&Some(metatile))
    }
}

/// Backend representation of a grid, `0xFFFF` standing in for empty cells
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedBlocks {
    pub width: u32,
    pub height: u32,
    pub metatiles: Vec<u16>,
    #[serde(alias = "levels")]
    pub permissions: Vec<u16>,
}

impl From<BlockGrid> for SerializedBlocks {
    fn from(grid: BlockGrid) -> Self {
        Self {
            width: grid.width,
            height: grid.height,
            metatiles: grid
                .metatiles
                .iter()
                .map(|m| m.unwrap_or(NULL_METATILE))
                .collect(),
            permissions: grid
                .permissions
                .iter()
                .map(|p| p.unwrap_or(NULL_PERMISSION))
                .collect(),
        }
    }
}

impl TryFrom<SerializedBlocks> for BlockGrid {
    type Error = BlockGridError;

    fn try_from(blocks: SerializedBlocks) -> Result<Self, Self::Error> {
        let size = (blocks.width * blocks.height) as usize;
        if blocks.metatiles.len() != size || blocks.permissions.len() != size {
            return Err(BlockGridError::LengthMismatch {
                width: blocks.width,
                height: blocks.height,
                metatiles: blocks.metatiles.len(),
                permissions: blocks.permissions.len(),
            });
        }
        Ok(Self {
            width: blocks.width,
            height: blocks.height,
            metatiles: blocks
                .metatiles
                .into_iter()
                .map(|m| (m != NULL_METATILE).then_some(m))
                .collect(),
            permissions: blocks
                .permissions
                .into_iter()
                .map(|p| (p != NULL_PERMISSION).then_some(p))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set() {
        let mut grid = BlockGrid::new(4, 3);
        assert_eq!(grid.len(), 12);
        assert_eq!(grid.get(1, 1), Some(Block::EMPTY));

        assert!(grid.set(1, 1, Block::new(5, 0)));
        assert_eq!(grid.get(1, 1), Some(Block::new(5, 0)));

        // Outside the grid
        assert!(!grid.set(4, 0, Block::new(1, 1)));
        assert_eq!(grid.get(4, 0), None);
        assert_eq!(grid.get_signed(-1, 0), None);
    }

    #[test]
    fn test_null_distinct_from_zero() {
        let mut grid = BlockGrid::new(2, 1);
        grid.set(0, 0, Block::new(0, 0));

        let json = serde_json::to_string(&grid).unwrap();
        let restored: BlockGrid = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.get(0, 0), Some(Block::new(0, 0)));
        assert_eq!(restored.get(1, 0), Some(Block::EMPTY));
    }

    #[test]
    fn test_wire_format_uses_sentinel() {
        let mut grid = BlockGrid::new(2, 1);
        grid.set(0, 0, Block::metatile(3));
        let value = serde_json::to_value(&grid).unwrap();

        assert_eq!(value["width"], 2);
        assert_eq!(value["metatiles"], serde_json::json!([3, 0xFFFF]));
        assert_eq!(value["permissions"], serde_json::json!([0xFFFF, 0xFFFF]));
    }

    #[test]
    fn test_legacy_levels_key_and_length_check() {
        let grid: BlockGrid = serde_json::from_value(serde_json::json!({
            "width": 1, "height": 1, "metatiles": [7], "levels": [2]
        }))
        .unwrap();
        assert_eq!(grid.get(0, 0), Some(Block::new(7, 2)));

        let bad = serde_json::from_value::<BlockGrid>(serde_json::json!({
            "width": 2, "height": 2, "metatiles": [1], "permissions": [1]
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn test_update_permissions_clips() {
        let mut grid = BlockGrid::new(2, 2);
        let written = grid.update_permissions(&[Some(1), Some(2), Some(3)], 2);
        assert_eq!(written, 2);
        assert_eq!(grid.permissions(), &[None, None, Some(1), Some(2)]);

        assert_eq!(grid.update_permissions(&[Some(9)], 10), 0);
    }

    #[test]
    fn test_resized_keeps_overlap() {
        let mut grid = BlockGrid::new(2, 2);
        grid.set(1, 1, Block::new(4, 1));

        let bigger = grid.resized(3, 3, None);
        assert_eq!(bigger.get(1, 1), Some(Block::new(4, 1)));
        assert_eq!(bigger.get(2, 2), Some(Block::metatile(0)));

        let smaller = grid.resized(1, 1, None);
        assert_eq!(smaller.len(), 1);
    }

    #[test]
    fn test_palette_layout() {
        let palette = BlockGrid::palette(10);
        assert_eq!(palette.width(), PALETTE_WIDTH);
        assert_eq!(palette.height(), 2);
        assert_eq!(palette.get(1, 1), Some(Block::metatile(9)));
        assert_eq!(palette.get(2, 1), Some(Block::EMPTY));
    }

    #[test]
    fn test_iter_coordinates() {
        let mut grid = BlockGrid::new(3, 2);
        grid.set(2, 1, Block::metatile(8));
        let found: Vec<_> = grid.iter().filter(|(_, _, b)| !b.is_null()).collect();
        assert_eq!(found, vec![(2, 1, Block::metatile(8))]);
    }
}
