//! Cell grid addressing and pointer hit-testing.

use serde::{Deserialize, Serialize};
use sigil_common::constants::{DEFAULT_GRID_SIZE, DEFAULT_HIT_RATIO};
use sigil_common::{Cell, Result, SigilError};

/// A fixed N×N grid of cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grid {
    size: u8,
}

impl Grid {
    pub fn new(size: u8) -> Result<Self> {
        if size == 0 {
            return Err(SigilError::Config("Grid size must be at least 1".to_string()));
        }
        Ok(Self { size })
    }

    pub fn size(&self) -> u8 {
        self.size
    }

    /// Number of cells (N²)
    pub fn capacity(&self) -> usize {
        usize::from(self.size) * usize::from(self.size)
    }

    pub fn cell_at(&self, row: u8, column: u8) -> Result<Cell> {
        Cell::new(row, column, self.size)
    }

    pub fn id_of(&self, cell: &Cell) -> Result<u16> {
        if cell.grid_size() != self.size {
            return Err(SigilError::InvalidCell {
                row: cell.row().into(),
                column: cell.column().into(),
                size: self.size,
            });
        }
        Ok(cell.id())
    }

    pub fn cell_of(&self, id: u16) -> Result<Cell> {
        Cell::from_id(id, self.size)
    }

    /// Every cell in row-major order
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        let size = self.size;
        (0..size).flat_map(move |row| {
            (0..size).filter_map(move |column| Cell::new(row, column, size).ok())
        })
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            size: DEFAULT_GRID_SIZE,
        }
    }
}

/// Where the grid sits on the drawing surface.
///
/// Cells are squares of `cell_size` separated by `spacing`, starting at
/// (`origin_x`, `origin_y`). A point hits a cell only inside a disc of
/// radius `hit_ratio * cell_size / 2` around the cell centre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub origin_x: f32,
    pub origin_y: f32,
    pub cell_size: f32,
    #[serde(default)]
    pub spacing: f32,
    #[serde(default = "default_hit_ratio")]
    pub hit_ratio: f32,
}

fn default_hit_ratio() -> f32 {
    DEFAULT_HIT_RATIO
}

impl GridGeometry {
    /// Unit geometry: cell (r, c) is centred on (c + 0.5, r + 0.5)
    pub fn unit() -> Self {
        Self {
            origin_x: 0.0,
            origin_y: 0.0,
            cell_size: 1.0,
            spacing: 0.0,
            hit_ratio: DEFAULT_HIT_RATIO,
        }
    }

    fn pitch(&self) -> f32 {
        self.cell_size + self.spacing
    }

    /// Centre of a cell in surface coordinates
    pub fn cell_center(&self, cell: &Cell) -> (f32, f32) {
        let half = self.cell_size / 2.0;
        (
            self.origin_x + f32::from(cell.column()) * self.pitch() + half,
            self.origin_y + f32::from(cell.row()) * self.pitch() + half,
        )
    }

    /// Map a surface point to the cell under it, if any
    pub fn hit_test(&self, grid: &Grid, x: f32, y: f32) -> Option<Cell> {
        if !x.is_finite() || !y.is_finite() || self.pitch() <= 0.0 {
            return None;
        }

        let column = ((x - self.origin_x) / self.pitch()).floor();
        let row = ((y - self.origin_y) / self.pitch()).floor();
        let size = f32::from(grid.size());
        if column < 0.0 || row < 0.0 || column >= size || row >= size {
            return None;
        }

        let cell = grid.cell_at(row as u8, column as u8).ok()?;
        let (cx, cy) = self.cell_center(&cell);
        let radius = self.hit_ratio * self.cell_size / 2.0;
        let (dx, dy) = (x - cx, y - cy);
        if dx * dx + dy * dy <= radius * radius {
            Some(cell)
        } else {
            None
        }
    }
}

impl Default for GridGeometry {
    fn default() -> Self {
        Self::unit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cells_row_major() {
        let grid = Grid::new(3).unwrap();
        let ids: Vec<u16> = grid.cells().map(|c| c.id()).collect();
        assert_eq!(ids, (0..9).collect::<Vec<_>>());
        assert_eq!(grid.capacity(), 9);
    }

    #[test]
    fn test_arbitrary_size() {
        let grid = Grid::new(5).unwrap();
        assert_eq!(grid.cells().count(), 25);
        let cell = grid.cell_of(24).unwrap();
        assert_eq!((cell.row(), cell.column()), (4, 4));
        assert_eq!(grid.id_of(&cell).unwrap(), 24);
    }

    #[test]
    fn test_out_of_range_addressing() {
        let grid = Grid::new(3).unwrap();
        assert!(matches!(
            grid.cell_at(0, 3),
            Err(SigilError::InvalidCell { .. })
        ));
        assert!(matches!(
            grid.cell_of(9),
            Err(SigilError::InvalidCellId { id: 9, size: 3 })
        ));
        assert!(Grid::new(0).is_err());

        let foreign = Grid::new(4).unwrap().cell_at(0, 3).unwrap();
        assert!(grid.id_of(&foreign).is_err());
    }

    #[test]
    fn test_hit_test_centre_and_tolerance() {
        let grid = Grid::new(3).unwrap();
        let geometry = GridGeometry {
            origin_x: 10.0,
            origin_y: 20.0,
            cell_size: 100.0,
            spacing: 0.0,
            hit_ratio: 0.6,
        };

        let hit = geometry.hit_test(&grid, 160.0, 170.0).unwrap();
        assert_eq!((hit.row(), hit.column()), (1, 1));

        // Inside the cell square but outside the hit disc (radius 30)
        assert!(geometry.hit_test(&grid, 115.0, 125.0).is_none());
        // Off the grid entirely
        assert!(geometry.hit_test(&grid, 5.0, 70.0).is_none());
        assert!(geometry.hit_test(&grid, 60.0, 400.0).is_none());
        assert!(geometry.hit_test(&grid, f32::NAN, 70.0).is_none());
    }

    #[test]
    fn test_hit_test_with_spacing() {
        let grid = Grid::new(3).unwrap();
        let geometry = GridGeometry {
            origin_x: 0.0,
            origin_y: 0.0,
            cell_size: 10.0,
            spacing: 10.0,
            hit_ratio: 1.0,
        };
        let cell = grid.cell_at(2, 1).unwrap();
        let (x, y) = geometry.cell_center(&cell);
        assert_eq!((x, y), (25.0, 45.0));
        assert_eq!(geometry.hit_test(&grid, x, y), Some(cell));
        // In the gap between cells
        assert!(geometry.hit_test(&grid, 15.0, 45.0).is_none());
    }
}
