//! Spatial Index for Satellite Grids
//!
//! ## Overview
//!
//! Satellite and atmospheric-model products arrive as regular lat/lon grids.
//! Every ground sensor has to be matched to the grid cell that covers it
//! before its readings can be compared against the retrieval. The grid is
//! rectangular, so the lookup is constant time:
//!
//! ```text
//! row = floor((lat - south) / cell_size_lat)
//! col = floor((lon - west)  / cell_size_lon)
//!
//!  north ┌─────┬─────┬─────┐
//!        │ 2,0 │ 2,1 │ 2,2 │
//!        ├─────┼─────┼─────┤
//!        │ 1,0 │ 1,1 │ 1,2 │
//!        ├─────┼─────┼─────┤
//!        │ 0,0 │ 0,1 │ 0,2 │
//!  south └─────┴─────┴─────┘
//!       west             east
//! ```
//!
//! ## Edge Rules
//!
//! - Cell edges are half-open: a point on an interior edge belongs to the
//!   cell to its north/east.
//! - Points exactly on the outer north/east edge belong to the last
//!   row/column, so the whole closed footprint is covered.
//! - Points outside the footprint are *not covered*; the lookup never panics.
//! - When the footprint is not a whole multiple of the cell size, the last
//!   row/column is clipped to the footprint.

use serde::{Deserialize, Serialize};

use crate::errors::{FusionError, FusionResult};
use crate::model::{BoundingBox, GeoPoint};

/// Grid cell coordinates, row 0 at the southern edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId {
    /// Row counted from the south
    pub row: u32,
    /// Column counted from the west
    pub col: u32,
}

impl CellId {
    /// Create a cell id
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

/// Constant-time point-to-cell lookup over a rectangular grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridIndex {
    bounds: BoundingBox,
    cell_size_lat: f64,
    cell_size_lon: f64,
    rows: u32,
    cols: u32,
}

impl GridIndex {
    /// Build an index for a footprint and cell size
    pub fn new(bounds: BoundingBox, cell_size_lat: f64, cell_size_lon: f64) -> FusionResult<Self> {
        bounds.validate()?;
        if !(cell_size_lat.is_finite() && cell_size_lat > 0.0)
            || !(cell_size_lon.is_finite() && cell_size_lon > 0.0)
        {
            return Err(FusionError::InvalidInput { reason: "grid cell size must be positive" });
        }

        let rows = cells_along(bounds.north - bounds.south, cell_size_lat);
        let cols = cells_along(bounds.east - bounds.west, cell_size_lon);

        Ok(Self {
            bounds,
            cell_size_lat,
            cell_size_lon,
            rows,
            cols,
        })
    }

    /// Grid footprint
    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    /// Number of rows and columns
    pub fn shape(&self) -> (u32, u32) {
        (self.rows, self.cols)
    }

    /// Covering cell, `None` when the point is outside the footprint
    pub fn locate(&self, point: &GeoPoint) -> Option<CellId> {
        if !point.lat.is_finite() || !point.lon.is_finite() || !self.bounds.contains(point) {
            return None;
        }

        let row = ((point.lat - self.bounds.south) / self.cell_size_lat).floor() as u32;
        let col = ((point.lon - self.bounds.west) / self.cell_size_lon).floor() as u32;

        // North/east outer edge folds into the last cell
        Some(CellId::new(row.min(self.rows - 1), col.min(self.cols - 1)))
    }

    /// Footprint of one cell, clipped to the grid
    pub fn cell_bounds(&self, cell: CellId) -> Option<BoundingBox> {
        if cell.row >= self.rows || cell.col >= self.cols {
            return None;
        }

        let south = self.bounds.south + cell.row as f64 * self.cell_size_lat;
        let west = self.bounds.west + cell.col as f64 * self.cell_size_lon;

        Some(BoundingBox {
            north: (south + self.cell_size_lat).min(self.bounds.north),
            south,
            east: (west + self.cell_size_lon).min(self.bounds.east),
            west,
        })
    }

    /// Centre of one cell, used as the location of gap-filled estimates
    pub fn cell_center(&self, cell: CellId) -> Option<GeoPoint> {
        self.cell_bounds(cell).map(|b| b.center())
    }

    /// Every cell of the grid, row-major from the south-west corner
    pub fn cells(&self) -> impl Iterator<Item = CellId> + '_ {
        (0..self.rows).flat_map(move |row| (0..self.cols).map(move |col| CellId::new(row, col)))
    }

    /// Cells whose centre lies inside `area`
    pub fn cells_within<'a>(&'a self, area: &'a BoundingBox) -> impl Iterator<Item = CellId> + 'a {
        self.cells().filter(move |cell| {
            self.cell_center(*cell)
                .map(|c| area.contains(&c))
                .unwrap_or(false)
        })
    }
}

/// Cells needed to span `extent`, at least one
fn cells_along(extent: f64, size: f64) -> u32 {
    let n = (extent / size).ceil();
    if n < 1.0 {
        1
    } else {
        n as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn grid() -> GridIndex {
        // 1° × 1.5° footprint with quarter-degree cells: 4 rows × 6 cols
        let bounds = BoundingBox::new(41.0, 40.0, 10.5, 9.0).unwrap();
        GridIndex::new(bounds, 0.25, 0.25).unwrap()
    }

    #[test]
    fn shape_from_footprint() {
        assert_eq!(grid().shape(), (4, 6));
    }

    #[test]
    fn locate_interior_point() {
        let cell = grid().locate(&GeoPoint::new(40.3, 9.6)).unwrap();
        assert_eq!(cell, CellId::new(1, 2));
    }

    #[test]
    fn interior_edge_belongs_to_north_east_cell() {
        let cell = grid().locate(&GeoPoint::new(40.5, 9.5)).unwrap();
        assert_eq!(cell, CellId::new(2, 2));
    }

    #[test]
    fn outer_north_east_edge_belongs_to_last_cell() {
        let g = grid();
        assert_eq!(g.locate(&GeoPoint::new(41.0, 10.5)), Some(CellId::new(3, 5)));
        assert_eq!(g.locate(&GeoPoint::new(40.0, 9.0)), Some(CellId::new(0, 0)));
    }

    #[test]
    fn outside_is_not_covered() {
        let g = grid();
        assert_eq!(g.locate(&GeoPoint::new(39.99, 9.5)), None);
        assert_eq!(g.locate(&GeoPoint::new(40.5, 10.75)), None);
        assert_eq!(g.locate(&GeoPoint::new(f64::NAN, 9.5)), None);
    }

    #[test]
    fn rejects_non_positive_cell_size() {
        let bounds = BoundingBox::new(41.0, 40.0, 10.0, 9.0).unwrap();
        assert!(GridIndex::new(bounds, 0.0, 0.25).is_err());
        assert!(GridIndex::new(bounds, 0.25, -1.0).is_err());
    }

    #[test]
    fn partial_last_cell_is_clipped() {
        let bounds = BoundingBox::new(41.0, 40.0, 10.0, 9.0).unwrap();
        let g = GridIndex::new(bounds, 0.75, 0.75).unwrap();
        assert_eq!(g.shape(), (2, 2));

        let last = g.cell_bounds(CellId::new(1, 1)).unwrap();
        assert_eq!(last.north, 41.0);
        assert_eq!(last.east, 10.0);
        assert!(g.cell_bounds(CellId::new(2, 0)).is_none());
    }

    #[test]
    fn cells_within_uses_centres() {
        let g = grid();
        let area = BoundingBox::new(40.5, 40.0, 9.5, 9.0).unwrap();
        let cells: Vec<_> = g.cells_within(&area).collect();
        assert_eq!(
            cells,
            vec![CellId::new(0, 0), CellId::new(0, 1), CellId::new(1, 0), CellId::new(1, 1)]
        );
    }

    proptest! {
        #[test]
        fn covered_points_land_inside_their_cell(lat in 40.0f64..=41.0, lon in 9.0f64..=10.5) {
            let g = grid();
            let p = GeoPoint::new(lat, lon);
            let cell = g.locate(&p).unwrap();
            let b = g.cell_bounds(cell).unwrap();
            prop_assert!(b.contains(&p));
        }

        #[test]
        fn points_outside_never_locate(lat in 41.0001f64..60.0, lon in -20.0f64..20.0) {
            prop_assert!(grid().locate(&GeoPoint::new(lat, lon)).is_none());
        }
    }
}
