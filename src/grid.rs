//! Grid sampling points inside the mirrored window

use serde::{Deserialize, Serialize};

use crate::config::GridSpec;

/// On-screen position and size of the mirrored window at capture time
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl WindowRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// One sampled grid cell. `col`/`row` are 1-indexed; `rel_x`/`rel_y` are
/// pixels from the window's own top-left corner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GridCell {
    pub col: u32,
    pub row: u32,
    pub rel_x: i64,
    pub rel_y: i64,
}

/// A grid cell together with the absolute screen point that gets clicked
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellTarget {
    pub cell: GridCell,
    pub abs_x: i64,
    pub abs_y: i64,
}

/// Un-rounded offset of a cell centre, given 0-indexed column and row
pub fn relative_point(spec: &GridSpec, width: u32, height: u32, col: u32, row: u32) -> (f64, f64) {
    let width = width as f64;
    let height = height as f64;

    let rel_x = (col as f64 + 0.5) / spec.cols as f64 * width;

    let effective_height = height * (spec.end_fraction - spec.start_fraction);
    let rel_y =
        spec.start_fraction * height + (row as f64 + 0.5) / spec.rows as f64 * effective_height;

    (rel_x, rel_y)
}

/// Compute every sampling target for a window, row by row.
///
/// Relative values are rounded from the floating point centre. Absolute
/// values are rounded from `window origin + un-rounded centre`, so they can
/// differ by one pixel from `origin + rel`.
pub fn compute_targets(spec: &GridSpec, rect: &WindowRect) -> Vec<CellTarget> {
    let mut targets = Vec::with_capacity(spec.cell_count());

    for row in 0..spec.rows {
        for col in 0..spec.cols {
            let (rel_x, rel_y) = relative_point(spec, rect.width, rect.height, col, row);
            let cell = GridCell {
                col: col + 1,
                row: row + 1,
                rel_x: rel_x.round() as i64,
                rel_y: rel_y.round() as i64,
            };
            targets.push(CellTarget {
                cell,
                abs_x: (rect.x as f64 + rel_x).round() as i64,
                abs_y: (rect.y as f64 + rel_y).round() as i64,
            });
        }
    }

    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn compute_cells(spec: &GridSpec, rect: &WindowRect) -> Vec<GridCell> {
        compute_targets(spec, rect).into_iter().map(|t| t.cell).collect()
    }

    #[test]
    fn test_nine_unique_cells() {
        let spec = GridSpec::default();
        for (w, h) in [(1, 1), (300, 600), (344, 764), (1920, 1080)] {
            let cells = compute_cells(&spec, &WindowRect::new(10, 20, w, h));
            assert_eq!(cells.len(), 9);

            let keys: HashSet<(u32, u32)> = cells.iter().map(|c| (c.col, c.row)).collect();
            assert_eq!(keys.len(), 9);
            for col in 1..=3 {
                for row in 1..=3 {
                    assert!(keys.contains(&(col, row)));
                }
            }
        }
    }

    #[test]
    fn test_first_cell_position() {
        let spec = GridSpec::default();
        let cells = compute_cells(&spec, &WindowRect::new(0, 0, 300, 600));
        let first = cells.iter().find(|c| c.col == 1 && c.row == 1).unwrap();
        // 0.15*600 + 0.5/3*420 = 90 + 70
        assert_eq!(first.rel_x, 50);
        assert_eq!(first.rel_y, 160);
    }

    #[test]
    fn test_last_cell_position() {
        let spec = GridSpec::default();
        let cells = compute_cells(&spec, &WindowRect::new(0, 0, 300, 600));
        let last = cells.iter().find(|c| c.col == 3 && c.row == 3).unwrap();
        // 2.5/3*300 = 250; 90 + 2.5/3*420 = 440
        assert_eq!(last.rel_x, 250);
        assert_eq!(last.rel_y, 440);
    }

    #[test]
    fn test_absolute_targets_include_origin() {
        let spec = GridSpec::default();
        let targets = compute_targets(&spec, &WindowRect::new(100, -40, 300, 600));
        let first = targets[0];
        assert_eq!((first.cell.col, first.cell.row), (1, 1));
        assert_eq!((first.abs_x, first.abs_y), (150, 120));
    }

    #[test]
    fn test_row_major_order() {
        let spec = GridSpec::default();
        let cells = compute_cells(&spec, &WindowRect::new(0, 0, 90, 90));
        let order: Vec<(u32, u32)> = cells.iter().map(|c| (c.col, c.row)).collect();
        assert_eq!(order[..4], [(1, 1), (2, 1), (3, 1), (1, 2)]);
    }
}
