//! Plain-text calibration records
//!
//! Two formats are handled here:
//!
//! - the grid-pass log (`grid_offsets.txt`): a window size line plus one
//!   `Cell c,r: Relative (x, y)` line per sampled cell. Parsing is tolerant
//!   and only looks at those two line shapes, so headers and absolute
//!   annotations written by the grid pass are ignored.
//! - the committed table (`calibrated_offsets.txt`): a window size line plus
//!   one `Cell c,r: (x, y)` line per cell in absolute screen pixels.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::OnceLock;

use crate::error::{CalibrationError, CalibrationResult};
use crate::grid::{CellTarget, GridCell, WindowRect};

static WINDOW_SIZE_RE: OnceLock<Regex> = OnceLock::new();
static RELATIVE_CELL_RE: OnceLock<Regex> = OnceLock::new();
static ABSOLUTE_CELL_RE: OnceLock<Regex> = OnceLock::new();

fn window_size_re() -> &'static Regex {
    WINDOW_SIZE_RE.get_or_init(|| {
        Regex::new(r"Window Size:\s*\((\d+)\s*x\s*(\d+)\)").expect("static regex")
    })
}

fn relative_cell_re() -> &'static Regex {
    RELATIVE_CELL_RE.get_or_init(|| {
        Regex::new(r"Cell\s+(\d+),\s*(\d+):.*Relative\s*\((-?\d+),\s*(-?\d+)\)")
            .expect("static regex")
    })
}

fn absolute_cell_re() -> &'static Regex {
    ABSOLUTE_CELL_RE.get_or_init(|| {
        Regex::new(r"^\s*Cell\s+(\d+),\s*(\d+):\s*\((-?\d+),\s*(-?\d+)\)").expect("static regex")
    })
}

/// Result of the automated grid pass, as read back from disk
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OffsetRecord {
    pub window_width: u32,
    pub window_height: u32,
    pub cells: Vec<GridCell>,
}

impl OffsetRecord {
    pub fn new(window_width: u32, window_height: u32, cells: Vec<GridCell>) -> Self {
        Self {
            window_width,
            window_height,
            cells,
        }
    }

    /// Minimal text form: size line then one relative line per cell
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Window Size: ({} x {})",
            self.window_width, self.window_height
        );
        for cell in &self.cells {
            let _ = writeln!(
                out,
                "Cell {},{}: Relative ({}, {})",
                cell.col, cell.row, cell.rel_x, cell.rel_y
            );
        }
        out
    }

    /// Tolerant parse. Unmatched lines are skipped; a missing size line
    /// leaves the size at 0x0. Use [`OffsetRecord::validate`] before scaling.
    pub fn parse(text: &str) -> Self {
        let mut record = OffsetRecord::default();

        // Pass 1: window size. The last size line wins.
        for line in text.lines() {
            if let Some(caps) = window_size_re().captures(line) {
                record.window_width = caps[1].parse().unwrap_or(0);
                record.window_height = caps[2].parse().unwrap_or(0);
            }
        }

        // Pass 2: cells, independently of where the size line was
        let mut seen: HashMap<(u32, u32), usize> = HashMap::new();
        for line in text.lines() {
            let Some(caps) = relative_cell_re().captures(line) else {
                continue;
            };
            let parsed = (
                caps[1].parse::<u32>(),
                caps[2].parse::<u32>(),
                caps[3].parse::<i64>(),
                caps[4].parse::<i64>(),
            );
            let (Ok(col), Ok(row), Ok(rel_x), Ok(rel_y)) = parsed else {
                tracing::debug!("Skipping unparsable cell line: {}", line);
                continue;
            };
            let cell = GridCell { col, row, rel_x, rel_y };
            match seen.get(&(col, row)) {
                Some(&idx) => record.cells[idx] = cell,
                None => {
                    seen.insert((col, row), record.cells.len());
                    record.cells.push(cell);
                }
            }
        }

        record
    }

    /// A record is usable when it has a non-zero size and at least one cell
    pub fn validate(&self) -> CalibrationResult<()> {
        if self.window_width == 0 || self.window_height == 0 {
            return Err(CalibrationError::InvalidWindowSize {
                width: self.window_width,
                height: self.window_height,
            });
        }
        if self.cells.is_empty() {
            return Err(CalibrationError::NoCalibrationLoaded);
        }
        Ok(())
    }
}

/// Full grid-pass log: a header with the window position, then the record
/// text with an absolute coordinate annotation on each cell line.
pub fn grid_log_text(rect: &WindowRect, targets: &[CellTarget]) -> String {
    let record = OffsetRecord::new(
        rect.width,
        rect.height,
        targets.iter().map(|t| t.cell).collect(),
    );
    let body = record.to_text();
    let mut lines = body.lines();

    let mut out = String::from("Grid Click Offsets:\n");
    let _ = writeln!(out, "Window Position: ({}, {})", rect.x, rect.y);
    if let Some(size_line) = lines.next() {
        let _ = writeln!(out, "{size_line}\n");
    }
    for (line, t) in lines.zip(targets) {
        let _ = writeln!(out, "{line} / Absolute ({}, {})", t.abs_x, t.abs_y);
    }
    out
}

/// One committed cell in the display coordinate space the user calibrated
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalibratedCell {
    pub col: u32,
    pub row: u32,
    pub x: i64,
    pub y: i64,
}

/// Terminal artifact of a manual calibration session
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinalOffsetRecord {
    pub window_width: u32,
    pub window_height: u32,
    pub cells: Vec<CalibratedCell>,
}

impl FinalOffsetRecord {
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Window Size: ({} x {})",
            self.window_width, self.window_height
        );
        for cell in &self.cells {
            let _ = writeln!(out, "Cell {},{}: ({}, {})", cell.col, cell.row, cell.x, cell.y);
        }
        out
    }

    /// Read back a committed table, skipping lines that don't match
    pub fn parse(text: &str) -> Self {
        let mut record = FinalOffsetRecord::default();
        for line in text.lines() {
            if let Some(caps) = window_size_re().captures(line) {
                record.window_width = caps[1].parse().unwrap_or(0);
                record.window_height = caps[2].parse().unwrap_or(0);
                continue;
            }
            if let Some(caps) = absolute_cell_re().captures(line) {
                if let (Ok(col), Ok(row), Ok(x), Ok(y)) = (
                    caps[1].parse::<u32>(),
                    caps[2].parse::<u32>(),
                    caps[3].parse::<i64>(),
                    caps[4].parse::<i64>(),
                ) {
                    record.cells.push(CalibratedCell { col, row, x, y });
                }
            }
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridSpec;
    use crate::grid::compute_targets;

    fn sample_record() -> OffsetRecord {
        OffsetRecord::new(
            344,
            764,
            vec![
                GridCell { col: 1, row: 1, rel_x: 57, rel_y: 204 },
                GridCell { col: 2, row: 1, rel_x: 172, rel_y: 204 },
                GridCell { col: 3, row: 2, rel_x: 287, rel_y: 382 },
            ],
        )
    }

    #[test]
    fn test_round_trip() {
        let record = sample_record();
        assert_eq!(OffsetRecord::parse(&record.to_text()), record);
    }

    #[test]
    fn test_parse_grid_log_with_annotations() {
        let spec = GridSpec::default();
        let rect = WindowRect::new(812, 33, 300, 600);
        let targets = compute_targets(&spec, &rect);
        let text = grid_log_text(&rect, &targets);

        let record = OffsetRecord::parse(&text);
        assert_eq!((record.window_width, record.window_height), (300, 600));
        assert_eq!(record.cells.len(), 9);
        assert_eq!(record.cells[0], GridCell { col: 1, row: 1, rel_x: 50, rel_y: 160 });
        // The position line must not be mistaken for the size
        assert!(text.contains("Window Position: (812, 33)"));
    }

    #[test]
    fn test_parse_ignores_noise_and_order() {
        let text = "\
some log header
Cell 3,2: Relative (287, 382) / Absolute (1, 2)
random junk
Cell 1,1: Relative (57, 204)
Window Size: (344 x 764)
Cell 2,1: Relative (172,204)
Cell x,y: Relative (nope)
";
        let record = OffsetRecord::parse(text);
        assert_eq!((record.window_width, record.window_height), (344, 764));

        let mut got = record.cells.clone();
        let mut want = sample_record().cells;
        got.sort_by_key(|c| (c.row, c.col));
        want.sort_by_key(|c| (c.row, c.col));
        assert_eq!(got, want);
    }

    #[test]
    fn test_missing_size_defaults_to_zero() {
        let record = OffsetRecord::parse("Cell 1,1: Relative (10, 20)\n");
        assert_eq!((record.window_width, record.window_height), (0, 0));
        assert_eq!(record.cells.len(), 1);
        assert!(matches!(
            record.validate(),
            Err(CalibrationError::InvalidWindowSize { width: 0, height: 0 })
        ));
    }

    #[test]
    fn test_validate_requires_cells() {
        let record = OffsetRecord::parse("Window Size: (300 x 600)\n");
        assert_eq!(record.validate(), Err(CalibrationError::NoCalibrationLoaded));
        assert!(sample_record().validate().is_ok());
    }

    #[test]
    fn test_duplicate_cell_keeps_last() {
        let text = "Window Size: (10 x 10)\nCell 1,1: Relative (1, 1)\nCell 1,1: Relative (2, 3)\n";
        let record = OffsetRecord::parse(text);
        assert_eq!(record.cells, vec![GridCell { col: 1, row: 1, rel_x: 2, rel_y: 3 }]);
    }

    #[test]
    fn test_final_record_text() {
        let record = FinalOffsetRecord {
            window_width: 300,
            window_height: 600,
            cells: vec![
                CalibratedCell { col: 1, row: 1, x: 103, y: 249 },
                CalibratedCell { col: 2, row: 1, x: -4, y: 249 },
            ],
        };
        let text = record.to_text();
        assert_eq!(
            text,
            "Window Size: (300 x 600)\nCell 1,1: (103, 249)\nCell 2,1: (-4, 249)\n"
        );
        assert_eq!(FinalOffsetRecord::parse(&text), record);
    }

    #[test]
    fn test_final_parse_skips_relative_lines() {
        let record = FinalOffsetRecord::parse("Cell 1,1: Relative (1, 2)\nCell 1,1: (5, 6)\n");
        assert_eq!(record.cells, vec![CalibratedCell { col: 1, row: 1, x: 5, y: 6 }]);
    }
}
