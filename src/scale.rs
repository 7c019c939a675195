//! Mapping from window-relative pixels to the displayed screenshot

use serde::{Deserialize, Serialize};

use crate::error::{CalibrationError, CalibrationResult};
use crate::grid::GridCell;

/// Largest accepted side of a rendered display, in pixels. The overlay is
/// drawn at the display size, so this bounds its allocation.
pub const MAX_DISPLAY_SIDE: u32 = 16384;

/// Rendered size of the displayed image, in pixels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisplaySize {
    pub width: u32,
    pub height: u32,
}

impl DisplaySize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Independent X/Y scale factors between the captured window and the
/// displayed image
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DisplayScale {
    pub scale_x: f64,
    pub scale_y: f64,
}

impl DisplayScale {
    /// Fails with `InvalidWindowSize` instead of producing infinite factors,
    /// and with `InvalidDisplaySize` when either display side exceeds
    /// [`MAX_DISPLAY_SIDE`].
    pub fn between(window_width: u32, window_height: u32, display: DisplaySize) -> CalibrationResult<Self> {
        if window_width == 0 || window_height == 0 {
            return Err(CalibrationError::InvalidWindowSize {
                width: window_width,
                height: window_height,
            });
        }
        if display.width > MAX_DISPLAY_SIDE || display.height > MAX_DISPLAY_SIDE {
            return Err(CalibrationError::InvalidDisplaySize {
                width: display.width,
                height: display.height,
                max: MAX_DISPLAY_SIDE,
            });
        }
        Ok(Self {
            scale_x: display.width as f64 / window_width as f64,
            scale_y: display.height as f64 / window_height as f64,
        })
    }

    /// Displayed position of a cell, before any manual offset
    #[inline]
    pub fn map_cell(&self, cell: &GridCell) -> (f64, f64) {
        (cell.rel_x as f64 * self.scale_x, cell.rel_y as f64 * self.scale_y)
    }
}
