//! Automated grid pass and plain screenshots
//!
//! Both operations are blocking sequences of automation calls. They run on a
//! worker thread and either complete fully or fail with a single error.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::automation::WindowAutomation;
use crate::config::{AutomationConfig, GridSpec};
use crate::error::{CalibrationError, CalibrationResult};
use crate::grid::{compute_targets, WindowRect};
use crate::records::{grid_log_text, OffsetRecord};
use crate::store::{CalibrationFiles, ScreenshotStore};

/// Click pacing for the grid pass
#[derive(Debug, Clone, Copy)]
pub struct ClickPlan {
    pub repeat: u32,
    pub cell_delay: Duration,
}

impl From<&AutomationConfig> for ClickPlan {
    fn from(config: &AutomationConfig) -> Self {
        Self {
            repeat: config.click_repeat.max(1),
            cell_delay: Duration::from_millis(config.cell_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GridPassOutcome {
    pub window: WindowRect,
    pub record: OffsetRecord,
    pub log_file: PathBuf,
    pub screenshot_file: PathBuf,
}

/// Query the window, click every grid cell, write the offsets log and
/// capture the window.
pub fn run_grid_pass(
    automation: &dyn WindowAutomation,
    spec: &GridSpec,
    plan: ClickPlan,
    files: &CalibrationFiles,
) -> CalibrationResult<GridPassOutcome> {
    let window = automation.window_rect()?;
    if window.width == 0 || window.height == 0 {
        return Err(CalibrationError::InvalidWindowSize {
            width: window.width,
            height: window.height,
        });
    }
    info!(
        "Grid pass on window at ({}, {}) size {}x{}",
        window.x, window.y, window.width, window.height
    );

    let targets = compute_targets(spec, &window);
    for target in &targets {
        for _ in 0..plan.repeat {
            automation.click(target.abs_x, target.abs_y)?;
        }
        debug!(
            "Clicked cell {},{} at ({}, {}) x{}",
            target.cell.col, target.cell.row, target.abs_x, target.abs_y, plan.repeat
        );
        if !plan.cell_delay.is_zero() {
            std::thread::sleep(plan.cell_delay);
        }
    }

    files.write_grid_log(&grid_log_text(&window, &targets))?;
    automation.capture_region(&window, &files.grid_screenshot)?;
    info!("Grid screenshot saved to {:?}", files.grid_screenshot);

    let record = OffsetRecord::new(
        window.width,
        window.height,
        targets.iter().map(|t| t.cell).collect(),
    );

    Ok(GridPassOutcome {
        window,
        record,
        log_file: files.offsets.clone(),
        screenshot_file: files.grid_screenshot.clone(),
    })
}

/// Capture the target window into a new timestamped file in the store
pub fn take_screenshot(
    automation: &dyn WindowAutomation,
    store: &ScreenshotStore,
) -> CalibrationResult<PathBuf> {
    let window = automation.window_rect()?;
    let path = store.next_capture_path();
    std::fs::create_dir_all(store.dir())
        .map_err(|e| CalibrationError::Persistence(format!("{}: {e}", store.dir().display())))?;
    automation.capture_region(&window, &path)?;
    info!("Screenshot saved: {:?}", path);
    Ok(path)
}
