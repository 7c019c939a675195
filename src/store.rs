//! Screenshot directory and calibration file storage

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::error::{CalibrationError, CalibrationResult};
use crate::records::{FinalOffsetRecord, OffsetRecord};

/// A screenshot file in the store
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScreenshotEntry {
    pub name: String,
    #[serde(skip)]
    pub path: PathBuf,
    /// Modification time, milliseconds since the Unix epoch
    pub modified_ms: u64,
}

/// Directory of captured screenshots
#[derive(Debug, Clone)]
pub struct ScreenshotStore {
    dir: PathBuf,
}

impl ScreenshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// PNG files, newest first. An unreadable directory lists as empty.
    pub fn list(&self) -> Vec<ScreenshotEntry> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to read screenshot directory {:?}: {}", self.dir, e);
                return Vec::new();
            }
        };

        let mut shots: Vec<ScreenshotEntry> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !name.to_lowercase().ends_with(".png") {
                    return None;
                }
                let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
                Some(ScreenshotEntry {
                    name,
                    path: entry.path(),
                    modified_ms: to_millis(modified),
                })
            })
            .collect();

        shots.sort_by(|a, b| b.modified_ms.cmp(&a.modified_ms).then_with(|| b.name.cmp(&a.name)));
        shots
    }

    /// Resolve a bare file name inside the store
    pub fn resolve(&self, name: &str) -> CalibrationResult<PathBuf> {
        let plain = !name.is_empty()
            && !name.contains(['/', '\\'])
            && name != "."
            && name != "..";
        if !plain {
            return Err(CalibrationError::Image(format!("invalid screenshot name {name:?}")));
        }
        let path = self.dir.join(name);
        if !path.is_file() {
            return Err(CalibrationError::Image(format!("screenshot {name} not found")));
        }
        Ok(path)
    }

    /// Fresh timestamped path for a new capture
    pub fn next_capture_path(&self) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        self.dir.join(format!("screenshot_{stamp}.png"))
    }
}

fn to_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Replace `path` with `text` in one step: write a sibling temp file, then
/// rename it over the target.
pub fn write_text_atomic(path: &Path, text: &str) -> CalibrationResult<()> {
    let persist_err = |e: std::io::Error| CalibrationError::Persistence(format!("{}: {e}", path.display()));

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(persist_err)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    if let Err(e) = std::fs::write(&tmp, text) {
        let _ = std::fs::remove_file(&tmp);
        return Err(persist_err(e));
    }
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        persist_err(e)
    })?;

    debug!("Wrote {} bytes to {:?}", text.len(), path);
    Ok(())
}

/// The well-known calibration files
#[derive(Debug, Clone)]
pub struct CalibrationFiles {
    pub offsets: PathBuf,
    pub grid_screenshot: PathBuf,
    pub calibrated: PathBuf,
}

impl CalibrationFiles {
    pub fn from_config(storage: &StorageConfig) -> Self {
        Self {
            offsets: storage.offsets_path(),
            grid_screenshot: storage.grid_screenshot_path(),
            calibrated: storage.calibrated_path(),
        }
    }

    pub fn write_grid_log(&self, text: &str) -> CalibrationResult<()> {
        write_text_atomic(&self.offsets, text)?;
        info!("Saved grid offsets to {:?}", self.offsets);
        Ok(())
    }

    /// Read and parse the grid-pass log. Validation is left to the caller.
    pub fn read_offsets(&self) -> CalibrationResult<OffsetRecord> {
        let text = std::fs::read_to_string(&self.offsets).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CalibrationError::NoCalibrationLoaded
            } else {
                CalibrationError::Persistence(format!("{}: {e}", self.offsets.display()))
            }
        })?;
        Ok(OffsetRecord::parse(&text))
    }

    pub fn write_calibrated(&self, record: &FinalOffsetRecord) -> CalibrationResult<()> {
        write_text_atomic(&self.calibrated, &record.to_text())?;
        info!("Saved calibrated offsets to {:?}", self.calibrated);
        Ok(())
    }

    /// Last committed table, if one exists
    pub fn read_calibrated(&self) -> Option<FinalOffsetRecord> {
        std::fs::read_to_string(&self.calibrated)
            .ok()
            .map(|text| FinalOffsetRecord::parse(&text))
    }
}
