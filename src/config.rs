//! Configuration management for MirrorGrid

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CalibrationError, CalibrationResult};

/// The sampling grid laid over the mirrored window.
///
/// Columns are spread evenly across the full window width. Rows are spread
/// across the vertical band between `start_fraction` and `end_fraction` of
/// the window height.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GridSpec {
    pub rows: u32,
    pub cols: u32,
    pub start_fraction: f64,
    pub end_fraction: f64,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            rows: 3,
            cols: 3,
            start_fraction: 0.15,
            end_fraction: 0.85,
        }
    }
}

impl GridSpec {
    /// Check `rows/cols > 0` and `0 <= start < end <= 1`
    pub fn validate(&self) -> CalibrationResult<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(CalibrationError::InvalidGrid(format!(
                "grid must have at least one row and column (got {}x{})",
                self.cols, self.rows
            )));
        }
        let ordered = 0.0 <= self.start_fraction
            && self.start_fraction < self.end_fraction
            && self.end_fraction <= 1.0;
        if !ordered {
            return Err(CalibrationError::InvalidGrid(format!(
                "fractions must satisfy 0 <= start < end <= 1 (got {} .. {})",
                self.start_fraction, self.end_fraction
            )));
        }
        Ok(())
    }

    pub fn cell_count(&self) -> usize {
        (self.rows * self.cols) as usize
    }
}

/// External automation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Name of the process owning the mirrored window
    pub process_name: String,
    /// Command-line click tool, invoked as `<tool> c:<x>,<y>`
    pub click_command: String,
    /// How many times each grid cell is clicked
    pub click_repeat: u32,
    /// Settle delay between grid cells
    pub cell_delay_ms: u64,
    /// Upper bound on any single external command
    pub command_timeout_ms: u64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            process_name: "iPhone Mirroring".to_string(),
            click_command: "/opt/homebrew/bin/cliclick".to_string(),
            click_repeat: 4,
            cell_delay_ms: 300,
            command_timeout_ms: 10_000,
        }
    }
}

/// Where screenshots and calibration files live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub screenshot_dir: PathBuf,
    pub calibration_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            screenshot_dir: PathBuf::from("apppages"),
            calibration_dir: PathBuf::from("calibration"),
        }
    }
}

impl StorageConfig {
    /// Grid-pass output (relative offsets)
    pub fn offsets_path(&self) -> PathBuf {
        self.calibration_dir.join("grid_offsets.txt")
    }

    /// Screenshot captured at the end of the grid pass
    pub fn grid_screenshot_path(&self) -> PathBuf {
        self.calibration_dir.join("grid_screenshot.png")
    }

    /// Committed absolute coordinates
    pub fn calibrated_path(&self) -> PathBuf {
        self.calibration_dir.join("calibrated_offsets.txt")
    }

    /// Create both directories if they don't exist yet
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.screenshot_dir, &self.calibration_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {:?}", dir))?;
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8092,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub grid: GridSpec,

    #[serde(default)]
    pub automation: AutomationConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from a file, or create default if it doesn't exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            let config = Config::default();
            config.save(path)?;
            tracing::info!("Created default configuration at {:?}", path);
            config
        };

        config
            .grid
            .validate()
            .with_context(|| format!("Invalid [grid] section in {:?}", path))?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory {:?}", parent))?;
            }
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grid_is_valid() {
        let grid = GridSpec::default();
        assert!(grid.validate().is_ok());
        assert_eq!(grid.cell_count(), 9);
    }

    #[test]
    fn test_grid_rejects_inverted_band() {
        let grid = GridSpec {
            start_fraction: 0.9,
            end_fraction: 0.1,
            ..GridSpec::default()
        };
        assert!(matches!(grid.validate(), Err(CalibrationError::InvalidGrid(_))));

        let grid = GridSpec {
            end_fraction: 1.2,
            ..GridSpec::default()
        };
        assert!(grid.validate().is_err());
    }

    #[test]
    fn test_grid_rejects_empty() {
        let grid = GridSpec {
            rows: 0,
            ..GridSpec::default()
        };
        assert!(grid.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[server]\nhost = \"0.0.0.0\"\nport = 9000\n").unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.automation.click_repeat, 4);
        assert_eq!(config.grid, GridSpec::default());
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirrorgrid.toml");
        let config = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.storage.offsets_path(), PathBuf::from("calibration/grid_offsets.txt"));

        let again = Config::load_or_create(&path).unwrap();
        assert_eq!(again.grid, config.grid);
    }

    #[test]
    fn test_load_rejects_bad_grid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(
            &path,
            "[grid]\nrows = 3\ncols = 3\nstart_fraction = 0.5\nend_fraction = 0.5\n",
        )
        .unwrap();
        assert!(Config::load_or_create(&path).is_err());
    }
}
