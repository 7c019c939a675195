//! Error kinds surfaced by calibration operations

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    /// The external click/capture/geometry call failed
    #[error("Automation failed: {0}")]
    Automation(String),

    #[error("No offsets loaded. Run the grid calibration or load offsets first")]
    NoCalibrationLoaded,

    #[error("Invalid window size ({width} x {height})")]
    InvalidWindowSize { width: u32, height: u32 },

    #[error("Display size {width} x {height} exceeds {max} px per side")]
    InvalidDisplaySize { width: u32, height: u32, max: u32 },

    #[error("Failed to persist calibration: {0}")]
    Persistence(String),

    #[error("No calibration session is active")]
    SessionInactive,

    #[error("Invalid grid configuration: {0}")]
    InvalidGrid(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Calibration controller is not running")]
    ControllerStopped,
}

impl CalibrationError {
    /// Stable identifier used in status lines and API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            CalibrationError::Automation(_) => "automation_failure",
            CalibrationError::NoCalibrationLoaded => "no_calibration_loaded",
            CalibrationError::InvalidWindowSize { .. } => "invalid_window_size",
            CalibrationError::InvalidDisplaySize { .. } => "invalid_display_size",
            CalibrationError::Persistence(_) => "persistence_failure",
            CalibrationError::SessionInactive => "session_inactive",
            CalibrationError::InvalidGrid(_) => "invalid_grid",
            CalibrationError::Image(_) => "image_error",
            CalibrationError::ControllerStopped => "controller_stopped",
        }
    }
}

pub type CalibrationResult<T> = Result<T, CalibrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings() {
        assert_eq!(
            CalibrationError::Automation("boom".into()).kind(),
            "automation_failure"
        );
        assert_eq!(
            CalibrationError::InvalidWindowSize { width: 0, height: 10 }.kind(),
            "invalid_window_size"
        );
        assert_eq!(
            CalibrationError::InvalidDisplaySize { width: 1, height: 1, max: 1 }.kind(),
            "invalid_display_size"
        );
    }

    #[test]
    fn test_automation_message_is_verbatim() {
        let err = CalibrationError::Automation("osascript exited with status 1".into());
        assert!(err.to_string().contains("osascript exited with status 1"));
    }
}
