//! Manual calibration session
//!
//! The session owns the loaded grid-pass record, the size of the displayed
//! screenshot, and (while active) the uniform pixel offset the user nudges
//! around. Committing turns the scaled, offset cell positions into a
//! [`FinalOffsetRecord`]; cancelling throws everything away. Both return the
//! session to idle.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CalibrationError, CalibrationResult};
use crate::overlay::{self, Marker};
use crate::records::{CalibratedCell, FinalOffsetRecord, OffsetRecord};
use crate::scale::{DisplayScale, DisplaySize};

/// One-pixel nudge direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Nudge {
    Up,
    Down,
    Left,
    Right,
}

impl Nudge {
    /// `(dx, dy)` step in screen orientation (y grows downwards)
    pub fn delta(self) -> (i64, i64) {
        match self {
            Nudge::Up => (0, -1),
            Nudge::Down => (0, 1),
            Nudge::Left => (-1, 0),
            Nudge::Right => (1, 0),
        }
    }
}

/// Commands accepted from the user input surface
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionCommand {
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    Commit,
    Cancel,
}

impl SessionCommand {
    pub fn nudge(self) -> Option<Nudge> {
        match self {
            SessionCommand::MoveUp => Some(Nudge::Up),
            SessionCommand::MoveDown => Some(Nudge::Down),
            SessionCommand::MoveLeft => Some(Nudge::Left),
            SessionCommand::MoveRight => Some(Nudge::Right),
            SessionCommand::Commit | SessionCommand::Cancel => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Active,
}

/// Ephemeral state that only exists while a session is active
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CalibrationSessionState {
    pub offset_x: i64,
    pub offset_y: i64,
    pub scale: DisplayScale,
    pub display: DisplaySize,
}

impl CalibrationSessionState {
    fn new(scale: DisplayScale, display: DisplaySize) -> Self {
        Self {
            offset_x: 0,
            offset_y: 0,
            scale,
            display,
        }
    }
}

/// Rounds halves towards positive infinity, so `-2.5` becomes `-2`. Grid
/// sampling uses `f64::round` instead, which rounds halves away from zero.
#[inline]
fn round_half_up(v: f64) -> i64 {
    (v + 0.5).floor() as i64
}

#[derive(Debug, Default)]
pub struct ManualCalibrationSession {
    record: Option<OffsetRecord>,
    /// Natural size of the displayed screenshot, if one is focused
    image: Option<DisplaySize>,
    state: Option<CalibrationSessionState>,
}

impl ManualCalibrationSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        if self.state.is_some() {
            SessionPhase::Active
        } else {
            SessionPhase::Idle
        }
    }

    pub fn state(&self) -> Option<&CalibrationSessionState> {
        self.state.as_ref()
    }

    pub fn record(&self) -> Option<&OffsetRecord> {
        self.record.as_ref()
    }

    pub fn image_size(&self) -> Option<DisplaySize> {
        self.image
    }

    /// Replace the loaded grid-pass record. Any active session is dropped
    /// since its cells no longer match.
    pub fn load_record(&mut self, record: OffsetRecord) {
        if self.state.take().is_some() {
            info!("Loaded new offsets, discarding active calibration session");
        }
        debug!(
            "Loaded {} cells for window {}x{}",
            record.cells.len(),
            record.window_width,
            record.window_height
        );
        self.record = Some(record);
    }

    /// Set (or clear) the displayed screenshot by its natural pixel size
    pub fn set_image(&mut self, size: Option<DisplaySize>) {
        self.image = size;
    }

    /// Idle -> Active. `rendered` is the on-screen size of the displayed
    /// image; when absent the image's natural size is used. Starting while
    /// already active restarts with a zero offset.
    pub fn start(&mut self, rendered: Option<DisplaySize>) -> CalibrationResult<&CalibrationSessionState> {
        let record = match &self.record {
            Some(r) if !r.cells.is_empty() => r,
            _ => return Err(CalibrationError::NoCalibrationLoaded),
        };
        let natural = self.image.ok_or(CalibrationError::NoCalibrationLoaded)?;
        let size = rendered.unwrap_or(natural);

        let scale = DisplayScale::between(record.window_width, record.window_height, size)?;
        info!(
            "Calibration session started: display {}x{}, scale {:.3}x{:.3}",
            size.width, size.height, scale.scale_x, scale.scale_y
        );

        Ok(&*self.state.insert(CalibrationSessionState::new(scale, size)))
    }

    /// Recompute the scale for a new rendered size, keeping the offset
    pub fn resize(&mut self, size: DisplaySize) -> CalibrationResult<&CalibrationSessionState> {
        let record = self.record.as_ref().ok_or(CalibrationError::NoCalibrationLoaded)?;
        let state = self.state.as_mut().ok_or(CalibrationError::SessionInactive)?;

        state.scale = DisplayScale::between(record.window_width, record.window_height, size)?;
        state.display = size;
        debug!("Display resized to {}x{}", size.width, size.height);
        Ok(&*state)
    }

    /// Shift the uniform offset by one pixel. The offset is unbounded.
    pub fn nudge(&mut self, direction: Nudge) -> CalibrationResult<(i64, i64)> {
        let state = self.state.as_mut().ok_or(CalibrationError::SessionInactive)?;
        let (dx, dy) = direction.delta();
        state.offset_x += dx;
        state.offset_y += dy;
        debug!("Offset now ({}, {})", state.offset_x, state.offset_y);
        Ok((state.offset_x, state.offset_y))
    }

    /// Coordinates that a commit would produce right now
    pub fn final_record(&self) -> CalibrationResult<FinalOffsetRecord> {
        let state = self.state.as_ref().ok_or(CalibrationError::SessionInactive)?;
        let record = self.record.as_ref().ok_or(CalibrationError::NoCalibrationLoaded)?;

        let cells = record
            .cells
            .iter()
            .map(|cell| {
                let (x, y) = state.scale.map_cell(cell);
                CalibratedCell {
                    col: cell.col,
                    row: cell.row,
                    x: round_half_up(x + state.offset_x as f64),
                    y: round_half_up(y + state.offset_y as f64),
                }
            })
            .collect();

        Ok(FinalOffsetRecord {
            window_width: record.window_width,
            window_height: record.window_height,
            cells,
        })
    }

    /// Active -> Idle via commit. `persist` writes the table; if it fails
    /// the session stays active with its offset intact so the user can retry.
    pub fn commit<F>(&mut self, persist: F) -> CalibrationResult<FinalOffsetRecord>
    where
        F: FnOnce(&FinalOffsetRecord) -> CalibrationResult<()>,
    {
        let final_record = self.final_record()?;
        persist(&final_record)?;
        self.state = None;
        info!("Calibration committed ({} cells)", final_record.cells.len());
        Ok(final_record)
    }

    /// Active -> Idle via cancel, discarding the offset
    pub fn cancel(&mut self) -> CalibrationResult<()> {
        match self.state.take() {
            Some(state) => {
                info!(
                    "Calibration cancelled at offset ({}, {})",
                    state.offset_x, state.offset_y
                );
                Ok(())
            }
            None => Err(CalibrationError::SessionInactive),
        }
    }

    /// Current marker positions for the overlay; empty when idle
    pub fn markers(&self) -> Vec<Marker> {
        match (&self.state, &self.record) {
            (Some(state), Some(record)) => overlay::markers(state, &record.cells),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridCell;
    use std::cell::Cell;

    fn loaded_session() -> ManualCalibrationSession {
        let mut session = ManualCalibrationSession::new();
        session.load_record(OffsetRecord::new(
            300,
            600,
            vec![
                GridCell { col: 1, row: 1, rel_x: 50, rel_y: 125 },
                GridCell { col: 2, row: 1, rel_x: 150, rel_y: 125 },
            ],
        ));
        session.set_image(Some(DisplaySize::new(600, 1200)));
        session
    }

    #[test]
    fn test_start_refused_without_cells() {
        let mut session = ManualCalibrationSession::new();
        session.set_image(Some(DisplaySize::new(600, 1200)));
        assert_eq!(
            session.start(None).err(),
            Some(CalibrationError::NoCalibrationLoaded)
        );

        session.load_record(OffsetRecord::new(300, 600, Vec::new()));
        assert_eq!(
            session.start(None).err(),
            Some(CalibrationError::NoCalibrationLoaded)
        );
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_start_refused_without_image() {
        let mut session = loaded_session();
        session.set_image(None);
        assert_eq!(
            session.start(None).err(),
            Some(CalibrationError::NoCalibrationLoaded)
        );
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_start_refused_with_zero_window() {
        let mut session = loaded_session();
        session.load_record(OffsetRecord::new(
            0,
            600,
            vec![GridCell { col: 1, row: 1, rel_x: 1, rel_y: 1 }],
        ));
        assert!(matches!(
            session.start(None),
            Err(CalibrationError::InvalidWindowSize { .. })
        ));
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_nudge_up_then_down_is_identity() {
        let mut session = loaded_session();
        session.start(None).unwrap();
        session.nudge(Nudge::Left).unwrap();
        let before = session.nudge(Nudge::Right).unwrap();
        session.nudge(Nudge::Up).unwrap();
        let after = session.nudge(Nudge::Down).unwrap();
        assert_eq!(before, after);
        assert_eq!(after, (0, 0));
    }

    #[test]
    fn test_nudge_requires_active() {
        let mut session = loaded_session();
        assert_eq!(session.nudge(Nudge::Up), Err(CalibrationError::SessionInactive));
    }

    #[test]
    fn test_commit_scaled_and_offset() {
        let mut session = loaded_session();
        session.start(None).unwrap();
        for _ in 0..3 {
            session.nudge(Nudge::Right).unwrap();
        }
        session.nudge(Nudge::Up).unwrap();

        let written = Cell::new(false);
        let record = session
            .commit(|_| {
                written.set(true);
                Ok(())
            })
            .unwrap();

        assert!(written.get());
        assert_eq!(record.cells[0], CalibratedCell { col: 1, row: 1, x: 103, y: 249 });
        assert_eq!(record.cells[1], CalibratedCell { col: 2, row: 1, x: 303, y: 249 });
        assert_eq!((record.window_width, record.window_height), (300, 600));
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_failed_commit_keeps_state() {
        let mut session = loaded_session();
        session.start(None).unwrap();
        session.nudge(Nudge::Down).unwrap();

        let err = session
            .commit(|_| Err(CalibrationError::Persistence("disk full".into())))
            .unwrap_err();
        assert_eq!(err.kind(), "persistence_failure");
        assert_eq!(session.phase(), SessionPhase::Active);
        assert_eq!(session.state().unwrap().offset_y, 1);

        assert!(session.commit(|_| Ok(())).is_ok());
    }

    #[test]
    fn test_cancel_discards_without_persisting() {
        let mut session = loaded_session();
        session.start(None).unwrap();
        for _ in 0..25 {
            session.nudge(Nudge::Left).unwrap();
        }
        session.cancel().unwrap();
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert!(session.markers().is_empty());
        assert_eq!(session.cancel(), Err(CalibrationError::SessionInactive));

        // A fresh session starts from a zero offset
        let state = session.start(None).unwrap();
        assert_eq!((state.offset_x, state.offset_y), (0, 0));
    }

    #[test]
    fn test_resize_recomputes_scale() {
        let mut session = loaded_session();
        session.start(Some(DisplaySize::new(300, 600))).unwrap();
        session.nudge(Nudge::Right).unwrap();
        let state = session.resize(DisplaySize::new(150, 300)).unwrap();
        assert_eq!(state.scale.scale_x, 0.5);
        assert_eq!(state.offset_x, 1);

        let record = session.final_record().unwrap();
        assert_eq!(record.cells[0].x, 26);
    }

    #[test]
    fn test_oversized_resize_keeps_session() {
        let mut session = loaded_session();
        session.start(None).unwrap();
        session.nudge(Nudge::Up).unwrap();

        let err = session.resize(DisplaySize::new(u32::MAX, u32::MAX)).unwrap_err();
        assert_eq!(err.kind(), "invalid_display_size");
        let state = session.state().unwrap();
        assert_eq!(state.display, DisplaySize::new(600, 1200));
        assert_eq!(state.offset_y, -1);

        assert!(session.start(Some(DisplaySize::new(20000, 10))).is_err());
    }

    #[test]
    fn test_rounding_halves_up() {
        assert_eq!(round_half_up(2.5), 3);
        assert_eq!(round_half_up(-2.5), -2);
        assert_eq!(round_half_up(-2.6), -3);
    }

    #[test]
    fn test_command_names() {
        let cmd: SessionCommand = serde_json::from_str("\"moveLeft\"").unwrap();
        assert_eq!(cmd, SessionCommand::MoveLeft);
        assert_eq!(cmd.nudge(), Some(Nudge::Left));
        assert_eq!(SessionCommand::Commit.nudge(), None);
    }
}
