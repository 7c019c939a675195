//! Session controller
//!
//! A single worker thread owns the [`ManualCalibrationSession`] and the
//! focused screenshot. Callers talk to it through a [`SessionHandle`]; events
//! are queued on one channel and handled strictly in arrival order, so a
//! cancel can never interleave with a commit.

use image::DynamicImage;
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{CalibrationError, CalibrationResult};
use crate::overlay::{self, Marker};
use crate::records::{FinalOffsetRecord, OffsetRecord};
use crate::scale::{DisplayScale, DisplaySize};
use crate::session::{ManualCalibrationSession, SessionCommand, SessionPhase};
use crate::store::CalibrationFiles;

const QUEUE_DEPTH: usize = 64;

/// What a session command did
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum CommandOutcome {
    Moved { offset_x: i64, offset_y: i64 },
    Committed { record: FinalOffsetRecord, path: PathBuf },
    Cancelled,
}

/// Read-only view of the session for the UI
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub window_size: Option<(u32, u32)>,
    pub cells_loaded: usize,
    pub image: Option<PathBuf>,
    pub image_size: Option<DisplaySize>,
    pub offset: Option<(i64, i64)>,
    pub scale: Option<DisplayScale>,
    pub display: Option<DisplaySize>,
    pub markers: Vec<Marker>,
}

type Reply<T> = oneshot::Sender<CalibrationResult<T>>;

enum SessionEvent {
    LoadRecord(OffsetRecord, Reply<usize>),
    Focus(PathBuf, Reply<DisplaySize>),
    Start(Option<DisplaySize>, Reply<SessionSnapshot>),
    Resize(DisplaySize, Reply<SessionSnapshot>),
    Command(SessionCommand, Reply<CommandOutcome>),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Overlay(Reply<Vec<u8>>),
    FocusedPath(Reply<PathBuf>),
}

struct FocusedImage {
    path: PathBuf,
    image: DynamicImage,
}

struct Controller {
    session: ManualCalibrationSession,
    focused: Option<FocusedImage>,
    files: CalibrationFiles,
}

impl Controller {
    fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::LoadRecord(record, reply) => {
                let count = record.cells.len();
                self.session.load_record(record);
                let _ = reply.send(Ok(count));
            }
            SessionEvent::Focus(path, reply) => {
                let _ = reply.send(self.focus(path));
            }
            SessionEvent::Start(rendered, reply) => {
                let result = self.session.start(rendered).map(|_| ());
                let _ = reply.send(result.map(|_| self.snapshot()));
            }
            SessionEvent::Resize(display, reply) => {
                let result = self.session.resize(display).map(|_| ());
                let _ = reply.send(result.map(|_| self.snapshot()));
            }
            SessionEvent::Command(command, reply) => {
                let _ = reply.send(self.command(command));
            }
            SessionEvent::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            SessionEvent::Overlay(reply) => {
                let _ = reply.send(self.overlay());
            }
            SessionEvent::FocusedPath(reply) => {
                let path = self
                    .focused
                    .as_ref()
                    .map(|f| f.path.clone())
                    .ok_or_else(|| CalibrationError::Image("no image focused".into()));
                let _ = reply.send(path);
            }
        }
    }

    fn focus(&mut self, path: PathBuf) -> CalibrationResult<DisplaySize> {
        let image = image::open(&path)
            .map_err(|e| CalibrationError::Image(format!("{}: {e}", path.display())))?;
        let size = DisplaySize::new(image.width(), image.height());
        info!("Focused {:?}, size {}x{}", path, size.width, size.height);
        self.session.set_image(Some(size));
        self.focused = Some(FocusedImage { path, image });
        Ok(size)
    }

    fn command(&mut self, command: SessionCommand) -> CalibrationResult<CommandOutcome> {
        if let Some(direction) = command.nudge() {
            let (offset_x, offset_y) = self.session.nudge(direction)?;
            return Ok(CommandOutcome::Moved { offset_x, offset_y });
        }

        match command {
            SessionCommand::Commit => {
                let files = &self.files;
                let record = self.session.commit(|record| files.write_calibrated(record))?;
                Ok(CommandOutcome::Committed {
                    record,
                    path: self.files.calibrated.clone(),
                })
            }
            SessionCommand::Cancel => {
                self.session.cancel()?;
                Ok(CommandOutcome::Cancelled)
            }
            _ => Err(CalibrationError::SessionInactive),
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        let state = self.session.state();
        let record = self.session.record();
        SessionSnapshot {
            phase: self.session.phase(),
            window_size: record.map(|r| (r.window_width, r.window_height)),
            cells_loaded: record.map(|r| r.cells.len()).unwrap_or(0),
            image: self.focused.as_ref().map(|f| f.path.clone()),
            image_size: self.session.image_size(),
            offset: state.map(|s| (s.offset_x, s.offset_y)),
            scale: state.map(|s| s.scale),
            display: state.map(|s| s.display),
            markers: self.session.markers(),
        }
    }

    fn overlay(&self) -> CalibrationResult<Vec<u8>> {
        let state = self.session.state().ok_or(CalibrationError::SessionInactive)?;
        let focused = self.focused.as_ref().ok_or(CalibrationError::NoCalibrationLoaded)?;
        overlay::overlay_png(&focused.image, state.display, &self.session.markers())
    }
}

/// Cloneable sender side of the controller queue
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Start the controller on a dedicated blocking thread
    pub fn spawn(files: CalibrationFiles) -> Self {
        let (tx, mut rx) = mpsc::channel::<SessionEvent>(QUEUE_DEPTH);
        let mut controller = Controller {
            session: ManualCalibrationSession::new(),
            focused: None,
            files,
        };

        tokio::task::spawn_blocking(move || {
            debug!("Session controller started");
            while let Some(event) = rx.blocking_recv() {
                controller.handle(event);
            }
            warn!("Session controller stopped");
        });

        Self { tx }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> SessionEvent,
    ) -> CalibrationResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| CalibrationError::ControllerStopped)?;
        rx.await.map_err(|_| CalibrationError::ControllerStopped)?
    }

    /// Replace the loaded offsets; returns the cell count
    pub async fn load_record(&self, record: OffsetRecord) -> CalibrationResult<usize> {
        self.request(|reply| SessionEvent::LoadRecord(record, reply)).await
    }

    /// Make `path` the displayed image; returns its natural size
    pub async fn focus(&self, path: PathBuf) -> CalibrationResult<DisplaySize> {
        self.request(|reply| SessionEvent::Focus(path, reply)).await
    }

    pub async fn start(&self, rendered: Option<DisplaySize>) -> CalibrationResult<SessionSnapshot> {
        self.request(|reply| SessionEvent::Start(rendered, reply)).await
    }

    pub async fn resize(&self, display: DisplaySize) -> CalibrationResult<SessionSnapshot> {
        self.request(|reply| SessionEvent::Resize(display, reply)).await
    }

    pub async fn command(&self, command: SessionCommand) -> CalibrationResult<CommandOutcome> {
        self.request(|reply| SessionEvent::Command(command, reply)).await
    }

    pub async fn snapshot(&self) -> CalibrationResult<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionEvent::Snapshot(reply))
            .await
            .map_err(|_| CalibrationError::ControllerStopped)?;
        rx.await.map_err(|_| CalibrationError::ControllerStopped)
    }

    pub async fn overlay(&self) -> CalibrationResult<Vec<u8>> {
        self.request(SessionEvent::Overlay).await
    }

    /// Path of the displayed image, without any overlay
    pub async fn focused_path(&self) -> CalibrationResult<PathBuf> {
        self.request(SessionEvent::FocusedPath).await
    }
}
