//! Window geometry, click and capture automation
//!
//! The calibration core only talks to [`WindowAutomation`]. The default
//! backend drives macOS command-line tools: `osascript` for the window
//! rectangle, a `cliclick`-style tool for clicks and `screencapture` for
//! region captures. Every command runs under a hard timeout; a hung tool is
//! killed and reported as an automation failure.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::debug;
use wait_timeout::ChildExt;

use crate::config::AutomationConfig;
use crate::error::{CalibrationError, CalibrationResult};
use crate::grid::WindowRect;

/// Host automation primitives. Implementations must be callable from a
/// blocking worker thread.
pub trait WindowAutomation: Send + Sync {
    /// Bring the target window to the front and report where it is
    fn window_rect(&self) -> CalibrationResult<WindowRect>;

    /// Click once at absolute screen coordinates
    fn click(&self, x: i64, y: i64) -> CalibrationResult<()>;

    /// Capture the given screen region into a PNG at `path`
    fn capture_region(&self, rect: &WindowRect, path: &Path) -> CalibrationResult<()>;
}

const WINDOW_RECT_SCRIPT: &str = r#"on run argv
    tell application "System Events"
        tell process (item 1 of argv)
            set frontmost to true
            set theWindow to UI element 1
            set {winX, winY} to position of theWindow
            set {winW, winH} to size of theWindow
        end tell
    end tell
    return (winX as text) & "," & (winY as text) & "," & (winW as text) & "," & (winH as text)
end run"#;

/// macOS backend built from `osascript`, a click tool and `screencapture`
pub struct MacAutomation {
    process_name: String,
    click_command: String,
    timeout: Duration,
}

impl MacAutomation {
    pub fn new(config: &AutomationConfig) -> Self {
        Self {
            process_name: config.process_name.clone(),
            click_command: config.click_command.clone(),
            timeout: Duration::from_millis(config.command_timeout_ms),
        }
    }
}

impl WindowAutomation for MacAutomation {
    fn window_rect(&self) -> CalibrationResult<WindowRect> {
        let args = vec![
            "-e".to_string(),
            WINDOW_RECT_SCRIPT.to_string(),
            self.process_name.clone(),
        ];
        let stdout = run_command("osascript", &args, self.timeout)?;
        parse_window_rect(&stdout)
    }

    fn click(&self, x: i64, y: i64) -> CalibrationResult<()> {
        run_command(&self.click_command, &[format!("c:{x},{y}")], self.timeout)?;
        Ok(())
    }

    fn capture_region(&self, rect: &WindowRect, path: &Path) -> CalibrationResult<()> {
        let args = vec![
            "-x".to_string(),
            format!("-R{},{},{},{}", rect.x, rect.y, rect.width, rect.height),
            path.to_string_lossy().into_owned(),
        ];
        run_command("screencapture", &args, self.timeout)?;
        if !path.exists() {
            return Err(CalibrationError::Automation(format!(
                "screencapture produced no file at {}",
                path.display()
            )));
        }
        Ok(())
    }
}

/// Run a command to completion within `timeout`, returning trimmed stdout.
/// Any spawn error, timeout or non-zero exit becomes `Automation`.
pub fn run_command(program: &str, args: &[String], timeout: Duration) -> CalibrationResult<String> {
    debug!("Running {} {:?}", program, args);

    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CalibrationError::Automation(format!("failed to start {program}: {e}")))?;

    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CalibrationError::Automation(format!(
                "{program} timed out after {}ms",
                timeout.as_millis()
            )));
        }
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CalibrationError::Automation(format!(
                "failed waiting for {program}: {e}"
            )));
        }
    };

    let mut stdout = String::new();
    let mut stderr = String::new();
    if let Some(mut out) = child.stdout.take() {
        let _ = out.read_to_string(&mut stdout);
    }
    if let Some(mut err) = child.stderr.take() {
        let _ = err.read_to_string(&mut stderr);
    }

    if !status.success() {
        let code = status.code().unwrap_or(-1);
        let stderr = stderr.trim();
        return Err(CalibrationError::Automation(if stderr.is_empty() {
            format!("{program} failed with status {code}")
        } else {
            format!("{program} failed with status {code}: {stderr}")
        }));
    }

    Ok(stdout.trim().to_string())
}

/// Parse `x,y,w,h` as printed by the window query script
pub fn parse_window_rect(raw: &str) -> CalibrationResult<WindowRect> {
    let parts: Vec<&str> = raw.trim().split(',').map(str::trim).collect();
    let bad = || CalibrationError::Automation(format!("unexpected window geometry: {raw:?}"));
    if parts.len() != 4 {
        return Err(bad());
    }

    let x = parts[0].parse::<i32>().map_err(|_| bad())?;
    let y = parts[1].parse::<i32>().map_err(|_| bad())?;
    let width = parts[2].parse::<u32>().map_err(|_| bad())?;
    let height = parts[3].parse::<u32>().map_err(|_| bad())?;
    Ok(WindowRect::new(x, y, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_window_rect() {
        assert_eq!(
            parse_window_rect("812, 33, 344,764\n").unwrap(),
            WindowRect::new(812, 33, 344, 764)
        );
        assert_eq!(
            parse_window_rect("-1440,0,344,764").unwrap(),
            WindowRect::new(-1440, 0, 344, 764)
        );
    }

    #[test]
    fn test_parse_window_rect_rejects_garbage() {
        for raw in ["", "1,2,3", "a,b,c,d", "1,2,-3,4", "1,2,3,4,5"] {
            assert!(matches!(
                parse_window_rect(raw),
                Err(CalibrationError::Automation(_))
            ));
        }
    }

    #[test]
    fn test_missing_program_is_automation_failure() {
        let err = run_command(
            "mirrorgrid-definitely-not-a-real-binary",
            &[],
            Duration::from_millis(500),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "automation_failure");
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_command() {
        let err = run_command("sleep", &["5".to_string()], Duration::from_millis(100)).unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[cfg(unix)]
    #[test]
    fn test_stdout_is_trimmed() {
        let out = run_command("echo", &["  1,2,3,4  ".to_string()], Duration::from_secs(5)).unwrap();
        assert_eq!(out, "1,2,3,4");
    }
}
