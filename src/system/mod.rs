//! Desktop adapters
//!
//! Thin wrappers around external tools:
//! - clipboard / primary selection (wl-clipboard or xclip)
//! - active window class (xdotool, X11 only)
//! - layout switching and layout list (key combo, command, setxkbmap)

pub mod clipboard;
pub mod layout;
pub mod window;

use log::debug;
use std::io::Write;
use std::process::{Command, Output, Stdio};
use std::sync::mpsc;
use std::time::Duration;

use crate::conversion::SelectionError;

/// Display server of the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayServer {
    Wayland,
    X11,
    Unknown,
}

impl DisplayServer {
    pub fn detect() -> Self {
        Self::from_env(
            std::env::var_os("WAYLAND_DISPLAY").is_some(),
            std::env::var_os("DISPLAY").is_some(),
        )
    }

    fn from_env(wayland: bool, x11: bool) -> Self {
        if wayland {
            DisplayServer::Wayland
        } else if x11 {
            DisplayServer::X11
        } else {
            DisplayServer::Unknown
        }
    }
}

/// Check if a tool is on PATH
pub fn has_tool(tool: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {} >/dev/null 2>&1", tool))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Run a tool with optional stdin, killing it after `timeout`
pub fn run_tool(
    tool: &str,
    args: &[&str],
    input: Option<&str>,
    capture: bool,
    timeout: Duration,
) -> Result<Output, SelectionError> {
    let mut child = Command::new(tool)
        .args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        // Clipboard owners (xclip -i, wl-copy) fork and keep inherited pipes open
        .stdout(if capture { Stdio::piped() } else { Stdio::null() })
        .stderr(if capture { Stdio::piped() } else { Stdio::null() })
        .spawn()
        .map_err(|e| SelectionError::Spawn {
            tool: tool.to_string(),
            source: e,
        })?;

    if let (Some(text), Some(mut stdin)) = (input, child.stdin.take()) {
        stdin
            .write_all(text.as_bytes())
            .map_err(|e| SelectionError::Spawn {
                tool: tool.to_string(),
                source: e,
            })?;
    }

    let pid = child.id();
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(child.wait_with_output());
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(output)) => {
            if output.status.success() {
                Ok(output)
            } else {
                Err(SelectionError::Command {
                    tool: tool.to_string(),
                    message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                })
            }
        }
        Ok(Err(e)) => Err(SelectionError::Spawn {
            tool: tool.to_string(),
            source: e,
        }),
        Err(_) => {
            debug!("{} timed out, killing pid {}", tool, pid);
            // SAFETY: pid belongs to our own child; a stale pid only yields ESRCH
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGKILL);
            }
            Err(SelectionError::Timeout {
                tool: tool.to_string(),
                timeout,
            })
        }
    }
}
