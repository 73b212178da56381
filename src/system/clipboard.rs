//! Clipboard and selection through wl-clipboard / xclip
//!
//! Reads and writes go through the command line tools; pasting and
//! selection growing are keystrokes on the virtual keyboard.

use anyhow::Result;
use log::{debug, info};
use std::time::Duration;

use super::{has_tool, run_tool, DisplayServer};
use crate::conversion::selection::{SelectionError, SelectionKeys, SelectionService};
use crate::input::keycodes::{KEY_LEFT, KEY_LEFTCTRL, KEY_LEFTSHIFT, KEY_V};
use crate::input::SharedKeySink;

/// Time allowed for clipboard reads/writes
const CLIPBOARD_TIMEOUT: Duration = Duration::from_secs(1);

/// Which tool family to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardTool {
    WlClipboard,
    Xclip,
}

impl ClipboardTool {
    /// Pick the tool for this session, if installed
    pub fn detect(display: DisplayServer) -> Option<Self> {
        match display {
            DisplayServer::Wayland if has_tool("wl-paste") && has_tool("wl-copy") => {
                Some(ClipboardTool::WlClipboard)
            }
            // XWayland sessions can still fall back to xclip
            DisplayServer::Wayland | DisplayServer::X11 if has_tool("xclip") => {
                Some(ClipboardTool::Xclip)
            }
            _ => None,
        }
    }

    fn read_command(self, primary: bool) -> (&'static str, Vec<&'static str>) {
        match (self, primary) {
            (ClipboardTool::WlClipboard, true) => ("wl-paste", vec!["--primary", "--no-newline"]),
            (ClipboardTool::WlClipboard, false) => ("wl-paste", vec!["--no-newline"]),
            (ClipboardTool::Xclip, true) => ("xclip", vec!["-o", "-selection", "primary"]),
            (ClipboardTool::Xclip, false) => ("xclip", vec!["-o", "-selection", "clipboard"]),
        }
    }

    fn write_command(self) -> (&'static str, Vec<&'static str>) {
        match self {
            ClipboardTool::WlClipboard => ("wl-copy", vec![]),
            ClipboardTool::Xclip => ("xclip", vec!["-i", "-selection", "clipboard"]),
        }
    }
}

/// Selection service backed by clipboard tools and the virtual keyboard
pub struct CommandClipboard {
    tool: ClipboardTool,
    keys: SharedKeySink,
}

impl CommandClipboard {
    pub fn new(tool: ClipboardTool, keys: SharedKeySink) -> Self {
        info!("Clipboard access via {:?}", tool);
        Self { tool, keys }
    }

    fn read(&self, primary: bool, timeout: Duration) -> Result<String, SelectionError> {
        let (tool, args) = self.tool.read_command(primary);
        match run_tool(tool, &args, None, true, timeout) {
            Ok(output) => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
            // Empty selections make wl-paste / xclip exit non-zero
            Err(SelectionError::Command { message, .. }) => {
                debug!("{} reported: {}", tool, message);
                Ok(String::new())
            }
            Err(e) => Err(e),
        }
    }
}

impl SelectionService for CommandClipboard {
    fn primary_selection(&mut self, timeout: Duration) -> Result<String, SelectionError> {
        self.read(true, timeout)
    }

    fn clipboard(&mut self) -> Result<String, SelectionError> {
        self.read(false, CLIPBOARD_TIMEOUT)
    }

    fn set_clipboard(&mut self, text: &str) -> Result<(), SelectionError> {
        let (tool, args) = self.tool.write_command();
        run_tool(tool, &args, Some(text), false, CLIPBOARD_TIMEOUT)?;
        Ok(())
    }

    fn paste_clipboard(&mut self) -> Result<(), SelectionError> {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        keys.chord(&[KEY_LEFTCTRL, KEY_V])
            .map_err(|e| SelectionError::Paste(e.to_string()))
    }
}

/// Stand-in when no clipboard tool is installed: every read is empty
pub struct NoClipboard;

impl SelectionService for NoClipboard {
    fn primary_selection(&mut self, _timeout: Duration) -> Result<String, SelectionError> {
        Ok(String::new())
    }

    fn clipboard(&mut self) -> Result<String, SelectionError> {
        Err(SelectionError::NoTool)
    }

    fn set_clipboard(&mut self, _text: &str) -> Result<(), SelectionError> {
        Err(SelectionError::NoTool)
    }

    fn paste_clipboard(&mut self) -> Result<(), SelectionError> {
        Err(SelectionError::NoTool)
    }
}

/// Shift+Left / Ctrl+Shift+Left on the virtual keyboard
pub struct KeyboardSelection {
    keys: SharedKeySink,
}

impl KeyboardSelection {
    pub fn new(keys: SharedKeySink) -> Self {
        Self { keys }
    }
}

impl SelectionKeys for KeyboardSelection {
    fn extend_left(&mut self) -> Result<()> {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        keys.chord(&[KEY_LEFTSHIFT, KEY_LEFT])
    }

    fn extend_word_left(&mut self) -> Result<()> {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        keys.chord(&[KEY_LEFTCTRL, KEY_LEFTSHIFT, KEY_LEFT])
    }
}
