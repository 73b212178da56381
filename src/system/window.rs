//! Active window class via xdotool (X11)

use anyhow::{Context, Result};
use log::info;
use std::time::Duration;

use super::{has_tool, run_tool, DisplayServer};
use crate::conversion::WindowInspector;

const XDOTOOL_TIMEOUT: Duration = Duration::from_millis(300);

pub struct XdotoolWindow;

impl XdotoolWindow {
    /// Available only on X11 sessions with xdotool installed
    pub fn detect(display: DisplayServer) -> Option<Self> {
        if display != DisplayServer::X11 || !has_tool("xdotool") {
            return None;
        }
        info!("Window classes via xdotool");
        Some(Self)
    }
}

impl WindowInspector for XdotoolWindow {
    fn active_window_class(&self) -> Result<Option<String>> {
        let output = run_tool(
            "xdotool",
            &["getactivewindow", "getwindowclassname"],
            None,
            true,
            XDOTOOL_TIMEOUT,
        )
        .context("xdotool query failed")?;
        Ok(parse_class(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn parse_class(output: &str) -> Option<String> {
    let class = output.trim();
    (!class.is_empty()).then(|| class.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_class() {
        assert_eq!(parse_class("firefox\n"), Some("firefox".to_string()));
        assert_eq!(parse_class("  \n"), None);
    }

    #[test]
    fn test_not_detected_on_wayland() {
        assert!(XdotoolWindow::detect(DisplayServer::Wayland).is_none());
    }
}
