//! System layout switching
//!
//! Switching presses the desktop's layout combo on the virtual keyboard,
//! or runs a configured command. The layout list comes from the config
//! or from `setxkbmap -query`. A poller keeps the list current.

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use super::run_tool;
use crate::input::keycodes;
use crate::input::SharedKeySink;
use crate::layout::{LayoutAdapter, LayoutManager};
use crate::worker::BackgroundWorker;

const SETXKBMAP_TIMEOUT: Duration = Duration::from_millis(500);

/// How to move to the next layout
pub enum SwitchMethod {
    /// Press a key combo (e.g. Super+Space)
    Keys { sink: SharedKeySink, combo: Vec<u16> },
    /// Run a shell command
    Command(String),
}

impl SwitchMethod {
    /// Command wins over keys; an unparsable combo is an error
    pub fn from_config(
        switch_keys: &str,
        switch_command: Option<&str>,
        sink: SharedKeySink,
    ) -> Result<Self> {
        if let Some(command) = switch_command.map(str::trim).filter(|c| !c.is_empty()) {
            return Ok(SwitchMethod::Command(command.to_string()));
        }
        let combo = keycodes::parse_combo(switch_keys)
            .ok_or_else(|| anyhow!("Invalid layout switch keys: '{}'", switch_keys))?;
        Ok(SwitchMethod::Keys { sink, combo })
    }
}

pub struct SystemLayoutAdapter {
    method: SwitchMethod,
    configured: Vec<String>,
}

impl SystemLayoutAdapter {
    pub fn new(method: SwitchMethod, configured: Vec<String>) -> Self {
        Self { method, configured }
    }
}

impl LayoutAdapter for SystemLayoutAdapter {
    fn switch_layout(&self) -> Result<bool> {
        match &self.method {
            SwitchMethod::Keys { sink, combo } => {
                let mut keys = sink.lock().unwrap_or_else(|e| e.into_inner());
                keys.chord(combo)?;
                Ok(true)
            }
            SwitchMethod::Command(command) => {
                let status = Command::new("sh")
                    .arg("-c")
                    .arg(command)
                    .status()
                    .with_context(|| format!("Failed to run '{}'", command))?;
                if !status.success() {
                    debug!("'{}' exited with {}", command, status);
                }
                Ok(status.success())
            }
        }
    }

    fn layouts(&self) -> Result<Vec<String>> {
        if !self.configured.is_empty() {
            return Ok(self.configured.clone());
        }
        query_layouts()
    }
}

/// Layouts configured in the X keyboard map
pub fn query_layouts() -> Result<Vec<String>> {
    let output = run_tool("setxkbmap", &["-query"], None, true, SETXKBMAP_TIMEOUT)
        .context("setxkbmap -query failed")?;
    Ok(parse_setxkbmap(&String::from_utf8_lossy(&output.stdout)))
}

/// Extract the layout list from `setxkbmap -query` output
fn parse_setxkbmap(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("layout:"))
        .flat_map(|value| value.split(','))
        .map(|layout| layout.trim().to_string())
        .filter(|layout| !layout.is_empty())
        .collect()
}

/// Periodically refreshes the layout list
pub struct LayoutPoller {
    worker: BackgroundWorker,
}

impl LayoutPoller {
    pub fn start(layouts: Arc<LayoutManager>, interval: Duration) -> Result<Self> {
        let worker = BackgroundWorker::spawn("relayout-layouts", move |stop| {
            while stop.sleep(interval) {
                if let Err(e) = layouts.refresh() {
                    debug!("Layout refresh failed: {:#}", e);
                }
            }
        })?;
        info!("Layout poller started ({:?})", interval);
        Ok(Self { worker })
    }

    pub fn stop(&mut self) {
        if !self.worker.stop() {
            warn!("Layout poller detached");
        }
    }
}
