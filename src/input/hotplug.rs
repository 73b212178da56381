//! Input device hotplug detection
//!
//! Monitors udev events for the input subsystem (keyboard/mouse plug/unplug)
//! and feeds them into the DeviceManager from a background thread.
//! Hotplug is best-effort: if udev is unavailable, only devices present at
//! startup are monitored.

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use super::device::{is_event_node, DeviceManager};
use crate::constants::WORKER_TICK_MS;
use crate::worker::{BackgroundWorker, StopFlag};

/// Hotplug event types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotplugEvent {
    /// A device node appeared
    Added(PathBuf),
    /// A device node went away
    Removed(PathBuf),
}

/// Map a udev action on a device node to a hotplug event.
///
/// Only /dev/input/eventN nodes matter; other actions (change, bind) are ignored.
pub fn classify(action: &str, devnode: Option<&Path>) -> Option<HotplugEvent> {
    let node = devnode.filter(|p| is_event_node(p))?;
    match action {
        "add" => Some(HotplugEvent::Added(node.to_path_buf())),
        "remove" => Some(HotplugEvent::Removed(node.to_path_buf())),
        _ => None,
    }
}

/// Apply one hotplug event to the device registry
pub fn apply(devices: &DeviceManager, event: &HotplugEvent, settle: Duration, stop: &StopFlag) {
    match event {
        HotplugEvent::Added(path) => {
            // The node may not be readable yet (udev rules still running)
            if !stop.sleep(settle) {
                return;
            }
            if !devices.add(path) {
                debug!("Hotplugged device {:?} not added", path);
            }
        }
        HotplugEvent::Removed(path) => {
            devices.remove(path);
        }
    }
}

/// udev-based hotplug watcher for input devices
pub struct HotplugWatcher {
    worker: BackgroundWorker,
}

impl HotplugWatcher {
    /// Start watching. Fails if the udev monitor cannot be created.
    pub fn start(devices: Arc<DeviceManager>, settle: Duration) -> Result<Self> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        let worker = BackgroundWorker::spawn("relayout-hotplug", move |stop| {
            let socket = match open_monitor() {
                Ok(socket) => {
                    let _ = ready_tx.send(Ok(()));
                    socket
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            watch(socket, &devices, settle, &stop);
        })?;

        // Wait for the monitor (created on the worker thread)
        match ready_rx.recv_timeout(Duration::from_secs(3)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow!("udev monitor startup timeout")),
        }

        info!("Input hotplug monitor initialized");
        Ok(Self { worker })
    }

    pub fn stop(&mut self) {
        self.worker.stop();
    }
}

fn open_monitor() -> Result<udev::MonitorSocket> {
    udev::MonitorBuilder::new()
        .context("Failed to create udev monitor builder")?
        .match_subsystem("input")
        .context("Failed to match input subsystem")?
        .listen()
        .context("Failed to start udev monitor")
}

fn watch(socket: udev::MonitorSocket, devices: &DeviceManager, settle: Duration, stop: &StopFlag) {
    let mut pfd = libc::pollfd {
        fd: socket.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };

    while !stop.is_set() {
        pfd.revents = 0;
        let ret = unsafe { libc::poll(&mut pfd, 1, WORKER_TICK_MS as libc::c_int) };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            warn!("udev monitor poll failed, hotplug disabled: {}", err);
            return;
        }
        if ret == 0 {
            continue;
        }

        // Iterate over available events (non-blocking due to MonitorSocket)
        for event in socket.iter() {
            let action = event.action().and_then(|a| a.to_str()).unwrap_or("");
            if let Some(hotplug) = classify(action, event.devnode()) {
                debug!("Input hotplug event: {:?}", hotplug);
                apply(devices, &hotplug, settle, stop);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::device::tests::{FakeBackend, FakeNode};

    #[test]
    fn test_classify() {
        let node = Path::new("/dev/input/event7");
        assert_eq!(
            classify("add", Some(node)),
            Some(HotplugEvent::Added(node.to_path_buf()))
        );
        assert_eq!(
            classify("remove", Some(node)),
            Some(HotplugEvent::Removed(node.to_path_buf()))
        );
        assert_eq!(classify("change", Some(node)), None);
        assert_eq!(classify("add", Some(Path::new("/dev/input/mouse0"))), None);
        assert_eq!(classify("add", None), None);
    }

    #[test]
    fn test_apply_add_and_remove() {
        let backend = FakeBackend::default().with("/dev/input/event4", FakeNode::keyboard("kbd"));
        let devices = DeviceManager::new(Box::new(backend), &[]);
        let stop = StopFlag::default();
        let path = PathBuf::from("/dev/input/event4");

        apply(&devices, &HotplugEvent::Added(path.clone()), Duration::from_millis(1), &stop);
        assert!(devices.contains(&path));

        apply(&devices, &HotplugEvent::Removed(path.clone()), Duration::ZERO, &stop);
        assert!(!devices.contains(&path));

        // Removing an unknown device is harmless
        apply(&devices, &HotplugEvent::Removed(path.clone()), Duration::ZERO, &stop);
    }
}
