//! Input device management
//!
//! Enumerates /dev/input/event*, keeps the keyboards and pointers worth
//! watching, and multiplexes their readiness with a single poll(2).
//! Devices come and go at runtime (see `hotplug`), so the registry is
//! shared behind a mutex that is never held across the poll wait.

use bitflags::bitflags;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

use super::event::{DeviceId, EventKind, RawEvent};
use crate::constants::{DEFAULT_DEVICE_EXCLUDES, EVENT_NODE_PREFIX, INPUT_DIR};

bitflags! {
    /// What a device can produce
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        /// Emits EV_KEY events
        const KEY = 1 << 0;
        /// Has a KEY_A (a real keyboard)
        const LETTER_KEYS = 1 << 1;
        /// Has BTN_LEFT or BTN_RIGHT (a pointer)
        const POINTER_BUTTONS = 1 << 2;
    }
}

/// Device access errors
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Cannot open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot scan {path:?}: {source}")]
    Enumerate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A tracked device as seen by the rest of the program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub path: PathBuf,
    pub capabilities: Capabilities,
    pub name: String,
}

/// An opened input device
pub trait InputDevice: Send {
    fn name(&self) -> String;
    fn capabilities(&self) -> Capabilities;
    /// File descriptor to wait on
    fn raw_fd(&self) -> RawFd;
    /// Drain pending events without blocking.
    ///
    /// The returned events carry device id 0; the manager stamps the real id.
    fn read_events(&mut self) -> io::Result<Vec<RawEvent>>;
}

/// Source of input devices
pub trait DeviceBackend: Send + Sync {
    /// Candidate device node paths
    fn enumerate(&self) -> Result<Vec<PathBuf>, DeviceError>;
    fn open(&self, path: &Path) -> Result<Box<dyn InputDevice>, DeviceError>;
}

/// Check whether a device should be monitored.
///
/// Keyboards and pointers qualify; anything whose name matches an exclusion
/// fragment never does, so our own uinput keyboard is not read back.
pub fn is_eligible(name: &str, capabilities: Capabilities, excludes: &[String]) -> bool {
    if !capabilities.contains(Capabilities::KEY) {
        return false;
    }
    if !capabilities.intersects(Capabilities::LETTER_KEYS | Capabilities::POINTER_BUTTONS) {
        return false;
    }
    let lower = name.to_lowercase();
    !excludes.iter().any(|fragment| lower.contains(fragment.as_str()))
}

// ============================================================================
// evdev backend
// ============================================================================

/// Real devices under /dev/input
pub struct EvdevBackend {
    dir: PathBuf,
}

impl EvdevBackend {
    pub fn new() -> Self {
        Self {
            dir: PathBuf::from(INPUT_DIR),
        }
    }
}

impl Default for EvdevBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBackend for EvdevBackend {
    fn enumerate(&self) -> Result<Vec<PathBuf>, DeviceError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|source| DeviceError::Enumerate {
            path: self.dir.clone(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| is_event_node(path))
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn InputDevice>, DeviceError> {
        let open_err = |source| DeviceError::Open {
            path: path.to_path_buf(),
            source,
        };

        let device = evdev::Device::open(path).map_err(open_err)?;

        // Set fd to non-blocking
        let fd = device.as_raw_fd();
        let flags = nix::fcntl::fcntl(fd, nix::fcntl::FcntlArg::F_GETFL)
            .map_err(|e| open_err(io::Error::from(e)))?;
        let mut flags = nix::fcntl::OFlag::from_bits_truncate(flags);
        flags.insert(nix::fcntl::OFlag::O_NONBLOCK);
        nix::fcntl::fcntl(fd, nix::fcntl::FcntlArg::F_SETFL(flags))
            .map_err(|e| open_err(io::Error::from(e)))?;

        Ok(Box::new(EvdevDevice { device }))
    }
}

/// Check if a path names an evdev node (/dev/input/eventN)
pub fn is_event_node(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(EVENT_NODE_PREFIX))
        .unwrap_or(false)
}

struct EvdevDevice {
    device: evdev::Device,
}

impl InputDevice for EvdevDevice {
    fn name(&self) -> String {
        self.device.name().unwrap_or("").to_string()
    }

    fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::empty();
        if self.device.supported_events().contains(evdev::EventType::KEY) {
            caps |= Capabilities::KEY;
        }
        if let Some(keys) = self.device.supported_keys() {
            if keys.contains(evdev::Key::KEY_A) {
                caps |= Capabilities::LETTER_KEYS;
            }
            if keys.contains(evdev::Key::BTN_LEFT) || keys.contains(evdev::Key::BTN_RIGHT) {
                caps |= Capabilities::POINTER_BUTTONS;
            }
        }
        caps
    }

    fn raw_fd(&self) -> RawFd {
        self.device.as_raw_fd()
    }

    fn read_events(&mut self) -> io::Result<Vec<RawEvent>> {
        match self.device.fetch_events() {
            Ok(events) => Ok(events
                .map(|ev| RawEvent {
                    device_id: 0,
                    kind: if ev.event_type() == evdev::EventType::KEY {
                        EventKind::Key
                    } else {
                        EventKind::Other
                    },
                    code: ev.code(),
                    value: ev.value(),
                    timestamp: ev.timestamp(),
                })
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// DeviceManager
// ============================================================================

struct TrackedDevice {
    record: DeviceRecord,
    fd: RawFd,
    device: Mutex<Box<dyn InputDevice>>,
}

#[derive(Default)]
struct Registry {
    devices: HashMap<PathBuf, Arc<TrackedDevice>>,
    next_id: DeviceId,
}

/// Owner of every monitored device
pub struct DeviceManager {
    backend: Box<dyn DeviceBackend>,
    /// Lowercase name fragments that disqualify a device
    excludes: Vec<String>,
    registry: Mutex<Registry>,
}

impl DeviceManager {
    /// Create a manager; `extra_excludes` extend the built-in exclusion list
    pub fn new(backend: Box<dyn DeviceBackend>, extra_excludes: &[String]) -> Self {
        let excludes = DEFAULT_DEVICE_EXCLUDES
            .iter()
            .map(|s| s.to_string())
            .chain(extra_excludes.iter().cloned())
            .map(|s| s.to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            backend,
            excludes,
            registry: Mutex::new(Registry {
                devices: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // A panic while holding the lock leaves the map itself consistent
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add every eligible device currently present. Returns how many were added.
    pub fn scan(&self) -> usize {
        let paths = match self.backend.enumerate() {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Device scan failed: {}", e);
                return 0;
            }
        };

        let added = paths.iter().filter(|path| self.add(path)).count();
        info!("Device scan: {} devices added ({} tracked)", added, self.len());
        added
    }

    /// Start monitoring `path`. Returns false if already tracked, unopenable or ineligible.
    pub fn add(&self, path: &Path) -> bool {
        if self.registry().devices.contains_key(path) {
            return false;
        }

        // Open outside the lock: this may block on a slow node
        let device = match self.backend.open(path) {
            Ok(device) => device,
            Err(e) => {
                warn!("{}", e);
                return false;
            }
        };

        let name = device.name();
        let capabilities = device.capabilities();
        if !is_eligible(&name, capabilities, &self.excludes) {
            debug!("Ignoring input device {:?} ({:?}, {:?})", path, name, capabilities);
            return false;
        }

        let mut registry = self.registry();
        if registry.devices.contains_key(path) {
            return false;
        }
        let id = registry.next_id;
        registry.next_id += 1;

        info!("Input device added: {:?} '{}' (id={})", path, name, id);
        let fd = device.raw_fd();
        registry.devices.insert(
            path.to_path_buf(),
            Arc::new(TrackedDevice {
                record: DeviceRecord {
                    id,
                    path: path.to_path_buf(),
                    capabilities,
                    name,
                },
                fd,
                device: Mutex::new(device),
            }),
        );
        true
    }

    /// Stop monitoring `path`. Returns false if it was not tracked.
    pub fn remove(&self, path: &Path) -> bool {
        match self.registry().devices.remove(path) {
            Some(tracked) => {
                info!(
                    "Input device removed: {:?} '{}'",
                    path, tracked.record.name
                );
                true
            }
            None => false,
        }
    }

    /// Wait up to `timeout` for events from any tracked device.
    ///
    /// A device that fails to read is dropped; the others still deliver.
    pub fn poll(&self, timeout: Duration) -> Vec<RawEvent> {
        // Snapshot under the lock; the Arcs keep fds open during the wait
        let tracked: Vec<Arc<TrackedDevice>> = self.registry().devices.values().cloned().collect();

        if tracked.is_empty() {
            std::thread::sleep(timeout);
            return Vec::new();
        }

        let mut fds: Vec<libc::pollfd> = tracked
            .iter()
            .map(|t| libc::pollfd {
                fd: t.fd,
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();

        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
        let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                warn!("poll failed: {}", err);
            }
            return Vec::new();
        }
        if ret == 0 {
            return Vec::new();
        }

        let mut events = Vec::new();
        for (pfd, t) in fds.iter().zip(&tracked) {
            if pfd.revents == 0 {
                continue;
            }

            if pfd.revents & libc::POLLIN != 0 {
                let result = t
                    .device
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .read_events();
                match result {
                    Ok(batch) => {
                        events.extend(batch.into_iter().map(|mut ev| {
                            ev.device_id = t.record.id;
                            ev
                        }));
                        continue;
                    }
                    Err(e) => {
                        warn!("Read error on {:?}: {}", t.record.path, e);
                        self.remove(&t.record.path);
                        continue;
                    }
                }
            }

            if pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
                debug!("Device {:?} hung up", t.record.path);
                self.remove(&t.record.path);
            }
        }

        events
    }

    /// Stop monitoring every device
    pub fn close(&self) {
        let mut registry = self.registry();
        let count = registry.devices.len();
        registry.devices.clear();
        info!("Closed {} input devices", count);
    }

    pub fn len(&self) -> usize {
        self.registry().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.registry().devices.contains_key(path)
    }

    /// Records of all tracked devices, ordered by id
    pub fn records(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<DeviceRecord> = self
            .registry()
            .devices
            .values()
            .map(|t| t.record.clone())
            .collect();
        records.sort_by_key(|r| r.id);
        records
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::constants::VIRTUAL_KEYBOARD_NAME;
    use crate::input::event::KeyValue;
    use std::collections::VecDeque;
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::SystemTime;

    /// Shared handle to a fake device node
    #[derive(Clone)]
    pub struct FakeNode {
        name: String,
        caps: Capabilities,
        queue: Arc<Mutex<VecDeque<RawEvent>>>,
        fail: Arc<AtomicBool>,
        reader: Arc<UnixStream>,
        writer: Arc<UnixStream>,
    }

    impl FakeNode {
        pub fn new(name: &str, caps: Capabilities) -> Self {
            let (reader, writer) = UnixStream::pair().unwrap();
            reader.set_nonblocking(true).unwrap();
            Self {
                name: name.to_string(),
                caps,
                queue: Arc::new(Mutex::new(VecDeque::new())),
                fail: Arc::new(AtomicBool::new(false)),
                reader: Arc::new(reader),
                writer: Arc::new(writer),
            }
        }

        pub fn keyboard(name: &str) -> Self {
            Self::new(name, Capabilities::KEY | Capabilities::LETTER_KEYS)
        }

        pub fn send(&self, code: u16, value: KeyValue) {
            self.queue
                .lock()
                .unwrap()
                .push_back(RawEvent::key(0, code, value, SystemTime::now()));
            (&*self.writer).write_all(&[1]).unwrap();
        }

        pub fn break_reads(&self) {
            self.fail.store(true, Ordering::SeqCst);
            (&*self.writer).write_all(&[1]).unwrap();
        }
    }

    struct FakeDevice(FakeNode);

    impl InputDevice for FakeDevice {
        fn name(&self) -> String {
            self.0.name.clone()
        }

        fn capabilities(&self) -> Capabilities {
            self.0.caps
        }

        fn raw_fd(&self) -> RawFd {
            self.0.reader.as_raw_fd()
        }

        fn read_events(&mut self) -> io::Result<Vec<RawEvent>> {
            let mut sink = [0u8; 64];
            while let Ok(n) = (&*self.0.reader).read(&mut sink) {
                if n == 0 {
                    break;
                }
            }
            if self.0.fail.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::Other, "device unplugged"));
            }
            Ok(self.0.queue.lock().unwrap().drain(..).collect())
        }
    }

    /// Backend over a fixed table of fake nodes. Listed-but-missing paths fail to open.
    #[derive(Default)]
    pub struct FakeBackend {
        nodes: Mutex<Vec<(PathBuf, Option<FakeNode>)>>,
    }

    impl FakeBackend {
        pub fn with(mut self, path: &str, node: FakeNode) -> Self {
            self.nodes.get_mut().unwrap().push((PathBuf::from(path), Some(node)));
            self
        }

        pub fn with_missing(mut self, path: &str) -> Self {
            self.nodes.get_mut().unwrap().push((PathBuf::from(path), None));
            self
        }
    }

    impl DeviceBackend for FakeBackend {
        fn enumerate(&self) -> Result<Vec<PathBuf>, DeviceError> {
            Ok(self.nodes.lock().unwrap().iter().map(|(p, _)| p.clone()).collect())
        }

        fn open(&self, path: &Path) -> Result<Box<dyn InputDevice>, DeviceError> {
            let nodes = self.nodes.lock().unwrap();
            match nodes.iter().find(|(p, _)| p == path) {
                Some((_, Some(node))) => Ok(Box::new(FakeDevice(node.clone()))),
                _ => Err(DeviceError::Open {
                    path: path.to_path_buf(),
                    source: io::Error::from(io::ErrorKind::NotFound),
                }),
            }
        }
    }

    #[test]
    fn test_eligibility() {
        let excludes = vec!["virtual".to_string()];
        let kbd = Capabilities::KEY | Capabilities::LETTER_KEYS;
        let mouse = Capabilities::KEY | Capabilities::POINTER_BUTTONS;

        assert!(is_eligible("AT Translated Set 2 keyboard", kbd, &excludes));
        assert!(is_eligible("Logitech Mouse", mouse, &excludes));
        assert!(!is_eligible("Power Button", Capabilities::KEY, &excludes));
        assert!(!is_eligible("Accelerometer", Capabilities::empty(), &excludes));
        assert!(!is_eligible("Some VIRTUAL keyboard", kbd, &excludes));
    }

    #[test]
    fn test_scan_skips_own_virtual_keyboard() {
        let backend = FakeBackend::default()
            .with("/dev/input/event0", FakeNode::keyboard("AT keyboard"))
            .with(
                "/dev/input/event1",
                FakeNode::new(
                    VIRTUAL_KEYBOARD_NAME,
                    Capabilities::all(),
                ),
            )
            .with(
                "/dev/input/event2",
                FakeNode::new("USB Mouse", Capabilities::KEY | Capabilities::POINTER_BUTTONS),
            )
            .with("/dev/input/event3", FakeNode::new("Lid Switch", Capabilities::empty()));

        let manager = DeviceManager::new(Box::new(backend), &[]);
        assert_eq!(manager.scan(), 2);
        assert!(!manager.contains(Path::new("/dev/input/event1")));
        assert!(manager.contains(Path::new("/dev/input/event0")));
        assert!(manager.contains(Path::new("/dev/input/event2")));
    }

    #[test]
    fn test_extra_excludes_are_case_insensitive() {
        let backend = FakeBackend::default()
            .with("/dev/input/event0", FakeNode::keyboard("Yubico YubiKey"));
        let manager = DeviceManager::new(Box::new(backend), &["YUBIKEY".to_string()]);
        assert_eq!(manager.scan(), 0);
    }

    #[test]
    fn test_add_is_idempotent() {
        let backend = FakeBackend::default().with("/dev/input/event0", FakeNode::keyboard("kbd"));
        let manager = DeviceManager::new(Box::new(backend), &[]);
        let path = Path::new("/dev/input/event0");

        assert!(manager.add(path));
        assert!(!manager.add(path));
        assert_eq!(manager.len(), 1);
        assert!(manager.remove(path));
        assert!(!manager.remove(path));
    }

    #[test]
    fn test_open_failure_does_not_stop_scan() {
        let backend = FakeBackend::default()
            .with_missing("/dev/input/event0")
            .with("/dev/input/event1", FakeNode::keyboard("kbd"));
        let manager = DeviceManager::new(Box::new(backend), &[]);
        assert_eq!(manager.scan(), 1);
    }

    #[test]
    fn test_poll_stamps_device_ids() {
        let kbd = FakeNode::keyboard("kbd");
        let backend = FakeBackend::default().with("/dev/input/event0", kbd.clone());
        let manager = DeviceManager::new(Box::new(backend), &[]);
        manager.scan();
        let id = manager.records()[0].id;

        kbd.send(30, KeyValue::Press);
        kbd.send(30, KeyValue::Release);
        let events = manager.poll(Duration::from_millis(500));

        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.device_id == id && e.code == 30));
    }

    #[test]
    fn test_poll_drops_failing_device_and_keeps_others() {
        let good = FakeNode::keyboard("good");
        let bad = FakeNode::keyboard("bad");
        let backend = FakeBackend::default()
            .with("/dev/input/event0", good.clone())
            .with("/dev/input/event1", bad.clone());
        let manager = DeviceManager::new(Box::new(backend), &[]);
        assert_eq!(manager.scan(), 2);

        good.send(31, KeyValue::Press);
        bad.break_reads();
        let events = manager.poll(Duration::from_millis(500));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].code, 31);
        assert!(!manager.contains(Path::new("/dev/input/event1")));
        assert!(manager.contains(Path::new("/dev/input/event0")));
    }

    #[test]
    fn test_poll_timeout_without_events() {
        let backend = FakeBackend::default().with("/dev/input/event0", FakeNode::keyboard("kbd"));
        let manager = DeviceManager::new(Box::new(backend), &[]);
        manager.scan();
        assert!(manager.poll(Duration::from_millis(20)).is_empty());
    }

    #[test]
    fn test_close_forgets_devices() {
        let backend = FakeBackend::default().with("/dev/input/event0", FakeNode::keyboard("kbd"));
        let manager = DeviceManager::new(Box::new(backend), &[]);
        manager.scan();
        manager.close();
        assert!(manager.is_empty());
    }
}
