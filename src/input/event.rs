//! Raw input events as captured from evdev devices

use std::time::SystemTime;

/// Identifier assigned to a tracked device by the DeviceManager
pub type DeviceId = u32;

/// Event kind (only key events are interpreted)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Key,
    Other,
}

/// Key state carried in the event value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyValue {
    Release,
    Press,
    Repeat,
}

impl KeyValue {
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Release),
            1 => Some(Self::Press),
            2 => Some(Self::Repeat),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            Self::Release => 0,
            Self::Press => 1,
            Self::Repeat => 2,
        }
    }
}

/// A single input event. Immutable once captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub device_id: DeviceId,
    pub kind: EventKind,
    pub code: u16,
    /// 0=release, 1=press, 2=repeat
    pub value: i32,
    /// Kernel timestamp
    pub timestamp: SystemTime,
}

impl RawEvent {
    pub fn key(device_id: DeviceId, code: u16, value: KeyValue, timestamp: SystemTime) -> Self {
        Self {
            device_id,
            kind: EventKind::Key,
            code,
            value: value.as_raw(),
            timestamp,
        }
    }

    pub fn is_key(&self) -> bool {
        self.kind == EventKind::Key
    }

    pub fn key_value(&self) -> Option<KeyValue> {
        KeyValue::from_raw(self.value)
    }

    pub fn is_press(&self) -> bool {
        self.value == 1
    }

    pub fn is_release(&self) -> bool {
        self.value == 0
    }

    pub fn is_repeat(&self) -> bool {
        self.value == 2
    }
}
