//! Input handling
//!
//! Read keystrokes from physical devices and write synthetic ones.
//! - Device discovery, filtering and readiness multiplexing (evdev)
//! - Hotplug tracking via udev
//! - Typed-word buffering and the key event state machine
//! - Watching for the desktop's layout switch combo
//! - uinput virtual keyboard for replay

pub mod buffer;
pub mod combo;
pub mod device;
pub mod event;
#[cfg(target_os = "linux")]
pub mod hotplug;
pub mod interpreter;
pub mod keycodes;
pub mod virtual_keyboard;

pub use buffer::InputBuffer;
pub use device::{DeviceManager, EvdevBackend};
pub use event::{KeyValue, RawEvent};
pub use interpreter::{EventInterpreter, Intent, InterpreterConfig, TriggerKeys};
pub use virtual_keyboard::{KeySink, SharedKeySink, VirtualKeyboard};
