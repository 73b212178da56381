//! uinput virtual keyboard
//!
//! The only device relayout writes to. Used to backspace over a word,
//! replay buffered key events, extend selections and press shortcuts.
//! Its name is on the device exclusion list so we never read our own output.

use anyhow::{Context, Result};
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key};
use log::info;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::event::KeyValue;
use crate::constants::VIRTUAL_KEYBOARD_NAME;

/// Highest key code registered on the virtual device
const MAX_KEY_CODE: u16 = 248;

/// Destination for synthetic key events
pub trait KeySink: Send {
    /// Queue a key event
    fn write_key(&mut self, code: u16, value: KeyValue) -> Result<()>;
    /// Flush queued events as one report
    fn sync(&mut self) -> Result<()>;
    /// Pause between keystrokes so applications keep up
    fn pause(&mut self) {}

    /// Press and release one key
    fn tap(&mut self, code: u16) -> Result<()> {
        self.write_key(code, KeyValue::Press)?;
        self.sync()?;
        self.pause();
        self.write_key(code, KeyValue::Release)?;
        self.sync()?;
        self.pause();
        Ok(())
    }

    /// Press keys in order, then release them in reverse order
    fn chord(&mut self, codes: &[u16]) -> Result<()> {
        for &code in codes {
            self.write_key(code, KeyValue::Press)?;
            self.sync()?;
        }
        self.pause();
        for &code in codes.iter().rev() {
            self.write_key(code, KeyValue::Release)?;
            self.sync()?;
        }
        self.pause();
        Ok(())
    }
}

/// Key sink shared between the engine and the adapters that press shortcuts
pub type SharedKeySink = Arc<Mutex<dyn KeySink>>;

/// uinput-backed keyboard
pub struct VirtualKeyboard {
    device: VirtualDevice,
    pending: Vec<InputEvent>,
    key_delay: Duration,
}

impl VirtualKeyboard {
    /// Create the uinput device (needs write access to /dev/uinput)
    pub fn create(key_delay: Duration) -> Result<Self> {
        let mut keys = AttributeSet::<Key>::new();
        for code in 1..=MAX_KEY_CODE {
            keys.insert(Key::new(code));
        }

        let device = VirtualDeviceBuilder::new()
            .context("Cannot open /dev/uinput")?
            .name(VIRTUAL_KEYBOARD_NAME)
            .with_keys(&keys)
            .context("Failed to register virtual keyboard keys")?
            .build()
            .context("Failed to create virtual keyboard")?;

        info!("Virtual keyboard created: '{}'", VIRTUAL_KEYBOARD_NAME);

        Ok(Self {
            device,
            pending: Vec::new(),
            key_delay,
        })
    }

    pub fn shared(self) -> SharedKeySink {
        Arc::new(Mutex::new(self))
    }
}

impl KeySink for VirtualKeyboard {
    fn write_key(&mut self, code: u16, value: KeyValue) -> Result<()> {
        self.pending
            .push(InputEvent::new(EventType::KEY, code, value.as_raw()));
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        // emit() appends the SYN_REPORT
        let result = self.device.emit(&self.pending);
        self.pending.clear();
        result.context("Failed to write to virtual keyboard")
    }

    fn pause(&mut self) {
        if !self.key_delay.is_zero() {
            std::thread::sleep(self.key_delay);
        }
    }
}
