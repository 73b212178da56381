//! Key-to-text rendering through xkbcommon
//!
//! The buffer records physical keys. What those keys typed on screen depends
//! on the layout that was active, so the text is derived from the system's
//! own keymap for that layout rather than from a fixed table.

use log::{debug, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use xkbcommon::xkb;

use crate::input::buffer::TypedKey;
use crate::input::keycodes::KEY_LEFTSHIFT;

/// evdev keycode -> xkb keycode
const XKB_KEYCODE_OFFSET: u32 = 8;

/// Text a sequence of keys types under a named layout
pub trait KeyRenderer {
    /// None when the layout is unknown or a key types nothing under it
    fn render(&self, layout: &str, keys: &[TypedKey]) -> Option<String>;
}

/// Keymaps compiled on first use, one per layout name.
///
/// Not `Send`: lives with the engine on the main thread.
pub struct XkbKeymaps {
    context: xkb::Context,
    /// A failed compile is cached too
    keymaps: RefCell<HashMap<String, Option<xkb::Keymap>>>,
}

impl XkbKeymaps {
    pub fn new() -> Self {
        Self {
            context: xkb::Context::new(xkb::CONTEXT_NO_FLAGS),
            keymaps: RefCell::new(HashMap::new()),
        }
    }

    fn keymap(&self, layout: &str) -> Option<xkb::Keymap> {
        if let Some(cached) = self.keymaps.borrow().get(layout) {
            return cached.clone();
        }

        let (name, variant) = xkb_names(layout);
        let keymap = xkb::Keymap::new_from_names(
            &self.context,
            "",
            "",
            &name,
            &variant,
            None,
            xkb::COMPILE_NO_FLAGS,
        );
        match &keymap {
            Some(_) => debug!("Compiled xkb keymap for '{}' ({}/{})", layout, name, variant),
            None => warn!("No xkb keymap for layout '{}'", layout),
        }
        self.keymaps
            .borrow_mut()
            .insert(layout.to_string(), keymap.clone());
        keymap
    }
}

impl Default for XkbKeymaps {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyRenderer for XkbKeymaps {
    fn render(&self, layout: &str, keys: &[TypedKey]) -> Option<String> {
        let keymap = self.keymap(layout)?;
        let mut state = xkb::State::new(&keymap);
        let shift = xkb::Keycode::new(KEY_LEFTSHIFT as u32 + XKB_KEYCODE_OFFSET);

        let mut text = String::new();
        for key in keys {
            let keycode = xkb::Keycode::new(key.code as u32 + XKB_KEYCODE_OFFSET);
            if key.shift {
                state.update_key(shift, xkb::KeyDirection::Down);
            }
            let utf8 = state.key_get_utf8(keycode);
            if key.shift {
                state.update_key(shift, xkb::KeyDirection::Up);
            }
            if utf8.is_empty() {
                return None;
            }
            text.push_str(&utf8);
        }
        Some(text)
    }
}

/// Split "us(intl)" / "us:intl" into xkb layout and variant names
fn xkb_names(layout: &str) -> (String, String) {
    let layout = layout.trim();
    let (name, variant) = match layout.find(|c: char| c == '(' || c == ':') {
        Some(i) => (&layout[..i], layout[i + 1..].trim_end_matches(')')),
        None => (layout, ""),
    };
    let name = name.to_lowercase();
    // Common alias that xkb does not know
    let name = if name == "en" { "us".to_string() } else { name };
    (name, variant.to_string())
}
