//! Typed-word buffer
//!
//! Keeps the key events of the word currently being typed (for replay)
//! and the text they produced (for conversion and backspace counting).

use std::collections::{HashSet, VecDeque};

use super::event::RawEvent;
use super::keycodes::{self, KEY_BACKSPACE};

/// A key that typed one character, with its shift state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypedKey {
    pub code: u16,
    pub shift: bool,
}

/// Bounded event log plus derived text.
///
/// Invariant: `chars_in_buffer() == text().chars().count() == typed_keys().len()`.
#[derive(Debug, Clone)]
pub struct InputBuffer {
    /// Recorded events, oldest first
    events: VecDeque<RawEvent>,
    /// Characters those events typed on a US QWERTY layout
    text: Vec<char>,
    /// Keys behind `text`, one per character
    keys: Vec<TypedKey>,
    /// Press events whose release has not been seen yet, in press order
    pressed: Vec<RawEvent>,
    /// Backspace auto-repeat was seen: the on-screen count is unknown
    backspace_hold: bool,
    /// Events were evicted: the log no longer reproduces the text
    truncated: bool,
    capacity: usize,
}

impl InputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            text: Vec::new(),
            keys: Vec::new(),
            pressed: Vec::new(),
            backspace_hold: false,
            truncated: false,
            capacity: capacity.max(1),
        }
    }

    /// Record a key event and update the derived text
    pub fn push(&mut self, event: RawEvent) {
        if !event.is_key() {
            return;
        }

        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.truncated = true;
        }
        self.events.push_back(event);

        if event.is_press() {
            if !self.pressed.iter().any(|e| e.code == event.code) {
                self.pressed.push(event);
            }
        } else if event.is_release() {
            self.pressed.retain(|e| e.code != event.code);
            return;
        }

        // Press or auto-repeat: both type on screen
        if event.code == KEY_BACKSPACE {
            self.text.pop();
            self.keys.pop();
            if event.is_repeat() {
                self.backspace_hold = true;
            }
            return;
        }
        let shift = self.shift_held();
        if let Some(ch) = keycodes::key_to_char(event.code, shift) {
            self.text.push(ch);
            self.keys.push(TypedKey {
                code: event.code,
                shift,
            });
        }
    }

    /// Drop the typed text, keeping keys that are still physically held.
    ///
    /// Mouse buttons are never carried over.
    pub fn clear(&mut self) {
        self.text.clear();
        self.keys.clear();
        self.backspace_hold = false;
        self.truncated = false;
        self.events = self
            .pressed
            .iter()
            .filter(|e| !keycodes::is_mouse_button(e.code))
            .copied()
            .collect();
    }

    pub fn chars_in_buffer(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Text as typed on US QWERTY
    pub fn text(&self) -> String {
        self.text.iter().collect()
    }

    pub fn typed_keys(&self) -> &[TypedKey] {
        &self.keys
    }

    /// Keys of the last whitespace-delimited word
    pub fn last_word_keys(&self) -> &[TypedKey] {
        &self.keys[self.last_word_range()]
    }

    fn last_word_range(&self) -> std::ops::Range<usize> {
        let end = self.text.len() - self.trailing_whitespace();
        let start = self.text[..end]
            .iter()
            .rposition(|c| c.is_whitespace())
            .map_or(0, |i| i + 1);
        start..end
    }

    /// Number of trailing whitespace characters after the last word
    pub fn trailing_whitespace(&self) -> usize {
        self.text.iter().rev().take_while(|c| c.is_whitespace()).count()
    }

    pub fn events(&self) -> impl Iterator<Item = &RawEvent> {
        self.events.iter()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Events to replay through the virtual keyboard.
    ///
    /// Pointer buttons and releases whose press is not in the log are skipped.
    pub fn replay_events(&self) -> Vec<RawEvent> {
        let mut seen = HashSet::new();
        self.events
            .iter()
            .filter(|e| !keycodes::is_mouse_button(e.code))
            .filter(|e| {
                if e.is_press() {
                    seen.insert(e.code);
                    true
                } else {
                    seen.contains(&e.code)
                }
            })
            .copied()
            .collect()
    }

    pub fn backspace_hold(&self) -> bool {
        self.backspace_hold
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    fn shift_held(&self) -> bool {
        self.pressed.iter().any(|e| keycodes::is_shift_key(e.code))
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new(crate::constants::MAX_BUFFER_EVENTS)
    }
}
