//! Key combo watcher
//!
//! Spots the desktop's own layout switch combo on the physical keyboards,
//! so a switch the user makes by hand keeps the layout state in step.
//! Generic modifier names ("super", "shift") match either side.

use super::event::RawEvent;
use super::keycodes;

#[derive(Debug, Clone, Default)]
pub struct ComboWatcher {
    combo: Vec<u16>,
    /// Keys currently down, in press order
    held: Vec<u16>,
}

impl ComboWatcher {
    pub fn new(combo: Vec<u16>) -> Self {
        Self {
            combo,
            held: Vec::new(),
        }
    }

    pub fn set_combo(&mut self, combo: Vec<u16>) {
        self.combo = combo;
        self.held.clear();
    }

    /// Feed one event. True when this press completed the combo.
    pub fn observe(&mut self, event: &RawEvent) -> bool {
        if !event.is_key() || self.combo.is_empty() {
            return false;
        }
        if event.is_release() {
            self.held.retain(|&code| code != event.code);
            return false;
        }
        // Auto-repeat never completes a combo twice
        if !event.is_press() || self.held.contains(&event.code) {
            return false;
        }
        self.held.push(event.code);

        let completes = self.combo.iter().any(|&wanted| matches(wanted, event.code));
        completes
            && self
                .combo
                .iter()
                .all(|&wanted| self.held.iter().any(|&code| matches(wanted, code)))
    }
}

fn matches(wanted: u16, code: u16) -> bool {
    wanted == code || wanted == keycodes::modifier_base(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::event::KeyValue;
    use crate::input::keycodes::{
        KEY_A, KEY_LEFTALT, KEY_LEFTMETA, KEY_LEFTSHIFT, KEY_RIGHTALT, KEY_RIGHTMETA, KEY_SPACE,
    };
    use std::time::{Duration, SystemTime};

    fn ev(code: u16, value: KeyValue, ms: u64) -> RawEvent {
        RawEvent::key(1, code, value, SystemTime::UNIX_EPOCH + Duration::from_millis(ms))
    }

    fn feed(watcher: &mut ComboWatcher, events: &[(u16, KeyValue)]) -> usize {
        events
            .iter()
            .enumerate()
            .filter(|(i, (code, value))| watcher.observe(&ev(*code, *value, *i as u64 * 10)))
            .count()
    }

    #[test]
    fn test_combo_fires_once_per_press() {
        let mut watcher = ComboWatcher::new(vec![KEY_LEFTMETA, KEY_SPACE]);
        let fired = feed(
            &mut watcher,
            &[
                (KEY_RIGHTMETA, KeyValue::Press),
                (KEY_SPACE, KeyValue::Press),
                (KEY_SPACE, KeyValue::Repeat),
                (KEY_SPACE, KeyValue::Release),
                (KEY_SPACE, KeyValue::Press),
                (KEY_SPACE, KeyValue::Release),
                (KEY_RIGHTMETA, KeyValue::Release),
            ],
        );
        assert_eq!(fired, 2);

        // Space alone
        assert_eq!(feed(&mut watcher, &[(KEY_SPACE, KeyValue::Press), (KEY_SPACE, KeyValue::Release)]), 0);
    }

    #[test]
    fn test_side_specific_names_stay_specific() {
        let mut watcher = ComboWatcher::new(vec![KEY_RIGHTALT, KEY_LEFTSHIFT]);
        let left = [
            (KEY_LEFTALT, KeyValue::Press),
            (KEY_LEFTSHIFT, KeyValue::Press),
            (KEY_LEFTSHIFT, KeyValue::Release),
            (KEY_LEFTALT, KeyValue::Release),
        ];
        assert_eq!(feed(&mut watcher, &left), 0);

        // Either order completes it
        let right = [
            (KEY_LEFTSHIFT, KeyValue::Press),
            (KEY_A, KeyValue::Press),
            (KEY_RIGHTALT, KeyValue::Press),
        ];
        assert_eq!(feed(&mut watcher, &right), 1);
    }

    #[test]
    fn test_empty_combo_never_fires() {
        let mut watcher = ComboWatcher::default();
        assert_eq!(feed(&mut watcher, &[(KEY_SPACE, KeyValue::Press)]), 0);
    }
}
