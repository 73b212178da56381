//! Key event interpreter
//!
//! Turns raw key events into intents for the engine:
//! - a double tap of the trigger modifier asks for a conversion
//! - space ends a word and asks for an auto-convert check
//! - navigation keys, mouse clicks and new words invalidate the typed buffer
//!
//! The interpreter never touches the buffer itself. It returns an ordered
//! list of intents which the engine executes; failures while executing them
//! are the engine's concern, so event flow stays live no matter what.

use std::time::{Duration, SystemTime};

use super::buffer::InputBuffer;
use super::event::RawEvent;
use super::keycodes::{self, KEY_LEFTSHIFT, KEY_RIGHTSHIFT, KEY_SPACE};

/// Which physical key(s) count as the double-tap trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerKeys(Vec<u16>);

impl TriggerKeys {
    pub fn new(codes: Vec<u16>) -> Self {
        Self(codes)
    }

    pub fn contains(&self, code: u16) -> bool {
        self.0.contains(&code)
    }
}

impl Default for TriggerKeys {
    fn default() -> Self {
        Self(vec![KEY_LEFTSHIFT, KEY_RIGHTSHIFT])
    }
}

/// What the engine should do in response to an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Append the event to the buffer
    Record(RawEvent),
    /// Typing context broke: drop the buffer
    ClearBuffer,
    /// Double tap detected: convert the last word
    Convert,
    /// A word just ended: check whether it should be converted automatically
    CheckAutoConvert,
}

/// Typing phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Inside a word
    Typing,
    /// Space was released; the next key starts a new word
    AfterSpace,
    /// A conversion owns the output device; input is ignored
    Converting,
}

/// Whether trigger-modifier releases may count toward a double tap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierGate {
    Armed,
    /// Disabled until explicitly re-armed
    Suppressed,
    /// Disabled until the given instant (after a replay)
    SuppressedUntil(SystemTime),
}

/// Interpreter settings
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    pub trigger: TriggerKeys,
    pub double_tap_timeout: Duration,
    pub replay_suppress: Duration,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            trigger: TriggerKeys::default(),
            double_tap_timeout: Duration::from_millis(crate::constants::DOUBLE_TAP_TIMEOUT_MS),
            replay_suppress: Duration::from_millis(crate::constants::REPLAY_SUPPRESS_MS),
        }
    }
}

/// Double-tap / word-boundary state machine
#[derive(Debug)]
pub struct EventInterpreter {
    config: InterpreterConfig,
    phase: Phase,
    gate: ModifierGate,
    /// First half of a potential double tap
    last_tap: Option<SystemTime>,
    /// Trigger modifier is down and nothing else was pressed with it
    clean_hold: bool,
    /// Events stamped before this were queued during a conversion
    ignore_before: Option<SystemTime>,
    /// Phase to return to when the conversion ends
    resume: Phase,
}

impl EventInterpreter {
    pub fn new(config: InterpreterConfig) -> Self {
        Self {
            config,
            phase: Phase::Typing,
            gate: ModifierGate::Armed,
            last_tap: None,
            clean_hold: false,
            ignore_before: None,
            resume: Phase::Typing,
        }
    }

    pub fn set_config(&mut self, config: InterpreterConfig) {
        self.config = config;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn gate(&self) -> ModifierGate {
        self.gate
    }

    pub fn is_converting(&self) -> bool {
        self.phase == Phase::Converting
    }

    /// Enter the conversion critical section
    pub fn begin_conversion(&mut self) {
        if self.phase != Phase::Converting {
            self.resume = self.phase;
        }
        self.phase = Phase::Converting;
        self.last_tap = None;
    }

    /// Leave the conversion critical section.
    ///
    /// Events stamped before `at` are dropped and trigger releases are
    /// ignored for the replay suppression window.
    pub fn end_conversion(&mut self, at: SystemTime) {
        self.phase = self.resume;
        self.ignore_before = Some(at);
        self.gate = ModifierGate::SuppressedUntil(at + self.config.replay_suppress);
        self.last_tap = None;
        self.clean_hold = false;
    }

    /// Disable or re-enable double-tap detection
    pub fn set_modifier_detection(&mut self, enabled: bool) {
        self.gate = if enabled {
            ModifierGate::Armed
        } else {
            ModifierGate::Suppressed
        };
        self.last_tap = None;
    }

    /// Interpret one event against the current buffer
    pub fn handle(&mut self, event: &RawEvent, buffer: &InputBuffer) -> Vec<Intent> {
        if self.phase == Phase::Converting || !event.is_key() {
            return Vec::new();
        }
        if self.ignore_before.map_or(false, |t| event.timestamp < t) {
            return Vec::new();
        }

        let code = event.code;

        if keycodes::is_navigation_key(code) {
            if event.is_release() && !buffer.is_empty() {
                return vec![Intent::ClearBuffer];
            }
            return Vec::new();
        }

        // A click may move the caret away from the typed word
        if keycodes::is_mouse_button(code) {
            if event.is_press() {
                self.break_modifier_sequence();
            }
            self.phase = Phase::Typing;
            return vec![Intent::ClearBuffer];
        }

        if self.config.trigger.contains(code) {
            return self.handle_trigger(event);
        }

        if code == KEY_SPACE {
            return self.handle_space(event);
        }

        self.handle_other(event)
    }

    fn handle_trigger(&mut self, event: &RawEvent) -> Vec<Intent> {
        let mut intents = vec![Intent::Record(*event)];

        if event.is_press() {
            self.clean_hold = true;
            return intents;
        }
        if !event.is_release() {
            return intents;
        }

        let now = event.timestamp;
        let was_clean = std::mem::replace(&mut self.clean_hold, false);

        if self.is_suppressed(now) || !was_clean {
            self.last_tap = None;
            return intents;
        }

        match self.last_tap {
            Some(first) if elapsed(first, now) < self.config.double_tap_timeout => {
                self.last_tap = None;
                intents.push(Intent::Convert);
            }
            _ => self.last_tap = Some(now),
        }
        intents
    }

    fn handle_space(&mut self, event: &RawEvent) -> Vec<Intent> {
        if event.is_press() {
            self.break_modifier_sequence();
        }
        let mut intents = vec![Intent::Record(*event)];
        // Further spaces extend the boundary; only the first one ends the word
        if event.is_release() && self.phase != Phase::AfterSpace {
            self.phase = Phase::AfterSpace;
            intents.push(Intent::CheckAutoConvert);
        }
        intents
    }

    fn handle_other(&mut self, event: &RawEvent) -> Vec<Intent> {
        if event.is_press() {
            self.break_modifier_sequence();
        }
        let mut intents = Vec::new();
        if self.phase == Phase::AfterSpace && event.is_press() {
            self.phase = Phase::Typing;
            intents.push(Intent::ClearBuffer);
        }
        intents.push(Intent::Record(*event));
        intents
    }

    /// Any other key press spoils a pending double tap and a clean modifier hold
    fn break_modifier_sequence(&mut self) {
        self.last_tap = None;
        self.clean_hold = false;
    }

    fn is_suppressed(&mut self, now: SystemTime) -> bool {
        match self.gate {
            ModifierGate::Armed => false,
            ModifierGate::Suppressed => true,
            ModifierGate::SuppressedUntil(until) => {
                if now < until {
                    true
                } else {
                    self.gate = ModifierGate::Armed;
                    false
                }
            }
        }
    }
}

fn elapsed(earlier: SystemTime, later: SystemTime) -> Duration {
    later.duration_since(earlier).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::event::KeyValue;
    use crate::input::keycodes::{BTN_LEFT, KEY_A, KEY_ENTER};
    use std::time::UNIX_EPOCH;

    const TIMEOUT_MS: u64 = 300;

    fn at(ms: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(ms)
    }

    fn ev(code: u16, value: KeyValue, ms: u64) -> RawEvent {
        RawEvent::key(1, code, value, at(ms))
    }

    fn interpreter() -> EventInterpreter {
        EventInterpreter::new(InterpreterConfig {
            trigger: TriggerKeys::default(),
            double_tap_timeout: Duration::from_millis(TIMEOUT_MS),
            replay_suppress: Duration::from_millis(150),
        })
    }

    /// Feed events, applying Record/ClearBuffer to the buffer like the engine does
    fn run(interp: &mut EventInterpreter, buf: &mut InputBuffer, events: &[RawEvent]) -> Vec<Intent> {
        let mut fired = Vec::new();
        for event in events {
            for intent in interp.handle(event, buf) {
                match &intent {
                    Intent::Record(e) => buf.push(*e),
                    Intent::ClearBuffer => buf.clear(),
                    _ => {}
                }
                fired.push(intent);
            }
        }
        fired
    }

    fn shift_tap(ms: u64) -> [RawEvent; 2] {
        [
            ev(KEY_LEFTSHIFT, KeyValue::Press, ms),
            ev(KEY_LEFTSHIFT, KeyValue::Release, ms + 30),
        ]
    }

    fn count(intents: &[Intent], wanted: &Intent) -> usize {
        intents.iter().filter(|i| *i == wanted).count()
    }

    #[test]
    fn test_double_tap_fires_once() {
        let mut interp = interpreter();
        let mut buf = InputBuffer::default();
        let mut events = shift_tap(0).to_vec();
        events.extend(shift_tap(150));

        let intents = run(&mut interp, &mut buf, &events);
        assert_eq!(count(&intents, &Intent::Convert), 1);
    }

    #[test]
    fn test_slow_taps_never_fire() {
        let mut interp = interpreter();
        let mut buf = InputBuffer::default();
        // Releases at 30 and 30 + TIMEOUT + 1
        let mut events = shift_tap(0).to_vec();
        events.extend(shift_tap(TIMEOUT_MS + 1));

        let intents = run(&mut interp, &mut buf, &events);
        assert_eq!(count(&intents, &Intent::Convert), 0);
    }

    #[test]
    fn test_triple_tap_fires_once() {
        let mut interp = interpreter();
        let mut buf = InputBuffer::default();
        let mut events = shift_tap(0).to_vec();
        events.extend(shift_tap(100));
        events.extend(shift_tap(200));

        let intents = run(&mut interp, &mut buf, &events);
        assert_eq!(count(&intents, &Intent::Convert), 1);
    }

    #[test]
    fn test_intervening_key_breaks_double_tap() {
        let mut interp = interpreter();
        let mut buf = InputBuffer::default();
        let mut events = shift_tap(0).to_vec();
        events.push(ev(KEY_A, KeyValue::Press, 60));
        events.push(ev(KEY_A, KeyValue::Release, 70));
        events.extend(shift_tap(100));

        let intents = run(&mut interp, &mut buf, &events);
        assert_eq!(count(&intents, &Intent::Convert), 0);
    }

    #[test]
    fn test_shift_chord_does_not_count() {
        let mut interp = interpreter();
        let mut buf = InputBuffer::default();
        let events = [
            ev(KEY_LEFTSHIFT, KeyValue::Press, 0),
            ev(KEY_A, KeyValue::Press, 10),
            ev(KEY_A, KeyValue::Release, 20),
            ev(KEY_LEFTSHIFT, KeyValue::Release, 30),
            ev(KEY_LEFTSHIFT, KeyValue::Press, 100),
            ev(KEY_LEFTSHIFT, KeyValue::Release, 120),
        ];

        let intents = run(&mut interp, &mut buf, &events);
        assert_eq!(count(&intents, &Intent::Convert), 0);
        assert_eq!(buf.text(), "A");
    }

    #[test]
    fn test_modifier_events_are_recorded() {
        let mut interp = interpreter();
        let mut buf = InputBuffer::default();
        run(&mut interp, &mut buf, &shift_tap(0));
        assert_eq!(buf.event_count(), 2);
    }

    #[test]
    fn test_replay_window_suppresses_detection() {
        let mut interp = interpreter();
        let mut buf = InputBuffer::default();

        interp.begin_conversion();
        assert!(run(&mut interp, &mut buf, &shift_tap(0)).is_empty());
        interp.end_conversion(at(1000));

        // Queued during the conversion: dropped outright
        assert!(run(&mut interp, &mut buf, &shift_tap(900)).is_empty());

        // Inside the suppression window: recorded but never a double tap
        let mut events = shift_tap(1000).to_vec();
        events.extend(shift_tap(1060));
        let intents = run(&mut interp, &mut buf, &events);
        assert_eq!(count(&intents, &Intent::Convert), 0);

        // Window over: detection re-arms
        let mut events = shift_tap(1400).to_vec();
        events.extend(shift_tap(1500));
        let intents = run(&mut interp, &mut buf, &events);
        assert_eq!(count(&intents, &Intent::Convert), 1);
        assert_eq!(interp.gate(), ModifierGate::Armed);
    }

    #[test]
    fn test_manual_suppression() {
        let mut interp = interpreter();
        let mut buf = InputBuffer::default();
        interp.set_modifier_detection(false);

        let mut events = shift_tap(0).to_vec();
        events.extend(shift_tap(100));
        assert_eq!(count(&run(&mut interp, &mut buf, &events), &Intent::Convert), 0);

        interp.set_modifier_detection(true);
        let mut events = shift_tap(1000).to_vec();
        events.extend(shift_tap(1100));
        assert_eq!(count(&run(&mut interp, &mut buf, &events), &Intent::Convert), 1);
    }

    #[test]
    fn test_navigation_clears_non_empty_buffer() {
        let mut interp = interpreter();
        let mut buf = InputBuffer::default();
        run(
            &mut interp,
            &mut buf,
            &[ev(KEY_A, KeyValue::Press, 0), ev(KEY_A, KeyValue::Release, 10)],
        );

        assert!(interp.handle(&ev(KEY_ENTER, KeyValue::Press, 20), &buf).is_empty());
        assert_eq!(
            interp.handle(&ev(KEY_ENTER, KeyValue::Release, 30), &buf),
            vec![Intent::ClearBuffer]
        );

        buf.clear();
        assert!(interp.handle(&ev(KEY_ENTER, KeyValue::Release, 40), &buf).is_empty());
    }

    #[test]
    fn test_space_then_key_starts_new_word() {
        let mut interp = interpreter();
        let mut buf = InputBuffer::default();
        let events = [
            ev(KEY_A, KeyValue::Press, 0),
            ev(KEY_A, KeyValue::Release, 10),
            ev(KEY_SPACE, KeyValue::Press, 20),
            ev(KEY_SPACE, KeyValue::Release, 30),
        ];
        let intents = run(&mut interp, &mut buf, &events);
        assert_eq!(count(&intents, &Intent::CheckAutoConvert), 1);
        assert_eq!(interp.phase(), Phase::AfterSpace);
        assert_eq!(buf.text(), "a ");

        let intents = run(&mut interp, &mut buf, &[ev(31, KeyValue::Press, 40)]);
        assert_eq!(intents[0], Intent::ClearBuffer);
        assert_eq!(interp.phase(), Phase::Typing);
        assert_eq!(buf.text(), "s");
    }

    #[test]
    fn test_repeated_spaces_keep_word() {
        let mut interp = interpreter();
        let mut buf = InputBuffer::default();
        let events = [
            ev(KEY_A, KeyValue::Press, 0),
            ev(KEY_A, KeyValue::Release, 10),
            ev(KEY_SPACE, KeyValue::Press, 20),
            ev(KEY_SPACE, KeyValue::Release, 30),
            ev(KEY_SPACE, KeyValue::Press, 40),
            ev(KEY_SPACE, KeyValue::Release, 50),
        ];
        let intents = run(&mut interp, &mut buf, &events);
        assert_eq!(count(&intents, &Intent::ClearBuffer), 0);
        assert_eq!(count(&intents, &Intent::CheckAutoConvert), 1);
        assert_eq!(buf.text(), "a  ");
    }

    #[test]
    fn test_click_clears_buffer() {
        let mut interp = interpreter();
        let mut buf = InputBuffer::default();
        let mut events = vec![
            ev(KEY_A, KeyValue::Press, 0),
            ev(KEY_A, KeyValue::Release, 10),
            ev(BTN_LEFT, KeyValue::Press, 20),
            ev(BTN_LEFT, KeyValue::Release, 30),
        ];
        let intents = run(&mut interp, &mut buf, &events);
        assert_eq!(intents.last(), Some(&Intent::ClearBuffer));
        assert!(!intents.contains(&Intent::Record(events[2])));
        assert!(buf.is_empty());
        assert_eq!(buf.event_count(), 0);

        // Shift press, click, shift release: not a clean tap
        events = shift_tap(100).to_vec();
        events.insert(1, ev(BTN_LEFT, KeyValue::Press, 110));
        events.extend(shift_tap(200));
        assert_eq!(count(&run(&mut interp, &mut buf, &events), &Intent::Convert), 0);
    }

    #[test]
    fn test_double_tap_after_space_keeps_word() {
        let mut interp = interpreter();
        let mut buf = InputBuffer::default();
        let mut events = vec![
            ev(KEY_A, KeyValue::Press, 0),
            ev(KEY_A, KeyValue::Release, 10),
            ev(KEY_SPACE, KeyValue::Press, 20),
            ev(KEY_SPACE, KeyValue::Release, 30),
        ];
        events.extend(shift_tap(100));
        events.extend(shift_tap(200));

        let intents = run(&mut interp, &mut buf, &events);
        assert_eq!(count(&intents, &Intent::Convert), 1);
        assert_eq!(count(&intents, &Intent::ClearBuffer), 0);
        assert_eq!(buf.text(), "a ");
    }

    #[test]
    fn test_converting_ignores_everything() {
        let mut interp = interpreter();
        let buf = InputBuffer::default();
        interp.begin_conversion();
        assert!(interp.handle(&ev(KEY_A, KeyValue::Press, 0), &buf).is_empty());
        assert!(interp.is_converting());
    }

    #[test]
    fn test_conversion_resumes_word_boundary() {
        let mut interp = interpreter();
        let mut buf = InputBuffer::default();
        run(
            &mut interp,
            &mut buf,
            &[ev(KEY_SPACE, KeyValue::Press, 0), ev(KEY_SPACE, KeyValue::Release, 10)],
        );
        interp.begin_conversion();
        interp.end_conversion(at(500));
        assert_eq!(interp.phase(), Phase::AfterSpace);

        let intents = run(&mut interp, &mut buf, &[ev(KEY_A, KeyValue::Press, 600)]);
        assert_eq!(intents[0], Intent::ClearBuffer);
    }
}
