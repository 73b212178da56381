//! Conversion engine
//!
//! Executes interpreter intents: records events into the buffer, and runs
//! conversions. A conversion is a critical section: the interpreter ignores
//! input until it ends, so replayed keystrokes never interleave with live ones.
//!
//! Retype: backspace over the buffered text, switch layout, replay the
//! buffered key events. Selection: convert the highlighted text in place.
//!
//! The desktop's own switch combo pressed on a physical keyboard advances
//! the layout state without going through the adapter.

use anyhow::{anyhow, Result};
use log::{debug, info, trace, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, MutexGuard};
use std::time::{Duration, Instant, SystemTime};

use crate::config::Config;
use crate::conversion::correction::{self, AutoConvertMarker};
use crate::conversion::dictionary::{AutoConvertDetector, SharedDictionary};
use crate::conversion::keymap::TextConverter;
use crate::conversion::policy::{ConversionMode, ConversionPolicy};
use crate::conversion::selection::SelectionProtocol;
use crate::input::buffer::TypedKey;
use crate::input::combo::ComboWatcher;
use crate::input::event::{KeyValue, RawEvent};
use crate::input::interpreter::{EventInterpreter, Intent};
use crate::input::keycodes::{self, KEY_BACKSPACE};
use crate::input::virtual_keyboard::{KeySink, SharedKeySink};
use crate::input::InputBuffer;
use crate::layout::{compat, KeyRenderer, LayoutManager, Script};

/// Engine behavior taken from the config
#[derive(Debug, Clone)]
struct EngineSettings {
    auto_convert: bool,
    trim_leading_whitespace: bool,
    correction_timeout: Duration,
}

impl EngineSettings {
    fn from_config(config: &Config) -> Self {
        Self {
            auto_convert: config.conversion.auto_convert,
            trim_leading_whitespace: config.conversion.trim_leading_whitespace,
            correction_timeout: config.conversion.correction_timeout(),
        }
    }
}

/// Collaborators the engine drives
pub struct EngineParts {
    pub policy: ConversionPolicy,
    pub selection: SelectionProtocol,
    pub layouts: Arc<LayoutManager>,
    pub keys: SharedKeySink,
    pub converter: Arc<dyn TextConverter>,
    pub dictionary: SharedDictionary,
    pub detector: Box<dyn AutoConvertDetector>,
    /// Keymaps for on-screen text; the converter's table stands in when None
    pub renderer: Option<Box<dyn KeyRenderer>>,
}

pub struct Engine {
    interpreter: EventInterpreter,
    buffer: InputBuffer,
    policy: ConversionPolicy,
    selection: SelectionProtocol,
    layouts: Arc<LayoutManager>,
    keys: SharedKeySink,
    converter: Arc<dyn TextConverter>,
    dictionary: SharedDictionary,
    detector: Box<dyn AutoConvertDetector>,
    renderer: Option<Box<dyn KeyRenderer>>,
    /// Desktop layout combo pressed by the user
    switch_combo: ComboWatcher,
    /// Last automatic conversion, for correction learning
    marker: Option<AutoConvertMarker>,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(parts: EngineParts, config: &Config) -> Self {
        let mut engine = Self {
            interpreter: EventInterpreter::new(config.hotkey.interpreter_config()),
            buffer: InputBuffer::default(),
            policy: parts.policy,
            selection: parts.selection,
            layouts: parts.layouts,
            keys: parts.keys,
            converter: parts.converter,
            dictionary: parts.dictionary,
            detector: parts.detector,
            renderer: parts.renderer,
            switch_combo: ComboWatcher::default(),
            marker: None,
            settings: EngineSettings::from_config(config),
        };
        engine.apply_config(config);
        engine
    }

    /// Re-apply settings after a config reload
    pub fn apply_config(&mut self, config: &Config) {
        self.interpreter
            .set_config(config.hotkey.interpreter_config());
        self.policy.set_overrides(&config.conversion.app_modes);
        self.policy.set_prefer_retype(config.conversion.prefer_retype);
        self.selection.set_timeouts(
            config.selection.read_timeout(),
            config.selection.paste_settle(),
        );
        self.settings = EngineSettings::from_config(config);

        let combo = keycodes::parse_combo(&config.layouts.switch_keys).unwrap_or_else(|| {
            warn!("Invalid layout switch keys: '{}'", config.layouts.switch_keys);
            Vec::new()
        });
        self.switch_combo.set_combo(combo);
    }

    pub fn buffer(&self) -> &InputBuffer {
        &self.buffer
    }

    /// Feed one raw event through the interpreter and act on its intents
    pub fn handle_event(&mut self, event: &RawEvent) {
        if self.switch_combo.observe(event) {
            if let Some(layout) = self.layouts.note_switched() {
                debug!("Layout switched by the user: {}", layout);
            }
        }
        for intent in self.interpreter.handle(event, &self.buffer) {
            match intent {
                Intent::Record(event) => self.buffer.push(event),
                Intent::ClearBuffer => self.buffer.clear(),
                Intent::Convert => self.guarded("Conversion", |engine| engine.convert()),
                Intent::CheckAutoConvert => {
                    if self.settings.auto_convert {
                        self.guarded("Auto-conversion", |engine| engine.auto_convert());
                    }
                }
            }
        }
    }

    /// Run `body` as a conversion critical section. Failures are logged.
    fn guarded<F>(&mut self, what: &str, body: F)
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.interpreter.begin_conversion();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(self)));
        self.interpreter.end_conversion(SystemTime::now());

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("{} failed: {:#}", what, e),
            Err(_) => warn!("{} panicked", what),
        }
    }

    // ========================================================================
    // Manual conversion
    // ========================================================================

    fn convert(&mut self) -> Result<()> {
        let hold = self.buffer.backspace_hold() || self.buffer.is_truncated();
        let chars = self.buffer.chars_in_buffer();

        let mut user_selection = None;
        let mode = {
            let selection = &mut self.selection;
            let user_selection = &mut user_selection;
            self.policy.choose_mode(chars, hold, &mut || {
                let selected = selection.has_selection()?;
                *user_selection = Some(selected);
                Ok(selected)
            })
        };
        // Empty buffer or a backspace hold picks selection without asking
        let user_selection = match (mode, user_selection) {
            (_, Some(selected)) => selected,
            (ConversionMode::Selection, None) => {
                self.selection.has_selection().unwrap_or_else(|e| {
                    debug!("Selection check failed: {:#}", e);
                    false
                })
            }
            (ConversionMode::Retype, None) => false,
        };

        match mode {
            ConversionMode::Retype => {
                let (original, converted) = self.retype()?;
                self.learn(&original, &converted);
            }
            ConversionMode::Selection => self.convert_selection(user_selection)?,
        }
        Ok(())
    }

    fn convert_selection(&mut self, user_selection: bool) -> Result<()> {
        let converter = self.converter.clone();
        let convert_fn = move |text: &str| converter.convert(text);
        let layouts = self.layouts.clone();
        let mut switch = move || {
            let target = current_script(&layouts).other();
            if !switch_to_script(&layouts, target) {
                warn!("Layout switch to {:?} failed", target);
            }
        };

        let outcome = self.selection.convert(
            &convert_fn,
            user_selection,
            self.settings.trim_leading_whitespace,
            Some(&mut switch),
        )?;
        // Whatever was buffered no longer matches the screen
        self.buffer.clear();

        if outcome.is_empty() {
            debug!("Nothing to convert");
            return Ok(());
        }
        self.learn(&outcome.original, &outcome.converted);
        Ok(())
    }

    // ========================================================================
    // Retype
    // ========================================================================

    /// Text `keys` type under `layout`.
    ///
    /// Without a keymap for it, the QWERTY text is converted to `script`.
    fn render(&self, keys: &[TypedKey], layout: Option<&str>, script: Script) -> String {
        if let (Some(renderer), Some(layout)) = (self.renderer.as_deref(), layout) {
            if let Some(text) = renderer.render(layout, keys) {
                return text;
            }
        }
        let typed: String = keys
            .iter()
            .filter_map(|key| keycodes::key_to_char(key.code, key.shift))
            .collect();
        match script {
            Script::Latin => typed,
            Script::Cyrillic => self.converter.convert_to(&typed, Script::Cyrillic),
        }
    }

    fn lock_keys(&self) -> MutexGuard<'_, dyn KeySink + 'static> {
        self.keys.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Erase the buffered text, switch layout and replay the buffered keys.
    ///
    /// Returns the on-screen text before and after.
    fn retype(&mut self) -> Result<(String, String)> {
        if self.buffer.is_empty() {
            return Err(anyhow!("Nothing buffered to retype"));
        }
        trace!("Retype keys (QWERTY): '{}'", self.buffer.text());
        let keys = self.buffer.typed_keys();
        let from = current_script(&self.layouts);
        let to = from.other();
        let target = compat::layout_for_script(to, &self.layouts.available());
        let original = self.render(keys, self.layouts.current().as_deref(), from);
        let converted = self.render(keys, target.as_deref(), to);
        let count = self.buffer.chars_in_buffer();
        let events = self.buffer.replay_events();

        info!(
            "Retype: '{}' → '{}' ({} chars, {} events)",
            original.trim(),
            converted.trim(),
            count,
            events.len()
        );

        {
            let mut keys = self.lock_keys();
            for _ in 0..count {
                keys.tap(KEY_BACKSPACE)?;
            }
        }

        // The switcher may press keys on the same sink: no lock held here
        if !switch_to_script(&self.layouts, to) {
            warn!("Layout switch to {:?} failed, replaying anyway", to);
        }

        self.replay(&events)?;
        Ok((original, converted))
    }

    fn replay(&self, events: &[RawEvent]) -> Result<()> {
        let mut keys = self.lock_keys();
        let mut held: Vec<u16> = Vec::new();

        for event in events {
            let Some(value) = event.key_value() else {
                continue;
            };
            keys.write_key(event.code, value)?;
            keys.sync()?;
            keys.pause();
            match value {
                KeyValue::Press => {
                    if !held.contains(&event.code) {
                        held.push(event.code);
                    }
                }
                KeyValue::Release => held.retain(|&c| c != event.code),
                KeyValue::Repeat => {}
            }
        }

        // Never leave a virtual key stuck down
        for code in held.into_iter().rev() {
            keys.write_key(code, KeyValue::Release)?;
            keys.sync()?;
        }
        Ok(())
    }

    // ========================================================================
    // Auto-conversion and learning
    // ========================================================================

    fn auto_convert(&mut self) -> Result<()> {
        if self.buffer.backspace_hold() || self.buffer.is_truncated() {
            return Ok(());
        }
        // The buffer holds one word plus the space that ended it
        let keys = self.buffer.last_word_keys();
        if keys.is_empty() {
            return Ok(());
        }

        let shown = self.render(
            keys,
            self.layouts.current().as_deref(),
            current_script(&self.layouts),
        );
        let detector = &self.detector;
        let decision = panic::catch_unwind(AssertUnwindSafe(|| detector.should_convert(&shown)))
            .map_err(|_| anyhow!("Auto-convert detector panicked"))?;
        if !decision.convert {
            trace!("Auto-convert skipped for '{}': {}", shown, decision.reason);
            return Ok(());
        }

        debug!("Auto-converting '{}' ({})", shown, decision.reason);
        let (original, converted) = self.retype()?;
        self.marker = Some(AutoConvertMarker::new(original.trim(), converted.trim()));
        Ok(())
    }

    /// Learn from a manual conversion: either it undid the last automatic
    /// conversion, or it is a conversion worth remembering.
    fn learn(&mut self, original: &str, converted: &str) {
        let mut dictionary = self.dictionary.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(marker) = self.marker.take() {
            if correction::is_correction(
                &marker,
                original,
                converted,
                self.settings.correction_timeout,
                Instant::now(),
                Some(&*dictionary),
            ) {
                correction::apply_correction(&mut *dictionary, &marker.source_word);
                return;
            }
        }

        let (original, converted) = (original.trim(), converted.trim());
        if original.is_empty() || original.chars().any(char::is_whitespace) {
            return;
        }
        let from = Script::detect(original);
        if let Err(e) = dictionary.add_conversion(original, converted, from, from.other()) {
            warn!("Failed to record conversion of '{}': {:#}", original, e);
        }
    }
}

/// Script of the active layout (Latin when unknown)
fn current_script(layouts: &LayoutManager) -> Script {
    layouts
        .current()
        .and_then(|layout| compat::script_of(&layout))
        .unwrap_or(Script::Latin)
}

/// Switch to a layout typing `script`, or just to the next one if none is known
fn switch_to_script(layouts: &LayoutManager, script: Script) -> bool {
    match compat::layout_for_script(script, &layouts.available()) {
        Some(target) => layouts.switch_to(&target),
        None => layouts.switch(),
    }
}
