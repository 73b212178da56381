//! Conversion mode selection
//!
//! Retype (backspace, switch layout, replay keys) is exact but needs a
//! trustworthy count of characters on screen. Selection mode works on
//! whatever text is highlighted and needs no count, but relies on the
//! clipboard. The policy picks one, in strict priority order:
//!
//! 1. backspace held or nothing buffered → Selection
//! 2. user has a selection → Selection
//! 3. active window class table (only with a window adapter)
//! 4. registered policies, first definite answer wins
//! 5. `prefer_retype` → Retype
//! 6. Retype

use anyhow::Result;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionMode {
    Retype,
    Selection,
}

/// Active window introspection
pub trait WindowInspector: Send {
    /// Class of the focused window, if any
    fn active_window_class(&self) -> Result<Option<String>>;
}

/// What a registered policy gets to look at
#[derive(Debug, Clone, Copy)]
pub struct PolicyContext<'a> {
    pub chars_in_buffer: usize,
    pub backspace_hold: bool,
    /// None when unknown (no adapter or the query failed)
    pub has_selection: Option<bool>,
    pub window_class: Option<&'a str>,
    pub prefer_retype: bool,
}

/// Pluggable mode rule
pub trait ModePolicy: Send {
    fn name(&self) -> &str;
    /// Ok(None) means no opinion
    fn choose(&self, ctx: &PolicyContext<'_>) -> Result<Option<ConversionMode>>;
}

/// Window classes with a known best mode (lowercase fragments)
const DEFAULT_APP_MODES: &[(&str, ConversionMode)] = &[
    ("code", ConversionMode::Retype),
    ("vscodium", ConversionMode::Retype),
    ("jetbrains", ConversionMode::Retype),
    ("sublime_text", ConversionMode::Retype),
    ("gedit", ConversionMode::Retype),
    ("kate", ConversionMode::Retype),
    ("emacs", ConversionMode::Retype),
    ("gvim", ConversionMode::Retype),
    ("neovide", ConversionMode::Retype),
    ("zed", ConversionMode::Retype),
    ("firefox", ConversionMode::Selection),
    ("chromium", ConversionMode::Selection),
    ("google-chrome", ConversionMode::Selection),
    ("brave-browser", ConversionMode::Selection),
    ("vivaldi", ConversionMode::Selection),
    ("opera", ConversionMode::Selection),
];

/// Look up a window class: exact match first, then the longest fragment
/// contained in it (ties go to the alphabetically first)
fn lookup<'a, I>(entries: I, class: &str) -> Option<ConversionMode>
where
    I: Iterator<Item = (&'a str, ConversionMode)> + Clone,
{
    entries
        .clone()
        .find(|(key, _)| *key == class)
        .or_else(|| {
            entries
                .filter(|(key, _)| !key.is_empty() && class.contains(*key))
                .max_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| b.cmp(a)))
        })
        .map(|(_, mode)| mode)
}

pub struct ConversionPolicy {
    window: Option<Box<dyn WindowInspector>>,
    /// Lowercased window class → mode, checked before the defaults
    overrides: HashMap<String, ConversionMode>,
    policies: Vec<Box<dyn ModePolicy>>,
    prefer_retype: bool,
}

impl ConversionPolicy {
    pub fn new(window: Option<Box<dyn WindowInspector>>) -> Self {
        Self {
            window,
            overrides: HashMap::new(),
            policies: Vec::new(),
            prefer_retype: false,
        }
    }

    pub fn set_overrides(&mut self, overrides: &HashMap<String, ConversionMode>) {
        self.overrides = overrides
            .iter()
            .map(|(class, mode)| (class.trim().to_lowercase(), *mode))
            .collect();
    }

    pub fn set_prefer_retype(&mut self, prefer_retype: bool) {
        self.prefer_retype = prefer_retype;
    }

    pub fn register(&mut self, policy: Box<dyn ModePolicy>) {
        self.policies.push(policy);
    }

    /// Mode configured for a window class
    pub fn mode_for_class(&self, class: &str) -> Option<ConversionMode> {
        let class = class.trim().to_lowercase();
        lookup(
            self.overrides.iter().map(|(k, v)| (k.as_str(), *v)),
            &class,
        )
        .or_else(|| lookup(DEFAULT_APP_MODES.iter().copied(), &class))
    }

    fn window_class(&self) -> Option<String> {
        let window = self.window.as_ref()?;
        match panic::catch_unwind(AssertUnwindSafe(|| window.active_window_class())) {
            Ok(Ok(class)) => class,
            Ok(Err(e)) => {
                debug!("Window class unavailable: {}", e);
                None
            }
            Err(_) => {
                warn!("Window inspector panicked");
                None
            }
        }
    }

    /// Pick the conversion mode.
    ///
    /// `has_selection` is only asked when the buffer is usable.
    pub fn choose_mode(
        &self,
        chars_in_buffer: usize,
        backspace_hold: bool,
        has_selection: &mut dyn FnMut() -> Result<bool>,
    ) -> ConversionMode {
        if backspace_hold || chars_in_buffer == 0 {
            debug!("Mode: selection (no reliable character count)");
            return ConversionMode::Selection;
        }

        let selection = match panic::catch_unwind(AssertUnwindSafe(|| has_selection())) {
            Ok(Ok(selected)) => Some(selected),
            Ok(Err(e)) => {
                debug!("Selection check failed: {}", e);
                None
            }
            Err(_) => {
                warn!("Selection check panicked");
                None
            }
        };
        if selection == Some(true) {
            debug!("Mode: selection (user selection)");
            return ConversionMode::Selection;
        }

        let class = self.window_class();
        if let Some(mode) = class.as_deref().and_then(|c| self.mode_for_class(c)) {
            debug!("Mode: {:?} (window class {:?})", mode, class);
            return mode;
        }

        let ctx = PolicyContext {
            chars_in_buffer,
            backspace_hold,
            has_selection: selection,
            window_class: class.as_deref(),
            prefer_retype: self.prefer_retype,
        };
        for policy in &self.policies {
            match panic::catch_unwind(AssertUnwindSafe(|| policy.choose(&ctx))) {
                Ok(Ok(Some(mode))) => {
                    debug!("Mode: {:?} (policy {})", mode, policy.name());
                    return mode;
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => warn!("Policy {} failed: {}", policy.name(), e),
                Err(_) => warn!("Policy {} panicked", policy.name()),
            }
        }

        if self.prefer_retype {
            debug!("Mode: retype (preferred)");
        }
        ConversionMode::Retype
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::Cell;

    struct FixedWindow(Option<&'static str>);

    impl WindowInspector for FixedWindow {
        fn active_window_class(&self) -> Result<Option<String>> {
            Ok(self.0.map(str::to_string))
        }
    }

    struct Always(ConversionMode);

    impl ModePolicy for Always {
        fn name(&self) -> &str {
            "always"
        }

        fn choose(&self, _ctx: &PolicyContext<'_>) -> Result<Option<ConversionMode>> {
            Ok(Some(self.0))
        }
    }

    struct Failing;

    impl ModePolicy for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn choose(&self, _ctx: &PolicyContext<'_>) -> Result<Option<ConversionMode>> {
            Err(anyhow!("broken policy"))
        }
    }

    struct Panicking;

    impl ModePolicy for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn choose(&self, _ctx: &PolicyContext<'_>) -> Result<Option<ConversionMode>> {
            panic!("policy panicked");
        }
    }

    fn no_selection() -> Result<bool> {
        Ok(false)
    }

    #[test]
    fn test_unreliable_count_forces_selection() {
        let policy = ConversionPolicy::new(None);
        let asked = Cell::new(false);
        let mut has = || -> Result<bool> {
            asked.set(true);
            Ok(false)
        };
        assert_eq!(policy.choose_mode(0, false, &mut has), ConversionMode::Selection);
        assert_eq!(policy.choose_mode(5, true, &mut has), ConversionMode::Selection);
        assert!(!asked.get());
    }

    #[test]
    fn test_user_selection_wins() {
        let mut policy = ConversionPolicy::new(Some(Box::new(FixedWindow(Some("Code")))));
        policy.register(Box::new(Always(ConversionMode::Retype)));
        assert_eq!(
            policy.choose_mode(3, false, &mut || Ok(true)),
            ConversionMode::Selection
        );
    }

    #[test]
    fn test_window_class_table() {
        let policy = ConversionPolicy::new(Some(Box::new(FixedWindow(Some("Firefox")))));
        assert_eq!(policy.choose_mode(3, false, &mut no_selection), ConversionMode::Selection);

        let policy = ConversionPolicy::new(Some(Box::new(FixedWindow(Some("jetbrains-idea")))));
        assert_eq!(policy.choose_mode(3, false, &mut no_selection), ConversionMode::Retype);

        let mut policy = ConversionPolicy::new(Some(Box::new(FixedWindow(Some("firefox")))));
        let mut overrides = HashMap::new();
        overrides.insert("Firefox".to_string(), ConversionMode::Retype);
        policy.set_overrides(&overrides);
        assert_eq!(policy.choose_mode(3, false, &mut no_selection), ConversionMode::Retype);
    }

    #[test]
    fn test_longest_fragment_wins() {
        let mut overrides = HashMap::new();
        overrides.insert("code".to_string(), ConversionMode::Selection);
        overrides.insert("vscode".to_string(), ConversionMode::Retype);
        overrides.insert("vsc".to_string(), ConversionMode::Selection);

        // Map iteration order differs between instances
        for _ in 0..16 {
            let mut policy = ConversionPolicy::new(None);
            policy.set_overrides(&overrides.clone().into_iter().collect());
            assert_eq!(policy.mode_for_class("vscode-insiders"), Some(ConversionMode::Retype));
            assert_eq!(policy.mode_for_class("code-oss"), Some(ConversionMode::Selection));
        }
    }

    #[test]
    fn test_failing_policies_are_no_opinion() {
        let mut policy = ConversionPolicy::new(Some(Box::new(FixedWindow(Some("xterm")))));
        policy.register(Box::new(Failing));
        policy.register(Box::new(Panicking));
        policy.register(Box::new(Always(ConversionMode::Selection)));

        let mut broken = || -> Result<bool> { Err(anyhow!("clipboard gone")) };
        assert_eq!(policy.choose_mode(3, false, &mut broken), ConversionMode::Selection);
    }

    #[test]
    fn test_defaults_to_retype() {
        let mut policy = ConversionPolicy::new(None);
        assert_eq!(policy.choose_mode(3, false, &mut no_selection), ConversionMode::Retype);
        policy.set_prefer_retype(true);
        assert_eq!(policy.choose_mode(3, false, &mut no_selection), ConversionMode::Retype);
    }

    #[test]
    fn test_choose_mode_is_idempotent() {
        let mut policy = ConversionPolicy::new(Some(Box::new(FixedWindow(Some("kitty")))));
        policy.register(Box::new(Always(ConversionMode::Selection)));
        let cases = [(0, false), (4, true), (4, false)];
        for (chars, hold) in cases {
            let first = policy.choose_mode(chars, hold, &mut no_selection);
            let second = policy.choose_mode(chars, hold, &mut no_selection);
            assert_eq!(first, second);
        }
    }
}
