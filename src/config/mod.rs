//! Configuration file management
//!
//! Loads TOML configuration files and provides application settings.
//! Default config path: ~/.config/relayout/config.toml

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(target_os = "linux")]
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
#[cfg(target_os = "linux")]
use std::sync::mpsc;

use crate::constants;
use crate::conversion::ConversionMode;
use crate::input::interpreter::{InterpreterConfig, TriggerKeys};
use crate::input::keycodes::{self, KEY_LEFTALT, KEY_LEFTCTRL, KEY_LEFTMETA, KEY_LEFTSHIFT};
use crate::input::keycodes::{KEY_RIGHTALT, KEY_RIGHTCTRL, KEY_RIGHTMETA, KEY_RIGHTSHIFT};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Double-tap trigger settings
    pub hotkey: HotkeyConfig,
    /// Conversion behavior
    pub conversion: ConversionConfig,
    /// Layout list and switching
    pub layouts: LayoutsConfig,
    /// Input device filtering
    pub devices: DevicesConfig,
    /// Clipboard / primary selection timing
    pub selection: SelectionConfig,
}

/// Double-tap trigger settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    /// Trigger key name(s): "shift" (either side), "left_shift", "right_ctrl", ...
    #[serde(deserialize_with = "deserialize_key_list")]
    pub trigger: Vec<String>,
    /// Max gap between the two taps (default: 300)
    pub double_tap_timeout_ms: u64,
    /// Trigger releases ignored this long after a replay (default: 150)
    pub replay_suppress_ms: u64,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            trigger: vec!["shift".to_string()],
            double_tap_timeout_ms: constants::DOUBLE_TAP_TIMEOUT_MS,
            replay_suppress_ms: constants::REPLAY_SUPPRESS_MS,
        }
    }
}

impl HotkeyConfig {
    /// Resolve trigger names to key codes. Unknown names are skipped with a warning.
    pub fn trigger_keys(&self) -> TriggerKeys {
        let mut codes = Vec::new();
        for name in &self.trigger {
            let resolved: Vec<u16> = match name.trim().to_lowercase().as_str() {
                "shift" => vec![KEY_LEFTSHIFT, KEY_RIGHTSHIFT],
                "ctrl" | "control" => vec![KEY_LEFTCTRL, KEY_RIGHTCTRL],
                "alt" => vec![KEY_LEFTALT, KEY_RIGHTALT],
                "super" | "meta" => vec![KEY_LEFTMETA, KEY_RIGHTMETA],
                other => match keycodes::key_from_name(other) {
                    Some(code) => vec![code],
                    None => {
                        warn!("Unknown trigger key '{}', ignoring", name);
                        Vec::new()
                    }
                },
            };
            for code in resolved {
                if !codes.contains(&code) {
                    codes.push(code);
                }
            }
        }

        if codes.is_empty() {
            TriggerKeys::default()
        } else {
            TriggerKeys::new(codes)
        }
    }

    pub fn interpreter_config(&self) -> InterpreterConfig {
        InterpreterConfig {
            trigger: self.trigger_keys(),
            double_tap_timeout: Duration::from_millis(self.double_tap_timeout_ms),
            replay_suppress: Duration::from_millis(self.replay_suppress_ms),
        }
    }
}

/// Conversion behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Convert learned words automatically when a word ends (default: false)
    pub auto_convert: bool,
    /// Prefer retype mode when nothing else decides (default: false)
    pub prefer_retype: bool,
    /// Window for recognizing a manual undo of an auto-conversion (default: 5)
    pub correction_timeout_secs: u64,
    /// Drop whitespace selected by the user in front of the word (default: false)
    pub trim_leading_whitespace: bool,
    /// Pause between replayed keystrokes (default: 5)
    pub replay_key_delay_ms: u64,
    /// Window class → "retype" | "selection"
    pub app_modes: HashMap<String, ConversionMode>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            auto_convert: false,
            prefer_retype: false,
            correction_timeout_secs: constants::CORRECTION_TIMEOUT_SECS,
            trim_leading_whitespace: false,
            replay_key_delay_ms: constants::REPLAY_KEY_DELAY_MS,
            app_modes: HashMap::new(),
        }
    }
}

impl ConversionConfig {
    pub fn correction_timeout(&self) -> Duration {
        Duration::from_secs(self.correction_timeout_secs)
    }
}

/// Layout list and switching
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutsConfig {
    /// Layouts in switch order (empty = ask the system)
    pub layouts: Vec<String>,
    /// Key combo the desktop uses to switch layouts (default: "super+space")
    pub switch_keys: String,
    /// Shell command that switches to the next layout (overrides switch_keys)
    pub switch_command: Option<String>,
    /// How often to re-read the system layout list (default: 5, 0 = never)
    pub poll_interval_secs: u64,
}

impl Default for LayoutsConfig {
    fn default() -> Self {
        Self {
            layouts: Vec::new(),
            switch_keys: "super+space".to_string(),
            switch_command: None,
            poll_interval_secs: constants::LAYOUT_POLL_INTERVAL_SECS,
        }
    }
}

impl LayoutsConfig {
    /// None when polling is off
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_secs > 0).then(|| Duration::from_secs(self.poll_interval_secs))
    }
}

/// Input device filtering
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    /// Extra device name fragments to ignore (case-insensitive)
    pub exclude: Vec<String>,
    /// Track devices plugged in at runtime (default: true)
    pub hotplug: bool,
    /// Wait before opening a new device node (default: 300)
    pub settle_delay_ms: u64,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            hotplug: true,
            settle_delay_ms: constants::HOTPLUG_SETTLE_DELAY_MS,
        }
    }
}

/// Clipboard / primary selection timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Primary selection read timeout (default: 500)
    pub read_timeout_ms: u64,
    /// Wait after pasting before the clipboard is restored (default: 80)
    pub paste_settle_ms: u64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: constants::SELECTION_READ_TIMEOUT_MS,
            paste_settle_ms: constants::PASTE_SETTLE_MS,
        }
    }
}

impl SelectionConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn paste_settle(&self) -> Duration {
        Duration::from_millis(self.paste_settle_ms)
    }
}

/// Accept either `"shift"` or `["left_shift", "right_ctrl"]`
fn deserialize_key_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct KeyListVisitor;

    impl<'de> Visitor<'de> for KeyListVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a key name or array of key names")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![value.to_string()])
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut keys = Vec::new();
            while let Some(key) = seq.next_element::<String>()? {
                keys.push(key);
            }
            Ok(keys)
        }
    }

    deserializer.deserialize_any(KeyListVisitor)
}

/// Commented template written by `--init-config`
const CONFIG_TEMPLATE: &str = r#"# relayout configuration
# Changes are picked up while relayout is running.

[hotkey]
# Double-tap this key to convert the last word.
# "shift" means either shift key; also "left_shift", "right_ctrl", "alt", ...
trigger = "shift"
double_tap_timeout_ms = 300
replay_suppress_ms = 150

[conversion]
# Convert words automatically once you have converted them by hand twice.
auto_convert = false
prefer_retype = false
correction_timeout_secs = 5
trim_leading_whitespace = false
replay_key_delay_ms = 5

# Per-application mode, keyed by window class (X11 only).
[conversion.app_modes]
# firefox = "selection"
# code = "retype"

[layouts]
# Layouts in switch order. Empty: read from `setxkbmap -query`.
layouts = []
# The key combo your desktop uses to switch layouts.
switch_keys = "super+space"
# Or a command that switches to the next layout:
# switch_command = "xkb-switch -n"
poll_interval_secs = 5

[devices]
# Device name fragments to ignore (case-insensitive).
exclude = []
hotplug = true
settle_delay_ms = 300

[selection]
read_timeout_ms = 500
paste_settle_ms = 80
"#;

impl Config {
    /// System-wide config path
    const SYSTEM_CONFIG_PATH: &'static str = "/etc/relayout/config.toml";

    /// Get the path that would be used for loading config
    /// Returns None if using built-in defaults
    pub fn config_path() -> Option<PathBuf> {
        // 1. RELAYOUT_CONFIG environment variable
        if let Ok(path) = std::env::var("RELAYOUT_CONFIG") {
            let p = Path::new(&path);
            if p.exists() {
                return Some(p.to_path_buf());
            }
        }

        // 2. User config: ~/.config/relayout/config.toml
        if let Some(config_path) = default_config_path() {
            if config_path.exists() {
                return Some(config_path);
            }
        }

        // 3. System config: /etc/relayout/config.toml
        let system_config = Path::new(Self::SYSTEM_CONFIG_PATH);
        if system_config.exists() {
            return Some(system_config.to_path_buf());
        }

        None
    }

    /// Load configuration with priority:
    /// 1. RELAYOUT_CONFIG environment variable
    /// 2. ~/.config/relayout/config.toml (user config)
    /// 3. /etc/relayout/config.toml (system config)
    /// 4. Built-in defaults
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            match Self::load_from_file(&path) {
                Ok(config) => {
                    info!("Loaded config: {}", path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to load config {}: {:#}", path.display(), e);
                }
            }
        }
        info!("Using built-in default config");
        Self::default()
    }

    /// Load settings from specified path
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Write the commented default config to `path`
    pub fn write_default_config_to(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            anyhow::bail!(
                "Config file already exists: {} (use --force to overwrite)",
                path.display()
            );
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, CONFIG_TEMPLATE)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Write default config to the user config path
    pub fn write_default_config(force: bool) -> Result<PathBuf> {
        let path =
            default_config_path().ok_or_else(|| anyhow::anyhow!("Config directory not found"))?;
        Self::write_default_config_to(&path, force)?;
        Ok(path)
    }
}

/// Config file change watcher (Linux only)
#[cfg(target_os = "linux")]
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<()>,
}

#[cfg(target_os = "linux")]
impl ConfigWatcher {
    /// Start watching config file
    pub fn new(config_path: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let file_name = config_path.file_name().map(|n| n.to_os_string());

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                // Editors often save by writing a temp file and renaming it
                use notify::EventKind;
                let ours = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                if ours && matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    let _ = tx.send(());
                }
            }
        })?;

        // Watch the parent directory to catch rename operations
        let watch_path = config_path.parent().unwrap_or(config_path);
        watcher.watch(watch_path, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Check if config file was modified (non-blocking)
    pub fn check_reload(&self) -> bool {
        let mut changed = false;
        while self.rx.try_recv().is_ok() {
            changed = true;
        }
        changed
    }
}

/// Get default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("relayout").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_template_matches_defaults() {
        let config: Config = toml::from_str(CONFIG_TEMPLATE).unwrap();
        let defaults = Config::default();
        assert_eq!(config.hotkey.trigger, defaults.hotkey.trigger);
        assert_eq!(
            config.hotkey.double_tap_timeout_ms,
            defaults.hotkey.double_tap_timeout_ms
        );
        assert_eq!(config.layouts.switch_keys, defaults.layouts.switch_keys);
        assert_eq!(config.devices.hotplug, defaults.devices.hotplug);
        assert_eq!(config.selection.paste_settle_ms, defaults.selection.paste_settle_ms);
        assert!(config.conversion.app_modes.is_empty());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [hotkey]
            trigger = ["right_ctrl", "ralt"]

            [conversion]
            auto_convert = true
            app_modes = { firefox = "retype", Code = "selection" }
            "#,
        )
        .unwrap();

        assert_eq!(config.hotkey.double_tap_timeout_ms, 300);
        assert_eq!(
            config.hotkey.trigger_keys(),
            TriggerKeys::new(vec![KEY_RIGHTCTRL, KEY_RIGHTALT])
        );
        assert!(config.conversion.auto_convert);
        assert_eq!(
            config.conversion.app_modes.get("firefox"),
            Some(&ConversionMode::Retype)
        );
        assert_eq!(config.layouts.poll_interval_secs, 5);
        assert_eq!(config.layouts.poll_interval(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_zero_poll_interval_disables_polling() {
        let config: Config = toml::from_str("[layouts]\npoll_interval_secs = 0\n").unwrap();
        assert_eq!(config.layouts.poll_interval(), None);
    }

    #[test]
    fn test_trigger_names() {
        let hotkey = HotkeyConfig {
            trigger: vec!["shift".into(), "left_shift".into(), "bogus".into()],
            ..Default::default()
        };
        assert_eq!(
            hotkey.trigger_keys(),
            TriggerKeys::new(vec![KEY_LEFTSHIFT, KEY_RIGHTSHIFT])
        );

        let hotkey = HotkeyConfig {
            trigger: vec!["bogus".into()],
            ..Default::default()
        };
        assert_eq!(hotkey.trigger_keys(), TriggerKeys::default());
    }

    #[test]
    fn test_write_default_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relayout").join("config.toml");

        Config::write_default_config_to(&path, false).unwrap();
        assert!(Config::load_from_file(&path).is_ok());

        assert!(Config::write_default_config_to(&path, false).is_err());
        assert!(Config::write_default_config_to(&path, true).is_ok());
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[hotkey]\ndouble_tap_timeout_ms = \"soon\"\n").unwrap();
        assert!(Config::load_from_file(&path).is_err());
    }
}
