//! Learned dictionary
//!
//! Remembers which words the user converted by hand (candidates for
//! automatic conversion) and which automatic conversions the user
//! reversed (never convert those again). Stored as TOML under the XDG
//! data directory.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::keymap::TextConverter;
use crate::layout::Script;

/// Manual conversions needed before a word converts automatically
pub const AUTO_CONVERT_MIN_COUNT: u32 = 2;

/// Shortest word considered for automatic conversion
pub const MIN_AUTO_WORD_CHARS: usize = 2;

/// Word knowledge used by correction learning and auto-convert
pub trait LearnedDictionary: Send {
    /// Should `word` (typed in `from`) be converted to `to` without asking?
    fn should_auto_convert(&self, word: &str, from: Script, to: Script) -> bool;

    /// Dictionary-specific conversion, overriding the key-position converter
    fn convert_text(&self, _text: &str, _to: Script) -> Option<String> {
        None
    }

    /// Canonical form of a word for comparison
    fn canonicalize(&self, word: &str, _script: Script) -> Result<String> {
        Ok(word.to_lowercase())
    }

    /// The user reversed an automatic conversion of `word`
    fn add_correction(&mut self, word: &str, script: Script) -> Result<()>;

    /// The user converted `source` to `converted` by hand
    fn add_conversion(&mut self, source: &str, converted: &str, from: Script, to: Script)
        -> Result<()>;
}

pub type SharedDictionary = Arc<Mutex<dyn LearnedDictionary>>;

// ============================================================================
// File store
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct ConversionEntry {
    converted: String,
    to: String,
    count: u32,
    last_used: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct CorrectionEntry {
    added: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct DictionaryData {
    /// "script:word" → learned conversion
    conversions: BTreeMap<String, ConversionEntry>,
    /// "script:word" → never auto-convert
    corrections: BTreeMap<String, CorrectionEntry>,
}

fn entry_key(word: &str, script: Script) -> String {
    format!("{}:{}", script.tag(), word.trim().to_lowercase())
}

/// TOML-backed dictionary. Saves after every change when a path is set.
pub struct FileDictionary {
    path: Option<PathBuf>,
    data: DictionaryData,
}

impl FileDictionary {
    /// In-memory only
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: DictionaryData::default(),
        }
    }

    /// Default location: ~/.local/share/relayout/learned.toml
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("relayout").join("learned.toml"))
    }

    /// Load from `path`; a missing or unreadable file starts empty
    pub fn open(path: &Path) -> Self {
        let data = match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<DictionaryData>(&content) {
                Ok(data) => {
                    info!(
                        "Learned dictionary loaded: {} conversions, {} corrections",
                        data.conversions.len(),
                        data.corrections.len()
                    );
                    data
                }
                Err(e) => {
                    warn!("Failed to parse {}: {}", path.display(), e);
                    DictionaryData::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => DictionaryData::default(),
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                DictionaryData::default()
            }
        };

        Self {
            path: Some(path.to_path_buf()),
            data,
        }
    }

    pub fn shared(self) -> SharedDictionary {
        Arc::new(Mutex::new(self))
    }

    pub fn conversion_count(&self, word: &str, script: Script) -> u32 {
        self.data
            .conversions
            .get(&entry_key(word, script))
            .map(|e| e.count)
            .unwrap_or(0)
    }

    pub fn is_corrected(&self, word: &str, script: Script) -> bool {
        self.data.corrections.contains_key(&entry_key(word, script))
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content =
            toml::to_string_pretty(&self.data).context("Failed to serialize learned dictionary")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Learned dictionary saved: {}", path.display());
        Ok(())
    }
}

impl LearnedDictionary for FileDictionary {
    fn should_auto_convert(&self, word: &str, from: Script, to: Script) -> bool {
        let key = entry_key(word, from);
        if self.data.corrections.contains_key(&key) {
            return false;
        }
        self.data
            .conversions
            .get(&key)
            .map(|e| e.to == to.tag() && e.count >= AUTO_CONVERT_MIN_COUNT)
            .unwrap_or(false)
    }

    fn convert_text(&self, text: &str, to: Script) -> Option<String> {
        let from = Script::detect(text);
        let entry = self.data.conversions.get(&entry_key(text, from))?;
        // Stored lowercase: only trust it for lowercase input
        (entry.to == to.tag() && text.trim() == text.trim().to_lowercase())
            .then(|| entry.converted.clone())
    }

    fn add_correction(&mut self, word: &str, script: Script) -> Result<()> {
        let key = entry_key(word, script);
        self.data.conversions.remove(&key);
        self.data
            .corrections
            .insert(key.clone(), CorrectionEntry { added: Utc::now() });
        info!("Learned correction: {}", key);
        self.save()
    }

    fn add_conversion(
        &mut self,
        source: &str,
        converted: &str,
        from: Script,
        to: Script,
    ) -> Result<()> {
        let key = entry_key(source, from);
        if source.trim().is_empty() || self.data.corrections.contains_key(&key) {
            return Ok(());
        }
        let entry = self
            .data
            .conversions
            .entry(key.clone())
            .or_insert_with(|| ConversionEntry {
                converted: String::new(),
                to: to.tag().to_string(),
                count: 0,
                last_used: Utc::now(),
            });
        entry.converted = converted.trim().to_lowercase();
        entry.to = to.tag().to_string();
        entry.count = entry.count.saturating_add(1);
        entry.last_used = Utc::now();
        debug!("Learned conversion: {} (x{})", key, entry.count);
        self.save()
    }
}

// ============================================================================
// Auto-convert decision
// ============================================================================

/// Result of an auto-convert check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub convert: bool,
    /// Replacement text when `convert` is true
    pub text: String,
    pub reason: &'static str,
}

impl Decision {
    fn skip(reason: &'static str) -> Self {
        Self {
            convert: false,
            text: String::new(),
            reason,
        }
    }
}

/// Decides whether a finished word should be converted automatically
pub trait AutoConvertDetector: Send {
    fn should_convert(&self, word: &str) -> Decision;
}

/// Auto-convert words the user has converted by hand before
pub struct LearnedDetector {
    dictionary: SharedDictionary,
    converter: Arc<dyn TextConverter>,
}

impl LearnedDetector {
    pub fn new(dictionary: SharedDictionary, converter: Arc<dyn TextConverter>) -> Self {
        Self {
            dictionary,
            converter,
        }
    }
}

impl AutoConvertDetector for LearnedDetector {
    fn should_convert(&self, word: &str) -> Decision {
        let word = word.trim();
        if word.chars().count() < MIN_AUTO_WORD_CHARS {
            return Decision::skip("too short");
        }

        let from = Script::detect(word);
        let to = from.other();
        let dictionary = self.dictionary.lock().unwrap_or_else(|e| e.into_inner());
        if !dictionary.should_auto_convert(word, from, to) {
            return Decision::skip("not learned");
        }

        let text = dictionary
            .convert_text(word, to)
            .unwrap_or_else(|| self.converter.convert_to(word, to));
        if text == word {
            return Decision::skip("unchanged");
        }

        Decision {
            convert: true,
            text,
            reason: "learned",
        }
    }
}
