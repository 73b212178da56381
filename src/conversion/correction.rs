//! Correction learning
//!
//! When the user manually reverses an automatic conversion shortly after it
//! happened, the word is recorded so it is never auto-converted again.

use log::{info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use super::dictionary::LearnedDictionary;
use crate::layout::Script;

/// Left behind by an automatic conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoConvertMarker {
    /// Word as typed
    pub source_word: String,
    /// What it was converted to
    pub converted_word: String,
    pub timestamp: Instant,
}

impl AutoConvertMarker {
    pub fn new(source_word: &str, converted_word: &str) -> Self {
        Self {
            source_word: source_word.to_string(),
            converted_word: converted_word.to_string(),
            timestamp: Instant::now(),
        }
    }

    pub fn is_stale(&self, timeout: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.timestamp) >= timeout
    }
}

/// Canonical form used to compare words.
///
/// Trimmed and lowercased; the dictionary may refine it further. A failing
/// or panicking dictionary falls back to the lowercase form.
pub fn canonicalize(text: &str, dictionary: Option<&dyn LearnedDictionary>) -> String {
    let trimmed = text.trim();
    let lower = trimmed.to_lowercase();
    let Some(dictionary) = dictionary else {
        return lower;
    };

    let script = Script::detect(trimmed);
    match panic::catch_unwind(AssertUnwindSafe(|| dictionary.canonicalize(&lower, script))) {
        Ok(Ok(canonical)) => canonical,
        Ok(Err(e)) => {
            warn!("Canonicalizer failed for '{}': {}", lower, e);
            lower
        }
        Err(_) => {
            warn!("Canonicalizer panicked for '{}'", lower);
            lower
        }
    }
}

/// Did the user just undo `marker`'s automatic conversion?
///
/// True iff the marker is younger than `timeout` and the manual conversion
/// went from exactly the auto-converted text back to exactly the source word.
pub fn is_correction(
    marker: &AutoConvertMarker,
    original: &str,
    converted: &str,
    timeout: Duration,
    now: Instant,
    dictionary: Option<&dyn LearnedDictionary>,
) -> bool {
    if marker.is_stale(timeout, now) {
        return false;
    }
    canonicalize(original, dictionary) == canonicalize(&marker.converted_word, dictionary)
        && canonicalize(converted, dictionary) == canonicalize(&marker.source_word, dictionary)
}

/// Record `word` as a correction. Returns whether it was recorded.
pub fn apply_correction(dictionary: &mut dyn LearnedDictionary, word: &str) -> bool {
    let word = word.trim().to_lowercase();
    if word.is_empty() {
        return false;
    }
    let script = Script::detect(&word);
    match dictionary.add_correction(&word, script) {
        Ok(()) => {
            info!("Correction learned: '{}' ({})", word, script.tag());
            true
        }
        Err(e) => {
            warn!("Failed to record correction for '{}': {}", word, e);
            false
        }
    }
}
