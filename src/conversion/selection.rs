//! Selection-based conversion
//!
//! Converts highlighted text without replaying keystrokes:
//! read the primary selection, widen it to the whole word if needed,
//! convert, and paste the result back over it. When no safe-replace
//! primitive exists the paste goes through the clipboard, and the user's
//! previous clipboard contents are always put back afterwards.

use anyhow::Result;
use log::{debug, info, warn};
use std::time::Duration;
use thiserror::Error;

use crate::constants::MAX_EXPAND_STEPS;

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("No clipboard tool available for this session")]
    NoTool,

    #[error("Failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} timed out after {timeout:?}")]
    Timeout { tool: String, timeout: Duration },

    #[error("{tool} failed: {message}")]
    Command { tool: String, message: String },

    #[error("Paste failed: {0}")]
    Paste(String),
}

/// Clipboard and primary selection access (required)
pub trait SelectionService: Send {
    fn primary_selection(&mut self, timeout: Duration) -> Result<String, SelectionError>;
    fn clipboard(&mut self) -> Result<String, SelectionError>;
    fn set_clipboard(&mut self, text: &str) -> Result<(), SelectionError>;
    /// Paste the clipboard into the focused window
    fn paste_clipboard(&mut self) -> Result<(), SelectionError>;
}

/// Single-call selection widening to the previous whitespace
pub trait SelectionExpander: Send {
    /// Ok(false) if nothing was done
    fn expand_to_space(&mut self) -> Result<bool, SelectionError>;
}

/// Direct selection replacement that leaves the clipboard alone
pub trait SafeReplace: Send {
    /// Ok(false) if the replacement did not happen
    fn replace_selection(&mut self, text: &str, selected: &str) -> Result<bool, SelectionError>;
}

/// Keystrokes that grow the selection leftwards
pub trait SelectionKeys: Send {
    /// One character (Shift+Left)
    fn extend_left(&mut self) -> Result<()>;
    /// One word (Ctrl+Shift+Left)
    fn extend_word_left(&mut self) -> Result<()>;
}

/// Result of one selection conversion (before whitespace is re-attached)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionOutcome {
    pub original: String,
    pub converted: String,
}

impl SelectionOutcome {
    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }
}

/// Whitespace split of the text being replaced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSnapshot {
    pub original_text: String,
    pub converted_text: String,
    pub leading_whitespace: String,
    pub trailing_whitespace: String,
}

impl SelectionSnapshot {
    /// Text to paste over the selection
    pub fn replacement(&self) -> String {
        format!(
            "{}{}{}",
            self.leading_whitespace,
            self.converted_text.trim(),
            self.trailing_whitespace
        )
    }
}

/// Split `text` into (leading whitespace, core, trailing whitespace)
fn split_whitespace_edges(text: &str) -> (&str, &str, &str) {
    let start = text.len() - text.trim_start().len();
    let end = text.trim_end().len().max(start);
    (&text[..start], &text[start..end], &text[end..])
}

pub struct SelectionProtocol {
    service: Box<dyn SelectionService>,
    expander: Option<Box<dyn SelectionExpander>>,
    safe_replace: Option<Box<dyn SafeReplace>>,
    keys: Option<Box<dyn SelectionKeys>>,
    read_timeout: Duration,
    paste_settle: Duration,
    /// Last text we pasted; a primary selection equal to it is not the user's
    last_written: Option<String>,
}

impl SelectionProtocol {
    pub fn new(service: Box<dyn SelectionService>, read_timeout: Duration) -> Self {
        Self {
            service,
            expander: None,
            safe_replace: None,
            keys: None,
            read_timeout,
            paste_settle: Duration::ZERO,
            last_written: None,
        }
    }

    pub fn with_expander(mut self, expander: Box<dyn SelectionExpander>) -> Self {
        self.expander = Some(expander);
        self
    }

    pub fn with_safe_replace(mut self, safe_replace: Box<dyn SafeReplace>) -> Self {
        self.safe_replace = Some(safe_replace);
        self
    }

    pub fn with_keys(mut self, keys: Box<dyn SelectionKeys>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Delay between pasting and restoring the clipboard
    pub fn with_paste_settle(mut self, settle: Duration) -> Self {
        self.paste_settle = settle;
        self
    }

    pub fn set_timeouts(&mut self, read_timeout: Duration, paste_settle: Duration) {
        self.read_timeout = read_timeout;
        self.paste_settle = paste_settle;
    }

    /// Is something highlighted that we did not put there ourselves?
    pub fn has_selection(&mut self) -> Result<bool> {
        let selected = self.service.primary_selection(self.read_timeout)?;
        if selected.is_empty() {
            return Ok(false);
        }
        Ok(self.last_written.as_deref() != Some(selected.as_str()))
    }

    fn read(&mut self) -> String {
        match self.service.primary_selection(self.read_timeout) {
            Ok(text) => text,
            Err(e) => {
                debug!("Primary selection unreadable: {}", e);
                String::new()
            }
        }
    }

    /// Widen a whitespace-free selection to the start of its word
    fn expand(&mut self, selected: &str) -> String {
        if let Some(expander) = self.expander.as_mut() {
            match expander.expand_to_space() {
                Ok(true) => {
                    let expanded = self.read();
                    if !expanded.is_empty() {
                        return expanded;
                    }
                }
                Ok(false) => {}
                Err(e) => debug!("Selection expander failed: {}", e),
            }
        }

        let Some(mut keys) = self.keys.take() else {
            return selected.to_string();
        };

        let mut current = selected.to_string();
        for _ in 0..MAX_EXPAND_STEPS {
            if let Err(e) = keys.extend_left() {
                debug!("Extend-left failed: {}", e);
                break;
            }
            let next = self.read();
            let grew = next.chars().count() > current.chars().count();
            if grew {
                current = next;
            }
            if !grew || current.chars().any(char::is_whitespace) {
                break;
            }
        }

        if !current.chars().any(char::is_whitespace) {
            match keys.extend_word_left() {
                Ok(()) => {
                    let next = self.read();
                    if next.chars().count() > current.chars().count() {
                        current = next;
                    }
                }
                Err(e) => debug!("Extend-word-left failed: {}", e),
            }
        }

        self.keys = Some(keys);
        current
    }

    /// Convert the selected text in place.
    ///
    /// `switch_layout` always runs once there is something to convert,
    /// before the replacement is written. An empty outcome means nothing
    /// was selected.
    pub fn convert(
        &mut self,
        convert_fn: &dyn Fn(&str) -> String,
        user_has_selection: bool,
        prefer_trim_leading: bool,
        switch_layout: Option<&mut dyn FnMut()>,
    ) -> Result<SelectionOutcome, SelectionError> {
        let selected = self.read();
        if selected.is_empty() {
            debug!("Nothing selected");
            return Ok(SelectionOutcome::default());
        }

        let mut outside_leading = String::new();
        let text = if !user_has_selection && !selected.chars().any(char::is_whitespace) {
            let expanded = self.expand(&selected);
            // Whitespace in front came from expansion, not from the user
            let (leading, _, _) = split_whitespace_edges(&expanded);
            outside_leading.push_str(leading);
            expanded[leading.len()..].to_string()
        } else {
            selected
        };

        let (inside_leading, core, trailing) = split_whitespace_edges(&text);
        if core.is_empty() {
            return Ok(SelectionOutcome::default());
        }

        if let Some(switch) = switch_layout {
            switch();
        }

        let converted = convert_fn(core);
        let snapshot = SelectionSnapshot {
            original_text: core.to_string(),
            converted_text: converted.clone(),
            leading_whitespace: if prefer_trim_leading {
                outside_leading
            } else {
                format!("{}{}", outside_leading, inside_leading)
            },
            trailing_whitespace: trailing.to_string(),
        };
        let replacement = snapshot.replacement();

        self.replace(&replacement, &text)?;
        self.last_written = Some(replacement);

        info!("Selection converted: '{}' → '{}'", core, converted.trim());
        Ok(SelectionOutcome {
            original: snapshot.original_text,
            converted,
        })
    }

    fn replace(&mut self, replacement: &str, selected: &str) -> Result<(), SelectionError> {
        if let Some(safe) = self.safe_replace.as_mut() {
            match safe.replace_selection(replacement, selected) {
                Ok(true) => return Ok(()),
                Ok(false) => debug!("Safe replace declined, using clipboard"),
                Err(e) => warn!("Safe replace failed, using clipboard: {}", e),
            }
        }

        let saved = match self.service.clipboard() {
            Ok(saved) => Some(saved),
            Err(e) => {
                debug!("Clipboard unreadable, it will not be restored: {}", e);
                None
            }
        };

        self.service.set_clipboard(replacement)?;
        let pasted = self.service.paste_clipboard();
        if !self.paste_settle.is_zero() {
            std::thread::sleep(self.paste_settle);
        }

        if let Some(saved) = saved {
            if let Err(e) = self.service.set_clipboard(&saved) {
                warn!("Failed to restore clipboard: {}", e);
            }
        }
        pasted
    }
}
