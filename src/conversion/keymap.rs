//! Key-position text conversion
//!
//! Maps text typed on US QWERTY to what the same keys produce on the
//! Russian ЙЦУКЕН layout, and back. Characters without a counterpart
//! (digits, whitespace, most symbols) pass through unchanged.

use crate::layout::Script;

/// Text conversion between layouts
pub trait TextConverter: Send + Sync {
    /// Convert `text` to the given script
    fn convert_to(&self, text: &str, target: Script) -> String;

    /// Convert to whichever script `text` is not written in
    fn convert(&self, text: &str) -> String {
        self.convert_to(text, Script::detect(text).other())
    }
}

/// Same physical key on QWERTY and ЙЦУКЕН, unshifted then shifted
const KEY_PAIRS: &[(char, char)] = &[
    ('`', 'ё'),
    ('q', 'й'),
    ('w', 'ц'),
    ('e', 'у'),
    ('r', 'к'),
    ('t', 'е'),
    ('y', 'н'),
    ('u', 'г'),
    ('i', 'ш'),
    ('o', 'щ'),
    ('p', 'з'),
    ('[', 'х'),
    (']', 'ъ'),
    ('a', 'ф'),
    ('s', 'ы'),
    ('d', 'в'),
    ('f', 'а'),
    ('g', 'п'),
    ('h', 'р'),
    ('j', 'о'),
    ('k', 'л'),
    ('l', 'д'),
    (';', 'ж'),
    ('\'', 'э'),
    ('z', 'я'),
    ('x', 'ч'),
    ('c', 'с'),
    ('v', 'м'),
    ('b', 'и'),
    ('n', 'т'),
    ('m', 'ь'),
    (',', 'б'),
    ('.', 'ю'),
    ('/', '.'),
    ('~', 'Ё'),
    ('{', 'Х'),
    ('}', 'Ъ'),
    (':', 'Ж'),
    ('"', 'Э'),
    ('<', 'Б'),
    ('>', 'Ю'),
    ('?', ','),
    ('@', '"'),
    ('#', '№'),
    ('$', ';'),
    ('^', ':'),
    ('&', '?'),
    ('|', '/'),
];

/// QWERTY ↔ ЙЦУКЕН converter
#[derive(Debug, Default, Clone, Copy)]
pub struct KeymapConverter;

impl KeymapConverter {
    pub fn new() -> Self {
        Self
    }

    fn to_cyrillic(ch: char) -> char {
        if let Some(&(_, cyr)) = KEY_PAIRS.iter().find(|(lat, _)| *lat == ch) {
            return cyr;
        }
        // Shifted letters: Q → Й
        if ch.is_ascii_uppercase() {
            let lower = ch.to_ascii_lowercase();
            if let Some(&(_, cyr)) = KEY_PAIRS.iter().find(|(lat, _)| *lat == lower) {
                return cyr.to_uppercase().next().unwrap_or(cyr);
            }
        }
        ch
    }

    fn to_latin(ch: char) -> char {
        if let Some(&(lat, _)) = KEY_PAIRS.iter().find(|(_, cyr)| *cyr == ch) {
            return lat;
        }
        if ch.is_uppercase() {
            let lower = ch.to_lowercase().next().unwrap_or(ch);
            if let Some(&(lat, _)) = KEY_PAIRS.iter().find(|(_, cyr)| *cyr == lower) {
                if lat.is_ascii_alphabetic() {
                    return lat.to_ascii_uppercase();
                }
            }
        }
        ch
    }
}

impl TextConverter for KeymapConverter {
    fn convert_to(&self, text: &str, target: Script) -> String {
        match target {
            Script::Cyrillic => text.chars().map(Self::to_cyrillic).collect(),
            Script::Latin => text.chars().map(Self::to_latin).collect(),
        }
    }
}
