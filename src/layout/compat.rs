//! Layout compatibility tables
//!
//! Maps XKB layout names to the script they type, so a request for one
//! layout can be satisfied by any installed layout of the same script
//! (e.g. `ru` by `ua`, `es` by `en`).

/// Script typed by a layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Script {
    Latin,
    Cyrillic,
}

impl Script {
    /// Short tag used by the learned dictionary
    pub fn tag(self) -> &'static str {
        match self {
            Script::Latin => "en",
            Script::Cyrillic => "ru",
        }
    }

    pub fn other(self) -> Self {
        match self {
            Script::Latin => Script::Cyrillic,
            Script::Cyrillic => Script::Latin,
        }
    }

    /// Script of a piece of text: Cyrillic if it contains any Cyrillic letter
    pub fn detect(text: &str) -> Self {
        if text.chars().any(is_cyrillic) {
            Script::Cyrillic
        } else {
            Script::Latin
        }
    }
}

/// Check if a character is in the Cyrillic blocks
pub fn is_cyrillic(ch: char) -> bool {
    matches!(ch as u32, 0x0400..=0x04FF | 0x0500..=0x052F)
}

/// Alternative names → canonical layout name
const ALIASES: &[(&str, &str)] = &[
    ("us", "en"),
    ("gb", "en"),
    ("eng", "en"),
    ("english", "en"),
    ("uk", "ua"),
    ("ukr", "ua"),
    ("rus", "ru"),
    ("russian", "ru"),
    ("be", "by"),
];

const LATIN_LAYOUTS: &[&str] = &[
    "en", "de", "fr", "es", "it", "pt", "nl", "se", "no", "dk", "fi", "pl", "cz", "sk", "hu",
    "ro", "tr", "latam", "br", "ch", "at", "ie", "ee", "lv", "lt",
];

const CYRILLIC_LAYOUTS: &[&str] = &["ru", "ua", "by", "bg", "kz", "mk", "rs", "mn", "kg"];

/// Normalize a layout name: lowercase, variant stripped, aliases resolved.
///
/// `"us(intl)"`, `"US"` and `"us:dvorak"` all become `"en"`.
pub fn normalize(layout: &str) -> String {
    let base = layout
        .trim()
        .split(|c: char| c == '(' || c == ':' || c == '+' || c == '-' || c == '_')
        .next()
        .unwrap_or("")
        .to_lowercase();
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == base)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(base)
}

/// Script a layout belongs to, if known
pub fn script_of(layout: &str) -> Option<Script> {
    let name = normalize(layout);
    if LATIN_LAYOUTS.contains(&name.as_str()) {
        Some(Script::Latin)
    } else if CYRILLIC_LAYOUTS.contains(&name.as_str()) {
        Some(Script::Cyrillic)
    } else {
        None
    }
}

/// Check if two layouts type the same script (or are the same layout)
pub fn are_compatible(a: &str, b: &str) -> bool {
    let (na, nb) = (normalize(a), normalize(b));
    if na == nb {
        return true;
    }
    matches!((script_of(&na), script_of(&nb)), (Some(x), Some(y)) if x == y)
}

/// Find an available layout that can stand in for `target`.
///
/// Exact (normalized) matches win; otherwise the first available layout of
/// the same script. Returns the name as it appears in `available`.
pub fn find_compatible_layout<S: AsRef<str>>(target: &str, available: &[S]) -> Option<String> {
    let wanted = normalize(target);

    if let Some(exact) = available.iter().find(|l| normalize(l.as_ref()) == wanted) {
        return Some(exact.as_ref().to_string());
    }

    let script = script_of(&wanted)?;
    available
        .iter()
        .find(|l| script_of(l.as_ref()) == Some(script))
        .map(|l| l.as_ref().to_string())
}

/// First available layout typing `script`
pub fn layout_for_script<S: AsRef<str>>(script: Script, available: &[S]) -> Option<String> {
    available
        .iter()
        .find(|l| script_of(l.as_ref()) == Some(script))
        .map(|l| l.as_ref().to_string())
}
