//! Writing-system detection.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::request::Language;

/// Writing system a backend can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Script {
    Latin,
    Arabic,
}

impl Script {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Latin => "latin",
            Self::Arabic => "arabic",
        }
    }

    /// Two-letter language code used when the caller gave no usable hint.
    pub fn default_language(self) -> &'static str {
        match self {
            Self::Latin => "en",
            Self::Arabic => "ur",
        }
    }

    /// Script implied by a language hint, if the hint names one we know.
    pub fn from_language(language: &Language) -> Option<Self> {
        match language {
            Language::English => Some(Self::Latin),
            Language::Urdu => Some(Self::Arabic),
            Language::Other(code) => match code.as_str() {
                "ar" | "fa" | "ps" | "sd" | "ug" => Some(Self::Arabic),
                _ => Some(Self::Latin),
            },
            Language::Auto => None,
        }
    }

    /// Script a single code point belongs to. Digits, punctuation and marks
    /// that are not script-specific return `None`.
    pub fn of(ch: char) -> Option<Self> {
        if is_arabic(ch) {
            return Some(Self::Arabic);
        }
        if ch.is_ascii_alphabetic() || matches!(ch, '\u{00C0}'..='\u{024F}') {
            return Some(Self::Latin);
        }
        None
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True for code points in the Arabic blocks (base, supplement, extended-A,
/// presentation forms A and B).
pub fn is_arabic(ch: char) -> bool {
    matches!(
        ch,
        '\u{0600}'..='\u{06FF}'
            | '\u{0750}'..='\u{077F}'
            | '\u{08A0}'..='\u{08FF}'
            | '\u{FB50}'..='\u{FDFF}'
            | '\u{FE70}'..='\u{FEFF}'
    )
}

/// Majority script among the letters of `text`; `None` when it has no letters.
///
/// Ties go to Arabic, since a Latin-only backend cannot speak half the text.
pub fn sniff(text: &str) -> Option<Script> {
    let (mut latin, mut arabic) = (0usize, 0usize);
    for ch in text.chars().filter(|c| c.is_alphabetic()) {
        match Script::of(ch) {
            Some(Script::Latin) => latin += 1,
            Some(Script::Arabic) => arabic += 1,
            None => {}
        }
    }
    match (latin, arabic) {
        (0, 0) => None,
        (l, a) if a >= l => Some(Script::Arabic),
        _ => Some(Script::Latin),
    }
}

/// Script to synthesize `text` in: sniffed script first, then the hint, then Latin.
pub fn resolve(text: &str, language: &Language) -> Script {
    sniff(text)
        .or_else(|| Script::from_language(language))
        .unwrap_or(Script::Latin)
}

/// Whether a backend limited to `supported` scripts can read `text` as is.
///
/// Script-specific code points (letters, Arabic punctuation and digits) must
/// belong to a supported script, as must letters of scripts we do not
/// classify. Everything else (spaces, quotes, joiners, emoji) is neutral.
pub fn is_renderable(text: &str, supported: &[Script]) -> bool {
    text.chars().all(|c| match Script::of(c) {
        Some(script) => supported.contains(&script),
        None => c.is_ascii() || !c.is_alphabetic(),
    })
}
