//! Romanization of Urdu text for backends that only speak Latin script.
//!
//! Three passes, each a pure function of its input:
//!
//! 1. letter and diacritic substitution from [`urdu_letter`],
//! 2. digit and punctuation substitution from [`numeric_class`],
//! 3. generic romanization (`deunicode`) of whatever non-ASCII is left.
//!
//! Arabic-script code points that survive all three passes are dropped, so
//! the output never contains the source script.

use crate::script::{is_arabic, Script};

/// Romanize `text` from `source` script into ASCII-approximate Latin.
///
/// ASCII input is returned unchanged, so applying this to its own output is
/// a no-op.
pub fn transliterate(text: &str, source: Script) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_ascii() {
            out.push(ch);
            continue;
        }
        let mapped = match source {
            Script::Arabic => urdu_letter(ch).or_else(|| numeric_class(ch)),
            Script::Latin => None,
        };
        match mapped {
            Some(seq) => out.push_str(seq),
            None => romanize_fallback(ch, &mut out),
        }
    }
    out
}

fn romanize_fallback(ch: char, out: &mut String) {
    if let Some(seq) = numeric_class(ch) {
        out.push_str(seq);
        return;
    }
    match deunicode::deunicode_char(ch) {
        Some(seq) => out.extend(seq.chars().filter(|c| c.is_ascii() && !is_arabic(*c))),
        None if ch.is_whitespace() => out.push(' '),
        None => {}
    }
}

/// Urdu letters and vowel marks.
fn urdu_letter(ch: char) -> Option<&'static str> {
    let seq = match ch {
        'ا' | 'أ' | 'ٱ' => "a",
        'آ' => "aa",
        'إ' => "i",
        'ب' => "b",
        'پ' => "p",
        'ت' | 'ٹ' | 'ط' | 'ة' | 'ۃ' => "t",
        'ث' | 'س' | 'ص' => "s",
        'ج' => "j",
        'چ' => "ch",
        'ح' | 'ہ' | 'ھ' | 'ۂ' | 'ه' => "h",
        'خ' => "kh",
        'د' | 'ڈ' => "d",
        'ذ' | 'ز' | 'ض' | 'ظ' => "z",
        'ر' | 'ڑ' => "r",
        'ژ' => "zh",
        'ش' => "sh",
        'ع' => "a",
        'غ' => "gh",
        'ف' => "f",
        'ق' => "q",
        'ک' | 'ك' => "k",
        'گ' => "g",
        'ل' => "l",
        'م' => "m",
        'ن' | 'ں' => "n",
        'و' | 'ؤ' => "o",
        'ی' | 'ي' | 'ئ' => "i",
        'ى' => "a",
        'ے' | 'ۓ' => "e",
        'ء' => "'",
        // harakat
        '\u{064E}' => "a",
        '\u{0650}' => "i",
        '\u{064F}' => "u",
        '\u{064B}' => "an",
        '\u{064D}' => "in",
        '\u{064C}' => "un",
        '\u{0670}' => "a",
        '\u{0651}' | '\u{0652}' | '\u{0654}' | '\u{0655}' | '\u{0640}' => "",
        '\u{200C}' | '\u{200D}' => "",
        _ => return None,
    };
    Some(seq)
}

/// Arabic-Indic digits and Arabic punctuation.
fn numeric_class(ch: char) -> Option<&'static str> {
    const DIGITS: [&str; 10] = ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];
    let seq = match ch {
        '\u{0660}'..='\u{0669}' => DIGITS[(ch as u32 - 0x0660) as usize],
        '\u{06F0}'..='\u{06F9}' => DIGITS[(ch as u32 - 0x06F0) as usize],
        '،' | '٬' => ",",
        '؛' => ";",
        '؟' => "?",
        '۔' | '٫' => ".",
        '٪' => "%",
        '\u{060D}' => "/",
        _ => return None,
    };
    Some(seq)
}
