use std::io::Write;
use std::process::Stdio;

use super::model::KokoroError;
use super::vocab::Vocab;
use crate::engines::espeak::{canonicalize_stdin_payload, EspeakConfig};

/// espeak-ng language for a Kokoro voice, from its two-letter prefix
/// (`af_heart` → American English, `hf_alpha` → Hindi).
pub fn voice_lang(voice: &str) -> &'static str {
    match voice.get(..2).unwrap_or_default() {
        "bf" | "bm" => "en-gb",
        "ef" | "em" => "es",
        "ff" => "fr",
        "hf" | "hm" => "hi",
        "if" | "im" => "it",
        "jf" | "jm" => "ja",
        "pf" | "pm" => "pt-br",
        "zf" | "zm" => "cmn",
        _ => "en-us",
    }
}

/// Text split at prosodic boundaries. Words go through espeak-ng, boundaries
/// are encoded directly so the model sees the pauses.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Words(String),
    Boundary(char),
}

/// Convert text to Kokoro token ids.
///
/// All word segments go to espeak-ng in one invocation, one per line; if the
/// line count comes back different the segments are phonemized one by one.
pub fn phonemize(text: &str, lang: &str, vocab: &Vocab, espeak: &EspeakConfig) -> Result<Vec<i64>, KokoroError> {
    let segments = segment(text);
    let words: Vec<&str> = segments
        .iter()
        .filter_map(|s| match s {
            Segment::Words(w) => Some(w.as_str()),
            Segment::Boundary(_) => None,
        })
        .collect();
    if words.is_empty() {
        return Ok(segments
            .iter()
            .filter_map(|s| match s {
                Segment::Boundary(ch) => vocab.id(*ch),
                Segment::Words(_) => None,
            })
            .collect());
    }

    let batched = run_espeak(&words.join("\n"), lang, espeak)?;
    let mut encoded: Vec<Vec<i64>> = batched.lines().map(|l| vocab.encode_ipa(l)).collect();
    if encoded.len() != words.len() {
        log::debug!(
            "espeak-ng returned {} lines for {} segments, phonemizing individually",
            encoded.len(),
            words.len()
        );
        encoded = words
            .iter()
            .map(|w| run_espeak(w, lang, espeak).map(|ipa| vocab.encode_ipa(&ipa)))
            .collect::<Result<_, _>>()?;
    }

    let mut encoded = encoded.into_iter();
    let mut ids = Vec::new();
    for seg in &segments {
        match seg {
            Segment::Words(_) => ids.extend(encoded.next().unwrap_or_default()),
            Segment::Boundary(ch) => ids.extend(vocab.id(*ch)),
        }
    }
    Ok(ids)
}

fn segment(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut words = String::new();
    let mut chars = text.chars().peekable();
    let mut prev: Option<char> = None;

    while let Some(ch) = chars.next() {
        let next = chars.peek().copied();
        let in_number = matches!(ch, '.' | ',')
            && prev.is_some_and(|p| p.is_ascii_digit())
            && next.is_some_and(|n| n.is_ascii_digit());
        prev = Some(ch);

        if let Some(boundary) = boundary(ch).filter(|_| !in_number) {
            push_words(&mut segments, &mut words);
            segments.push(Segment::Boundary(boundary));
        } else if ch.is_whitespace() {
            if !words.is_empty() && !words.ends_with(' ') {
                words.push(' ');
            }
        } else {
            words.push(ch);
        }
    }
    push_words(&mut segments, &mut words);
    segments
}

fn push_words(segments: &mut Vec<Segment>, words: &mut String) {
    let trimmed = words.trim();
    if !trimmed.is_empty() {
        segments.push(Segment::Words(trimmed.to_string()));
    }
    words.clear();
}

fn boundary(ch: char) -> Option<char> {
    match ch {
        '.' | '!' | '?' | ',' | ';' | ':' | '—' | '…' | '"' | '(' | ')' | '\u{201c}' | '\u{201d}' => Some(ch),
        '\n' | '\r' => Some('.'),
        _ => None,
    }
}

fn run_espeak(input: &str, lang: &str, espeak: &EspeakConfig) -> Result<String, KokoroError> {
    let mut child = espeak
        .command()
        .args(["--ipa", "--stdin", "-q", "-v", lang])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => KokoroError::EspeakNotFound,
            _ => KokoroError::Io(e),
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(canonicalize_stdin_payload(input).as_bytes())?;
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(KokoroError::PhonemizerFailed(format!(
            "espeak-ng exited with code {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
