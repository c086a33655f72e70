use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::model::{KokoroError, STYLE_DIM};

type Style = [f32; STYLE_DIM];

/// Style vectors for every voice in a `voices-*.bin` (.npz) archive.
///
/// Row `i` of a voice is the style to use for an utterance of `i` phoneme
/// tokens; longer utterances use the last row.
pub struct VoiceStore {
    voices: HashMap<String, Vec<Style>>,
}

impl VoiceStore {
    /// Load every `<voice>.npy` entry of a numpy zip archive.
    pub fn load(path: &Path) -> Result<Self, KokoroError> {
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| KokoroError::VoiceParse(format!("{}: {e}", path.display())))?;

        let mut voices = HashMap::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| KokoroError::VoiceParse(format!("entry {i}: {e}")))?;
            if entry.is_dir() {
                continue;
            }
            let entry_name = entry.name().to_string();
            let Some(voice) = entry_name.strip_suffix(".npy").filter(|v| !v.is_empty()) else {
                log::debug!("Skipping non-voice archive entry {entry_name}");
                continue;
            };
            let voice = voice.to_string();

            let mut data = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut data)
                .map_err(|e| KokoroError::VoiceParse(format!("{entry_name}: {e}")))?;
            voices.insert(voice, parse_npy(&data, &entry_name)?);
        }

        log::info!("Loaded {} Kokoro voices from {}", voices.len(), path.display());
        Ok(Self { voices })
    }

    pub fn contains(&self, voice: &str) -> bool {
        self.voices.contains_key(voice)
    }

    /// Style row for `voice` at `idx`, clamped to the last row.
    pub fn style(&self, voice: &str, idx: usize) -> Result<&Style, KokoroError> {
        let rows = self
            .voices
            .get(voice)
            .filter(|rows| !rows.is_empty())
            .ok_or_else(|| KokoroError::VoiceNotFound(voice.to_string()))?;
        Ok(&rows[idx.min(rows.len() - 1)])
    }

    /// Voice names in sorted order.
    pub fn list_voices(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.voices.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Decode a little-endian float32, C-ordered `.npy` array whose trailing
/// dimension is [`STYLE_DIM`] (voice files are `[N, 1, 256]`).
fn parse_npy(data: &[u8], name: &str) -> Result<Vec<Style>, KokoroError> {
    let bad = |msg: String| KokoroError::VoiceParse(format!("{name}: {msg}"));

    if data.len() < 10 || &data[..6] != b"\x93NUMPY" {
        return Err(bad("not a numpy array".to_string()));
    }
    let (header_len, header_start) = match data[6] {
        1 => (u16::from_le_bytes([data[8], data[9]]) as usize, 10),
        2 | 3 if data.len() >= 12 => (
            u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize,
            12,
        ),
        major => return Err(bad(format!("unsupported npy version {major}"))),
    };
    let body_start = header_start + header_len;
    let header = data
        .get(header_start..body_start)
        .map(String::from_utf8_lossy)
        .ok_or_else(|| bad(format!("header truncated at {} bytes", data.len())))?;

    if !header.contains("'descr': '<f4'") {
        return Err(bad(format!("expected little-endian float32, header {header}")));
    }
    if header.contains("'fortran_order': True") {
        return Err(bad("fortran-ordered arrays are not supported".to_string()));
    }

    let body = &data[body_start..];
    let row_bytes = STYLE_DIM * 4;
    if body.is_empty() || body.len() % row_bytes != 0 {
        return Err(bad(format!(
            "{} data bytes is not a whole number of {STYLE_DIM}-float rows",
            body.len()
        )));
    }

    Ok(body
        .chunks_exact(row_bytes)
        .map(|row| {
            let mut style = [0f32; STYLE_DIM];
            for (dst, bytes) in style.iter_mut().zip(row.chunks_exact(4)) {
                *dst = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
            style
        })
        .collect())
}
