use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView2};
use ort::execution_providers::CPUExecutionProvider;
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use super::phonemizer::{phonemize, voice_lang};
use super::vocab::Vocab;
use super::voices::VoiceStore;
use crate::engines::espeak::EspeakConfig;

/// Maximum number of phoneme tokens per inference call (before padding).
pub const MAX_PHONEME_LEN: usize = 510;

/// Style vector dimension for Kokoro.
pub const STYLE_DIM: usize = 256;

/// Output sample rate from the Kokoro model.
pub const SAMPLE_RATE: u32 = 24000;

pub const QUANTIZED_WEIGHTS: &str = "kokoro-quant-convinteger.onnx";
pub const FULL_WEIGHTS: &str = "kokoro-v1.0.onnx";
pub const VOICES_ARCHIVE: &str = "voices-v1.0.bin";

/// 10ms at 24kHz.
const CROSSFADE_SAMPLES: usize = 240;

/// Token ids of `;:,.!?`, preferred split points for long inputs.
const PAUSE_IDS: &[i64] = &[1, 2, 3, 4, 5, 6];

#[derive(thiserror::Error, Debug)]
pub enum KokoroError {
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error(
        "espeak-ng not found. Install: Linux: `sudo apt-get install espeak-ng`, \
         macOS: `brew install espeak-ng`, Windows: https://espeak-ng.org/download"
    )]
    EspeakNotFound,
    #[error("Phonemization failed: {0}")]
    PhonemizerFailed(String),
    #[error("Voice '{0}' not found in the voice archive")]
    VoiceNotFound(String),
    #[error("Model not loaded")]
    ModelNotLoaded,
    #[error("Model file missing: {0}")]
    MissingFile(PathBuf),
    #[error("Invalid config.json: {0}")]
    Config(String),
    #[error("Failed to parse voice file: {0}")]
    VoiceParse(String),
}

/// How to build the ONNX session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub num_threads: Option<usize>,
    /// Pick the 8-bit weights when both variants are in the model directory.
    pub prefer_quantized: bool,
    /// Where the optimized graph is written on first load and read on later ones.
    pub optimized_cache_path: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            num_threads: None,
            prefer_quantized: true,
            optimized_cache_path: None,
        }
    }
}

/// A loaded Kokoro session plus its voices and vocabulary.
pub struct KokoroModel {
    session: Session,
    voices: VoiceStore,
    vocab: Vocab,
    /// "input_ids" or "tokens", depending on the export.
    tokens_input: String,
    speed_is_int32: bool,
}

impl KokoroModel {
    /// Load weights, voices, and vocabulary from `model_dir`.
    pub fn load(model_dir: &Path, options: &SessionOptions) -> Result<Self, KokoroError> {
        let voices_path = model_dir.join(VOICES_ARCHIVE);
        if !voices_path.exists() {
            return Err(KokoroError::MissingFile(voices_path));
        }
        let onnx_path = find_weights(model_dir, options.prefer_quantized)?;
        log::info!("Loading Kokoro model from {}", onnx_path.display());

        let session = init_session(&onnx_path, options)?;
        let tokens_input = session
            .inputs()
            .into_iter()
            .map(|input| input.name())
            .find(|name| *name == "input_ids" || *name == "tokens")
            .unwrap_or("input_ids")
            .to_string();
        let speed_is_int32 = session
            .inputs()
            .into_iter()
            .find(|input| input.name() == "speed")
            .map(|input| format!("{:?}", input.dtype()).to_ascii_lowercase().contains("int32"))
            .unwrap_or(true);
        log::debug!("Kokoro inputs: tokens='{tokens_input}', speed_is_int32={speed_is_int32}");

        Ok(Self {
            session,
            voices: VoiceStore::load(&voices_path)?,
            vocab: Vocab::for_model_dir(model_dir)?,
            tokens_input,
            speed_is_int32,
        })
    }

    pub fn has_voice(&self, voice: &str) -> bool {
        self.voices.contains(voice)
    }

    pub fn list_voices(&self) -> Vec<&str> {
        self.voices.list_voices()
    }

    /// Synthesize `text` with `voice`. Inputs longer than [`MAX_PHONEME_LEN`]
    /// tokens are split at pauses and the pieces crossfaded together.
    pub fn synthesize_text(
        &mut self,
        text: &str,
        voice: &str,
        speed: f32,
        style_index: Option<usize>,
        espeak: &EspeakConfig,
    ) -> Result<Vec<f32>, KokoroError> {
        if !self.voices.contains(voice) {
            return Err(KokoroError::VoiceNotFound(voice.to_string()));
        }
        let ids = phonemize(text, voice_lang(voice), &self.vocab, espeak)?;
        if ids.is_empty() {
            log::warn!("No phoneme tokens produced for {} chars of text", text.chars().count());
            return Ok(Vec::new());
        }

        // One style row for the whole utterance keeps prosody steady across pieces.
        let style = *self.voices.style(voice, style_index.unwrap_or(ids.len()))?;
        let pieces = split_at_pauses(&ids, MAX_PHONEME_LEN);
        if pieces.len() > 1 {
            log::debug!("Kokoro input of {} tokens split into {} pieces", ids.len(), pieces.len());
        }

        let mut combined = Vec::with_capacity(ids.len() * 300);
        for piece in pieces {
            let audio = self.infer(piece, &style, speed)?;
            append_with_crossfade(&mut combined, &audio, CROSSFADE_SAMPLES);
        }
        Ok(combined)
    }

    fn infer(&mut self, tokens: &[i64], style: &[f32; STYLE_DIM], speed: f32) -> Result<Vec<f32>, KokoroError> {
        // [[0, t1..tN, 0]]
        let mut padded = Vec::with_capacity(tokens.len() + 2);
        padded.push(0);
        padded.extend_from_slice(tokens);
        padded.push(0);
        let tokens = Array2::from_shape_vec((1, padded.len()), padded)?;
        let style = ArrayView2::from_shape((1, STYLE_DIM), style.as_slice())?;

        let outputs = if self.speed_is_int32 {
            let speed = ndarray::arr1(&[speed.round() as i32]);
            self.session.run(inputs![
                self.tokens_input.as_str() => TensorRef::from_array_view(tokens.view())?,
                "style" => TensorRef::from_array_view(style)?,
                "speed" => TensorRef::from_array_view(speed.view())?,
            ])?
        } else {
            let speed = ndarray::arr1(&[speed]);
            self.session.run(inputs![
                self.tokens_input.as_str() => TensorRef::from_array_view(tokens.view())?,
                "style" => TensorRef::from_array_view(style)?,
                "speed" => TensorRef::from_array_view(speed.view())?,
            ])?
        };

        let (_, waveform) = outputs
            .iter()
            .next()
            .ok_or_else(|| KokoroError::Ort(ort::Error::new("model produced no outputs")))?;
        let waveform = waveform.try_extract_array::<f32>()?;
        Ok(waveform.iter().copied().collect())
    }
}

/// Choose the weights file: the preferred variant, then the other, then any `.onnx`.
pub fn find_weights(model_dir: &Path, prefer_quantized: bool) -> Result<PathBuf, KokoroError> {
    let ordered = if prefer_quantized {
        [QUANTIZED_WEIGHTS, FULL_WEIGHTS]
    } else {
        [FULL_WEIGHTS, QUANTIZED_WEIGHTS]
    };
    if let Some(path) = ordered.iter().map(|f| model_dir.join(f)).find(|p| p.exists()) {
        return Ok(path);
    }

    let mut candidates: Vec<PathBuf> = std::fs::read_dir(model_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "onnx"))
        .collect();
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| KokoroError::MissingFile(model_dir.join("*.onnx")))
}

/// Build the session, reusing a previously optimized graph when one is cached.
///
/// Level3 optimization takes seconds; with a cache path the result is written
/// there on first load and later loads read it with optimization disabled.
fn init_session(onnx_path: &Path, options: &SessionOptions) -> Result<Session, KokoroError> {
    let cached = options.optimized_cache_path.as_deref();
    let (load_path, level) = match cached {
        Some(cache) if cache.exists() => {
            log::info!("Loading pre-optimized Kokoro graph from {}", cache.display());
            (cache, GraphOptimizationLevel::Disable)
        }
        _ => (onnx_path, GraphOptimizationLevel::Level3),
    };

    let mut builder = Session::builder()?
        .with_optimization_level(level)?
        .with_execution_providers([CPUExecutionProvider::default().build()])?
        .with_parallel_execution(true)?;

    if let Some(cache) = cached.filter(|c| !c.exists()) {
        log::info!("Saving optimized Kokoro graph to {}", cache.display());
        builder = builder.with_optimized_model_path(cache)?;
    }
    if let Some(threads) = options.num_threads {
        builder = builder.with_intra_threads(threads)?.with_inter_threads(threads)?;
    }

    Ok(builder.commit_from_file(load_path)?)
}

/// Split token ids into pieces of at most `max_len`, cutting after the last
/// pause token in each window when there is one.
fn split_at_pauses(ids: &[i64], max_len: usize) -> Vec<&[i64]> {
    let mut pieces = Vec::new();
    let mut rest = ids;
    while rest.len() > max_len {
        let cut = rest[..max_len]
            .iter()
            .rposition(|id| PAUSE_IDS.contains(id))
            .map_or(max_len, |i| i + 1);
        let (piece, tail) = rest.split_at(cut);
        pieces.push(piece);
        rest = tail;
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

fn append_with_crossfade(dst: &mut Vec<f32>, src: &[f32], crossfade: usize) {
    let overlap = crossfade.min(dst.len()).min(src.len());
    let start = dst.len() - overlap;
    for (i, (d, s)) in dst[start..].iter_mut().zip(src).enumerate() {
        let t = (i + 1) as f32 / (overlap as f32 + 1.0);
        *d = *d * (1.0 - t) + s * t;
    }
    dst.extend_from_slice(&src[overlap..]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_input_is_one_piece() {
        let ids = [10, 11, 12];
        assert_eq!(split_at_pauses(&ids, 510), vec![&ids[..]]);
        assert!(split_at_pauses(&[], 510).is_empty());
    }

    #[test]
    fn long_input_splits_after_last_pause() {
        // 4 is '.', 3 is ','
        let ids = [20, 4, 21, 22, 3, 23, 24, 25, 26];
        let pieces = split_at_pauses(&ids, 6);
        assert_eq!(pieces, vec![&[20, 4, 21, 22, 3][..], &[23, 24, 25, 26][..]]);
    }

    #[test]
    fn input_without_pauses_splits_at_limit() {
        let ids: Vec<i64> = (100..110).collect();
        let pieces = split_at_pauses(&ids, 4);
        assert_eq!(pieces.iter().map(|p| p.len()).collect::<Vec<_>>(), vec![4, 4, 2]);
    }

    #[test]
    fn crossfade_blends_overlap() {
        let mut dst = vec![1.0; 4];
        append_with_crossfade(&mut dst, &[0.0; 4], 2);
        assert_eq!(dst.len(), 6);
        assert_eq!(&dst[..2], &[1.0, 1.0]);
        assert!(dst[2] > dst[3] && dst[3] > 0.0);
        assert_eq!(&dst[4..], &[0.0, 0.0]);

        let mut empty = Vec::new();
        append_with_crossfade(&mut empty, &[0.5, 0.5], 240);
        assert_eq!(empty, vec![0.5, 0.5]);
    }

    #[test]
    fn weight_selection_honours_preference() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            find_weights(dir.path(), true),
            Err(KokoroError::MissingFile(_))
        ));

        std::fs::write(dir.path().join("custom.onnx"), b"x").unwrap();
        assert_eq!(find_weights(dir.path(), true).unwrap(), dir.path().join("custom.onnx"));

        std::fs::write(dir.path().join(QUANTIZED_WEIGHTS), b"x").unwrap();
        std::fs::write(dir.path().join(FULL_WEIGHTS), b"x").unwrap();
        assert_eq!(find_weights(dir.path(), true).unwrap(), dir.path().join(QUANTIZED_WEIGHTS));
        assert_eq!(find_weights(dir.path(), false).unwrap(), dir.path().join(FULL_WEIGHTS));
    }

    #[test]
    fn missing_voice_archive_fails_before_session() {
        let dir = tempfile::tempdir().unwrap();
        let err = KokoroModel::load(dir.path(), &SessionOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, KokoroError::MissingFile(p) if p.ends_with(VOICES_ARCHIVE)));
    }
}
