use std::collections::HashMap;
use std::path::Path;

use super::model::KokoroError;

/// Runs of consecutive token ids: `(first_id, symbols)` assigns `first_id` to
/// the first symbol, `first_id + 1` to the next, and so on.
const BUILTIN_RUNS: &[(i64, &str)] = &[
    (1, ";:,.!?"),
    (9, "—…\"()\u{201c}\u{201d} \u{0303}ʣʥʦʨᵝꭧ"),
    (24, "AI"),
    (31, "O"),
    (33, "Q"),
    (35, "ST"),
    (39, "W"),
    (41, "Yᵊabcdef"),
    (50, "hijklmnopqrstuvwxyzɑɐɒæ"),
    (75, "βɔɕç"),
    (80, "ɖðʤə"),
    (85, "ɚɛɜ"),
    (90, "ɟ"),
    (92, "ɡ"),
    (99, "ɥ"),
    (101, "ɨɪʝ"),
    (110, "ɯɰŋɳɲɴø"),
    (118, "ɸθœ"),
    (123, "ɹ"),
    (125, "ɾɻ"),
    (128, "ʁɽʂʃʈʧ"),
    (135, "ʊʋ"),
    (138, "ʌɣɤ"),
    (142, "χʎ"),
    (147, "ʒʔ"),
    (156, "ˈˌː"),
    (162, "ʰ"),
    (164, "ʲ"),
    (169, "↓"),
    (171, "→↗↘"),
    (177, "ᵻ"),
];

/// Mapping from IPA symbols (and boundary punctuation) to model token ids.
#[derive(Debug, Clone)]
pub struct Vocab(HashMap<char, i64>);

impl Vocab {
    /// The table shipped with Kokoro v1.0, used when the model directory has
    /// no `config.json`.
    pub fn builtin() -> Self {
        let map = BUILTIN_RUNS
            .iter()
            .flat_map(|&(first, symbols)| symbols.chars().zip(first..))
            .collect();
        Self(map)
    }

    /// Read the `"vocab"` object of a Kokoro `config.json`.
    pub fn from_config_json(path: &Path) -> Result<Self, KokoroError> {
        let content = std::fs::read_to_string(path)?;
        let json: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| KokoroError::Config(format!("failed to parse JSON: {e}")))?;

        let entries = json
            .get("vocab")
            .and_then(|v| v.as_object())
            .ok_or_else(|| KokoroError::Config("missing 'vocab' object".to_string()))?;

        entries
            .iter()
            .map(|(symbol, id)| {
                let mut chars = symbol.chars();
                let ch = match (chars.next(), chars.next()) {
                    (Some(ch), None) => ch,
                    _ => {
                        return Err(KokoroError::Config(format!(
                            "vocab key {symbol:?} is not a single character"
                        )))
                    }
                };
                let id = id.as_i64().ok_or_else(|| {
                    KokoroError::Config(format!("non-integer id for vocab key {symbol:?}"))
                })?;
                Ok((ch, id))
            })
            .collect::<Result<HashMap<_, _>, _>>()
            .map(Self)
    }

    /// Load from `config.json` in `model_dir` when present, else the builtin table.
    pub fn for_model_dir(model_dir: &Path) -> Result<Self, KokoroError> {
        let config_path = model_dir.join("config.json");
        if config_path.exists() {
            log::info!("Loading vocab from {}", config_path.display());
            Self::from_config_json(&config_path)
        } else {
            log::debug!("No config.json in {}, using builtin vocab", model_dir.display());
            Ok(Self::builtin())
        }
    }

    pub fn id(&self, symbol: char) -> Option<i64> {
        self.0.get(&symbol).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encode espeak-ng IPA output. Word-joiner underscores and symbols the
    /// model doesn't know are dropped.
    pub fn encode_ipa(&self, ipa: &str) -> Vec<i64> {
        ipa.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .flat_map(|line| line.chars())
            .filter(|&ch| ch != '_')
            .filter_map(|ch| self.id(ch))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_runs_assign_expected_ids() {
        let vocab = Vocab::builtin();
        assert_eq!(vocab.id(';'), Some(1));
        assert_eq!(vocab.id('?'), Some(6));
        assert_eq!(vocab.id(' '), Some(16));
        assert_eq!(vocab.id('\u{0303}'), Some(17));
        assert_eq!(vocab.id('ꭧ'), Some(23));
        assert_eq!(vocab.id('a'), Some(43));
        assert_eq!(vocab.id('z'), Some(68));
        assert_eq!(vocab.id('æ'), Some(72));
        assert_eq!(vocab.id('ə'), Some(83));
        assert_eq!(vocab.id('ʧ'), Some(133));
        assert_eq!(vocab.id('ᵻ'), Some(177));
        assert_eq!(vocab.id('g'), None);
    }

    #[test]
    fn encode_skips_joiners_and_unknown_symbols() {
        let vocab = Vocab::builtin();
        assert_eq!(vocab.encode_ipa("hə_l\u{2028}oʊ\n\n"), vec![50, 83, 54, 57, 135]);
    }

    #[test]
    fn reads_config_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"n_token": 3, "vocab": {"a": 1, "ə": 2}}"#).unwrap();

        let vocab = Vocab::for_model_dir(dir.path()).unwrap();
        assert_eq!(vocab.len(), 2);
        assert_eq!(vocab.id('ə'), Some(2));
    }

    #[test]
    fn rejects_multi_character_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"vocab": {"ab": 1}}"#).unwrap();
        assert!(matches!(
            Vocab::from_config_json(&path),
            Err(KokoroError::Config(_))
        ));
    }
}
