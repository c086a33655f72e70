//! espeak-ng: the deterministic, always-available offline synthesizer.
//!
//! Also provides the process plumbing the Kokoro phonemizer uses, so both
//! honour the same binary and data overrides.

use std::borrow::Cow;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::backend::{AudioFormat, BackendDescriptor, SpeechBackend};
use crate::error::BackendError;
use crate::request::{Rate, DEFAULT_WPM};
use crate::script::Script;

pub const IDENTIFIER: &str = "espeak-ng";

const DESCRIPTOR: BackendDescriptor = BackendDescriptor {
    identifier: IDENTIFIER,
    supports_online: false,
    native_scripts: &[Script::Latin],
    output_format: AudioFormat::Wav,
};

/// Location of the espeak-ng binary and its data directory.
///
/// Either path can be `None` to use the system default (`espeak-ng` from
/// PATH, built-in data location).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EspeakConfig {
    pub bin_path: Option<PathBuf>,
    pub data_path: Option<PathBuf>,
}

impl EspeakConfig {
    pub fn program(&self) -> &OsStr {
        self.bin_path
            .as_deref()
            .map(Path::as_os_str)
            .unwrap_or_else(|| OsStr::new("espeak-ng"))
    }

    /// A command for the configured binary with the data path applied.
    pub fn command(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(self.program());
        if let Some(data) = &self.data_path {
            cmd.env("ESPEAK_DATA_PATH", data);
        }
        cmd
    }
}

/// espeak-ng treats stdin as line-oriented input. Without a final line
/// terminator the last token can be under-processed.
pub(crate) fn canonicalize_stdin_payload(input: &str) -> Cow<'_, str> {
    if input.ends_with('\n') {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(format!("{input}\n"))
    }
}

/// Formant synthesis through the espeak-ng CLI, written straight to WAV.
#[derive(Debug, Clone, Default)]
pub struct EspeakBackend {
    config: EspeakConfig,
}

impl EspeakBackend {
    pub fn new(config: EspeakConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SpeechBackend for EspeakBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &DESCRIPTOR
    }

    async fn generate(
        &self,
        text: &str,
        voice: &str,
        rate: Rate,
        out_path: &Path,
    ) -> Result<PathBuf, BackendError> {
        let wpm = rate.words_per_minute(DEFAULT_WPM);
        let mut cmd = tokio::process::Command::from(self.config.command());
        cmd.arg("-v")
            .arg(voice)
            .arg("-s")
            .arg(wpm.to_string())
            .arg("-w")
            .arg(out_path)
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BackendError::transient(
                    IDENTIFIER,
                    format!(
                        "{} not found. Install: Linux: `sudo apt-get install espeak-ng`, \
                         macOS: `brew install espeak-ng`, Windows: https://espeak-ng.org/download",
                        self.config.program().to_string_lossy()
                    ),
                )
            } else {
                BackendError::Io(e)
            }
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(canonicalize_stdin_payload(text).as_bytes())
                .await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::transient(
                IDENTIFIER,
                format!("exited with code {:?}: {}", output.status.code(), stderr.trim()),
            ));
        }

        log::debug!("espeak-ng wrote {} at {wpm} wpm", out_path.display());
        Ok(out_path.to_path_buf())
    }
}
