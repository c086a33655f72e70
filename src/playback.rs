//! Best-effort local playback through whatever system player is installed.

use std::path::Path;

use serde::Serialize;
use tokio::process::Command;

use crate::backend::AudioFormat;

/// What happened when playback was attempted. Playback never fails the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlaybackReport {
    Played { player: String },
    MissingFile,
    NoPlayer,
    Failed { player: String, message: String },
}

/// A player binary and the arguments that go before the file path.
type Player = (&'static str, &'static [&'static str]);

const AFPLAY: Player = ("afplay", &[]);
const START: Player = ("cmd", &["/C", "start", "/WAIT", ""]);
const MPG123: Player = ("mpg123", &["-q"]);
const PAPLAY: Player = ("paplay", &[]);
const APLAY: Player = ("aplay", &["-q"]);
const FFPLAY: Player = ("ffplay", &["-nodisp", "-autoexit", "-loglevel", "quiet"]);

/// Players to try for `format` on this platform, in order of preference.
pub fn players_for(format: AudioFormat) -> Vec<Player> {
    if cfg!(target_os = "macos") {
        return vec![AFPLAY];
    }
    if cfg!(windows) {
        return vec![START];
    }
    match format {
        AudioFormat::Mp3 => vec![MPG123, FFPLAY],
        AudioFormat::Wav => vec![PAPLAY, APLAY, FFPLAY],
    }
}

/// Play `path`, choosing a player by its container.
pub async fn play(path: &Path) -> PlaybackReport {
    let format = AudioFormat::from_path(path).unwrap_or(AudioFormat::Wav);
    play_with(path, &players_for(format)).await
}

async fn play_with(path: &Path, players: &[Player]) -> PlaybackReport {
    if !tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file()) {
        return PlaybackReport::MissingFile;
    }

    for (player, args) in players {
        let status = Command::new(player).args(*args).arg(path).status().await;
        match status {
            Ok(status) if status.success() => {
                log::debug!("Played {} with {player}", path.display());
                return PlaybackReport::Played {
                    player: player.to_string(),
                };
            }
            Ok(status) => {
                return PlaybackReport::Failed {
                    player: player.to_string(),
                    message: format!("exited with {status}"),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                return PlaybackReport::Failed {
                    player: player.to_string(),
                    message: e.to_string(),
                }
            }
        }
    }
    log::warn!("No audio player found for {}", path.display());
    PlaybackReport::NoPlayer
}
