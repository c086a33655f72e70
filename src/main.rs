//! tts-cascade command-line entry point.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgGroup, Parser};
use serde_json::json;

use tts_cascade::{
    play, OrchestratorConfig, Rate, SpeechOrchestrator, StaticProbe, SynthesisError,
    SynthesisRequest,
};

/// Speak text to an audio file, falling back from online to offline engines.
#[derive(Parser, Debug)]
#[command(name = "tts-cascade", version, about)]
#[command(group(ArgGroup::new("input").required(true).args(["text", "file"])))]
struct Cli {
    /// Text to speak
    text: Option<String>,

    /// Read the text from a UTF-8 file instead
    #[arg(short, long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Language hint (en, ur, auto, ...); the script of the text wins over it
    #[arg(short, long, default_value = "auto")]
    lang: String,

    /// Output file name inside the output directory; generated when omitted
    #[arg(short, long, value_name = "NAME")]
    output: Option<String>,

    /// Rate relative to normal, e.g. "+20%" or "-10"
    #[arg(long, allow_hyphen_values = true, conflicts_with = "wpm")]
    rate: Option<String>,

    /// Absolute rate in words per minute
    #[arg(long)]
    wpm: Option<u32>,

    /// Online backend identifier (gtts, openai)
    #[arg(short, long)]
    backend: Option<String>,

    /// Skip the online tier without probing
    #[arg(long)]
    offline: bool,

    /// Give up on the whole request after this many seconds
    #[arg(long, value_name = "SECS")]
    deadline_secs: Option<f64>,

    /// JSON config file; environment variables override it
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Play the result with a system audio player
    #[arg(long)]
    play: bool,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(report) => println!("{report:#}"),
        Err(e) => {
            let tier = e
                .downcast_ref::<SynthesisError>()
                .and_then(SynthesisError::tier);
            println!("{:#}", json!({ "success": false, "error": e.to_string(), "tier": tier }));
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => OrchestratorConfig::from_json_file(path)?,
        None => OrchestratorConfig::default(),
    }
    .with_env();

    let text = match (cli.text, &cli.file) {
        (Some(text), _) => text,
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?,
        (None, None) => return Err("no text given".into()),
    };

    let mut request = SynthesisRequest::new(text)
        .with_language(cli.lang.as_str())
        .with_rate(parse_rate(cli.rate.as_deref(), cli.wpm)?);
    if let Some(name) = cli.output {
        request = request.with_output_name(name);
    }
    if let Some(backend) = cli.backend {
        request = request.with_backend(backend);
    }
    if let Some(secs) = cli.deadline_secs {
        let deadline = Duration::try_from_secs_f64(secs)
            .map_err(|e| format!("invalid --deadline-secs {secs}: {e}"))?;
        request = request.with_deadline(deadline);
    }

    let mut orchestrator = SpeechOrchestrator::new(config);
    if cli.offline {
        orchestrator = orchestrator.with_probe(Arc::new(StaticProbe(false)));
    }

    let result = orchestrator.synthesize(request).await?;
    let mut report = json!({
        "success": true,
        "audio_path": result.audio_path,
        "language": result.language,
        "tier": result.tier,
    });
    if cli.play {
        report["playback"] = serde_json::to_value(play(&result.audio_path).await)?;
    }
    Ok(report)
}

fn parse_rate(rate: Option<&str>, wpm: Option<u32>) -> Result<Rate, String> {
    if let Some(wpm) = wpm {
        return Ok(Rate::WordsPerMinute(wpm));
    }
    let Some(raw) = rate else {
        return Ok(Rate::default());
    };
    raw.trim()
        .trim_end_matches('%')
        .parse::<i32>()
        .map(Rate::Percent)
        .map_err(|_| format!("invalid --rate {raw:?}; expected a percentage like +20% or -10"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rates() {
        assert_eq!(parse_rate(None, None).unwrap(), Rate::Percent(0));
        assert_eq!(parse_rate(Some("+20%"), None).unwrap(), Rate::Percent(20));
        assert_eq!(parse_rate(Some("-10"), None).unwrap(), Rate::Percent(-10));
        assert_eq!(parse_rate(None, Some(200)).unwrap(), Rate::WordsPerMinute(200));
        assert!(parse_rate(Some("fast"), None).is_err());
    }

    #[test]
    fn cli_requires_text_or_file() {
        assert!(Cli::try_parse_from(["tts-cascade"]).is_err());
        let cli = Cli::try_parse_from(["tts-cascade", "hello", "--rate", "-10%", "--offline"]).unwrap();
        assert_eq!(cli.text.as_deref(), Some("hello"));
        assert!(cli.offline);
        assert!(Cli::try_parse_from(["tts-cascade", "hi", "--rate", "5", "--wpm", "100"]).is_err());
    }
}
