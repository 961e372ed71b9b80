use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::config::{EngineConfig, FeatureConfig};

#[derive(Parser, Debug)]
#[command(
    name = "voiceprint",
    version,
    about = "Text-independent speaker verification with GMM-UBM models"
)]
pub struct Cli {
    /// Log at debug level regardless of RUST_LOG.
    #[arg(long, short, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Train a universal background model from a set of recordings.
    Ubm(UbmArgs),
    /// Adapt the background model to one speaker and save the result.
    Enroll(EnrollArgs),
    /// Score a recording against an enrolled speaker.
    Verify(VerifyArgs),
    /// Print a JSON summary of a model file.
    Inspect(InspectArgs),
}

#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// JSON engine configuration; the flags below override its fields.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Background model file.
    #[arg(long, value_name = "PATH")]
    pub ubm: Option<PathBuf>,
    /// Speaker model file.
    #[arg(long, value_name = "PATH")]
    pub model: Option<PathBuf>,
    /// Drop silent blocks before analysis (aggressiveness 0-100).
    #[arg(long = "delete-silence", value_name = "AGGRESSIVENESS")]
    pub delete_silence: Option<u8>,
    /// Score only the best N background mixtures per frame.
    #[arg(long = "top-mixtures", value_name = "N")]
    pub top_mixtures: Option<usize>,
}

impl EngineArgs {
    /// Resolves the session configuration for audio at `sample_rate`.
    pub fn engine_config(&self, sample_rate: u32) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)
                .with_context(|| format!("Failed to load engine config {:?}", path))?,
            None => {
                let ubm = self
                    .ubm
                    .clone()
                    .context("--ubm is required when no --config is given")?;
                let model = self
                    .model
                    .clone()
                    .context("--model is required when no --config is given")?;
                EngineConfig::new(sample_rate, ubm, model)
            }
        };
        if let Some(ubm) = &self.ubm {
            config.ubm_path = ubm.clone();
        }
        if let Some(model) = &self.model {
            config.user_model_path = model.clone();
        }
        if let Some(aggressiveness) = self.delete_silence {
            config = config.with_silence_deletion(aggressiveness);
        }
        if self.top_mixtures.is_some() {
            config = config.with_top_mixtures(self.top_mixtures);
        }
        ensure!(
            config.sample_rate == sample_rate,
            "audio is sampled at {} Hz but the engine expects {} Hz",
            sample_rate,
            config.sample_rate
        );
        config.validate().context("Invalid engine configuration")?;
        Ok(config)
    }
}

#[derive(Args, Debug, Clone)]
pub struct UbmArgs {
    /// Mono 16-bit WAV recordings from many speakers.
    #[arg(required = true, value_name = "WAV")]
    pub inputs: Vec<PathBuf>,
    /// Where to write the background model.
    #[arg(long, short, value_name = "PATH")]
    pub output: PathBuf,
    #[arg(long, default_value_t = 64)]
    pub mixtures: usize,
    /// Number of EM runs after seeding.
    #[arg(long, default_value_t = 1)]
    pub rounds: usize,
    /// JSON feature configuration.
    #[arg(long, value_name = "PATH")]
    pub features: Option<PathBuf>,
}

impl UbmArgs {
    pub fn feature_config(&self) -> Result<FeatureConfig> {
        ensure!(self.mixtures > 0, "--mixtures must be positive");
        ensure!(self.rounds > 0, "--rounds must be positive");
        let config = match &self.features {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read feature config {:?}", path))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("Failed to parse feature config {:?}", path))?
            }
            None => FeatureConfig::default(),
        };
        Ok(config)
    }
}

#[derive(Args, Debug, Clone)]
pub struct EnrollArgs {
    #[command(flatten)]
    pub engine: EngineArgs,
    /// Enrollment recordings, appended in order.
    #[arg(required = true, value_name = "WAV")]
    pub inputs: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub engine: EngineArgs,
    /// Recording to score.
    #[arg(value_name = "WAV")]
    pub input: PathBuf,
    /// Accept when the score reaches this value.
    #[arg(long)]
    pub threshold: Option<f64>,
}

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    #[arg(value_name = "MODEL")]
    pub model: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command, FeatureConfig};
    use clap::Parser;

    #[test]
    fn parses_enroll_with_overrides() {
        let cli = Cli::try_parse_from([
            "voiceprint",
            "enroll",
            "--ubm",
            "ubm.gmm",
            "--model",
            "alice.gmm",
            "--delete-silence",
            "60",
            "a.wav",
            "b.wav",
        ])
        .unwrap();
        let Command::Enroll(args) = cli.command else {
            panic!("expected enroll");
        };
        assert_eq!(args.inputs.len(), 2);
        let config = args.engine.engine_config(16_000).unwrap();
        assert!(config.delete_silence);
        assert_eq!(config.silence_aggressiveness, 60);
        assert_eq!(config.user_model_path.to_str(), Some("alice.gmm"));
    }

    #[test]
    fn engine_paths_are_required_without_config() {
        let cli = Cli::try_parse_from(["voiceprint", "verify", "--ubm", "ubm.gmm", "test.wav"])
            .unwrap();
        let Command::Verify(args) = cli.command else {
            panic!("expected verify");
        };
        let err = args.engine.engine_config(16_000).unwrap_err();
        assert!(err.to_string().contains("--model"));
    }

    #[test]
    fn config_file_is_overridden_by_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(
            &path,
            r#"{"sample_rate": 8000, "ubm_path": "a.gmm", "user_model_path": "b.gmm"}"#,
        )
        .unwrap();
        let cli = Cli::try_parse_from([
            "voiceprint",
            "verify",
            "--config",
            path.to_str().unwrap(),
            "--top-mixtures",
            "5",
            "--model",
            "c.gmm",
            "test.wav",
        ])
        .unwrap();
        let Command::Verify(args) = cli.command else {
            panic!("expected verify");
        };
        let config = args.engine.engine_config(8000).unwrap();
        assert_eq!(config.top_mixtures, Some(5));
        assert_eq!(config.user_model_path.to_str(), Some("c.gmm"));
        assert!(args.engine.engine_config(16_000).is_err());
    }

    #[test]
    fn ubm_defaults() {
        let cli = Cli::try_parse_from(["voiceprint", "-v", "ubm", "-o", "ubm.gmm", "x.wav"])
            .unwrap();
        assert!(cli.verbose);
        let Command::Ubm(args) = cli.command else {
            panic!("expected ubm");
        };
        assert_eq!(args.mixtures, 64);
        assert_eq!(args.rounds, 1);
        assert_eq!(args.feature_config().unwrap(), FeatureConfig::default());
    }
}
