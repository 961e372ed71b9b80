use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use voiceprint::audio::{read_pcm16, PcmClip};
use voiceprint::cli::{Cli, Command, EnrollArgs, InspectArgs, UbmArgs, VerifyArgs};
use voiceprint::{FeatureExtractor, FeatureMatrix, Gmm, VprEngine};

#[derive(Debug, Serialize)]
struct VerifyOutcome {
    score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    accepted: Option<bool>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Command::Ubm(args) => train_ubm(&args),
        Command::Enroll(args) => enroll(&args),
        Command::Verify(args) => verify(&args),
        Command::Inspect(args) => inspect(&args),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_clips(paths: &[PathBuf]) -> Result<(Vec<PcmClip>, u32)> {
    let mut clips = Vec::with_capacity(paths.len());
    for path in paths {
        let clip = read_pcm16(path).with_context(|| format!("Failed to load {:?}", path))?;
        info!(path = %path.display(), seconds = clip.duration_secs(), "loaded recording");
        clips.push(clip);
    }
    let sample_rate = clips.first().map(|clip| clip.sample_rate).unwrap_or(16_000);
    ensure!(
        clips.iter().all(|clip| clip.sample_rate == sample_rate),
        "all recordings must share one sample rate"
    );
    Ok((clips, sample_rate))
}

fn train_ubm(args: &UbmArgs) -> Result<()> {
    let features_config = args.feature_config()?;
    let (clips, sample_rate) = load_clips(&args.inputs)?;
    let extractor = FeatureExtractor::new(features_config, sample_rate)
        .context("Invalid feature configuration")?;

    let mut parts = Vec::with_capacity(clips.len());
    for (clip, path) in clips.iter().zip(&args.inputs) {
        match extractor.extract(&clip.samples) {
            Ok(features) => parts.push(features),
            Err(err) => warn!(path = %path.display(), error = %err, "skipping recording"),
        }
    }
    let features = FeatureMatrix::stack(&parts).context("No usable training recordings")?;
    info!(
        frames = features.frames(),
        dim = features.dim(),
        mixtures = args.mixtures,
        "training background model"
    );

    let mut ubm = Gmm::from_features(&features, args.mixtures)
        .context("Failed to seed background model")?;
    for round in 0..args.rounds {
        let report = ubm
            .em(&features, args.mixtures)
            .with_context(|| format!("EM failed in round {}", round + 1))?;
        info!(
            round = round + 1,
            iterations = report.iterations,
            average_log_likelihood = report.average_log_likelihood,
            converged = report.converged,
            "em round finished"
        );
    }
    save_model(&ubm, &args.output)?;
    println!("Background model written to {:?}", args.output);
    Ok(())
}

fn save_model(model: &Gmm, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {:?}", dir))?;
    }
    model
        .save(path)
        .with_context(|| format!("Failed to save model {:?}", path))
}

fn enroll(args: &EnrollArgs) -> Result<()> {
    let (clips, sample_rate) = load_clips(&args.inputs)?;
    let config = args.engine.engine_config(sample_rate)?;
    let model_path = config.user_model_path.clone();
    let mut engine = VprEngine::new(config).context("Failed to start verification engine")?;
    for clip in &clips {
        engine
            .add_train_samples(&clip.samples)
            .context("Failed to buffer enrollment audio")?;
    }
    engine.train_model().context("Enrollment failed")?;
    println!("Speaker model written to {:?}", model_path);
    Ok(())
}

fn verify(args: &VerifyArgs) -> Result<()> {
    let clip =
        read_pcm16(&args.input).with_context(|| format!("Failed to load {:?}", args.input))?;
    let config = args.engine.engine_config(clip.sample_rate)?;
    let mut engine = VprEngine::new(config).context("Failed to start verification engine")?;
    engine
        .add_verify_samples(&clip.samples)
        .context("Failed to buffer verification audio")?;
    let score = engine.verify_model().context("Verification failed")?;
    let outcome = VerifyOutcome {
        score,
        accepted: args.threshold.map(|threshold| score >= threshold),
    };
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn inspect(args: &InspectArgs) -> Result<()> {
    let model =
        Gmm::load(&args.model).with_context(|| format!("Failed to load model {:?}", args.model))?;
    println!("{}", serde_json::to_string_pretty(&model.summary())?);
    Ok(())
}
