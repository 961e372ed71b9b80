use std::f32::consts::PI;
use std::path::Path;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use voiceprint::audio::encode_le_i16;
use voiceprint::{
    EngineConfig, ErrorCode, FeatureConfig, FeatureExtractor, FeatureMatrix, Gmm, SessionState,
    VprEngine, VprError,
};

const SAMPLE_RATE: u32 = 16_000;

/// Voiced speech stand-in: a jittered harmonic series shaped by a cycle of
/// two-resonance vowels, plus a little noise.
struct Voice {
    f0: f32,
    vowels: [[f32; 2]; 3],
}

const ALICE: Voice = Voice {
    f0: 120.0,
    vowels: [[300.0, 2300.0], [700.0, 1200.0], [450.0, 900.0]],
};
const BOB: Voice = Voice {
    f0: 210.0,
    vowels: [[550.0, 1800.0], [850.0, 2600.0], [380.0, 3100.0]],
};

/// Samples per vowel before moving to the next one.
const VOWEL_LEN: usize = 3_200;

impl Voice {
    fn speak(&self, seconds: f32, seed: u64) -> Vec<i16> {
        let mut rng = StdRng::seed_from_u64(seed);
        let len = (seconds * SAMPLE_RATE as f32).round() as usize;
        let first_vowel = rng.gen_range(0..self.vowels.len());
        let mut phase = 0.0f32;
        let mut f0 = self.f0;
        let mut samples = Vec::with_capacity(len);
        for t in 0..len {
            if t % 800 == 0 {
                f0 = self.f0 * rng.gen_range(0.92..1.08);
            }
            let formants = self.vowels[(first_vowel + t / VOWEL_LEN) % self.vowels.len()];
            phase = (phase + 2.0 * PI * f0 / SAMPLE_RATE as f32) % (2.0 * PI);
            let mut value = 0.0;
            for h in 1..=30 {
                let freq = f0 * h as f32;
                if freq > 3_900.0 {
                    break;
                }
                value += gain(&formants, freq) * (phase * h as f32).sin();
            }
            value += rng.gen_range(-0.02..0.02);
            samples.push((6_000.0 * value).clamp(-32_000.0, 32_000.0) as i16);
        }
        samples
    }
}

fn gain(formants: &[f32; 2], freq: f32) -> f32 {
    formants
        .iter()
        .map(|&center| {
            let offset = (freq - center) / 150.0;
            1.0 / (1.0 + offset * offset)
        })
        .sum()
}

fn train_ubm(path: &Path) -> Result<()> {
    let extractor = FeatureExtractor::new(FeatureConfig::default(), SAMPLE_RATE)?;
    let parts = vec![
        extractor.extract(&ALICE.speak(4.0, 1))?,
        extractor.extract(&BOB.speak(4.0, 2))?,
    ];
    let features = FeatureMatrix::stack(&parts)?;
    let mut ubm = Gmm::from_features(&features, 4)?;
    ubm.em(&features, 4)?;
    ubm.save(path)?;
    Ok(())
}

fn engine(dir: &Path) -> Result<VprEngine> {
    let ubm = dir.join("ubm.gmm");
    if !ubm.exists() {
        train_ubm(&ubm)?;
    }
    Ok(VprEngine::new(EngineConfig::new(
        SAMPLE_RATE,
        ubm,
        dir.join("speakers/alice.gmm"),
    ))?)
}

#[test]
fn enrolled_speaker_outscores_impostor() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut engine = engine(dir.path())?;

    engine.add_train_buffer(&encode_le_i16(&ALICE.speak(3.0, 10)))?;
    engine.add_train_samples(&ALICE.speak(2.0, 11))?;
    engine.train_model()?;
    assert!(dir.path().join("speakers/alice.gmm").exists());
    engine.clear_train_buffer();

    engine.add_verify_samples(&ALICE.speak(3.5, 20))?;
    let genuine = engine.verify_model()?;
    assert_eq!(engine.score(), genuine);

    engine.add_verify_buffer(&encode_le_i16(&BOB.speak(3.5, 21)))?;
    let impostor = engine.verify_model()?;
    engine.clear_all_buffers();

    assert!(genuine.is_finite() && impostor.is_finite());
    assert!(
        genuine > impostor,
        "genuine {genuine} should beat impostor {impostor}"
    );
    assert_eq!(engine.state(), SessionState::Idle);
    Ok(())
}

#[test]
fn top_mixture_scoring_agrees_in_direction() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut engine = engine(dir.path())?;
    engine.add_train_samples(&ALICE.speak(5.0, 30))?;
    engine.train_model()?;

    let config = engine.config().clone().with_top_mixtures(Some(2));
    let mut engine = VprEngine::new(config)?;
    engine.add_verify_samples(&ALICE.speak(3.5, 31))?;
    let genuine = engine.verify_model()?;
    engine.add_verify_samples(&BOB.speak(3.5, 32))?;
    let impostor = engine.verify_model()?;
    assert!(genuine > impostor, "genuine {genuine}, impostor {impostor}");
    Ok(())
}

#[test]
fn training_needs_two_seconds() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut engine = engine(dir.path())?;
    engine.add_train_samples(&ALICE.speak(1.9, 40))?;
    let err = engine.train_model().unwrap_err();
    assert!(matches!(
        err,
        VprError::InsufficientData {
            samples: 30_400,
            required: 32_000
        }
    ));
    assert_eq!(err.code(), ErrorCode::NoAvailableData);
    Ok(())
}

#[test]
fn two_seconds_can_still_lack_frames() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut engine = engine(dir.path())?;
    engine.add_train_samples(&ALICE.speak(2.1, 41))?;
    let err = engine.train_model().unwrap_err();
    assert_eq!(err.code(), ErrorCode::MemInsufficient);
    assert!(matches!(
        err.root(),
        VprError::InsufficientFrames { required: 300, .. }
    ));
    assert!(!dir.path().join("speakers/alice.gmm").exists());
    Ok(())
}

#[test]
fn verification_needs_a_quarter_second() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut engine = engine(dir.path())?;
    engine.add_verify_samples(&ALICE.speak(0.2, 42))?;
    let err = engine.verify_model().unwrap_err();
    assert!(matches!(err, VprError::NeedMoreSample { samples: 3_200, .. }));
    assert_eq!(err.to_string().split(':').next(), Some("need more sample"));
    Ok(())
}

#[test]
fn odd_byte_buffers_are_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut engine = engine(dir.path())?;
    let err = engine.add_train_buffer(&[1, 2, 3]).unwrap_err();
    assert!(matches!(err, VprError::InvalidInput(_)));
    assert_eq!(engine.train_len(), 0);
    Ok(())
}

#[test]
fn silence_is_dropped_before_buffering() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = engine(dir.path())?.config().clone().with_silence_deletion(50);
    let mut engine = VprEngine::new(config)?;

    let mut audio = vec![0i16; 16_000];
    audio.extend(ALICE.speak(0.5, 43));
    engine.add_train_samples(&audio)?;
    assert!(engine.train_len() > 0);
    assert!(engine.train_len() <= 8_000);
    Ok(())
}
