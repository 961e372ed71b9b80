use std::path::Path;

use anyhow::{bail, Context, Result};

/// Mono 16-bit PCM read from or written to a WAV container.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmClip {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl PcmClip {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.samples.len() as f64 / self.sample_rate as f64
        }
    }
}

/// Reads a mono, 16-bit integer WAV file.
pub fn read_pcm16<P: AsRef<Path>>(path: P) -> Result<PcmClip> {
    let path = path.as_ref();
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;
    let spec = reader.spec();
    if spec.channels != 1 {
        bail!(
            "{} has {} channels; only mono audio is supported",
            path.display(),
            spec.channels
        );
    }
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        bail!(
            "{} is {}-bit {:?}; only 16-bit integer PCM is supported",
            path.display(),
            spec.bits_per_sample,
            spec.sample_format
        );
    }
    let samples = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read samples from {}", path.display()))?;
    Ok(PcmClip {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Writes `clip` as a mono, 16-bit integer WAV file.
pub fn write_pcm16<P: AsRef<Path>>(clip: &PcmClip, path: P) -> Result<()> {
    let path = path.as_ref();
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: clip.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;
    for &sample in &clip.samples {
        writer
            .write_sample(sample)
            .context("Failed to write audio sample")?;
    }
    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}
