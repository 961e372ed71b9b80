/// Samples per energy block.
pub const BLOCK_LEN: usize = 1600;
/// Default mean absolute amplitude a block needs to count as voiced.
pub const MIN_VOICE_ENERGY: i64 = 500;

/// Drops low-energy blocks and squeezes runs of repeated samples.
///
/// The energy threshold starts at [`MIN_VOICE_ENERGY`] (or half the peak for
/// quiet recordings) and is moved towards the peak or towards zero by
/// `aggressiveness`, where 50 leaves it unchanged. Inside a kept block a run
/// of four or more identical samples is removed together with the three
/// copies already written, and leading zeros are dropped.
pub fn delete_silence(samples: &[i16], aggressiveness: u8) -> Vec<i16> {
    let peak = samples
        .iter()
        .map(|&s| i64::from(s).abs())
        .max()
        .unwrap_or(0);
    let mut threshold = MIN_VOICE_ENERGY;
    if peak < threshold {
        threshold = peak / 2;
    }
    let k = i64::from(aggressiveness);
    if k > 50 {
        threshold += (peak - threshold) * (k - 50) / 50;
    } else if k < 50 {
        threshold -= threshold * (50 - k) / 50;
    }

    let mut kept = Vec::with_capacity(samples.len());
    let mut block = Vec::with_capacity(BLOCK_LEN);
    for chunk in samples.chunks(BLOCK_LEN) {
        let energy: i64 = chunk.iter().map(|&s| i64::from(s).abs()).sum();
        if energy > threshold * chunk.len() as i64 {
            squeeze_repeats(chunk, &mut block);
            kept.extend_from_slice(&block);
        }
    }
    kept
}

fn squeeze_repeats(chunk: &[i16], out: &mut Vec<i16>) {
    out.clear();
    let mut rewind: isize = 0;
    let (mut old1, mut old2, mut old3) = (0i16, 0i16, 0i16);
    for &sample in chunk {
        if sample == old1 && old1 == old2 && old2 == old3 {
            if rewind >= 0 {
                out.truncate(rewind as usize);
            }
        } else {
            out.push(sample);
            rewind = out.len() as isize - 3;
        }
        old3 = old2;
        old2 = old1;
        old1 = sample;
    }
}
