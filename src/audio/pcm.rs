use crate::error::{Result, VprError};

/// Decodes little-endian 16-bit PCM bytes.
pub fn decode_le_i16(bytes: &[u8]) -> Result<Vec<i16>> {
    if bytes.is_empty() {
        return Err(VprError::NoAvailableData);
    }
    if bytes.len() % 2 != 0 {
        return Err(VprError::InvalidInput(format!(
            "pcm buffer of {} bytes is not a whole number of 16-bit samples",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Encodes samples as little-endian 16-bit PCM.
pub fn encode_le_i16(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}
