use std::f64::consts::PI;

use crate::error::{Result, VprError};

/// Orthonormal DCT-II with a cosine table cached per input length.
#[derive(Debug, Default, Clone)]
pub struct Dct {
    input: Vec<f64>,
    cosines: Vec<f64>,
}

impl Dct {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transforms the first `input_len` values of `data` in place, writing
    /// `output_len` coefficients to its head. `output_len == 0` means
    /// `input_len`.
    pub fn transform(
        &mut self,
        data: &mut [f64],
        input_len: usize,
        output_len: usize,
    ) -> Result<()> {
        let output_len = if output_len == 0 { input_len } else { output_len };
        if input_len == 0 || input_len > data.len() || output_len > data.len() {
            return Err(VprError::InvalidParam(format!(
                "dct lengths out of range (input={input_len}, output={output_len}, buffer={})",
                data.len()
            )));
        }
        let n2 = input_len << 1;
        if self.cosines.len() != n2 {
            self.cosines = (0..n2).map(|i| (i as f64 * PI / n2 as f64).cos()).collect();
        }
        self.input.clear();
        self.input.extend_from_slice(&data[..input_len]);

        let factor = (2.0 / input_len as f64).sqrt();
        let c0 = 1.0 / 2.0_f64.sqrt();
        for (k, out) in data.iter_mut().take(output_len).enumerate() {
            let mut acc = 0.0;
            for (n, value) in self.input.iter().enumerate() {
                let offset = ((n << 1) + 1) * k;
                let sign = if (offset / n2) % 2 == 0 { 1.0 } else { -1.0 };
                acc += value * sign * self.cosines[offset % n2];
            }
            if k == 0 {
                acc *= c0;
            }
            *out = acc * factor;
        }
        Ok(())
    }
}
