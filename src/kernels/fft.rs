use std::f64::consts::PI;

use crate::error::{Result, VprError};

/// In-place iterative radix-2 FFT over split real/imaginary buffers.
///
/// Twiddle tables are kept between calls and rebuilt only when the
/// transform length changes.
#[derive(Debug, Default, Clone)]
pub struct Fft {
    sin_table: Vec<f64>,
    cos_table: Vec<f64>,
}

impl Fft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward transform of `re + i·im`. Both slices must share a
    /// power-of-two length.
    pub fn forward(&mut self, re: &mut [f64], im: &mut [f64]) -> Result<()> {
        let n = re.len();
        if n == 0 || im.len() != n {
            return Err(VprError::InvalidParam(format!(
                "fft buffers must be non-empty and equal in length (re={}, im={})",
                n,
                im.len()
            )));
        }
        if !n.is_power_of_two() {
            return Err(VprError::InvalidLength(n));
        }
        self.ensure_tables(n);
        bit_reverse(re, im);

        let stages = n.trailing_zeros();
        let mut half = 1usize;
        for stage in 1..=stages {
            let span = 1usize << stage;
            let stride = 1usize << (stages - stage);
            for j in 0..half {
                let x = self.cos_table[stride * j];
                let y = -self.sin_table[stride * j];
                let mut k = j;
                while k < n {
                    let tr = re[k + half] * x - im[k + half] * y;
                    let ti = re[k + half] * y + im[k + half] * x;
                    re[k + half] = re[k] - tr;
                    im[k + half] = im[k] - ti;
                    re[k] += tr;
                    im[k] += ti;
                    k += span;
                }
            }
            half <<= 1;
        }
        Ok(())
    }

    /// Inverse transform, scaled by `1/n`.
    pub fn inverse(&mut self, re: &mut [f64], im: &mut [f64]) -> Result<()> {
        im.iter_mut().for_each(|v| *v = -*v);
        self.forward(re, im)?;
        let scale = 1.0 / re.len() as f64;
        for (r, i) in re.iter_mut().zip(im.iter_mut()) {
            *r *= scale;
            *i = -*i * scale;
        }
        Ok(())
    }

    fn ensure_tables(&mut self, n: usize) {
        if self.sin_table.len() == n {
            return;
        }
        let step = 2.0 * PI / n as f64;
        self.sin_table = (0..n).map(|l| (step * l as f64).sin()).collect();
        self.cos_table = (0..n).map(|l| (step * l as f64).cos()).collect();
    }
}

fn bit_reverse(re: &mut [f64], im: &mut [f64]) {
    let n = re.len();
    if n < 2 {
        return;
    }
    let mut j = n >> 1;
    for i in 1..n - 1 {
        if i < j {
            re.swap(i, j);
            im.swap(i, j);
        }
        let mut k = n >> 1;
        while j >= k {
            j -= k;
            k >>= 1;
        }
        j += k;
    }
}
