use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray::{Array1, Array2};
use tempfile::NamedTempFile;
use tracing::debug;

use super::Gmm;
use crate::error::{Result, VprError};

// Per-mixture prefix kept for compatibility with older tooling: two f64
// fields and one byte, always written as zero and ignored on read.
const RESERVED_BYTES: usize = 8 + 8 + 1;

impl Gmm {
    /// Reads a model file: little-endian `i32` mixture count and dimension,
    /// the `f64` weights, then per mixture the reserved prefix followed by
    /// `f64` variances and means.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|err| VprError::io(path, err))?;
        let gmm = Self::from_bytes(&bytes)?;
        debug!(
            path = %path.display(),
            mixtures = gmm.mixtures(),
            dim = gmm.dim(),
            "loaded model"
        );
        Ok(gmm)
    }

    /// Writes the model next to `path` and renames it into place.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let parent = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(parent).map_err(|err| VprError::io(parent, err))?;
        {
            let mut writer = BufWriter::new(file.as_file_mut());
            writer
                .write_all(&self.to_bytes()?)
                .and_then(|_| writer.flush())
                .map_err(|err| VprError::io(path, err))?;
        }
        file.as_file()
            .sync_all()
            .map_err(|err| VprError::io(path, err))?;
        file.persist(path)
            .map_err(|err| VprError::io(path, err.error))?;
        debug!(path = %path.display(), mixtures = self.mixtures(), "saved model");
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mixtures = i32::try_from(self.mixtures())
            .map_err(|_| VprError::ModelFormat("too many mixtures".into()))?;
        let dim = i32::try_from(self.dim())
            .map_err(|_| VprError::ModelFormat("dimension too large".into()))?;
        let mut out = Vec::with_capacity(expected_len(self.mixtures(), self.dim()).unwrap_or(0));
        out.extend_from_slice(&mixtures.to_le_bytes());
        out.extend_from_slice(&dim.to_le_bytes());
        for weight in self.weights.iter() {
            out.extend_from_slice(&weight.to_le_bytes());
        }
        for (variances, means) in self.variances.outer_iter().zip(self.means.outer_iter()) {
            out.extend_from_slice(&[0u8; RESERVED_BYTES]);
            for value in variances.iter().chain(means.iter()) {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor { bytes, offset: 0 };
        let mixtures = cursor.read_count("mixture count")?;
        let dim = cursor.read_count("dimension")?;
        let expected = expected_len(mixtures, dim).unwrap_or(usize::MAX);
        if bytes.len() != expected {
            return Err(VprError::ModelFormat(format!(
                "{mixtures} mixtures of dimension {dim} need {expected} bytes, file has {}",
                bytes.len()
            )));
        }

        let mut weights = Array1::zeros(mixtures);
        for weight in weights.iter_mut() {
            *weight = cursor.read_f64()?;
        }
        let mut means = Array2::zeros((mixtures, dim));
        let mut variances = Array2::zeros((mixtures, dim));
        for mixture in 0..mixtures {
            cursor.skip(RESERVED_BYTES)?;
            for value in variances.row_mut(mixture).iter_mut() {
                *value = cursor.read_f64()?;
            }
            for value in means.row_mut(mixture).iter_mut() {
                *value = cursor.read_f64()?;
            }
        }
        Gmm::from_parts(weights, means, variances)
    }
}

fn expected_len(mixtures: usize, dim: usize) -> Option<usize> {
    let per_mixture = dim.checked_mul(16)?.checked_add(RESERVED_BYTES + 8)?;
    mixtures.checked_mul(per_mixture)?.checked_add(8)
}

struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl Cursor<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.offset + N;
        let chunk = self
            .bytes
            .get(self.offset..end)
            .ok_or_else(|| VprError::ModelFormat(format!("truncated at byte {}", self.offset)))?;
        self.offset = end;
        let mut out = [0u8; N];
        out.copy_from_slice(chunk);
        Ok(out)
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        if self.offset + len > self.bytes.len() {
            return Err(VprError::ModelFormat(format!(
                "truncated at byte {}",
                self.offset
            )));
        }
        self.offset += len;
        Ok(())
    }

    fn read_count(&mut self, what: &str) -> Result<usize> {
        let value = i32::from_le_bytes(self.take::<4>()?);
        if value <= 0 {
            return Err(VprError::ModelFormat(format!("{what} must be positive, got {value}")));
        }
        Ok(value as usize)
    }

    fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.take::<8>()?))
    }
}
