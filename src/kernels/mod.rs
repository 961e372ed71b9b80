//! Numeric primitives shared by the feature front-end and the GMM engine.
//!
//! Values on a log scale at or below [`LSMALL`] are treated as zero and are
//! floored to [`LOGZERO`].

pub mod dct;
pub mod fft;

pub use dct::Dct;
pub use fft::Fft;

/// Stand-in for `log(0)`.
pub const LOGZERO: f64 = -1.0e10;
/// Log values below this are set to [`LOGZERO`].
pub const LSMALL: f64 = -0.5e10;
/// Smallest argument accepted by `ln` before the result is floored.
pub const MINLARG: f64 = 2.45e-308;

/// Differences below `-ln(-LOGZERO)` vanish when exponentiated.
fn min_log_exp() -> f64 {
    -(-LOGZERO).ln()
}

/// Returns `ln(exp(a) + exp(b))` without leaving the log domain.
pub fn log_add(a: f64, b: f64) -> f64 {
    let (hi, lo) = if a < b { (b, a) } else { (a, b) };
    let diff = lo - hi;
    if diff < min_log_exp() {
        if hi < LSMALL {
            LOGZERO
        } else {
            hi
        }
    } else {
        hi + diff.exp().ln_1p()
    }
}

/// Returns `ln(exp(a) - exp(b))`, or [`LOGZERO`] when `a < b` or the
/// difference underflows.
pub fn log_sub(a: f64, b: f64) -> f64 {
    if a < b {
        return LOGZERO;
    }
    let diff = b - a;
    if diff < min_log_exp() {
        if a < LSMALL {
            LOGZERO
        } else {
            a
        }
    } else {
        let z = 1.0 - diff.exp();
        if z < MINLARG {
            LOGZERO
        } else {
            a + z.ln()
        }
    }
}

/// Converts a log value back to linear scale, flooring negligible values to 0.
pub fn log_to_linear(x: f64) -> f64 {
    if x < LSMALL {
        0.0
    } else {
        x.exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn log_add_matches_linear_sum() {
        let (a, b) = (-1.3_f64, -2.7_f64);
        assert_relative_eq!(log_add(a, b).exp(), a.exp() + b.exp(), epsilon = 1e-12);
        assert_eq!(log_add(a, b), log_add(b, a));
    }

    #[test]
    fn log_add_ignores_negligible_terms() {
        assert_eq!(log_add(0.0, -40.0), 0.0);
        assert_eq!(log_add(LOGZERO, LOGZERO), LOGZERO);
        assert_eq!(log_add(-3.0, LOGZERO), -3.0);
    }

    #[test]
    fn log_sub_inverts_log_add() {
        let (a, b) = (-0.4_f64, -1.9_f64);
        assert_relative_eq!(log_sub(log_add(a, b), b), a, epsilon = 1e-9);
    }

    #[test]
    fn log_sub_rejects_negative_results() {
        assert_eq!(log_sub(-2.0, -1.0), LOGZERO);
        assert_eq!(log_sub(-1.0, -1.0), LOGZERO);
    }

    #[test]
    fn log_to_linear_floors_small_values() {
        assert_eq!(log_to_linear(LOGZERO), 0.0);
        assert_relative_eq!(log_to_linear(1.0), std::f64::consts::E);
    }
}
