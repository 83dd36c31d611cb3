//! Log-domain arithmetic
//!
//! Probabilities are carried as `f32` logarithms in a configurable base.
//! A base just above one (the default, 1.0001) keeps adjacent probabilities
//! distinguishable after quantisation; `LogMath::natural()` works in `ln`.

use crate::error::{AcousticError, Result};

/// Logarithm of zero; absorbing for [`LogMath::add_as_linear`]
pub const LOG_ZERO: f32 = -f32::MAX;

/// Logarithm of one
pub const LOG_ONE: f32 = 0.0;

/// Default log base
pub const DEFAULT_LOG_BASE: f64 = 1.0001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogMath {
    base: f64,
    ln_base: f64,
}

impl Default for LogMath {
    fn default() -> Self {
        Self {
            base: DEFAULT_LOG_BASE,
            ln_base: DEFAULT_LOG_BASE.ln(),
        }
    }
}

impl LogMath {
    pub fn new(base: f64) -> Result<Self> {
        if !(base > 1.0 && base.is_finite()) {
            return Err(AcousticError::config(format!(
                "Log base must be a finite number greater than 1, got {}",
                base
            )));
        }

        Ok(Self {
            base,
            ln_base: base.ln(),
        })
    }

    /// Natural logarithms
    pub fn natural() -> Self {
        Self {
            base: std::f64::consts::E,
            ln_base: 1.0,
        }
    }

    pub fn base(&self) -> f64 {
        self.base
    }

    pub fn linear_to_log(&self, value: f64) -> f32 {
        if value <= 0.0 {
            return LOG_ZERO;
        }
        self.ln_to_log(value.ln())
    }

    pub fn log_to_linear(&self, value: f32) -> f64 {
        if value <= LOG_ZERO {
            return 0.0;
        }
        (value as f64 * self.ln_base).exp()
    }

    pub fn ln_to_log(&self, ln: f64) -> f32 {
        clamp(ln / self.ln_base)
    }

    pub fn log_to_ln(&self, value: f32) -> f64 {
        if value <= LOG_ZERO {
            return f64::NEG_INFINITY;
        }
        value as f64 * self.ln_base
    }

    /// `log(a' + b')` for `a = log(a')`, `b = log(b')`
    pub fn add_as_linear(&self, a: f32, b: f32) -> f32 {
        if a <= LOG_ZERO {
            return b;
        }
        if b <= LOG_ZERO {
            return a;
        }

        let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
        let diff_ln = (lo as f64 - hi as f64) * self.ln_base;
        clamp(hi as f64 + diff_ln.exp().ln_1p() / self.ln_base)
    }

    /// Log of the linear sum of every value
    pub fn log_sum<I: IntoIterator<Item = f32>>(&self, values: I) -> f32 {
        values
            .into_iter()
            .fold(LOG_ZERO, |acc, v| self.add_as_linear(acc, v))
    }
}

fn clamp(value: f64) -> f32 {
    if value.is_nan() || value <= LOG_ZERO as f64 {
        LOG_ZERO
    } else if value >= f32::MAX as f64 {
        f32::MAX
    } else {
        value as f32
    }
}
