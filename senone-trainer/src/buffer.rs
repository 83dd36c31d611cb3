//! Accumulators for one pool entry

use senone_acoustic::{LogMath, LOG_ZERO};

/// Running statistics for one pool entry or one transition matrix row
///
/// A linear buffer sums weighted vectors and their weights; a log buffer
/// log-adds values into individual lanes. `was_used` is set by the first
/// non-zero contribution only.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    id: usize,
    is_log: bool,
    lanes: Vec<f64>,
    mass: f64,
    was_used: bool,
}

impl Buffer {
    pub fn new(len: usize, is_log: bool, id: usize) -> Self {
        let zero = if is_log { LOG_ZERO as f64 } else { 0.0 };
        Self {
            id,
            is_log,
            lanes: vec![zero; len],
            mass: zero,
            was_used: false,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_log(&self) -> bool {
        self.is_log
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    pub fn was_used(&self) -> bool {
        self.was_used
    }

    /// Total weight (linear) or log of total weight (log)
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Add `weight * vector[i]` to every lane
    pub fn accumulate(&mut self, vector: &[f32], weight: f64) {
        debug_assert!(!self.is_log, "linear accumulate on log buffer {}", self.id);
        assert_eq!(vector.len(), self.lanes.len(), "buffer {} dimension", self.id);
        if weight <= 0.0 {
            return;
        }

        for (lane, &x) in self.lanes.iter_mut().zip(vector) {
            *lane += weight * x as f64;
        }
        self.mass += weight;
        self.was_used = true;
    }

    /// Log-add `log_value` into `lane`
    pub fn log_accumulate(&mut self, log_value: f32, lane: usize, log_math: &LogMath) {
        debug_assert!(self.is_log, "log accumulate on linear buffer {}", self.id);
        if log_value <= LOG_ZERO {
            return;
        }

        self.lanes[lane] = log_math.add_as_linear(self.lanes[lane] as f32, log_value) as f64;
        self.mass = log_math.add_as_linear(self.mass as f32, log_value) as f64;
        self.was_used = true;
    }

    /// Divide every lane by the accumulated weight
    pub fn normalize(&mut self) {
        if self.mass <= 0.0 {
            return;
        }
        let mass = self.mass;
        self.lanes.iter_mut().for_each(|lane| *lane /= mass);
        self.mass = 1.0;
    }

    /// Log-domain divide by the accumulated mass
    pub fn log_normalize(&mut self) {
        let mass = self.mass;
        if mass <= LOG_ZERO as f64 {
            return;
        }
        for lane in self.lanes.iter_mut().filter(|l| **l > LOG_ZERO as f64) {
            *lane -= mass;
        }
        self.mass = 0.0;
    }

    /// Log-domain normalisation over the lanes `mask` permits
    ///
    /// Lanes where `mask` is LOG_ZERO are forced to LOG_ZERO and excluded
    /// from the sum.
    pub fn log_normalize_non_zero(&mut self, mask: &[f32], log_math: &LogMath) {
        assert_eq!(mask.len(), self.lanes.len(), "buffer {} mask length", self.id);

        let permitted = |i: usize| mask[i] != LOG_ZERO;
        let total = log_math.log_sum(
            (0..self.lanes.len())
                .filter(|&i| permitted(i))
                .map(|i| self.lanes[i] as f32),
        );
        if total <= LOG_ZERO {
            return;
        }

        for (i, lane) in self.lanes.iter_mut().enumerate() {
            if !permitted(i) || *lane <= LOG_ZERO as f64 {
                *lane = LOG_ZERO as f64;
            } else {
                *lane -= total as f64;
            }
        }
        self.mass = 0.0;
    }

    /// Rescale the non-zero lanes so that their linear sum is one
    pub fn log_normalize_to_sum(&mut self, log_math: &LogMath) {
        let total = log_math.log_sum(self.lanes.iter().map(|&l| l as f32));
        if total <= LOG_ZERO {
            return;
        }
        for lane in self.lanes.iter_mut().filter(|l| **l > LOG_ZERO as f64) {
            *lane -= total as f64;
        }
        self.mass = 0.0;
    }

    /// Raise every lane below `floor` to `floor`; true if any lane moved
    pub fn log_floor(&mut self, floor: f32) -> bool {
        let mut clamped = false;
        for lane in self.lanes.iter_mut() {
            if *lane < floor as f64 {
                *lane = floor as f64;
                clamped = true;
            }
        }
        clamped
    }

    /// Like [`Buffer::log_floor`], leaving LOG_ZERO lanes untouched
    pub fn log_floor_non_zero(&mut self, floor: f32) -> bool {
        let mut clamped = false;
        for lane in self.lanes.iter_mut().filter(|l| **l > LOG_ZERO as f64) {
            if *lane < floor as f64 {
                *lane = floor as f64;
                clamped = true;
            }
        }
        clamped
    }

    pub fn value(&self, lane: usize) -> f32 {
        self.lanes[lane] as f32
    }

    pub fn set_value(&mut self, lane: usize, value: f32) {
        self.lanes[lane] = value as f64;
    }

    pub fn values(&self) -> Vec<f32> {
        self.lanes.iter().map(|&l| l as f32).collect()
    }
}
