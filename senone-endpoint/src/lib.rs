//! Speech/non-speech endpointing for the senone frontend
//!
//! A level-tracking endpointer: every frame's energy (root mean square in
//! decibels) updates a fast-rising `level` and a slowly adapting
//! `background` estimate. A frame is speech while the level stands more than
//! `threshold` dB above the background.
//!
//! # Example
//!
//! ```
//! use senone_endpoint::{EndpointConfig, NonSpeechFilter, SpeechClassifier};
//! use senone_frontend::{DataProcessor, FrameBlocker, VecSource};
//!
//! let source = VecSource::from_samples(vec![0.0; 1600], 16000);
//! let blocker = FrameBlocker::new(Box::new(source), 10)?;
//! let classifier = SpeechClassifier::new(Box::new(blocker), EndpointConfig::default())?;
//! let mut filter = NonSpeechFilter::new(Box::new(classifier));
//!
//! // Pure silence: only the stream signals survive
//! while let Some(data) = filter.get_data()? {
//!     assert!(data.is_signal());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod classifier;
mod error;
mod filter;

pub use classifier::{log_root_mean_square, SpeechClassifier};
pub use error::{EndpointError, Result};
pub use filter::NonSpeechFilter;

/// Endpointer configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Longest accepted frame, in milliseconds (default: 10)
    pub frame_length_ms: u32,

    /// Frames quieter than this (dB) do not update the estimates (default: 0)
    pub min_signal: f64,

    /// Level must exceed background by this many dB to be speech (default: 10)
    pub threshold: f64,

    /// Rate at which the background follows a louder signal (default: 0.003)
    pub adjustment: f64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            frame_length_ms: 10,
            min_signal: 0.0,
            threshold: 10.0,
            adjustment: 0.003,
        }
    }
}

impl EndpointConfig {
    /// Set the speech threshold in dB
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the background adjustment rate
    pub fn adjustment(mut self, adjustment: f64) -> Self {
        self.adjustment = adjustment;
        self
    }

    /// Set the minimum signal level in dB
    pub fn min_signal(mut self, min_signal: f64) -> Self {
        self.min_signal = min_signal;
        self
    }

    /// Set the maximum frame length
    pub fn frame_length(mut self, frame_length_ms: u32) -> Self {
        self.frame_length_ms = frame_length_ms;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.frame_length_ms == 0 {
            return Err(EndpointError::config("frame_length_ms must be positive"));
        }

        if !(self.adjustment > 0.0 && self.adjustment <= 1.0) {
            return Err(EndpointError::config("adjustment must be in (0, 1]"));
        }

        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(EndpointError::config("threshold must be a non-negative number of dB"));
        }

        if !self.min_signal.is_finite() {
            return Err(EndpointError::config("min_signal must be finite"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EndpointConfig::default();
        assert_eq!(config.frame_length_ms, 10);
        assert_eq!(config.threshold, 10.0);
        assert_eq!(config.adjustment, 0.003);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = EndpointConfig::default()
            .threshold(6.0)
            .adjustment(0.01)
            .min_signal(-10.0)
            .frame_length(20);

        assert_eq!(config.threshold, 6.0);
        assert_eq!(config.adjustment, 0.01);
        assert_eq!(config.min_signal, -10.0);
        assert_eq!(config.frame_length_ms, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(EndpointConfig::default().adjustment(0.0).validate().is_err());
        assert!(EndpointConfig::default().adjustment(1.5).validate().is_err());
        assert!(EndpointConfig::default().threshold(-1.0).validate().is_err());
        assert!(EndpointConfig::default().frame_length(0).validate().is_err());
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: EndpointConfig = serde_json::from_str(r#"{ "threshold": 12.5 }"#).unwrap();
        assert_eq!(config.threshold, 12.5);
        assert_eq!(config.adjustment, 0.003);
    }
}
