//! Senone Frontend
//!
//! Pull-based audio frontend feeding the acoustic scorer.
//!
//! ## Architecture
//!
//! ```text
//! capture thread
//!   │  CaptureProducer::push (bounded, blocking)
//!   ▼
//! AudioSource ──> FrameBlocker (10 ms frames, ringbuf)
//!                   │
//!                   ├─> SpeechClassifier / NonSpeechFilter (senone-endpoint)
//!                   │
//!                   └─> FeatureExtractor (rustfft) ──> AcousticScorer
//! ```
//!
//! Every stage implements [`DataProcessor`]: `get_data()` blocks until the
//! next [`Data`] item is ready and returns `Ok(None)` once the stream is
//! exhausted.

pub mod blocker;
pub mod buffer;
pub mod capture;
pub mod data;
pub mod error;
pub mod features;
pub mod processor;

pub use blocker::FrameBlocker;
pub use buffer::FrameBuffer;
pub use capture::{capture_channel, AudioSource, CaptureProducer};
pub use data::{ClassifiedAudio, Data, DoubleData, FloatData};
pub use error::{FrontendError, Result};
pub use features::{FeatureConfig, FeatureExtractor};
pub use processor::{DataProcessor, VecSource};

/// Default sample rate (16kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 16000;

/// Default frame length in milliseconds
pub const DEFAULT_FRAME_LENGTH_MS: u32 = 10;

/// Frontend configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FrontendConfig {
    /// Expected input sample rate (default: 16000 Hz)
    pub sample_rate: u32,
    /// Frame length in milliseconds (default: 10)
    pub frame_length_ms: u32,
    /// Capacity of the capture queue, in chunks (default: 64)
    pub queue_capacity: usize,
    /// Cepstral feature settings
    pub features: FeatureConfig,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            frame_length_ms: DEFAULT_FRAME_LENGTH_MS,
            queue_capacity: 64,
            features: FeatureConfig::default(),
        }
    }
}

impl FrontendConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(FrontendError::invalid_config("Sample rate cannot be zero"));
        }
        if self.frame_length_ms == 0 {
            return Err(FrontendError::invalid_config("Frame length must be positive"));
        }
        if self.queue_capacity == 0 {
            return Err(FrontendError::invalid_config("Queue capacity must be positive"));
        }
        self.features.validate()
    }
}
