//! Level-tracking speech classifier

use senone_frontend::{ClassifiedAudio, Data, DataProcessor, DoubleData, FrontendError};
use tracing::{debug, trace};

use crate::error::Result;
use crate::EndpointConfig;

const INITIAL_BACKGROUND: f64 = 100.0;

/// Frame energy in dB: `20 * log10(max(rms, 1))`
///
/// The floor of 1 keeps digital silence at 0 dB instead of minus infinity.
pub fn log_root_mean_square(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_of_squares: f64 = samples.iter().map(|s| s * s).sum();
    let rms = (sum_of_squares / samples.len() as f64).sqrt().max(1.0);
    20.0 * rms.log10()
}

/// Labels every audio frame as speech or non-speech
///
/// Emits `Data::Classified` for each `Data::Audio` frame and passes signals
/// through untouched. State is reset on every `StreamStart`.
pub struct SpeechClassifier {
    predecessor: Box<dyn DataProcessor>,
    config: EndpointConfig,
    level: f64,
    background: f64,
    frames: u64,
    speech_frames: u64,
}

impl SpeechClassifier {
    pub fn new(predecessor: Box<dyn DataProcessor>, config: EndpointConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            predecessor,
            config,
            level: 0.0,
            background: INITIAL_BACKGROUND,
            frames: 0,
            speech_frames: 0,
        })
    }

    /// Forget the level and background estimates
    pub fn reset(&mut self) {
        self.level = 0.0;
        self.background = INITIAL_BACKGROUND;
        self.frames = 0;
        self.speech_frames = 0;
    }

    /// Current level estimate in dB
    pub fn level(&self) -> f64 {
        self.level
    }

    /// Current background estimate in dB
    pub fn background(&self) -> f64 {
        self.background
    }

    /// Frames classified since the last reset, and how many were speech
    pub fn frame_counts(&self) -> (u64, u64) {
        (self.frames, self.speech_frames)
    }

    /// Update the estimates with one frame and classify it
    pub fn classify_samples(&mut self, samples: &[f64]) -> bool {
        let current = log_root_mean_square(samples);

        // Frames below min_signal are never speech
        let mut is_speech = false;
        if current >= self.config.min_signal {
            self.level = (self.level + current) / 2.0;
            if current < self.background {
                self.background = current;
            } else {
                self.background += (current - self.background) * self.config.adjustment;
            }
            if self.level < self.background {
                self.level = self.background;
            }
            is_speech = self.level - self.background > self.config.threshold;
        }

        self.frames += 1;
        if is_speech {
            self.speech_frames += 1;
        }

        trace!(
            current,
            level = self.level,
            background = self.background,
            is_speech,
            "Classified frame"
        );

        is_speech
    }

    fn classify(&mut self, audio: DoubleData) -> std::result::Result<Data, FrontendError> {
        let max = (self.config.frame_length_ms as u64 * audio.sample_rate as u64 / 1000) as usize;
        if audio.values.len() > max {
            return Err(FrontendError::FrameTooLong {
                got: audio.values.len(),
                max,
            });
        }

        let is_speech = self.classify_samples(&audio.values);
        Ok(Data::Classified(ClassifiedAudio { audio, is_speech }))
    }
}

impl DataProcessor for SpeechClassifier {
    fn get_data(&mut self) -> senone_frontend::Result<Option<Data>> {
        let data = match self.predecessor.get_data()? {
            Some(data) => data,
            None => return Ok(None),
        };

        match data {
            Data::StreamStart { sample_rate, time_ms } => {
                self.reset();
                debug!(sample_rate, "Speech classifier reset");
                Ok(Some(Data::StreamStart { sample_rate, time_ms }))
            }
            Data::StreamEnd { sample_rate, duration_ms } => {
                debug!(
                    frames = self.frames,
                    speech_frames = self.speech_frames,
                    "Speech classifier reached end of stream"
                );
                Ok(Some(Data::StreamEnd { sample_rate, duration_ms }))
            }
            Data::Audio(audio) => self.classify(audio).map(Some),
            other => Ok(Some(other)),
        }
    }
}
