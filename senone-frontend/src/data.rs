//! Frame types flowing through the frontend

/// Audio samples for one frame, with stream metadata
#[derive(Debug, Clone, PartialEq)]
pub struct DoubleData {
    /// Samples (linear amplitude, 16-bit range for PCM input)
    pub values: Vec<f64>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Time (ms since stream start) at which the first sample was collected
    pub collect_time_ms: u64,
    /// Position of the first sample within the stream
    pub first_sample_number: u64,
}

impl DoubleData {
    pub fn new(values: Vec<f64>, sample_rate: u32, first_sample_number: u64) -> Self {
        let collect_time_ms = if sample_rate == 0 {
            0
        } else {
            first_sample_number * 1000 / sample_rate as u64
        };

        Self {
            values,
            sample_rate,
            collect_time_ms,
            first_sample_number,
        }
    }

    /// Duration covered by this frame in milliseconds
    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.values.len() as f64 * 1000.0 / self.sample_rate as f64
    }
}

/// A feature vector computed from one frame of audio
#[derive(Debug, Clone, PartialEq)]
pub struct FloatData {
    pub values: Vec<f32>,
    pub sample_rate: u32,
    pub collect_time_ms: u64,
    pub first_sample_number: u64,
}

impl FloatData {
    pub fn new(values: Vec<f32>, sample_rate: u32, first_sample_number: u64) -> Self {
        let collect_time_ms = if sample_rate == 0 {
            0
        } else {
            first_sample_number * 1000 / sample_rate as u64
        };

        Self {
            values,
            sample_rate,
            collect_time_ms,
            first_sample_number,
        }
    }

    /// Feature vector without stream metadata (tests and synthetic input)
    pub fn from_values(values: Vec<f32>) -> Self {
        Self::new(values, 0, 0)
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }
}

/// Audio frame labelled by the endpointer
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedAudio {
    pub audio: DoubleData,
    pub is_speech: bool,
}

/// Everything that travels between frontend stages
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    /// Start of a stream; resets stateful stages
    StreamStart { sample_rate: u32, time_ms: u64 },
    /// End of a stream; consumers must not request further frames for it
    StreamEnd { sample_rate: u32, duration_ms: u64 },
    /// Raw audio frame
    Audio(DoubleData),
    /// Audio frame with a speech/non-speech label
    Classified(ClassifiedAudio),
    /// Feature vector ready for scoring
    Features(FloatData),
}

impl Data {
    pub fn is_signal(&self) -> bool {
        matches!(self, Data::StreamStart { .. } | Data::StreamEnd { .. })
    }

    pub fn is_stream_end(&self) -> bool {
        matches!(self, Data::StreamEnd { .. })
    }

    pub fn as_features(&self) -> Option<&FloatData> {
        match self {
            Data::Features(features) => Some(features),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_time_from_sample_number() {
        let data = DoubleData::new(vec![0.0; 160], 16000, 32000);
        assert_eq!(data.collect_time_ms, 2000);
        assert_eq!(data.duration_ms(), 10.0);
    }

    #[test]
    fn test_signal_helpers() {
        let end = Data::StreamEnd { sample_rate: 16000, duration_ms: 10 };
        assert!(end.is_signal());
        assert!(end.is_stream_end());
        assert!(end.as_features().is_none());

        let features = Data::Features(FloatData::from_values(vec![1.0, 2.0]));
        assert!(!features.is_signal());
        assert_eq!(features.as_features().map(|f| f.dimension()), Some(2));
    }
}
