//! Drops non-speech frames before they reach feature extraction

use senone_frontend::{Data, DataProcessor, Result};
use tracing::debug;

/// Passes only speech frames and stream signals
///
/// Unlabelled audio is passed through unchanged.
pub struct NonSpeechFilter {
    predecessor: Box<dyn DataProcessor>,
    dropped: u64,
    in_speech: bool,
}

impl NonSpeechFilter {
    pub fn new(predecessor: Box<dyn DataProcessor>) -> Self {
        Self {
            predecessor,
            dropped: 0,
            in_speech: false,
        }
    }

    /// Non-speech frames discarded so far
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }
}

impl DataProcessor for NonSpeechFilter {
    fn get_data(&mut self) -> Result<Option<Data>> {
        loop {
            let data = match self.predecessor.get_data()? {
                Some(data) => data,
                None => return Ok(None),
            };

            match data {
                Data::Classified(ref classified) if !classified.is_speech => {
                    if self.in_speech {
                        debug!(
                            sample = classified.audio.first_sample_number,
                            "Speech ended"
                        );
                        self.in_speech = false;
                    }
                    self.dropped += 1;
                }
                Data::Classified(classified) => {
                    if !self.in_speech {
                        debug!(
                            sample = classified.audio.first_sample_number,
                            "Speech started"
                        );
                        self.in_speech = true;
                    }
                    return Ok(Some(Data::Classified(classified)));
                }
                Data::StreamStart { .. } => {
                    self.in_speech = false;
                    return Ok(Some(data));
                }
                other => return Ok(Some(other)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use senone_frontend::{ClassifiedAudio, DoubleData, VecSource};

    fn frame(n: u64, is_speech: bool) -> Data {
        Data::Classified(ClassifiedAudio {
            audio: DoubleData::new(vec![0.0; 160], 16000, n * 160),
            is_speech,
        })
    }

    #[test]
    fn test_filters_non_speech() {
        let input = vec![
            Data::StreamStart { sample_rate: 16000, time_ms: 0 },
            frame(0, false),
            frame(1, true),
            frame(2, false),
            frame(3, true),
            Data::StreamEnd { sample_rate: 16000, duration_ms: 40 },
        ];
        let mut filter = NonSpeechFilter::new(Box::new(VecSource::new(input)));

        let mut out = Vec::new();
        while let Some(data) = filter.get_data().unwrap() {
            out.push(data);
        }

        assert_eq!(out.len(), 4);
        assert!(matches!(out[0], Data::StreamStart { .. }));
        assert_eq!(out[1], frame(1, true));
        assert_eq!(out[2], frame(3, true));
        assert!(out[3].is_stream_end());
        assert_eq!(filter.dropped_frames(), 2);
    }

    #[test]
    fn test_unlabelled_audio_passes() {
        let audio = Data::Audio(DoubleData::new(vec![1.0; 10], 1000, 0));
        let mut filter = NonSpeechFilter::new(Box::new(VecSource::new(vec![audio.clone()])));
        assert_eq!(filter.get_data().unwrap(), Some(audio));
        assert_eq!(filter.get_data().unwrap(), None);
    }
}
