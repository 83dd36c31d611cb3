//! Regroups incoming audio chunks into fixed-length frames

use std::collections::VecDeque;

use tracing::debug;

use crate::buffer::FrameBuffer;
use crate::data::{Data, DoubleData};
use crate::error::{FrontendError, Result};
use crate::processor::DataProcessor;

/// Cuts the audio stream into frames of `frame_length_ms`
///
/// Chunks of any length go in; frames of exactly one block length come
/// out, except for a possibly shorter last frame flushed at end of stream.
/// A predecessor that runs dry between `StreamStart` and `StreamEnd` is
/// reported as [`FrontendError::UnexpectedEndOfStream`].
pub struct FrameBlocker {
    predecessor: Box<dyn DataProcessor>,
    frame_length_ms: u32,
    buffer: FrameBuffer,
    output: VecDeque<Data>,
    in_stream: bool,
}

impl FrameBlocker {
    pub fn new(predecessor: Box<dyn DataProcessor>, frame_length_ms: u32) -> Result<Self> {
        if frame_length_ms == 0 {
            return Err(FrontendError::invalid_config("Frame length must be positive"));
        }

        Ok(Self {
            predecessor,
            frame_length_ms,
            buffer: FrameBuffer::new(1, 0),
            output: VecDeque::new(),
            in_stream: false,
        })
    }

    /// Samples per frame at the current sample rate
    pub fn frame_size(&self) -> usize {
        self.buffer.frame_size()
    }

    fn configure(&mut self, sample_rate: u32) {
        let frame_size = ((sample_rate as u64 * self.frame_length_ms as u64) / 1000).max(1) as usize;
        self.buffer = FrameBuffer::new(frame_size, sample_rate);
        debug!(sample_rate, frame_size, "Frame blocker configured");
    }

    fn flush(&mut self) {
        if let Some(frame) = self.buffer.take_frame() {
            self.output.push_back(Data::Audio(frame));
        }
    }

    fn feed(&mut self, audio: DoubleData) {
        if audio.sample_rate != self.buffer.sample_rate() {
            // Audio without a preceding start signal
            self.flush();
            self.configure(audio.sample_rate);
        }

        let mut rest = &audio.values[..];
        while !rest.is_empty() {
            let written = self.buffer.fill(rest);
            rest = &rest[written..];
            if self.buffer.is_frame_complete() {
                self.flush();
            }
        }
    }
}

impl DataProcessor for FrameBlocker {
    fn get_data(&mut self) -> Result<Option<Data>> {
        while self.output.is_empty() {
            match self.predecessor.get_data()? {
                None if self.in_stream => {
                    let received = self.buffer.next_sample_number() + self.buffer.pending() as u64;
                    self.in_stream = false;
                    self.buffer.reset();
                    return Err(FrontendError::unexpected_end(format!(
                        "input ended {} samples into the stream without an end marker",
                        received
                    )));
                }
                None => {
                    self.flush();
                    break;
                }
                Some(Data::StreamStart { sample_rate, time_ms }) => {
                    self.flush();
                    self.configure(sample_rate);
                    self.in_stream = true;
                    self.output.push_back(Data::StreamStart { sample_rate, time_ms });
                }
                Some(Data::Audio(audio)) => self.feed(audio),
                Some(end @ Data::StreamEnd { .. }) => {
                    self.flush();
                    self.in_stream = false;
                    self.output.push_back(end);
                }
                Some(other) => self.output.push_back(other),
            }
        }

        Ok(self.output.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::VecSource;

    fn drain(blocker: &mut FrameBlocker) -> Vec<Data> {
        let mut frames = Vec::new();
        while let Some(data) = blocker.get_data().unwrap() {
            frames.push(data);
        }
        frames
    }

    #[test]
    fn test_blocks_into_fixed_frames() {
        let samples: Vec<f64> = (0..400).map(|i| i as f64).collect();
        let source = VecSource::from_samples(samples, 16000);
        let mut blocker = FrameBlocker::new(Box::new(source), 10).unwrap();

        let frames = drain(&mut blocker);
        let audio: Vec<&DoubleData> = frames
            .iter()
            .filter_map(|d| match d {
                Data::Audio(a) => Some(a),
                _ => None,
            })
            .collect();

        // 400 samples = 2 full frames of 160 + remainder of 80
        assert_eq!(audio.len(), 3);
        assert_eq!(audio[0].values.len(), 160);
        assert_eq!(audio[1].values.len(), 160);
        assert_eq!(audio[2].values.len(), 80);
        assert_eq!(audio[1].first_sample_number, 160);
        assert_eq!(audio[1].values[0], 160.0);
        assert_eq!(audio[2].collect_time_ms, 20);

        assert!(matches!(frames.first(), Some(Data::StreamStart { .. })));
        assert!(matches!(frames.last(), Some(Data::StreamEnd { .. })));
    }

    #[test]
    fn test_joins_small_chunks() {
        let mut input = vec![Data::StreamStart { sample_rate: 1000, time_ms: 0 }];
        for n in 0..5 {
            input.push(Data::Audio(DoubleData::new(vec![n as f64; 4], 1000, n * 4)));
        }
        input.push(Data::StreamEnd { sample_rate: 1000, duration_ms: 20 });

        let mut blocker = FrameBlocker::new(Box::new(VecSource::new(input)), 10).unwrap();
        let frames = drain(&mut blocker);

        // 20 samples at 1 kHz, 10 ms frames = 2 frames of 10
        let sizes: Vec<usize> = frames
            .iter()
            .filter_map(|d| match d {
                Data::Audio(a) => Some(a.values.len()),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![10, 10]);
    }

    #[test]
    fn test_stream_without_end_marker_is_an_error() {
        let input = vec![
            Data::StreamStart { sample_rate: 16000, time_ms: 0 },
            Data::Audio(DoubleData::new(vec![0.0; 100], 16000, 0)),
        ];
        let mut blocker = FrameBlocker::new(Box::new(VecSource::new(input)), 10).unwrap();

        assert!(matches!(blocker.get_data().unwrap(), Some(Data::StreamStart { .. })));
        match blocker.get_data() {
            Err(FrontendError::UnexpectedEndOfStream(msg)) => assert!(msg.contains("100 samples")),
            other => panic!("expected UnexpectedEndOfStream, got {:?}", other),
        }
        // The stream is closed once reported
        assert!(blocker.get_data().unwrap().is_none());
    }

    #[test]
    fn test_rejects_zero_frame_length() {
        assert!(FrameBlocker::new(Box::new(VecSource::default()), 0).is_err());
    }
}
