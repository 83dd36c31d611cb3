//! Staging buffer that assembles fixed-size frames

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;

use crate::data::DoubleData;

/// Ring buffer holding at most one frame of samples
///
/// Samples are appended until the frame is complete, then taken out as a
/// [`DoubleData`] stamped with its position in the stream. The next frame
/// continues numbering where the previous one stopped.
pub struct FrameBuffer {
    producer: ringbuf::HeapProd<f64>,
    consumer: ringbuf::HeapCons<f64>,
    frame_size: usize,
    sample_rate: u32,
    next_sample_number: u64,
}

impl FrameBuffer {
    /// Buffer for frames of `frame_size` samples at `sample_rate`
    ///
    /// ```
    /// use senone_frontend::FrameBuffer;
    ///
    /// let mut buffer = FrameBuffer::new(160, 16000); // one 10 ms frame
    /// assert_eq!(buffer.fill(&[0.0; 100]), 100);
    /// assert!(!buffer.is_frame_complete());
    /// ```
    pub fn new(frame_size: usize, sample_rate: u32) -> Self {
        let frame_size = frame_size.max(1);
        let (producer, consumer) = HeapRb::<f64>::new(frame_size).split();

        Self {
            producer,
            consumer,
            frame_size,
            sample_rate,
            next_sample_number: 0,
        }
    }

    /// Append as many samples as the current frame still takes
    pub fn fill(&mut self, samples: &[f64]) -> usize {
        self.producer.push_slice(samples)
    }

    pub fn is_frame_complete(&self) -> bool {
        self.producer.is_full()
    }

    /// Samples waiting in the current frame
    pub fn pending(&self) -> usize {
        self.consumer.occupied_len()
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Stream position the next frame starts at
    pub fn next_sample_number(&self) -> u64 {
        self.next_sample_number
    }

    /// Take whatever is buffered as a frame; `None` when nothing is pending
    ///
    /// Called on a complete frame this yields exactly `frame_size` samples;
    /// at end of stream it flushes a shorter remainder.
    pub fn take_frame(&mut self) -> Option<DoubleData> {
        let pending = self.pending();
        if pending == 0 {
            return None;
        }

        let mut samples = vec![0.0; pending];
        let read = self.consumer.pop_slice(&mut samples);
        samples.truncate(read);

        let frame = DoubleData::new(samples, self.sample_rate, self.next_sample_number);
        self.next_sample_number += read as u64;
        Some(frame)
    }

    /// Drop pending samples and restart numbering at zero
    pub fn reset(&mut self) {
        self.consumer.clear();
        self.next_sample_number = 0;
    }
}
