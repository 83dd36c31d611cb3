//! Bounded capture queue between a producer thread and the pipeline
//!
//! The capture side (a device callback or a file reader) runs on its own
//! thread and pushes sample chunks; the pipeline pulls them through
//! [`AudioSource`]. The queue is FIFO and bounded: a full queue blocks the
//! producer, an empty one blocks the consumer. Stopping is cooperative: the
//! producer enqueues a `StreamEnd` marker rather than interrupting anyone.
//!
//! Both blocking calls must be made from plain threads, never from inside an
//! async runtime.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::data::{Data, DoubleData};
use crate::error::{FrontendError, Result};
use crate::processor::DataProcessor;

/// Create a connected producer/consumer pair
///
/// `capacity` is the number of chunks (not samples) the queue can hold.
pub fn capture_channel(capacity: usize, sample_rate: u32) -> Result<(CaptureProducer, AudioSource)> {
    if capacity == 0 {
        return Err(FrontendError::invalid_config("Capture queue capacity must be positive"));
    }
    if sample_rate == 0 {
        return Err(FrontendError::invalid_config("Sample rate cannot be zero"));
    }

    let (tx, rx) = mpsc::channel(capacity);
    let (ready_tx, ready_rx) = oneshot::channel();

    let producer = CaptureProducer {
        tx,
        ready: Some(ready_tx),
        sample_rate,
        samples_sent: 0,
        started: false,
    };
    let source = AudioSource {
        rx,
        ready: Some(ready_rx),
    };

    Ok((producer, source))
}

/// Capture side of the queue
pub struct CaptureProducer {
    tx: mpsc::Sender<Data>,
    ready: Option<oneshot::Sender<()>>,
    sample_rate: u32,
    samples_sent: u64,
    started: bool,
}

impl CaptureProducer {
    /// Begin a stream: resolves the readiness signal and enqueues `StreamStart`
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;
        self.samples_sent = 0;

        if let Some(ready) = self.ready.take() {
            // The consumer may not be waiting; that is fine
            let _ = ready.send(());
        }

        info!(sample_rate = self.sample_rate, "Capture started");
        self.send(Data::StreamStart {
            sample_rate: self.sample_rate,
            time_ms: 0,
        })
    }

    /// Enqueue a chunk of samples, blocking while the queue is full
    pub fn push(&mut self, samples: Vec<f64>) -> Result<()> {
        if !self.started {
            return Err(FrontendError::capture("Capture not started"));
        }
        let len = samples.len() as u64;
        let data = DoubleData::new(samples, self.sample_rate, self.samples_sent);
        self.send(Data::Audio(data))?;
        self.samples_sent += len;
        Ok(())
    }

    /// End the stream with a `StreamEnd` marker
    pub fn stop(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }
        self.started = false;

        let duration_ms = self.samples_sent * 1000 / self.sample_rate as u64;
        debug!(samples = self.samples_sent, duration_ms, "Capture stopped");
        self.send(Data::StreamEnd {
            sample_rate: self.sample_rate,
            duration_ms,
        })
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    fn send(&self, data: Data) -> Result<()> {
        self.tx
            .blocking_send(data)
            .map_err(|_| FrontendError::capture("Audio source was dropped"))
    }
}

/// Consumer side of the queue; the head of a frontend pipeline
pub struct AudioSource {
    rx: mpsc::Receiver<Data>,
    ready: Option<oneshot::Receiver<()>>,
}

impl AudioSource {
    /// Block until the producer has started capturing
    pub fn wait_for_start(&mut self) -> Result<()> {
        match self.ready.take() {
            Some(ready) => ready
                .blocking_recv()
                .map_err(|_| FrontendError::capture("Capture producer dropped before starting")),
            None => Ok(()),
        }
    }
}

impl DataProcessor for AudioSource {
    fn get_data(&mut self) -> Result<Option<Data>> {
        Ok(self.rx.blocking_recv())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_producer_thread_to_source() {
        let (mut producer, mut source) = capture_channel(2, 16000).unwrap();

        let handle = thread::spawn(move || {
            producer.start().unwrap();
            for _ in 0..5 {
                producer.push(vec![0.5; 160]).unwrap();
            }
            producer.stop().unwrap();
        });

        source.wait_for_start().unwrap();

        let mut frames = Vec::new();
        while let Some(data) = source.get_data().unwrap() {
            frames.push(data);
        }
        handle.join().unwrap();

        assert!(matches!(frames.first(), Some(Data::StreamStart { sample_rate: 16000, .. })));
        assert!(matches!(frames.last(), Some(Data::StreamEnd { duration_ms: 50, .. })));

        let numbers: Vec<u64> = frames
            .iter()
            .filter_map(|d| match d {
                Data::Audio(a) => Some(a.first_sample_number),
                _ => None,
            })
            .collect();
        assert_eq!(numbers, vec![0, 160, 320, 480, 640]);
    }

    #[test]
    fn test_push_before_start_fails() {
        let (mut producer, _source) = capture_channel(1, 16000).unwrap();
        assert!(producer.push(vec![0.0; 10]).is_err());
    }

    #[test]
    fn test_dropped_producer_unblocks_wait() {
        let (producer, mut source) = capture_channel(1, 16000).unwrap();
        drop(producer);
        assert!(source.wait_for_start().is_err());
        assert!(source.get_data().unwrap().is_none());
    }

    #[test]
    fn test_invalid_capacity() {
        assert!(capture_channel(0, 16000).is_err());
    }
}
