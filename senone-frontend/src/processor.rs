//! Pull-based processing stages

use std::collections::VecDeque;

use crate::data::Data;
use crate::error::Result;

/// A stage in the frontend pipeline
///
/// Each call blocks until a frame is available. `Ok(None)` means the stage
/// has nothing further to deliver; a `Data::StreamEnd` marker precedes that
/// for a properly terminated stream.
pub trait DataProcessor: Send {
    fn get_data(&mut self) -> Result<Option<Data>>;
}

impl<P: DataProcessor + ?Sized> DataProcessor for Box<P> {
    fn get_data(&mut self) -> Result<Option<Data>> {
        (**self).get_data()
    }
}

/// In-memory source over a fixed list of frames
#[derive(Debug, Default)]
pub struct VecSource {
    frames: VecDeque<Data>,
}

impl VecSource {
    pub fn new(frames: Vec<Data>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    /// Wrap raw samples as a single terminated stream of one chunk
    pub fn from_samples(samples: Vec<f64>, sample_rate: u32) -> Self {
        let duration_ms = samples.len() as u64 * 1000 / sample_rate.max(1) as u64;
        Self::new(vec![
            Data::StreamStart { sample_rate, time_ms: 0 },
            Data::Audio(crate::data::DoubleData::new(samples, sample_rate, 0)),
            Data::StreamEnd { sample_rate, duration_ms },
        ])
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl DataProcessor for VecSource {
    fn get_data(&mut self) -> Result<Option<Data>> {
        Ok(self.frames.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_source_drains_in_order() {
        let mut source = VecSource::from_samples(vec![0.0; 32], 16000);
        assert_eq!(source.remaining(), 3);

        assert!(matches!(source.get_data().unwrap(), Some(Data::StreamStart { .. })));
        assert!(matches!(source.get_data().unwrap(), Some(Data::Audio(_))));
        assert!(matches!(source.get_data().unwrap(), Some(Data::StreamEnd { .. })));
        assert!(source.get_data().unwrap().is_none());
    }

    #[test]
    fn test_boxed_processor() {
        let mut boxed: Box<dyn DataProcessor> = Box::new(VecSource::new(vec![]));
        assert!(boxed.get_data().unwrap().is_none());
    }
}
