//! Cepstral feature extraction
//!
//! Turns each audio frame into a mel-frequency cepstral vector: the frame is
//! pre-emphasised and appended to a sliding analysis window, Hamming
//! windowed, transformed with an FFT, folded through a triangular mel
//! filterbank, logged and finally decorrelated with a DCT-II.

use std::collections::VecDeque;
use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use tracing::debug;

use crate::data::{Data, DoubleData, FloatData};
use crate::error::{FrontendError, Result};
use crate::processor::DataProcessor;

/// Feature extractor configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Number of triangular mel filters
    pub num_filters: usize,
    /// Number of cepstral coefficients kept (feature dimension)
    pub num_cepstra: usize,
    /// Analysis window length in milliseconds
    pub window_ms: f32,
    /// Lower edge of the filterbank in Hz
    pub f_min: f32,
    /// Upper edge of the filterbank in Hz
    pub f_max: f32,
    /// Pre-emphasis factor (0 disables)
    pub pre_emphasis: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            num_filters: 40,
            num_cepstra: 13,
            window_ms: 25.625,
            f_min: 133.333_34,
            f_max: 6855.4976,
            pre_emphasis: 0.97,
        }
    }
}

impl FeatureConfig {
    pub fn num_cepstra(mut self, num_cepstra: usize) -> Self {
        self.num_cepstra = num_cepstra;
        self
    }

    pub fn num_filters(mut self, num_filters: usize) -> Self {
        self.num_filters = num_filters;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_filters == 0 {
            return Err(FrontendError::invalid_config("num_filters must be positive"));
        }
        if self.num_cepstra == 0 || self.num_cepstra > self.num_filters {
            return Err(FrontendError::invalid_config(
                "num_cepstra must be between 1 and num_filters",
            ));
        }
        if self.window_ms <= 0.0 {
            return Err(FrontendError::invalid_config("window_ms must be positive"));
        }
        if !(0.0..self.f_max).contains(&self.f_min) {
            return Err(FrontendError::invalid_config("f_min must be in [0, f_max)"));
        }
        if !(0.0..1.0).contains(&self.pre_emphasis) {
            return Err(FrontendError::invalid_config("pre_emphasis must be in [0, 1)"));
        }
        Ok(())
    }
}

/// Frontend stage producing `Data::Features` from audio frames
pub struct FeatureExtractor {
    predecessor: Box<dyn DataProcessor>,
    config: FeatureConfig,
    sample_rate: u32,
    window_size: usize,
    fft: Option<Arc<dyn Fft<f64>>>,
    fft_size: usize,
    mel_banks: Vec<Vec<f64>>,
    hamming: Vec<f64>,
    history: VecDeque<f64>,
    prior_sample: f64,
}

impl FeatureExtractor {
    pub fn new(predecessor: Box<dyn DataProcessor>, config: FeatureConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            predecessor,
            config,
            sample_rate: 0,
            window_size: 0,
            fft: None,
            fft_size: 0,
            mel_banks: Vec::new(),
            hamming: Vec::new(),
            history: VecDeque::new(),
            prior_sample: 0.0,
        })
    }

    /// Dimension of the produced feature vectors
    pub fn dimension(&self) -> usize {
        self.config.num_cepstra
    }

    fn configure(&mut self, sample_rate: u32) -> Result<()> {
        if sample_rate == 0 {
            return Err(FrontendError::processing("Audio frame with zero sample rate"));
        }
        if self.config.f_max as f64 > sample_rate as f64 / 2.0 {
            return Err(FrontendError::invalid_config(format!(
                "f_max {} exceeds the Nyquist frequency of {} Hz audio",
                self.config.f_max, sample_rate
            )));
        }

        let window_size = ((sample_rate as f64 * self.config.window_ms as f64) / 1000.0).round() as usize;
        let window_size = window_size.max(2);
        let fft_size = window_size.next_power_of_two();

        self.sample_rate = sample_rate;
        self.window_size = window_size;
        self.fft_size = fft_size;
        self.fft = Some(FftPlanner::<f64>::new().plan_fft_forward(fft_size));
        self.hamming = (0..window_size)
            .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (window_size - 1) as f64).cos())
            .collect();
        self.mel_banks = create_mel_filterbanks(&self.config, sample_rate, fft_size);
        self.history.clear();
        self.prior_sample = 0.0;

        debug!(sample_rate, window_size, fft_size, "Feature extractor configured");
        Ok(())
    }

    /// Compute the cepstrum of one frame
    pub fn compute(&mut self, audio: &DoubleData) -> Result<Vec<f32>> {
        if audio.sample_rate != self.sample_rate || self.fft.is_none() {
            self.configure(audio.sample_rate)?;
        }

        for &sample in &audio.values {
            let emphasised = sample - self.config.pre_emphasis * self.prior_sample;
            self.prior_sample = sample;
            self.history.push_back(emphasised);
        }
        while self.history.len() > self.window_size {
            self.history.pop_front();
        }

        // Right-align the window; pad the front with zeros at stream start
        let pad = self.window_size - self.history.len();
        let mut buffer = vec![Complex::new(0.0, 0.0); self.fft_size];
        for (i, &sample) in self.history.iter().enumerate() {
            buffer[pad + i] = Complex::new(sample * self.hamming[pad + i], 0.0);
        }

        let fft = self
            .fft
            .as_ref()
            .ok_or_else(|| FrontendError::processing("FFT not configured"))?;
        fft.process(&mut buffer);

        let spectrum: Vec<f64> = buffer[..=self.fft_size / 2]
            .iter()
            .map(|c| c.norm_sqr())
            .collect();

        let log_mel: Vec<f64> = self
            .mel_banks
            .iter()
            .map(|bank| {
                let energy: f64 = bank.iter().zip(spectrum.iter()).map(|(b, s)| b * s).sum();
                energy.max(1e-10).ln()
            })
            .collect();

        Ok(dct(&log_mel, self.config.num_cepstra))
    }
}

impl DataProcessor for FeatureExtractor {
    fn get_data(&mut self) -> Result<Option<Data>> {
        let data = match self.predecessor.get_data()? {
            Some(data) => data,
            None => return Ok(None),
        };

        let audio = match data {
            Data::StreamStart { sample_rate, time_ms } => {
                self.configure(sample_rate)?;
                return Ok(Some(Data::StreamStart { sample_rate, time_ms }));
            }
            Data::Audio(audio) => audio,
            Data::Classified(classified) => classified.audio,
            other => return Ok(Some(other)),
        };

        let values = self.compute(&audio)?;
        Ok(Some(Data::Features(FloatData::new(
            values,
            audio.sample_rate,
            audio.first_sample_number,
        ))))
    }
}

/// DCT-II of the log filterbank energies, truncated to `num_cepstra`
fn dct(log_mel: &[f64], num_cepstra: usize) -> Vec<f32> {
    let m = log_mel.len() as f64;
    (0..num_cepstra)
        .map(|k| {
            let sum: f64 = log_mel
                .iter()
                .enumerate()
                .map(|(j, &e)| e * (PI * k as f64 * (j as f64 + 0.5) / m).cos())
                .sum();
            (sum / m) as f32
        })
        .collect()
}

fn create_mel_filterbanks(config: &FeatureConfig, sample_rate: u32, fft_size: usize) -> Vec<Vec<f64>> {
    let num_bins = config.num_filters;
    let fft_bins = fft_size / 2 + 1;

    let mel_min = hz_to_mel(config.f_min as f64);
    let mel_max = hz_to_mel(config.f_max as f64);

    // Equally spaced on the mel scale, mapped back to FFT bins
    let bin_points: Vec<usize> = (0..=num_bins + 1)
        .map(|i| mel_min + (mel_max - mel_min) * i as f64 / (num_bins + 1) as f64)
        .map(mel_to_hz)
        .map(|f| ((fft_size as f64 * f / sample_rate as f64).floor() as usize).min(fft_bins - 1))
        .collect();

    let mut banks = Vec::with_capacity(num_bins);
    for i in 0..num_bins {
        let mut bank = vec![0.0; fft_bins];

        let left = bin_points[i];
        let center = bin_points[i + 1];
        let right = bin_points[i + 2];

        for (j, weight) in bank.iter_mut().enumerate().take(center).skip(left) {
            *weight = (j - left) as f64 / (center - left) as f64;
        }
        for (j, weight) in bank.iter_mut().enumerate().take(right).skip(center) {
            *weight = (right - j) as f64 / (right - center) as f64;
        }
        // Narrow filters collapse to a single bin
        if left == right {
            bank[center] = 1.0;
        }

        banks.push(bank);
    }

    banks
}

fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10.0_f64.powf(mel / 2595.0) - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocker::FrameBlocker;
    use crate::processor::VecSource;
    use approx::assert_relative_eq;

    fn sine(freq: f64, amplitude: f64, samples: usize) -> Vec<f64> {
        (0..samples)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / 16000.0).sin())
            .collect()
    }

    #[test]
    fn test_mel_conversion() {
        let hz = 1000.0;
        assert_relative_eq!(mel_to_hz(hz_to_mel(hz)), hz, epsilon = 1e-6);
    }

    #[test]
    fn test_config_validation() {
        assert!(FeatureConfig::default().validate().is_ok());
        assert!(FeatureConfig::default().num_cepstra(0).validate().is_err());
        assert!(FeatureConfig::default().num_cepstra(50).validate().is_err());
    }

    #[test]
    fn test_features_per_frame() {
        let source = VecSource::from_samples(sine(440.0, 3000.0, 1600), 16000);
        let blocker = FrameBlocker::new(Box::new(source), 10).unwrap();
        let mut extractor = FeatureExtractor::new(Box::new(blocker), FeatureConfig::default()).unwrap();

        let mut vectors = Vec::new();
        while let Some(data) = extractor.get_data().unwrap() {
            if let Data::Features(f) = data {
                vectors.push(f);
            }
        }

        assert_eq!(vectors.len(), 10);
        assert!(vectors.iter().all(|v| v.dimension() == 13));
        assert!(vectors.iter().all(|v| v.values.iter().all(|x| x.is_finite())));
        assert_eq!(vectors[3].first_sample_number, 480);
    }

    #[test]
    fn test_louder_signal_raises_c0() {
        let config = FeatureConfig::default();
        let mut quiet = FeatureExtractor::new(Box::new(VecSource::default()), config.clone()).unwrap();
        let mut loud = FeatureExtractor::new(Box::new(VecSource::default()), config).unwrap();

        let frame = |amp| DoubleData::new(sine(1000.0, amp, 410), 16000, 0);
        let c_quiet = quiet.compute(&frame(10.0)).unwrap();
        let c_loud = loud.compute(&frame(10000.0)).unwrap();

        assert!(c_loud[0] > c_quiet[0]);
    }
}
