//! Endpointer behaviour on synthetic level steps

use senone_endpoint::{EndpointConfig, NonSpeechFilter, SpeechClassifier};
use senone_frontend::{Data, DataProcessor, FrameBlocker, VecSource};

const RATE: u32 = 16000;
const FRAME: usize = 160;

/// `frames` frames of a square wave with the given RMS amplitude
fn tone(frames: usize, rms: f64) -> Vec<f64> {
    (0..frames * FRAME)
        .map(|i| if i % 2 == 0 { rms } else { -rms })
        .collect()
}

fn labels(samples: Vec<f64>) -> Vec<bool> {
    let source = VecSource::from_samples(samples, RATE);
    let blocker = FrameBlocker::new(Box::new(source), 10).unwrap();
    let mut classifier = SpeechClassifier::new(Box::new(blocker), EndpointConfig::default()).unwrap();

    let mut labels = Vec::new();
    while let Some(data) = classifier.get_data().unwrap() {
        if let Data::Classified(c) = data {
            labels.push(c.is_speech);
        }
    }
    labels
}

#[test]
fn test_step_flips_to_speech_and_back() {
    // 1 s of digital silence (0 dB), 0.5 s at 20 dB, 3 s of silence
    let mut samples = tone(100, 0.0);
    samples.extend(tone(50, 10.0));
    samples.extend(tone(300, 0.0));

    let labels = labels(samples);
    assert_eq!(labels.len(), 450);

    assert!(labels[..100].iter().all(|&s| !s), "silence must not be speech");

    // Adjustment 0.003 gives a time constant of ~333 frames; the flip is far quicker
    let onset = labels[100..].iter().position(|&s| s).expect("step never detected");
    assert!(onset < 333, "onset after {} frames", onset);
    assert!(labels[105..150].iter().all(|&s| s));

    let offset = labels[150..].iter().position(|&s| !s).expect("never returned to silence");
    assert!(offset < 10);
    assert!(labels[200..].iter().all(|&s| !s));
}

#[test]
fn test_background_adapts_to_steady_noise() {
    // A constant 20 dB hum is eventually absorbed into the background
    let mut samples = tone(10, 0.0);
    samples.extend(tone(1000, 10.0));
    let labels = labels(samples);

    assert!(labels[10..60].iter().any(|&s| s));
    assert!(labels[900..].iter().all(|&s| !s));
}

#[test]
fn test_filter_keeps_only_speech_frames() {
    let mut samples = tone(100, 0.0);
    samples.extend(tone(40, 100.0)); // 40 dB burst
    samples.extend(tone(100, 0.0));

    let source = VecSource::from_samples(samples, RATE);
    let blocker = FrameBlocker::new(Box::new(source), 10).unwrap();
    let classifier = SpeechClassifier::new(Box::new(blocker), EndpointConfig::default()).unwrap();
    let mut filter = NonSpeechFilter::new(Box::new(classifier));

    let mut speech_frames = Vec::new();
    let mut signals = 0;
    while let Some(data) = filter.get_data().unwrap() {
        match data {
            Data::Classified(c) => {
                assert!(c.is_speech);
                speech_frames.push(c.audio.first_sample_number / FRAME as u64);
            }
            d if d.is_signal() => signals += 1,
            other => panic!("unexpected {:?}", other),
        }
    }

    assert_eq!(signals, 2);
    assert!(!speech_frames.is_empty());
    assert!(speech_frames.iter().all(|&n| (100..145).contains(&n)));
    assert!(filter.dropped_frames() > 150);
}
