//! Viterbi decoding of synthetic feature streams

use std::sync::Arc;

use senone_acoustic::{AcousticModel, AcousticScorer, HmmDefinition, ModelConfig, ModelDefinition, SenoneDefinition, Unit};
use senone_frontend::{Data, FloatData, VecSource};
use senone_search::{
    BreadthFirstSearch, CiPhoneLoop, Dictionary, PhoneLoopConfig, SearchConfig, WordLoop, WordLoopConfig,
};

/// Units A, B and SIL with one emitting state at means 0, 10 and -10
fn model() -> Arc<AcousticModel> {
    let hmm = |name: &str, senone: usize| HmmDefinition {
        unit: if name == "SIL" { Unit::filler(name) } else { Unit::ci(name) },
        position: Default::default(),
        senones: vec![senone],
        transition_matrix: 0,
    };
    let def = ModelDefinition {
        vector_length: 1,
        means: vec![vec![0.0], vec![10.0], vec![-10.0]],
        variances: vec![vec![1.0], vec![1.0], vec![1.0]],
        senones: (0..3)
            .map(|g| SenoneDefinition {
                gaussians: vec![g],
                mixture_weights: vec![1.0],
            })
            .collect(),
        transition_matrices: vec![vec![vec![0.5, 0.5], vec![0.0, 0.0]]],
        hmms: vec![hmm("A", 0), hmm("B", 1), hmm("SIL", 2)],
    };
    Arc::new(AcousticModel::from_definition(&def, &ModelConfig::default()).unwrap())
}

fn features(values: &[f32]) -> VecSource {
    let mut data = vec![Data::StreamStart {
        sample_rate: 16000,
        time_ms: 0,
    }];
    data.extend(values.iter().map(|&v| Data::Features(FloatData::from_values(vec![v]))));
    data.push(Data::StreamEnd {
        sample_rate: 16000,
        duration_ms: values.len() as u64 * 10,
    });
    VecSource::new(data)
}

fn pattern(segments: &[(f32, usize)]) -> Vec<f32> {
    segments
        .iter()
        .flat_map(|&(value, count)| std::iter::repeat(value).take(count))
        .collect()
}

#[test]
fn test_phone_loop_recovers_unit_sequence() {
    let model = model();
    let phone_loop = CiPhoneLoop::new(&model, &PhoneLoopConfig::default().phone_insertion_probability(0.01)).unwrap();
    let scorer = AcousticScorer::new(Box::new(features(&pattern(&[(0.0, 5), (10.0, 5)]))), model);
    let mut search = BreadthFirstSearch::new(phone_loop, scorer, SearchConfig::default()).unwrap();

    let result = search.recognize().unwrap().unwrap();
    assert_eq!(result.units, vec!["A", "B"]);
    assert!(result.words.is_empty());
    assert_eq!(result.frames, 10);
    assert!(result.reached_final);
    assert!(result.score < 0.0);
}

#[test]
fn test_word_loop_recovers_words_and_skips_silence() {
    let model = model();
    let dictionary = Dictionary::parse("ONE A\nTWO B\n").unwrap();
    let word_loop = WordLoop::new(&model, &dictionary, &WordLoopConfig::default()).unwrap();
    let frames = pattern(&[(-10.0, 3), (0.0, 4), (-10.0, 3), (10.0, 4), (-10.0, 3)]);
    let scorer = AcousticScorer::new(Box::new(features(&frames)), model);
    let mut search = BreadthFirstSearch::new(word_loop, scorer, SearchConfig::default()).unwrap();

    let result = search.recognize().unwrap().unwrap();
    assert_eq!(result.text(), "ONE TWO");
    assert_eq!(result.units, vec!["SIL", "A", "SIL", "B", "SIL"]);
    assert!(result.reached_final);
}

#[test]
fn test_absolute_beam_caps_active_tokens() {
    let model = model();
    let phone_loop = CiPhoneLoop::new(&model, &PhoneLoopConfig::default()).unwrap();
    let scorer = AcousticScorer::new(Box::new(features(&pattern(&[(0.0, 4)]))), model);
    let mut search = BreadthFirstSearch::new(phone_loop, scorer, SearchConfig::default().absolute_beam(1)).unwrap();

    search.start();
    assert_eq!(search.active_count(), 3);
    assert!(search.step().unwrap());
    // The single survivor on A both loops and re-enters every unit
    assert_eq!(search.active_count(), 3);

    let result = search.recognize().unwrap().unwrap();
    assert_eq!(result.units.first().map(String::as_str), Some("A"));
}

#[test]
fn test_empty_stream_has_no_result() {
    let model = model();
    let phone_loop = CiPhoneLoop::new(&model, &PhoneLoopConfig::default()).unwrap();
    let scorer = AcousticScorer::new(Box::new(features(&[])), model);
    let mut search = BreadthFirstSearch::new(phone_loop, scorer, SearchConfig::default()).unwrap();

    assert!(search.recognize().unwrap().is_none());
    assert_eq!(search.frames(), 0);
}

#[test]
fn test_raw_audio_is_a_processing_error() {
    let model = model();
    let phone_loop = CiPhoneLoop::new(&model, &PhoneLoopConfig::default()).unwrap();
    let scorer = AcousticScorer::new(Box::new(VecSource::from_samples(vec![0.0; 160], 16000)), model);
    let mut search = BreadthFirstSearch::new(phone_loop, scorer, SearchConfig::default()).unwrap();

    assert!(search.recognize().is_err());
}
