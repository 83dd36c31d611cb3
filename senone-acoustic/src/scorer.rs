//! Frame-by-frame scoring of search tokens against senones

use std::sync::Arc;

use senone_frontend::{Data, DataProcessor, FloatData};
use tracing::debug;

use crate::error::{AcousticError, Result};
use crate::logmath::LOG_ZERO;
use crate::model::AcousticModel;

/// Something the scorer can score: a search token sitting on an emitting state
pub trait Scoreable {
    /// Senone the item is scored against
    fn senone(&self) -> usize;

    /// Receive the acoustic score for the current frame; returns the
    /// item's total score after applying it
    fn apply_score(&mut self, acoustic: f32) -> f32;
}

/// Senone scores of the current frame
///
/// Many HMM states tie to one senone; each senone is scored at most once
/// per frame.
#[derive(Debug, Clone)]
pub struct SenoneScoreCache {
    scores: Vec<Option<f32>>,
    hits: u64,
    misses: u64,
}

impl SenoneScoreCache {
    pub fn new(num_senones: usize) -> Self {
        Self {
            scores: vec![None; num_senones],
            hits: 0,
            misses: 0,
        }
    }

    /// Forget the previous frame
    pub fn clear(&mut self) {
        self.scores.iter_mut().for_each(|s| *s = None);
    }

    pub fn score(&mut self, model: &AcousticModel, senone: usize, feature: &[f32]) -> f32 {
        match self.scores[senone] {
            Some(score) => {
                self.hits += 1;
                score
            }
            None => {
                self.misses += 1;
                let score = model.score_senone(senone, feature);
                self.scores[senone] = Some(score);
                score
            }
        }
    }

    /// (cached lookups, computed scores) since creation
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

/// Result of scoring one frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameScore {
    /// Index of the best scoreable, `None` when the list was empty
    pub best: Option<usize>,
    pub best_score: f32,
    /// Position of the frame in the stream
    pub frame: u64,
    pub features: FloatData,
}

/// Pulls feature frames from the frontend and scores search tokens
pub struct AcousticScorer {
    frontend: Box<dyn DataProcessor>,
    model: Arc<AcousticModel>,
    cache: SenoneScoreCache,
    frames: u64,
    ended: bool,
}

impl AcousticScorer {
    pub fn new(frontend: Box<dyn DataProcessor>, model: Arc<AcousticModel>) -> Self {
        let cache = SenoneScoreCache::new(model.num_senones());
        Self {
            frontend,
            model,
            cache,
            frames: 0,
            ended: false,
        }
    }

    pub fn model(&self) -> &Arc<AcousticModel> {
        &self.model
    }

    /// Frames scored in the current stream
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Ready the scorer for a new stream
    pub fn start(&mut self) {
        self.frames = 0;
        self.ended = false;
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> (u64, u64) {
        self.cache.stats()
    }

    /// Score every item against the next feature frame
    ///
    /// Returns `Ok(None)` once the stream has ended; no further frames are
    /// requested from the frontend after that.
    pub fn calculate_scores<S: Scoreable>(&mut self, scoreables: &mut [S]) -> Result<Option<FrameScore>> {
        let features = match self.next_features()? {
            Some(features) => features,
            None => return Ok(None),
        };

        self.cache.clear();
        let mut best = None;
        let mut best_score = LOG_ZERO;
        for (i, item) in scoreables.iter_mut().enumerate() {
            let acoustic = self.cache.score(&self.model, item.senone(), &features.values);
            let total = item.apply_score(acoustic);
            if best.is_none() || total > best_score {
                best = Some(i);
                best_score = total;
            }
        }

        let frame = self.frames;
        self.frames += 1;
        Ok(Some(FrameScore {
            best,
            best_score,
            frame,
            features,
        }))
    }

    fn next_features(&mut self) -> Result<Option<FloatData>> {
        if self.ended {
            return Ok(None);
        }

        loop {
            match self.frontend.get_data()? {
                None => {
                    self.ended = true;
                    return Ok(None);
                }
                Some(Data::Features(features)) => {
                    if features.dimension() != self.model.vector_length() {
                        return Err(AcousticError::invalid_input(format!(
                            "Feature dimension {} does not match model vector length {}",
                            features.dimension(),
                            self.model.vector_length()
                        )));
                    }
                    return Ok(Some(features));
                }
                Some(Data::StreamStart { .. }) => {
                    self.frames = 0;
                }
                Some(Data::StreamEnd { duration_ms, .. }) => {
                    debug!(frames = self.frames, duration_ms, "Scorer reached end of stream");
                    self.ended = true;
                    return Ok(None);
                }
                Some(_) => {
                    return Err(AcousticError::invalid_input(
                        "Scorer expects feature frames, got raw audio",
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hmm::Unit;
    use crate::model::{HmmDefinition, ModelConfig, ModelDefinition, SenoneDefinition};
    use approx::assert_relative_eq;
    use senone_frontend::VecSource;

    struct Token {
        senone: usize,
        path: f32,
        score: f32,
    }

    impl Scoreable for Token {
        fn senone(&self) -> usize {
            self.senone
        }

        fn apply_score(&mut self, acoustic: f32) -> f32 {
            self.score = self.path + acoustic;
            self.score
        }
    }

    fn model() -> Arc<AcousticModel> {
        let def = ModelDefinition {
            vector_length: 1,
            means: vec![vec![0.0], vec![10.0]],
            variances: vec![vec![1.0], vec![1.0]],
            senones: vec![
                SenoneDefinition { gaussians: vec![0], mixture_weights: vec![1.0] },
                SenoneDefinition { gaussians: vec![1], mixture_weights: vec![1.0] },
            ],
            transition_matrices: vec![vec![vec![0.5, 0.5], vec![0.0, 0.0]]],
            hmms: vec![HmmDefinition {
                unit: Unit::ci("A"),
                position: Default::default(),
                senones: vec![0],
                transition_matrix: 0,
            }],
        };
        Arc::new(AcousticModel::from_definition(&def, &ModelConfig::default()).unwrap())
    }

    fn frames(values: &[f32]) -> VecSource {
        let mut data = vec![Data::StreamStart { sample_rate: 16000, time_ms: 0 }];
        data.extend(values.iter().map(|&v| Data::Features(FloatData::from_values(vec![v]))));
        data.push(Data::StreamEnd { sample_rate: 16000, duration_ms: 10 });
        VecSource::new(data)
    }

    fn tokens() -> Vec<Token> {
        vec![
            Token { senone: 0, path: 0.0, score: 0.0 },
            Token { senone: 1, path: 0.0, score: 0.0 },
            Token { senone: 0, path: -1000.0, score: 0.0 },
        ]
    }

    #[test]
    fn test_best_scoreable_per_frame() {
        let mut scorer = AcousticScorer::new(Box::new(frames(&[0.0, 10.0])), model());
        let mut toks = tokens();

        let first = scorer.calculate_scores(&mut toks).unwrap().unwrap();
        assert_eq!(first.best, Some(0));
        assert_eq!(first.frame, 0);

        let second = scorer.calculate_scores(&mut toks).unwrap().unwrap();
        assert_eq!(second.best, Some(1));
        assert_eq!(second.frame, 1);

        assert!(scorer.calculate_scores(&mut toks).unwrap().is_none());
        // Ended streams stay ended
        assert!(scorer.calculate_scores(&mut toks).unwrap().is_none());
    }

    #[test]
    fn test_tied_senones_scored_once() {
        let mut scorer = AcousticScorer::new(Box::new(frames(&[1.0])), model());
        let mut toks = tokens();
        scorer.calculate_scores(&mut toks).unwrap();

        // Three tokens, two distinct senones
        assert_eq!(scorer.cache_stats(), (1, 2));
        assert_relative_eq!(toks[0].score, toks[2].score - toks[2].path, epsilon = 0.01);
    }

    #[test]
    fn test_empty_list_still_consumes_frame() {
        let mut scorer = AcousticScorer::new(Box::new(frames(&[1.0])), model());
        let mut none: Vec<Token> = Vec::new();
        let result = scorer.calculate_scores(&mut none).unwrap().unwrap();
        assert_eq!(result.best, None);
        assert_eq!(result.best_score, LOG_ZERO);
    }

    #[test]
    fn test_dimension_mismatch() {
        let source = VecSource::new(vec![Data::Features(FloatData::from_values(vec![0.0, 1.0]))]);
        let mut scorer = AcousticScorer::new(Box::new(source), model());
        assert!(scorer.calculate_scores(&mut tokens()).is_err());
    }
}
