//! Breadth-first token-passing Viterbi search
//!
//! Per frame:
//!
//! 1. the scorer applies the frame's senone scores to every active token
//! 2. tokens below `best + relative_beam` are dropped, then all but the
//!    best `absolute_beam`
//! 3. survivors follow their arcs; tokens landing on non-emitting states
//!    keep moving within the frame, tokens landing on emitting states
//!    become next frame's active list
//!
//! Only the best token per state survives (recombination). Unit and word
//! states leave a backpointer so the best path can be read back.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use senone_acoustic::{AcousticScorer, Scoreable, LOG_ONE, LOG_ZERO};

use crate::error::{Result, SearchError};
use crate::graph::{Linguist, StateId, StateKind, SENTENCE_START, UNKNOWN_WORD};

/// Pruning configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Linear ratio to the best score below which tokens are pruned
    /// (default: 1e-80)
    pub relative_beam: f64,
    /// Maximum active tokens per frame, 0 for no limit (default: 20000)
    pub absolute_beam: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            relative_beam: 1e-80,
            absolute_beam: 20_000,
        }
    }
}

impl SearchConfig {
    pub fn relative_beam(mut self, beam: f64) -> Self {
        self.relative_beam = beam;
        self
    }

    pub fn absolute_beam(mut self, beam: usize) -> Self {
        self.absolute_beam = beam;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.relative_beam > 0.0 && self.relative_beam <= 1.0) {
            return Err(SearchError::config(format!(
                "relative_beam must be in (0, 1], got {}",
                self.relative_beam
            )));
        }
        Ok(())
    }
}

/// Best path of an utterance
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub words: Vec<String>,
    pub units: Vec<String>,
    /// Path log score in the model's log base
    pub score: f32,
    pub frames: u64,
    /// Whether the path ends in a final state
    pub reached_final: bool,
}

impl RecognitionResult {
    pub fn text(&self) -> String {
        self.words.join(" ")
    }
}

#[derive(Debug, Clone, Copy)]
struct Backpointer {
    state: StateId,
    previous: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    state: StateId,
    senone: usize,
    score: f32,
    backpointer: Option<usize>,
}

impl Scoreable for Token {
    fn senone(&self) -> usize {
        self.senone
    }

    fn apply_score(&mut self, acoustic: f32) -> f32 {
        self.score += acoustic;
        self.score
    }
}

/// Best token that reached some state while growing
#[derive(Debug, Clone, Copy)]
struct Arrival {
    score: f32,
    backpointer: Option<usize>,
}

/// Viterbi decoder over a [`Linguist`]'s graph
pub struct BreadthFirstSearch<L: Linguist> {
    linguist: L,
    scorer: AcousticScorer,
    config: SearchConfig,
    log_relative_beam: f32,
    active: Vec<Token>,
    backpointers: Vec<Backpointer>,
    best_final: Option<Arrival>,
    frames: u64,
}

impl<L: Linguist> BreadthFirstSearch<L> {
    pub fn new(linguist: L, scorer: AcousticScorer, config: SearchConfig) -> Result<Self> {
        config.validate()?;
        let log_relative_beam = scorer.model().log_math().linear_to_log(config.relative_beam);

        Ok(Self {
            linguist,
            scorer,
            config,
            log_relative_beam,
            active: Vec::new(),
            backpointers: Vec::new(),
            best_final: None,
            frames: 0,
        })
    }

    pub fn linguist(&self) -> &L {
        &self.linguist
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Frames decoded in the current utterance
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Seed the search with the linguist's initial state
    pub fn start(&mut self) {
        self.scorer.start();
        self.backpointers.clear();
        self.frames = 0;

        let initial = self.linguist.initial_state();
        let seed = Arrival {
            score: LOG_ONE,
            backpointer: None,
        };
        self.active = self.grow(vec![(initial, seed)]);
        debug!(active = self.active.len(), "Search started");
    }

    /// Decode one frame; `false` once the frontend is exhausted
    pub fn step(&mut self) -> Result<bool> {
        let scored = match self.scorer.calculate_scores(&mut self.active)? {
            Some(scored) => scored,
            None => return Ok(false),
        };

        self.prune(scored.best_score);
        self.frames += 1;

        let seeds = self
            .active
            .iter()
            .map(|t| {
                (
                    t.state,
                    Arrival {
                        score: t.score,
                        backpointer: t.backpointer,
                    },
                )
            })
            .collect::<Vec<_>>();
        self.active = self.grow_from_emitting(seeds);

        trace!(
            frame = scored.frame,
            best = scored.best_score,
            active = self.active.len(),
            "Frame decoded"
        );
        Ok(true)
    }

    /// Decode until the frontend is exhausted and return the best path
    ///
    /// `None` when no frame was decoded.
    pub fn recognize(&mut self) -> Result<Option<RecognitionResult>> {
        self.start();
        while self.step()? {}

        let result = self.result();
        if let Some(result) = &result {
            debug!(
                frames = result.frames,
                score = result.score,
                words = result.words.len(),
                units = result.units.len(),
                reached_final = result.reached_final,
                "Utterance decoded"
            );
        }
        Ok(result)
    }

    /// Best path so far, preferring paths that end in a final state
    pub fn result(&self) -> Option<RecognitionResult> {
        if self.frames == 0 {
            return None;
        }

        let (best, reached_final) = match self.best_final {
            Some(arrival) => (arrival, true),
            None => {
                let token = self
                    .active
                    .iter()
                    .max_by(|a, b| a.score.total_cmp(&b.score))?;
                (
                    Arrival {
                        score: token.score,
                        backpointer: token.backpointer,
                    },
                    false,
                )
            }
        };

        let graph = self.linguist.search_graph();
        let mut path = Vec::new();
        let mut cursor = best.backpointer;
        while let Some(index) = cursor {
            let backpointer = self.backpointers[index];
            path.push(backpointer.state);
            cursor = backpointer.previous;
        }
        path.reverse();

        let mut words = Vec::new();
        let mut units = Vec::new();
        for state in path {
            match graph.state(state).kind() {
                StateKind::Word { word, .. } if word != UNKNOWN_WORD && word != SENTENCE_START => {
                    words.push(word.clone())
                }
                StateKind::Unit { unit, .. } => units.push(unit.name.clone()),
                _ => {}
            }
        }

        Some(RecognitionResult {
            words,
            units,
            score: best.score,
            frames: self.frames,
            reached_final,
        })
    }

    fn prune(&mut self, best: f32) {
        let before = self.active.len();
        if best > LOG_ZERO {
            let threshold = best + self.log_relative_beam;
            self.active.retain(|t| t.score >= threshold);
        }
        if self.config.absolute_beam > 0 && self.active.len() > self.config.absolute_beam {
            self.active.sort_by(|a, b| b.score.total_cmp(&a.score));
            self.active.truncate(self.config.absolute_beam);
        }
        if self.active.len() < before {
            trace!(pruned = before - self.active.len(), "Tokens pruned");
        }
    }

    /// Follow arcs out of scored emitting tokens
    fn grow_from_emitting(&mut self, seeds: Vec<(StateId, Arrival)>) -> Vec<Token> {
        let graph = self.linguist.search_graph();
        let mut moved = Vec::new();
        for (state, arrival) in seeds {
            for arc in graph.successors(state) {
                moved.push((
                    arc.to,
                    Arrival {
                        score: arrival.score + arc.log_probability(),
                        backpointer: arrival.backpointer,
                    },
                ));
            }
        }
        self.grow(moved)
    }

    /// Carry tokens through non-emitting states until each rests on an
    /// emitting one, keeping the best arrival per state
    fn grow(&mut self, seeds: Vec<(StateId, Arrival)>) -> Vec<Token> {
        let mut best: HashMap<StateId, Arrival> = HashMap::new();
        let mut pending = seeds;
        let mut emitting: HashMap<StateId, Arrival> = HashMap::new();
        self.best_final = None;

        while let Some((id, arrival)) = pending.pop() {
            let graph = self.linguist.search_graph();
            let state = graph.state(id);

            if state.is_emitting() {
                match emitting.get(&id) {
                    Some(known) if known.score >= arrival.score => {}
                    _ => {
                        emitting.insert(id, arrival);
                    }
                }
                continue;
            }

            if let Some(known) = best.get(&id) {
                if known.score >= arrival.score {
                    continue;
                }
            }

            let backpointer = match state.kind() {
                StateKind::Unit { .. } | StateKind::Word { .. } => {
                    self.backpointers.push(Backpointer {
                        state: id,
                        previous: arrival.backpointer,
                    });
                    Some(self.backpointers.len() - 1)
                }
                _ => arrival.backpointer,
            };
            let arrival = Arrival {
                score: arrival.score,
                backpointer,
            };
            best.insert(id, arrival);

            if state.is_final() && self.best_final.map_or(true, |f| arrival.score > f.score) {
                self.best_final = Some(arrival);
            }

            for arc in state.arcs() {
                pending.push((
                    arc.to,
                    Arrival {
                        score: arrival.score + arc.log_probability(),
                        backpointer,
                    },
                ));
            }
        }

        let graph = self.linguist.search_graph();
        emitting
            .into_iter()
            .filter_map(|(id, arrival)| {
                graph.state(id).kind().senone().map(|senone| Token {
                    state: id,
                    senone,
                    score: arrival.score,
                    backpointer: arrival.backpointer,
                })
            })
            .collect()
    }
}
