//! # Senone Search
//!
//! Search graphs over senone HMMs and a Viterbi decoder to walk them.
//!
//! A [`Linguist`] owns a [`SearchGraph`] of typed states (word, unit, HMM,
//! non-emitting, branch, loop-back). States are deduplicated by signature:
//! asking for a state whose signature is cached returns the cached one.
//!
//! - [`CiPhoneLoop`]: any sequence of context-independent phones
//! - [`WordLoop`]: any sequence of dictionary words, optional silence
//! - [`traverse`]: depth- or breadth-first walk with [`GraphVisitor`]s
//! - [`BreadthFirstSearch`]: token passing with beam pruning
//! - [`NGramBuffer`]: fixed-width n-gram record lookup
//!
//! ```no_run
//! use std::sync::Arc;
//! use senone_acoustic::{AcousticModel, AcousticScorer, ModelConfig};
//! use senone_frontend::VecSource;
//! use senone_search::{BreadthFirstSearch, CiPhoneLoop, PhoneLoopConfig, SearchConfig};
//!
//! let model = Arc::new(AcousticModel::load("model.json", &ModelConfig::default())?);
//! let phone_loop = CiPhoneLoop::new(&model, &PhoneLoopConfig::default())?;
//! let scorer = AcousticScorer::new(Box::new(VecSource::default()), model);
//! let mut search = BreadthFirstSearch::new(phone_loop, scorer, SearchConfig::default())?;
//! if let Some(result) = search.recognize()? {
//!     println!("{}", result.units.join(" "));
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod decoder;
mod error;
mod graph;
mod ngram;
mod phone_loop;
mod traversal;
mod word_loop;

pub use decoder::{BreadthFirstSearch, RecognitionResult, SearchConfig};
pub use error::{Result, SearchError};
pub use graph::{
    expand_hmm, Linguist, SearchGraph, SearchState, SearchStateArc, StateId, StateKind, SENTENCE_START,
    UNKNOWN_WORD,
};
pub use ngram::{Endianness, IdWidth, NGramBuffer, NGramLayout, NGramRecord};
pub use phone_loop::{CiPhoneLoop, PhoneLoopConfig};
pub use traversal::{dump_graph, traverse, GraphDumper, GraphVisitor, SignatureAudit, TraversalOrder};
pub use word_loop::{Dictionary, WordLoop, WordLoopConfig};
