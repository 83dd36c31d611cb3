//! Free word loop over a pronunciation dictionary

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use senone_acoustic::{AcousticModel, HmmPosition, Unit, LOG_ONE};

use crate::error::{Result, SearchError};
use crate::graph::{expand_hmm, Linguist, SearchGraph, SearchStateArc, StateId, StateKind, SENTENCE_START};

/// Word to pronunciations (unit names) map
///
/// Text format is one pronunciation per line, `WORD U1 U2 ...`. Alternate
/// pronunciations repeat the word with a `(n)` suffix. Lines starting with
/// `;;` or `#` are comments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    words: BTreeMap<String, Vec<Vec<String>>>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<S: Into<String>>(&mut self, word: S, units: Vec<String>) -> Result<()> {
        let word = word.into();
        if units.is_empty() {
            return Err(SearchError::dictionary(format!("Word {} has an empty pronunciation", word)));
        }
        self.words.entry(word).or_default().push(units);
        Ok(())
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut dictionary = Self::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(";;") || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let Some(entry) = fields.next() else { continue };
            let word = match entry.find('(') {
                Some(open) if entry.ends_with(')') => &entry[..open],
                _ => entry,
            };
            let units: Vec<String> = fields.map(str::to_string).collect();
            dictionary
                .add(word, units)
                .map_err(|e| SearchError::dictionary(format!("line {}: {}", number + 1, e)))?;
        }
        Ok(dictionary)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    pub fn pronunciations(&self, word: &str) -> Option<&[Vec<String>]> {
        self.words.get(word).map(Vec::as_slice)
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.words.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Word loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WordLoopConfig {
    /// Linear probability charged on entering any word (default: 0.1)
    pub word_insertion_probability: f64,
    /// Linear probability charged on entering silence (default: 0.1)
    pub silence_insertion_probability: f64,
    /// Filler unit that may sit between words; `None` disables it
    pub silence_unit: Option<String>,
}

impl Default for WordLoopConfig {
    fn default() -> Self {
        Self {
            word_insertion_probability: 0.1,
            silence_insertion_probability: 0.1,
            silence_unit: Some("SIL".to_string()),
        }
    }
}

impl WordLoopConfig {
    pub fn word_insertion_probability(mut self, probability: f64) -> Self {
        self.word_insertion_probability = probability;
        self
    }

    pub fn silence_unit(mut self, unit: Option<String>) -> Self {
        self.silence_unit = unit;
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (name, p) in [
            ("word_insertion_probability", self.word_insertion_probability),
            ("silence_insertion_probability", self.silence_insertion_probability),
        ] {
            if !(p > 0.0 && p <= 1.0) {
                return Err(SearchError::config(format!("{} must be in (0, 1], got {}", name, p)));
            }
        }
        Ok(())
    }
}

fn position_in_word(index: usize, len: usize) -> HmmPosition {
    match (index, len) {
        (_, 1) => HmmPosition::Single,
        (0, _) => HmmPosition::Begin,
        (i, n) if i + 1 == n => HmmPosition::End,
        _ => HmmPosition::Internal,
    }
}

/// Search graph accepting any sequence of dictionary words
///
/// Each pronunciation is a chain of units. Units carry their neighbours as
/// context so a triphone model is used where it has one; lookup falls back
/// to the context-independent HMM otherwise.
#[derive(Debug, Clone)]
pub struct WordLoop {
    graph: SearchGraph,
    first: StateId,
    loop_back: StateId,
    words: usize,
}

impl WordLoop {
    pub fn new(model: &AcousticModel, dictionary: &Dictionary, config: &WordLoopConfig) -> Result<Self> {
        config.validate()?;
        if dictionary.is_empty() {
            return Err(SearchError::graph("Word loop needs at least one word"));
        }

        let log_math = model.log_math();
        let log_language = log_math.linear_to_log(1.0 / dictionary.len() as f64);
        let log_word_insertion = log_math.linear_to_log(config.word_insertion_probability);
        let silence_context = config.silence_unit.clone().unwrap_or_else(|| "SIL".to_string());

        let mut graph = SearchGraph::new();
        let (first, _) = graph.get_or_insert(
            StateKind::Word {
                word: SENTENCE_START.to_string(),
                variant: 0,
            },
            None,
        );
        let (branch, _) = graph.get_or_insert(StateKind::Branch("WordLoop".into()), None);
        let (loop_back, _) = graph.get_or_insert(StateKind::LoopBack("WordLoop".into()), None);
        graph.attach(first, SearchStateArc::certain(branch));
        graph.attach(loop_back, SearchStateArc::certain(branch));
        graph.set_final(loop_back);

        for word in dictionary.words() {
            let pronunciations = dictionary.pronunciations(word).unwrap_or_default();
            for (variant, units) in pronunciations.iter().enumerate() {
                let (word_state, _) = graph.get_or_insert(
                    StateKind::Word {
                        word: word.to_string(),
                        variant,
                    },
                    None,
                );
                graph.attach(
                    branch,
                    SearchStateArc::new(word_state, LOG_ONE, log_language, log_word_insertion),
                );

                let mut tail = word_state;
                for (index, name) in units.iter().enumerate() {
                    let left = if index == 0 { &silence_context } else { &units[index - 1] };
                    let right = units.get(index + 1).unwrap_or(&silence_context);
                    let unit = Unit::with_context(name.clone(), left.clone(), right.clone());
                    let position = position_in_word(index, units.len());

                    let hmm = model.hmm_manager().lookup(&unit, position).ok_or_else(|| {
                        SearchError::graph(format!("No HMM for unit {} in word {}", name, word))
                    })?;
                    let (unit_state, _) = graph.get_or_insert(
                        StateKind::Unit {
                            unit,
                            position,
                            index,
                        },
                        Some(word_state),
                    );
                    graph.attach(tail, SearchStateArc::certain(unit_state));
                    tail = expand_hmm(&mut graph, model, unit_state, hmm)?;
                }
                graph.attach(tail, SearchStateArc::certain(loop_back));
            }
        }

        if let Some(silence) = &config.silence_unit {
            let unit = Unit::filler(silence.clone());
            match model.hmm_manager().lookup(&unit, HmmPosition::Undefined) {
                Some(hmm) => {
                    let log_silence = log_math.linear_to_log(config.silence_insertion_probability);
                    let (unit_state, _) = graph.get_or_insert(
                        StateKind::Unit {
                            unit,
                            position: HmmPosition::Undefined,
                            index: 0,
                        },
                        None,
                    );
                    graph.attach(branch, SearchStateArc::new(unit_state, LOG_ONE, LOG_ONE, log_silence));
                    let exit = expand_hmm(&mut graph, model, unit_state, hmm)?;
                    graph.attach(exit, SearchStateArc::certain(loop_back));
                }
                None => warn!(unit = %silence, "Silence unit not in model, word loop built without it"),
            }
        }

        graph.set_initial(first);
        debug!(
            words = dictionary.len(),
            states = graph.len(),
            arcs = graph.num_arcs(),
            "Word loop built"
        );

        Ok(Self {
            graph,
            first,
            loop_back,
            words: dictionary.len(),
        })
    }

    pub fn loop_back_state(&self) -> StateId {
        self.loop_back
    }

    pub fn num_words(&self) -> usize {
        self.words
    }
}

impl Linguist for WordLoop {
    fn search_graph(&self) -> &SearchGraph {
        &self.graph
    }

    fn initial_state(&self) -> StateId {
        self.first
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dictionary_with_variants() {
        let text = ";; comment\nREAD R IY D\nREAD(2) R EH D\n\nA AH\n# another\n";
        let dictionary = Dictionary::parse(text).unwrap();

        assert_eq!(dictionary.len(), 2);
        let read = dictionary.pronunciations("READ").unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[1], vec!["R", "EH", "D"]);
        assert_eq!(dictionary.words().collect::<Vec<_>>(), vec!["A", "READ"]);
    }

    #[test]
    fn test_word_without_units_rejected() {
        let err = Dictionary::parse("OK OW K\nBROKEN\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("words.dict");
        std::fs::write(&path, "YES Y EH S\nNO N OW\n").unwrap();

        let dictionary = Dictionary::load(&path).unwrap();
        assert_eq!(dictionary.pronunciations("NO").unwrap()[0], vec!["N", "OW"]);
        assert!(Dictionary::load(dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_positions() {
        assert_eq!(position_in_word(0, 1), HmmPosition::Single);
        assert_eq!(position_in_word(0, 3), HmmPosition::Begin);
        assert_eq!(position_in_word(1, 3), HmmPosition::Internal);
        assert_eq!(position_in_word(2, 3), HmmPosition::End);
    }

    #[test]
    fn test_config_validation() {
        assert!(WordLoopConfig::default().validate().is_ok());
        assert!(WordLoopConfig::default().word_insertion_probability(0.0).validate().is_err());
    }
}
