//! Frontend → endpointer → features → scorer → search pipeline

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use senone_acoustic::{AcousticModel, AcousticScorer};
use senone_endpoint::{NonSpeechFilter, SpeechClassifier};
use senone_frontend::{DataProcessor, FeatureExtractor, FrameBlocker, VecSource};
use senone_search::{
    dump_graph, BreadthFirstSearch, CiPhoneLoop, Dictionary, Linguist, RecognitionResult, SearchGraph, StateId,
    TraversalOrder, WordLoop,
};

use crate::config::RecognizerConfig;

/// Search graph the recognizer decodes against
#[derive(Debug)]
pub enum SearchLinguist {
    Phones(CiPhoneLoop),
    Words(WordLoop),
}

impl Linguist for SearchLinguist {
    fn search_graph(&self) -> &SearchGraph {
        match self {
            SearchLinguist::Phones(l) => l.search_graph(),
            SearchLinguist::Words(l) => l.search_graph(),
        }
    }

    fn initial_state(&self) -> StateId {
        match self {
            SearchLinguist::Phones(l) => l.initial_state(),
            SearchLinguist::Words(l) => l.initial_state(),
        }
    }
}

/// Loaded model and graph, ready to decode utterances
pub struct Recognizer {
    config: RecognizerConfig,
    model: Arc<AcousticModel>,
    linguist: Arc<SearchLinguist>,
}

impl Recognizer {
    /// Load the model (and dictionary, when configured) named by `config`
    pub fn new(config: RecognizerConfig) -> Result<Self> {
        config.validate()?;

        info!("Loading acoustic model from {}", config.model_path.display());
        let model = AcousticModel::load(&config.model_path, &config.acoustic)
            .with_context(|| format!("Failed to load acoustic model {}", config.model_path.display()))?;

        let dictionary = match &config.dictionary_path {
            Some(path) => Some(
                Dictionary::load(path)
                    .with_context(|| format!("Failed to load dictionary {}", path.display()))?,
            ),
            None => None,
        };

        Self::from_parts(config, model, dictionary)
    }

    /// Build from an already loaded model
    pub fn from_parts(config: RecognizerConfig, model: AcousticModel, dictionary: Option<Dictionary>) -> Result<Self> {
        config.validate()?;

        if config.frontend.features.num_cepstra != model.vector_length() {
            bail!(
                "Frontend produces {} cepstra but the model expects vectors of {}",
                config.frontend.features.num_cepstra,
                model.vector_length()
            );
        }

        let linguist = match dictionary {
            Some(dictionary) => SearchLinguist::Words(
                WordLoop::new(&model, &dictionary, &config.search.word_loop)
                    .context("Failed to build word loop")?,
            ),
            None => SearchLinguist::Phones(
                CiPhoneLoop::new(&model, &config.search.phone_loop).context("Failed to build phone loop")?,
            ),
        };

        let graph = linguist.search_graph();
        info!(
            states = graph.len(),
            arcs = graph.num_arcs(),
            senones = model.num_senones(),
            "Recognizer ready"
        );

        Ok(Self {
            config,
            model: Arc::new(model),
            linguist: Arc::new(linguist),
        })
    }

    pub fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    pub fn model(&self) -> &Arc<AcousticModel> {
        &self.model
    }

    pub fn linguist(&self) -> &SearchLinguist {
        &self.linguist
    }

    /// Text dump of the search graph
    pub fn dump_graph(&self, order: TraversalOrder) -> String {
        dump_graph(self.linguist.search_graph(), order)
    }

    /// Decode one stream pulled from `source`
    ///
    /// `None` when the endpointer found no speech.
    pub fn recognize(&self, source: Box<dyn DataProcessor>) -> Result<Option<RecognitionResult>> {
        let frontend = &self.config.frontend;

        let blocker = FrameBlocker::new(source, frontend.frame_length_ms)?;
        let classifier = SpeechClassifier::new(Box::new(blocker), self.config.endpoint.clone())?;
        let filter = NonSpeechFilter::new(Box::new(classifier));
        let features = FeatureExtractor::new(Box::new(filter), frontend.features.clone())?;
        let scorer = AcousticScorer::new(Box::new(features), self.model.clone());

        let mut search = BreadthFirstSearch::new(self.linguist.clone(), scorer, self.config.search.pruning.clone())?;
        let result = search.recognize().context("Decoding failed")?;

        match &result {
            Some(result) => debug!(
                frames = result.frames,
                units = result.units.len(),
                words = result.words.len(),
                "Stream decoded"
            ),
            None => debug!("No speech in stream"),
        }
        Ok(result)
    }

    /// Decode samples held in memory
    pub fn recognize_samples(&self, samples: Vec<f64>, sample_rate: u32) -> Result<Option<RecognitionResult>> {
        self.recognize(Box::new(VecSource::from_samples(samples, sample_rate)))
    }
}
