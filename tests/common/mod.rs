//! In-process fakes for the inference services and a pipeline harness.

#![allow(dead_code)]

use async_trait::async_trait;
use convo_sql::analysis::LexiconNounFilter;
use convo_sql::cache::{CacheNamespace, CacheStore, MemoryCacheStore};
use convo_sql::error::{OrchestratorError, Result};
use convo_sql::schema::{DatabaseSchema, ParserContext, Preprocessor, SchemaCatalog};
use convo_sql::services::{
    Attribution, AttributionEngine, AttributionError, Beam, IntentClassifier, SemanticParser,
    TextGenerator, TuningDetector,
};
use convo_sql::{Orchestrator, PipelinePolicy, Services};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn concert_singer() -> DatabaseSchema {
    let columns = [
        (-1, "*"),
        (0, "stadium id"),
        (0, "location"),
        (0, "name"),
        (0, "capacity"),
        (1, "singer id"),
        (1, "name"),
        (1, "country"),
        (1, "age"),
        (2, "concert id"),
        (2, "concert name"),
        (2, "stadium id"),
        (2, "year"),
        (3, "concert id"),
        (3, "singer id"),
    ];
    DatabaseSchema {
        db_id: "concert_singer".to_string(),
        table_names: ["stadium", "singer", "concert", "singer in concert"]
            .iter()
            .map(|t| t.to_string())
            .collect(),
        column_names: columns.iter().map(|(t, c)| (*t, c.to_string())).collect(),
    }
}

pub fn preprocessor() -> Preprocessor {
    Preprocessor::new(SchemaCatalog::from_schemas(vec![concert_singer()]), 512)
}

/// Beam scores whose softmax gives the first beam probability `p`.
pub fn beams_with_top_probability(sql: &str, p: f64) -> Vec<Beam> {
    vec![
        Beam {
            sql: sql.to_string(),
            score: p.ln(),
        },
        Beam {
            sql: "SELECT * FROM singer".to_string(),
            score: (1.0 - p).ln(),
        },
    ]
}

pub struct FakeParser {
    beams: Vec<Beam>,
    delay: Duration,
    pub calls: AtomicUsize,
    pub questions: Mutex<Vec<String>>,
}

impl FakeParser {
    pub fn new(beams: Vec<Beam>) -> Self {
        Self {
            beams,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            questions: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }
}

#[async_trait]
impl SemanticParser for FakeParser {
    async fn parse(&self, context: &ParserContext) -> Result<Vec<Beam>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.questions.lock().unwrap().push(context.raw_question.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.beams.clone())
    }
}

pub struct FakeClassifier {
    label: String,
    pub calls: AtomicUsize,
    pub inputs: Mutex<Vec<String>>,
}

impl FakeClassifier {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntentClassifier for FakeClassifier {
    async fn classify(&self, context: &ParserContext) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(context.raw_question.clone());
        Ok(vec![self.label.clone(), "other".to_string()])
    }
}

/// Flags every utterance mentioning "tune" as a tuning request.
pub struct KeywordTuningDetector {
    pub calls: AtomicUsize,
}

impl KeywordTuningDetector {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TuningDetector for KeywordTuningDetector {
    async fn is_tuning(&self, utterance: &str, _db_id: &str) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(utterance.to_lowercase().contains("tune"))
    }
}

pub enum AttributionBehaviour {
    Succeed(Attribution),
    FailUpstream,
    Malformed,
    /// Upstream failure for the first `failures` calls, then success.
    Recover { failures: usize, attribution: Attribution },
}

pub struct FakeAttribution {
    behaviour: AttributionBehaviour,
    pub calls: AtomicUsize,
}

impl FakeAttribution {
    pub fn new(behaviour: AttributionBehaviour) -> Self {
        Self {
            behaviour,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn succeeding(tokens: &[&str], scores: &[f64]) -> Self {
        Self::new(AttributionBehaviour::Succeed(Attribution {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            scores: scores.to_vec(),
        }))
    }

    /// Fails upstream `failures` times before answering with `tokens`/`scores`.
    pub fn recovering(failures: usize, tokens: &[&str], scores: &[f64]) -> Self {
        Self::new(AttributionBehaviour::Recover {
            failures,
            attribution: Attribution {
                tokens: tokens.iter().map(|t| t.to_string()).collect(),
                scores: scores.to_vec(),
            },
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttributionEngine for FakeAttribution {
    async fn attribute(
        &self,
        _input_text: &str,
        _context: &ParserContext,
    ) -> std::result::Result<Attribution, AttributionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            AttributionBehaviour::Succeed(attribution) => Ok(attribution.clone()),
            AttributionBehaviour::Recover { failures, attribution } => {
                if call < *failures {
                    Err(AttributionError::Upstream("service unavailable".to_string()))
                } else {
                    Ok(attribution.clone())
                }
            }
            AttributionBehaviour::FailUpstream => {
                Err(AttributionError::Upstream("connection refused".to_string()))
            }
            AttributionBehaviour::Malformed => Err(AttributionError::Malformed("missing scores".to_string())),
        }
    }
}

pub struct FakeGenerator {
    reply: String,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn generate(&self, prompt: &str, _max_new_tokens: u32, _temperature: f32) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

/// Store that behaves like an unreachable server.
pub struct UnreachableStore;

#[async_trait]
impl CacheStore for UnreachableStore {
    async fn exists(&self, _: CacheNamespace, _: &str) -> Result<bool> {
        Err(OrchestratorError::CacheUnavailable("connection refused".to_string()))
    }

    async fn get(&self, _: CacheNamespace, _: &str) -> Result<Option<Vec<u8>>> {
        Err(OrchestratorError::CacheUnavailable("connection refused".to_string()))
    }

    async fn put(&self, _: CacheNamespace, _: &str, _: Vec<u8>) -> Result<()> {
        Err(OrchestratorError::CacheUnavailable("connection refused".to_string()))
    }

    async fn clear(&self, _: CacheNamespace) -> Result<()> {
        Err(OrchestratorError::CacheUnavailable("connection refused".to_string()))
    }
}

/// A fully faked pipeline with handles on every fake.
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub store: Arc<MemoryCacheStore>,
    pub parser: Arc<FakeParser>,
    pub classifier: Arc<FakeClassifier>,
    pub detector: Arc<KeywordTuningDetector>,
    pub attribution: Arc<FakeAttribution>,
    pub generator: Arc<FakeGenerator>,
}

impl Harness {
    pub fn new(parser: FakeParser, attribution: FakeAttribution) -> Self {
        let store = Arc::new(MemoryCacheStore::new());
        Self::build(store.clone(), store, parser, attribution)
    }

    /// Harness whose pipeline talks to `backend` while `store` stays empty.
    pub fn with_store(backend: Arc<dyn CacheStore>, parser: FakeParser, attribution: FakeAttribution) -> Self {
        Self::build(backend, Arc::new(MemoryCacheStore::new()), parser, attribution)
    }

    fn build(
        backend: Arc<dyn CacheStore>,
        store: Arc<MemoryCacheStore>,
        parser: FakeParser,
        attribution: FakeAttribution,
    ) -> Self {
        let parser = Arc::new(parser);
        let classifier = Arc::new(FakeClassifier::new("query"));
        let detector = Arc::new(KeywordTuningDetector::new());
        let attribution = Arc::new(attribution);
        let generator = Arc::new(FakeGenerator::new("Summary: There are six concerts.\nTable: ..."));

        let services = Services {
            parser: parser.clone(),
            intent_classifier: classifier.clone(),
            tuning_detector: detector.clone(),
            attribution: attribution.clone(),
            text_generator: generator.clone(),
            nouns: Arc::new(LexiconNounFilter::new()),
        };
        let orchestrator = Orchestrator::new(backend, preprocessor(), services, PipelinePolicy::default());

        Self {
            orchestrator,
            store,
            parser,
            classifier,
            detector,
            attribution,
            generator,
        }
    }
}
