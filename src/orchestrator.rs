//! Orchestrator
//!
//! Owns the session registry and every pipeline stage and runs one turn:
//!
//! 1. lock the session (held for the whole turn so a conversation's turns
//!    are serialized while other conversations proceed)
//! 2. route; tuning requests return the fixed answer and touch nothing else
//! 3. snapshot history, resolve SQL, then append the turn
//! 4. analyse when confidence is below the gate
//! 5. resolve the user intent and assemble the response

use crate::analysis::{AnalysisRequest, ConfidenceAnalyzer, LexiconNounFilter, NounFilter};
use crate::cache::{CacheStats, CacheStore, Memoizer, MemoryCacheStore, SqliteCacheStore};
use crate::config::{
    AnalysisConfig, CacheBackend, OrchestratorConfig, TableToTextConfig, Thresholds, TuningDetectorKind,
};
use crate::error::Result;
use crate::intent_router::{IntentRouter, PromptTuningDetector};
use crate::query_resolver::QueryResolver;
use crate::response::{ResponseAssembler, TurnRequest, TurnResponse};
use crate::schema::{Preprocessor, SchemaCatalog};
use crate::services::{
    AttributionEngine, HttpAttributionEngine, HttpIntentClassifier, HttpSemanticParser,
    HttpTextGenerator, HttpTuningDetector, IntentClassifier, SemanticParser, TextGenerator,
    TuningDetector,
};
use crate::session::SessionRegistry;
use crate::table2text::TableSummarizer;
use crate::user_intent::UserIntentResolver;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The external capabilities a pipeline is wired to.
pub struct Services {
    pub parser: Arc<dyn SemanticParser>,
    pub intent_classifier: Arc<dyn IntentClassifier>,
    pub tuning_detector: Arc<dyn TuningDetector>,
    pub attribution: Arc<dyn AttributionEngine>,
    pub text_generator: Arc<dyn TextGenerator>,
    pub nouns: Arc<dyn NounFilter>,
}

/// Tunable policy shared by the pipeline stages.
#[derive(Debug, Clone, Default)]
pub struct PipelinePolicy {
    pub thresholds: Thresholds,
    pub analysis: AnalysisConfig,
    pub table_to_text: TableToTextConfig,
}

pub struct Orchestrator {
    sessions: SessionRegistry,
    memo: Arc<Memoizer>,
    router: IntentRouter,
    resolver: QueryResolver,
    analyzer: ConfidenceAnalyzer,
    intents: UserIntentResolver,
    summarizer: TableSummarizer,
    thresholds: Thresholds,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn CacheStore>,
        preprocessor: Preprocessor,
        services: Services,
        policy: PipelinePolicy,
    ) -> Self {
        let memo = Arc::new(Memoizer::new(store));
        let preprocessor = Arc::new(preprocessor);

        Self {
            sessions: SessionRegistry::new(),
            router: IntentRouter::new(services.tuning_detector),
            resolver: QueryResolver::new(
                Arc::clone(&memo),
                Arc::clone(&preprocessor),
                services.parser,
                policy.thresholds.clone(),
            ),
            analyzer: ConfidenceAnalyzer::new(
                Arc::clone(&memo),
                Arc::clone(&preprocessor),
                services.attribution,
                services.nouns,
                policy.analysis,
            ),
            intents: UserIntentResolver::new(Arc::clone(&memo), preprocessor, services.intent_classifier),
            summarizer: TableSummarizer::new(Arc::clone(&memo), services.text_generator, policy.table_to_text),
            thresholds: policy.thresholds,
            memo,
        }
    }

    /// Wire the HTTP service clients and the configured cache backend.
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self> {
        let catalog = SchemaCatalog::load(&config.schema.tables_path)?;
        let preprocessor = Preprocessor::new(catalog, config.schema.token_budget);

        let store: Arc<dyn CacheStore> = match config.cache.backend {
            CacheBackend::Memory => Arc::new(MemoryCacheStore::new()),
            CacheBackend::Sqlite => Arc::new(SqliteCacheStore::open(&config.cache.sqlite_path)?),
        };

        let text_generator: Arc<dyn TextGenerator> =
            Arc::new(HttpTextGenerator::new(&config.text_generation)?);
        let tuning_detector: Arc<dyn TuningDetector> = match config.tuning_detector.kind {
            TuningDetectorKind::Classifier => {
                Arc::new(HttpTuningDetector::new(&config.tuning_detector.endpoint)?)
            }
            TuningDetectorKind::Prompt => Arc::new(PromptTuningDetector::new(Arc::clone(&text_generator))),
        };

        let services = Services {
            parser: Arc::new(HttpSemanticParser::new(&config.parser)?),
            intent_classifier: Arc::new(HttpIntentClassifier::new(&config.intent_classifier)?),
            tuning_detector,
            attribution: Arc::new(HttpAttributionEngine::new(&config.attribution)?),
            text_generator,
            nouns: Arc::new(LexiconNounFilter::new()),
        };

        let policy = PipelinePolicy {
            thresholds: config.thresholds.clone(),
            analysis: config.analysis.clone(),
            table_to_text: config.table_to_text.clone(),
        };

        Ok(Self::new(store, preprocessor, services, policy))
    }

    pub async fn handle_turn(&self, request: &TurnRequest) -> Result<TurnResponse> {
        let mut session = self.sessions.acquire(&request.session_id).await;
        if request.reset_history {
            debug!("Resetting history of session '{}'", request.session_id);
            session.reset();
        }

        let decision = self.router.route(&request.text, &request.db_id).await?;
        if decision.is_tuning {
            return Ok(TurnResponse::tuning());
        }

        let history = session.snapshot();
        let resolution = self
            .resolver
            .resolve(&request.text, &history, &request.db_id)
            .await?;
        session.append_turn(&request.text);

        let analysis = if request.analyse && resolution.query.confidence < self.thresholds.analysis_gate {
            let result = self
                .analyzer
                .analyze(AnalysisRequest {
                    key: &resolution.key,
                    input_text: &resolution.input_text,
                    utterance: &request.text,
                    db_id: &request.db_id,
                    context: resolution.context.as_ref(),
                })
                .await?;
            Some(result)
        } else {
            None
        };

        let intent = self
            .intents
            .resolve_intent(&resolution.key, &resolution.input_text, &request.db_id)
            .await?;

        info!(
            "Session '{}': confidence {:.2}{}, intent {}",
            request.session_id,
            resolution.query.confidence,
            if resolution.cache_hit { " (cached)" } else { "" },
            intent
        );
        Ok(ResponseAssembler::assemble(resolution.query, analysis, intent))
    }

    pub async fn reset_session(&self, session_id: &str) {
        self.sessions.reset(session_id).await;
        info!("History of session '{}' cleared", session_id);
    }

    pub async fn summarize_table(&self, rows: &Value) -> Result<String> {
        self.summarizer.summarize(rows).await
    }

    /// Clear every cache namespace.
    pub async fn flush_caches(&self) -> Result<()> {
        warn!("Flushing all cache namespaces");
        self.memo.clear_all().await
    }

    pub fn stats(&self) -> CacheStats {
        self.memo.stats()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
