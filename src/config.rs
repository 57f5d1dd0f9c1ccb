//! Orchestrator configuration
//!
//! Statically typed configuration with one named section per external service.
//! Values come from the environment (`CONVO_SQL_*`, optionally via a `.env` file)
//! and can be overridden by the server's command line flags.

use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default timeout for every service except the primary parser.
pub const DEFAULT_SERVICE_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub schema: SchemaConfig,
    pub parser: ParserConfig,
    pub intent_classifier: ServiceEndpoint,
    pub tuning_detector: TuningDetectorConfig,
    pub attribution: ServiceEndpoint,
    pub text_generation: ServiceEndpoint,
    pub table_to_text: TableToTextConfig,
    pub thresholds: Thresholds,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Sqlite,
}

impl std::str::FromStr for CacheBackend {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(CacheBackend::Memory),
            "sqlite" => Ok(CacheBackend::Sqlite),
            other => Err(OrchestratorError::Configuration(format!(
                "unknown cache backend '{}' (expected memory or sqlite)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub sqlite_path: PathBuf,
    /// Clear every namespace at startup
    pub flush_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Spider-style tables.json describing every database the parser knows
    pub tables_path: PathBuf,
    /// Combined question + schema word budget of the encoder
    pub token_budget: usize,
}

/// Address of one inference service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub host: String,
    pub port: u16,
    /// `None` waits indefinitely
    pub timeout_ms: Option<u64>,
}

impl ServiceEndpoint {
    pub fn new(host: impl Into<String>, port: u16, timeout_ms: Option<u64>) -> Self {
        Self {
            host: host.into(),
            port,
            timeout_ms,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    pub endpoint: ServiceEndpoint,
    pub beam_size: usize,
    pub max_steps: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TuningDetectorKind {
    /// Fine-tuned classifier behind `/predict`
    Classifier,
    /// Few-shot prompt sent to the text generation backend
    Prompt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningDetectorConfig {
    pub kind: TuningDetectorKind,
    pub endpoint: ServiceEndpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableToTextConfig {
    pub max_new_tokens: u32,
    pub temperature: f32,
}

impl Default for TableToTextConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 128,
            temperature: 0.0,
        }
    }
}

/// Confidence policy knobs. These are empirically tuned, not derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    /// Analysis runs when confidence (0-100 scale) is below this
    pub analysis_gate: f64,
    /// Conditional-clause predictions below this raw confidence get boosted
    pub boost_ceiling: f64,
    pub boost_amount: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            analysis_gate: 80.0,
            boost_ceiling: 0.70,
            boost_amount: 0.20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub max_attempts: u32,
    /// Uniform score assigned to every word when attribution fails
    pub fallback_score: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            fallback_score: 0.1,
        }
    }
}

impl OrchestratorConfig {
    /// Build the configuration from `CONVO_SQL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let services_host = env_or("CONVO_SQL_SERVICES_HOST", "0.0.0.0");

        let config = Self {
            server: ServerConfig {
                host: env_or("CONVO_SQL_HOST", "0.0.0.0"),
                port: env_parse("CONVO_SQL_PORT", 4000)?,
            },
            cache: CacheConfig {
                backend: env_or("CONVO_SQL_CACHE_BACKEND", "sqlite").parse()?,
                sqlite_path: PathBuf::from(env_or("CONVO_SQL_CACHE_PATH", "./cache/convo_sql.db")),
                flush_on_start: env_parse("CONVO_SQL_CACHE_FLUSH", false)?,
            },
            schema: SchemaConfig {
                tables_path: PathBuf::from(env_or("CONVO_SQL_TABLES_PATH", "./data/tables.json")),
                token_budget: env_parse("CONVO_SQL_TOKEN_BUDGET", 512)?,
            },
            parser: ParserConfig {
                endpoint: ServiceEndpoint::new(
                    env_or("CONVO_SQL_PARSER_HOST", &services_host),
                    env_parse("CONVO_SQL_PARSER_PORT", 5001)?,
                    env_timeout("CONVO_SQL_PARSER_TIMEOUT_MS", None)?,
                ),
                beam_size: env_parse("CONVO_SQL_BEAM_SIZE", 5)?,
                max_steps: env_parse("CONVO_SQL_MAX_STEPS", 1000)?,
            },
            intent_classifier: ServiceEndpoint::new(
                env_or("CONVO_SQL_INTENT_HOST", &services_host),
                env_parse("CONVO_SQL_INTENT_PORT", 5002)?,
                env_timeout("CONVO_SQL_INTENT_TIMEOUT_MS", Some(DEFAULT_SERVICE_TIMEOUT_MS))?,
            ),
            tuning_detector: TuningDetectorConfig {
                kind: match env_or("CONVO_SQL_TUNING_KIND", "classifier").as_str() {
                    "prompt" => TuningDetectorKind::Prompt,
                    "classifier" => TuningDetectorKind::Classifier,
                    other => {
                        return Err(OrchestratorError::Configuration(format!(
                            "unknown tuning detector kind '{}'",
                            other
                        )))
                    }
                },
                endpoint: ServiceEndpoint::new(
                    env_or("CONVO_SQL_TUNING_HOST", &services_host),
                    env_parse("CONVO_SQL_TUNING_PORT", 5000)?,
                    env_timeout("CONVO_SQL_TUNING_TIMEOUT_MS", Some(DEFAULT_SERVICE_TIMEOUT_MS))?,
                ),
            },
            attribution: ServiceEndpoint::new(
                env_or("CONVO_SQL_ATTRIBUTION_HOST", &services_host),
                env_parse("CONVO_SQL_ATTRIBUTION_PORT", 5003)?,
                env_timeout("CONVO_SQL_ATTRIBUTION_TIMEOUT_MS", Some(DEFAULT_SERVICE_TIMEOUT_MS))?,
            ),
            text_generation: ServiceEndpoint::new(
                env_or("CONVO_SQL_LLM_HOST", &services_host),
                env_parse("CONVO_SQL_LLM_PORT", 30000)?,
                env_timeout("CONVO_SQL_LLM_TIMEOUT_MS", Some(DEFAULT_SERVICE_TIMEOUT_MS))?,
            ),
            table_to_text: TableToTextConfig {
                max_new_tokens: env_parse("CONVO_SQL_SUMMARY_MAX_TOKENS", 128)?,
                temperature: env_parse("CONVO_SQL_SUMMARY_TEMPERATURE", 0.0)?,
            },
            thresholds: Thresholds {
                analysis_gate: env_parse("CONVO_SQL_ANALYSIS_GATE", 80.0)?,
                boost_ceiling: env_parse("CONVO_SQL_BOOST_CEILING", 0.70)?,
                boost_amount: env_parse("CONVO_SQL_BOOST_AMOUNT", 0.20)?,
            },
            analysis: AnalysisConfig {
                max_attempts: env_parse("CONVO_SQL_ANALYSIS_ATTEMPTS", 6)?,
                fallback_score: env_parse("CONVO_SQL_ANALYSIS_FALLBACK_SCORE", 0.1)?,
            },
        };

        Ok(config)
    }

    /// Reject configurations the server cannot start with.
    pub fn validate(&self) -> Result<()> {
        if !self.schema.tables_path.is_file() {
            return Err(OrchestratorError::Configuration(format!(
                "schema tables file does not exist: {}",
                self.schema.tables_path.display()
            )));
        }
        if self.analysis.max_attempts == 0 {
            return Err(OrchestratorError::Configuration(
                "analysis.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.parser.beam_size == 0 {
            return Err(OrchestratorError::Configuration(
                "parser.beam_size must be at least 1".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.thresholds.analysis_gate) {
            return Err(OrchestratorError::Configuration(format!(
                "analysis gate {} is outside 0-100",
                self.thresholds.analysis_gate
            )));
        }
        if !(0.0..=1.0).contains(&self.thresholds.boost_ceiling)
            || !(0.0..=1.0).contains(&self.thresholds.boost_amount)
        {
            return Err(OrchestratorError::Configuration(
                "confidence boost knobs must be within 0-1".to_string(),
            ));
        }
        if self.schema.token_budget == 0 {
            return Err(OrchestratorError::Configuration(
                "schema.token_budget must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| {
            OrchestratorError::Configuration(format!("invalid value for {}: '{}'", key, raw))
        }),
        Err(_) => Ok(default),
    }
}

/// `none`, `0` or an empty value mean "no timeout".
fn env_timeout(key: &str, default: Option<u64>) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(raw) => {
            let raw = raw.trim();
            if raw.is_empty() || raw.eq_ignore_ascii_case("none") || raw == "0" {
                Ok(None)
            } else {
                raw.parse::<u64>().map(Some).map_err(|_| {
                    OrchestratorError::Configuration(format!("invalid timeout for {}: '{}'", key, raw))
                })
            }
        }
        Err(_) => Ok(default),
    }
}
