//! Intent Router
//!
//! First stage of every turn: decides whether the utterance asks for database
//! maintenance ("tuning") instead of data. Tuning requests short-circuit the
//! pipeline without touching the cache or the session history.

use crate::error::{OrchestratorError, Result};
use crate::services::{TextGenerator, TuningDetector};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use tracing::info;

lazy_static! {
    static ref TUNE_CALL: Regex = Regex::new(r"f_tune\(\[\s*(True|False)\s*\]\)").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteDecision {
    pub is_tuning: bool,
}

pub struct IntentRouter {
    detector: Arc<dyn TuningDetector>,
}

impl IntentRouter {
    pub fn new(detector: Arc<dyn TuningDetector>) -> Self {
        Self { detector }
    }

    pub async fn route(&self, utterance: &str, db_id: &str) -> Result<RouteDecision> {
        let is_tuning = self.detector.is_tuning(utterance, db_id).await?;
        if is_tuning {
            info!("Routing '{}' to database tuning", utterance);
        }
        Ok(RouteDecision { is_tuning })
    }
}

/// Tuning detection through a few-shot prompt on the text generation backend.
///
/// The model answers with a call-like marker, `f_tune([True])` or
/// `f_tune([False])`; anything else is a malformed response.
pub struct PromptTuningDetector {
    generator: Arc<dyn TextGenerator>,
    max_new_tokens: u32,
}

const TUNING_EXAMPLES: &[(&str, bool)] = &[
    ("How many singers do we have?", false),
    ("The database feels slow, can you tune it?", true),
    ("Show the names of stadiums with capacity over 5000.", false),
    ("Please optimize the indexes of this database.", true),
    ("What is the average age of all singers from France?", false),
    ("Run a performance tuning pass on the concert database.", true),
];

impl PromptTuningDetector {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            max_new_tokens: 16,
        }
    }

    pub fn build_prompt(utterance: &str) -> String {
        let mut prompt = String::from(
            "Decide whether the request asks to tune or maintain the database rather than query its data.\n\
             Answer with f_tune([True]) or f_tune([False]) only.\n\n",
        );
        for (example, is_tuning) in TUNING_EXAMPLES {
            let flag = if *is_tuning { "True" } else { "False" };
            prompt.push_str(&format!("Request: {}\nAnswer: f_tune([{}])\n\n", example, flag));
        }
        prompt.push_str(&format!("Request: {}\nAnswer:", utterance));
        prompt
    }

    pub fn parse_answer(generated: &str) -> Result<bool> {
        TUNE_CALL
            .captures(generated)
            .map(|caps| &caps[1] == "True")
            .ok_or_else(|| {
                OrchestratorError::upstream(
                    "tuning detector",
                    format!("no f_tune marker in generation: {:?}", generated),
                )
            })
    }
}

#[async_trait]
impl TuningDetector for PromptTuningDetector {
    async fn is_tuning(&self, utterance: &str, _db_id: &str) -> Result<bool> {
        let prompt = Self::build_prompt(utterance);
        let generated = self.generator.generate(&prompt, self.max_new_tokens, 0.0).await?;
        Self::parse_answer(&generated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedGenerator {
        answer: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, prompt: &str, _: u32, _: f32) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.answer.clone())
        }
    }

    #[test]
    fn test_parse_answer() {
        assert!(PromptTuningDetector::parse_answer(" f_tune([True])\n").unwrap());
        assert!(!PromptTuningDetector::parse_answer("f_tune([False])").unwrap());
        assert!(PromptTuningDetector::parse_answer("yes please").is_err());
    }

    #[test]
    fn test_prompt_ends_with_request() {
        let prompt = PromptTuningDetector::build_prompt("tune my database");
        assert!(prompt.ends_with("Request: tune my database\nAnswer:"));
        assert!(prompt.contains("f_tune([True])"));
    }

    #[tokio::test]
    async fn test_router_with_prompt_detector() {
        let generator = Arc::new(ScriptedGenerator {
            answer: "f_tune([True])".to_string(),
            prompts: Mutex::new(Vec::new()),
        });
        let router = IntentRouter::new(Arc::new(PromptTuningDetector::new(generator.clone())));

        let decision = router.route("please tune the database", "concert_singer").await.unwrap();
        assert!(decision.is_tuning);
        assert_eq!(generator.prompts.lock().unwrap().len(), 1);
    }
}
