//! reqwest clients for the inference services

use super::{
    Attribution, AttributionEngine, AttributionError, Beam, IntentClassifier, SemanticParser,
    TextGenerator, TuningDetector,
};
use crate::config::{ParserConfig, ServiceEndpoint};
use crate::error::{OrchestratorError, Result};
use crate::schema::ParserContext;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

fn build_client(endpoint: &ServiceEndpoint, service: &str) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = endpoint.timeout() {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| OrchestratorError::Configuration(format!("Failed to build {} client: {}", service, e)))
}

async fn post_json<B: Serialize + ?Sized, R: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    body: &B,
    service: &str,
) -> Result<R> {
    debug!("POST {} ({})", url, service);

    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| OrchestratorError::upstream(service, format!("request failed: {}", e)))?;

    let response = response
        .error_for_status()
        .map_err(|e| OrchestratorError::upstream(service, format!("error status: {}", e)))?;

    response
        .json::<R>()
        .await
        .map_err(|e| OrchestratorError::upstream(service, format!("malformed response: {}", e)))
}

pub struct HttpSemanticParser {
    client: reqwest::Client,
    url: String,
    beam_size: usize,
    max_steps: usize,
}

#[derive(Serialize)]
struct ParseRequest<'a> {
    question: &'a str,
    db_id: &'a str,
    context: &'a ParserContext,
    beam_size: usize,
    max_steps: usize,
}

#[derive(Deserialize)]
struct ParseResponse {
    beams: Vec<Beam>,
}

impl HttpSemanticParser {
    pub fn new(config: &ParserConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(&config.endpoint, "parser")?,
            url: format!("{}/parse", config.endpoint.base_url()),
            beam_size: config.beam_size,
            max_steps: config.max_steps,
        })
    }
}

#[async_trait]
impl SemanticParser for HttpSemanticParser {
    async fn parse(&self, context: &ParserContext) -> Result<Vec<Beam>> {
        let request = ParseRequest {
            question: &context.raw_question,
            db_id: &context.db_id,
            context,
            beam_size: self.beam_size,
            max_steps: self.max_steps,
        };
        let response: ParseResponse = post_json(&self.client, &self.url, &request, "parser").await?;
        Ok(response.beams)
    }
}

pub struct HttpIntentClassifier {
    client: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    labels: Vec<String>,
}

impl HttpIntentClassifier {
    pub fn new(endpoint: &ServiceEndpoint) -> Result<Self> {
        Ok(Self {
            client: build_client(endpoint, "intent classifier")?,
            url: format!("{}/classify", endpoint.base_url()),
        })
    }
}

#[async_trait]
impl IntentClassifier for HttpIntentClassifier {
    async fn classify(&self, context: &ParserContext) -> Result<Vec<String>> {
        let body = serde_json::json!({ "context": context });
        let response: ClassifyResponse =
            post_json(&self.client, &self.url, &body, "intent classifier").await?;
        Ok(response.labels)
    }
}

/// Fine-tuned tuning classifier answering `{"intent": bool}` on `/predict`.
pub struct HttpTuningDetector {
    client: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct PredictResponse {
    intent: bool,
}

impl HttpTuningDetector {
    pub fn new(endpoint: &ServiceEndpoint) -> Result<Self> {
        Ok(Self {
            client: build_client(endpoint, "tuning detector")?,
            url: format!("{}/predict", endpoint.base_url()),
        })
    }
}

#[async_trait]
impl TuningDetector for HttpTuningDetector {
    async fn is_tuning(&self, utterance: &str, db_id: &str) -> Result<bool> {
        let body = serde_json::json!({ "question": utterance, "db_id": db_id });
        let response: PredictResponse =
            post_json(&self.client, &self.url, &body, "tuning detector").await?;
        Ok(response.intent)
    }
}

pub struct HttpAttributionEngine {
    client: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct AttributionResponse {
    tokens: Vec<String>,
    scores: Vec<f64>,
}

impl HttpAttributionEngine {
    pub fn new(endpoint: &ServiceEndpoint) -> Result<Self> {
        Ok(Self {
            client: build_client(endpoint, "attribution")?,
            url: format!("{}/attribute", endpoint.base_url()),
        })
    }
}

#[async_trait]
impl AttributionEngine for HttpAttributionEngine {
    async fn attribute(
        &self,
        input_text: &str,
        context: &ParserContext,
    ) -> std::result::Result<Attribution, AttributionError> {
        let body = serde_json::json!({ "text": input_text, "context": context });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AttributionError::Upstream(e.to_string()))?;

        let payload: AttributionResponse = response
            .json()
            .await
            .map_err(|e| AttributionError::Malformed(e.to_string()))?;

        if payload.tokens.len() != payload.scores.len() {
            return Err(AttributionError::Malformed(format!(
                "{} tokens but {} scores",
                payload.tokens.len(),
                payload.scores.len()
            )));
        }

        Ok(Attribution {
            tokens: payload.tokens,
            scores: payload.scores,
        })
    }
}

pub struct HttpTextGenerator {
    client: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct Generation {
    #[serde(default)]
    text: String,
}

impl HttpTextGenerator {
    pub fn new(endpoint: &ServiceEndpoint) -> Result<Self> {
        Ok(Self {
            client: build_client(endpoint, "text generation")?,
            url: format!("{}/generate", endpoint.base_url()),
        })
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(&self, prompt: &str, max_new_tokens: u32, temperature: f32) -> Result<String> {
        let body = serde_json::json!({
            "text": [prompt],
            "sampling_params": {
                "max_new_tokens": max_new_tokens,
                "temperature": temperature,
            },
        });

        let generations: Vec<Generation> =
            post_json(&self.client, &self.url, &body, "text generation").await?;

        generations
            .into_iter()
            .next()
            .map(|g| g.text)
            .ok_or_else(|| OrchestratorError::upstream("text generation", "empty generation list"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beam_wire_format() {
        let beams: ParseResponse = serde_json::from_str(
            r#"{"beams": [{"inferred_code": "SELECT count(*) FROM concert", "score": -0.3}]}"#,
        )
        .unwrap();
        assert_eq!(beams.beams[0].sql, "SELECT count(*) FROM concert");
    }

    #[test]
    fn test_parser_endpoint_url() {
        let config = ParserConfig {
            endpoint: ServiceEndpoint::new("10.0.0.5", 5001, None),
            beam_size: 5,
            max_steps: 1000,
        };
        let parser = HttpSemanticParser::new(&config).unwrap();
        assert_eq!(parser.url, "http://10.0.0.5:5001/parse");
    }
}
