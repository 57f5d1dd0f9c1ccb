//! HTTP surface
//!
//! Plain tokio server, one task per connection, one request per connection.
//!
//! Routes:
//! - `GET /health`: status, version, live sessions and cache counters
//! - `GET|POST /reset_history[?session_id=]`: clear one conversation's history
//! - `POST /text_to_sql`: run one conversational turn
//! - `POST /table_to_text`: summarize `{rows: [...]}`
//! - `OPTIONS *`: CORS preflight

pub mod http;

pub use http::{HttpRequest, ReadOutcome};

use crate::cache::CacheStats;
use crate::error::{OrchestratorError, Result};
use crate::orchestrator::Orchestrator;
use crate::response::TurnRequest;
use crate::session::DEFAULT_SESSION_ID;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};
use uuid::Uuid;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct AppState {
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions: usize,
    pub cache: CacheStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub response: bool,
}

#[derive(Debug, Deserialize)]
pub struct TableRequest {
    #[serde(default)]
    pub rows: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
}

/// Status code and JSON body produced for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply {
    pub status: u16,
    pub body: Value,
}

impl ApiReply {
    fn ok<T: Serialize>(body: &T) -> Result<Self> {
        Ok(Self {
            status: 200,
            body: serde_json::to_value(body)?,
        })
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: serde_json::json!({ "error": message.into() }),
        }
    }

    fn from_error(err: &OrchestratorError) -> Self {
        Self::error(err.status_code(), err.to_string())
    }
}

/// Accept connections until the listener fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    info!("Listening on {}", listener.local_addr()?);
    loop {
        let (stream, addr) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let request_id = Uuid::new_v4();
            if let Err(e) = handle_connection(stream, state, request_id).await {
                error!("[{}] Error handling connection from {}: {}", request_id, addr, e);
            }
        });
    }
}

pub async fn handle_connection(mut stream: TcpStream, state: Arc<AppState>, request_id: Uuid) -> Result<()> {
    let request = match http::read_request(&mut stream, READ_TIMEOUT).await {
        Ok(ReadOutcome::Request(request)) => request,
        Ok(ReadOutcome::Closed) => return Ok(()),
        Ok(ReadOutcome::TimedOut) => {
            return write_reply(&mut stream, &ApiReply::error(408, "Request timeout")).await;
        }
        Err(e) => {
            warn!("[{}] Rejecting malformed request: {}", request_id, e);
            return write_reply(&mut stream, &ApiReply::from_error(&e)).await;
        }
    };

    info!("[{}] {} {}", request_id, request.method, request.path);

    if request.method == "OPTIONS" {
        stream.write_all(&http::cors_response()).await?;
        stream.flush().await?;
        return Ok(());
    }

    let reply = dispatch(&state, &request).await;
    if reply.status >= 500 {
        error!("[{}] {} {} failed with {}", request_id, request.method, request.path, reply.status);
    }
    write_reply(&mut stream, &reply).await
}

async fn write_reply(stream: &mut TcpStream, reply: &ApiReply) -> Result<()> {
    let bytes = http::json_response(reply.status, &reply.body)?;
    stream.write_all(&bytes).await?;
    stream.flush().await?;
    Ok(())
}

/// Route a parsed request to the orchestrator.
pub async fn dispatch(state: &AppState, request: &HttpRequest) -> ApiReply {
    let result = match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => health(state),
        ("GET", "/reset_history") | ("POST", "/reset_history") => reset_history(state, request).await,
        ("POST", "/text_to_sql") => text_to_sql(state, request).await,
        ("POST", "/table_to_text") => table_to_text(state, request).await,
        (_, "/health") | (_, "/reset_history") | (_, "/text_to_sql") | (_, "/table_to_text") => {
            return ApiReply::error(405, format!("{} not allowed on {}", request.method, request.path));
        }
        (_, path) => return ApiReply::error(404, format!("Unknown route: {}", path)),
    };

    result.unwrap_or_else(|e| ApiReply::from_error(&e))
}

fn health(state: &AppState) -> Result<ApiReply> {
    ApiReply::ok(&HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: state.orchestrator.session_count(),
        cache: state.orchestrator.stats(),
    })
}

async fn reset_history(state: &AppState, request: &HttpRequest) -> Result<ApiReply> {
    let session_id = request.query_param("session_id").unwrap_or(DEFAULT_SESSION_ID);
    state.orchestrator.reset_session(session_id).await;
    ApiReply::ok(&ResetResponse { response: true })
}

async fn text_to_sql(state: &AppState, request: &HttpRequest) -> Result<ApiReply> {
    let mut turn: TurnRequest = serde_json::from_slice(&request.body)?;
    if let Some(session_id) = request.query_param("session_id") {
        turn.session_id = session_id.to_string();
    }
    if turn.text.trim().is_empty() {
        return Err(OrchestratorError::InvalidRequest("text must not be empty".to_string()));
    }

    let response = state.orchestrator.handle_turn(&turn).await?;
    ApiReply::ok(&response)
}

async fn table_to_text(state: &AppState, request: &HttpRequest) -> Result<ApiReply> {
    let table: TableRequest = serde_json::from_slice(&request.body)?;
    let summary = state.orchestrator.summarize_table(&table.rows).await?;
    ApiReply::ok(&SummaryResponse { summary })
}
