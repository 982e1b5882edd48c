//! HTTP API over the query engine.


use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::embeddings::{Embedder, OllamaClient};
use crate::llm::{self, LanguageModel};
use crate::query::{QueryEngine, QueryResult, SystemStats};
use crate::{RagError, Result};

const DEFAULT_K: usize = 5;
const MAX_K: usize = 200;

/// Shared request state. The engine is opened on first use and kept, so a server
/// started before the index exists begins answering once it has been built.
pub struct AppState {
    config: Config,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LanguageModel>,
    engine: Mutex<Option<Arc<QueryEngine>>>,
}

impl std::fmt::Debug for AppState {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("base_dir", &self.config.get_base_dir())
            .field("llm", &self.llm.identifier())
            .finish_non_exhaustive()
    }
}

impl AppState {
    #[inline]
    pub fn new(config: Config, embedder: Arc<dyn Embedder>, llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            config,
            embedder,
            llm,
            engine: Mutex::new(None),
        }
    }

    /// State wired to the configured Ollama embedder and language model backend.
    #[inline]
    pub fn from_config(config: Config) -> Result<Self> {
        let embedder = Arc::new(OllamaClient::new(&config.embeddings)?);
        let llm = llm::from_config(&config)?;
        Ok(Self::new(config, embedder, llm))
    }

    #[inline]
    pub async fn engine(&self) -> Result<Arc<QueryEngine>> {
        let mut slot = self.engine.lock().await;
        if let Some(engine) = slot.as_ref() {
            return Ok(Arc::clone(engine));
        }

        let engine = Arc::new(
            QueryEngine::open(
                self.config.clone(),
                Arc::clone(&self.embedder),
                Arc::clone(&self.llm),
            )
            .await?,
        );
        *slot = Some(Arc::clone(&engine));
        Ok(engine)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AskRequest {
    pub question: String,
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    DEFAULT_K
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    IndexUnavailable(String),

    #[error("{0}")]
    Internal(RagError),
}

impl From<RagError> for ApiError {
    #[inline]
    fn from(error: RagError) -> Self {
        if error.is_missing_index() {
            Self::IndexUnavailable(format!(
                "{}. Build the index with `paper-rag build` and retry.",
                error
            ))
        } else {
            Self::Internal(error)
        }
    }
}

impl IntoResponse for ApiError {
    #[inline]
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::IndexUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(e) => {
                error!("Request failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[inline]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/ask", post(ask))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn stats(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<SystemStats>, ApiError> {
    let engine = state.engine().await?;
    Ok(Json(engine.stats()))
}

async fn ask(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AskRequest>,
) -> std::result::Result<Json<QueryResult>, ApiError> {
    if request.question.trim().is_empty() {
        return Err(ApiError::InvalidRequest(
            "question must not be empty".to_string(),
        ));
    }
    if !(1..=MAX_K).contains(&request.k) {
        return Err(ApiError::InvalidRequest(format!(
            "k must be between 1 and {}, got {}",
            MAX_K, request.k
        )));
    }

    let engine = state.engine().await?;
    let result = engine.ask(&request.question, request.k).await?;
    Ok(Json(result))
}

/// Bind `host:port` and serve until Ctrl-C.
#[inline]
pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!("Serving on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    info!("Server stopped");
    Ok(())
}
