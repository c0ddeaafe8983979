//! HTTP surface for the chat and speech flows.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Retrieval-augmented persona reply |
//! | `POST` | `/tts` | Render reply text as `audio/mpeg` |
//! | `GET`  | `/health` | Version and index lifecycle state |
//!
//! Errors are returned as `{ "error": "<message>" }` with the status code
//! the failing capability reported (or 4xx for request validation).
//!
//! The index build is kicked off in the background at startup; requests
//! arriving before it completes are served with empty retrieved context.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support
//! browser-based clients.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::generation::GenerationClient;
use crate::index::{IndexService, IndexStatus};
use crate::markdown::strip_markdown;
use crate::prompt::{build_messages, compose_system_prompt, HistoryTurn, Persona};
use crate::retrieve::retrieve_and_augment;
use crate::speech::{SpeechClient, VoiceSettings};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    persona: Arc<Persona>,
    index: Arc<IndexService>,
    embedder: Arc<dyn Embedder>,
    generation: Arc<GenerationClient>,
    speech: Arc<SpeechClient>,
}

/// Start the HTTP server and the one-time index build.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let config = Arc::new(config.clone());

    let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&config.embedding)?);
    let index = Arc::new(IndexService::new());

    // Background build: requests that arrive before it completes observe
    // an inactive index and degrade to empty context.
    {
        let index = index.clone();
        let embedder = embedder.clone();
        let config = config.clone();
        tokio::spawn(async move {
            index.build_once(embedder.as_ref(), &config).await;
        });
    }

    let state = AppState {
        persona: Arc::new(Persona::default()),
        index,
        embedder,
        generation: Arc::new(GenerationClient::new(&config.generation)?),
        speech: Arc::new(SpeechClient::new(&config.speech)?),
        config,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/chat", post(handle_chat))
        .route("/tts", post(handle_tts))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("oracolo listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ============ POST /chat ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    message: String,
    #[serde(default)]
    history: Vec<HistoryTurn>,
    /// Sent by clients whose history lives elsewhere (the speech-only
    /// mode always posts an empty history).
    #[serde(default)]
    is_first_message: Option<bool>,
}

#[derive(Serialize)]
struct ChatResponse {
    reply: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "message must not be empty",
        ));
    }

    // An explicit flag from the client wins over the history heuristic.
    let is_first = request
        .is_first_message
        .unwrap_or(request.history.is_empty());

    let retrieved = match retrieve_and_augment(
        &state.index,
        state.embedder.as_ref(),
        &request.message,
        state.config.retrieval.top_k,
    )
    .await
    {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Warning: {e}; continuing without retrieved context");
            String::new()
        }
    };

    let system_prompt = compose_system_prompt(&state.persona, is_first, &retrieved);
    let messages = build_messages(&system_prompt, &request.history, &request.message);

    let reply = state
        .generation
        .complete(&messages)
        .await
        .map_err(|e| ApiError::from_status(e.status(), e.to_string()))?;

    let reply = if reply.trim().is_empty() {
        state.persona.fallback_reply.clone()
    } else {
        reply
    };

    Ok(Json(ChatResponse { reply }))
}

// ============ POST /tts ============

#[derive(Deserialize)]
struct TtsRequest {
    text: String,
    voice_id: Option<String>,
    stability: Option<f32>,
    similarity_boost: Option<f32>,
    style: Option<f32>,
    use_speaker_boost: Option<bool>,
}

async fn handle_tts(
    State(state): State<AppState>,
    Json(request): Json<TtsRequest>,
) -> Result<Response, ApiError> {
    if request.text.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "text must not be empty",
        ));
    }

    let plain = strip_markdown(&request.text);
    if plain.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "text is empty after markdown stripping",
        ));
    }
    if plain.chars().count() > state.config.speech.max_text_chars {
        return Err(ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!(
                "text exceeds the maximum length of {} characters",
                state.config.speech.max_text_chars
            ),
        ));
    }

    let defaults = VoiceSettings::default();
    let settings = VoiceSettings {
        stability: request.stability.unwrap_or(defaults.stability),
        similarity_boost: request.similarity_boost.unwrap_or(defaults.similarity_boost),
        style: request.style.unwrap_or(defaults.style),
        use_speaker_boost: request.use_speaker_boost.unwrap_or(defaults.use_speaker_boost),
    };
    let voice_id = request
        .voice_id
        .as_deref()
        .unwrap_or(&state.config.speech.voice_id);

    let audio = state
        .speech
        .synthesize(&plain, voice_id, &settings)
        .await
        .map_err(|e| ApiError::from_status(e.status(), e.to_string()))?;

    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    index: IndexHealth,
}

#[derive(Serialize)]
struct IndexHealth {
    state: String,
    chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    built_at: Option<String>,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let index = match state.index.status() {
        IndexStatus::Uninitialized => IndexHealth {
            state: "uninitialized".to_string(),
            chunks: 0,
            built_at: None,
        },
        IndexStatus::Building => IndexHealth {
            state: "building".to_string(),
            chunks: 0,
            built_at: None,
        },
        IndexStatus::Inactive => IndexHealth {
            state: "inactive".to_string(),
            chunks: 0,
            built_at: None,
        },
        IndexStatus::Ready {
            chunks, built_at, ..
        } => IndexHealth {
            state: "ready".to_string(),
            chunks,
            built_at: Some(built_at.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        },
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        index,
    })
}
