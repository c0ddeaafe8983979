//! Error taxonomy for the retrieval and external-capability boundaries.
//!
//! Leaf modules surface typed errors; orchestration code (index build, CLI)
//! wraps them in `anyhow` with context. The split matters because callers
//! react differently per class: a malformed lore document is skipped, an
//! embedding failure aborts the in-progress build without publishing a
//! partial index, and a query-time retrieval failure degrades to "no
//! context" instead of failing the user's request.

use thiserror::Error;

/// Raised by the document flattener when nesting exceeds the recursion
/// guard. Lore data is document-shaped and acyclic; hitting the guard
/// means the source file is malformed or pathological.
#[derive(Debug, Error)]
pub enum FlattenError {
    #[error("document nesting exceeds {limit} levels")]
    DepthExceeded { limit: usize },
}

/// Embedding backend failures. During an index build these abort the whole
/// build; on the query path they are wrapped in [`RetrievalUnavailable`].
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider is disabled")]
    Disabled,

    #[error("unknown embedding provider: {0}")]
    UnknownProvider(String),

    #[error("OPENAI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("embedding request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("embedding API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("embedding dimensionality mismatch: expected {expected}, got {actual}")]
    DimsMismatch { expected: usize, actual: usize },
}

/// Query-path retrieval could not run. Callers must treat this as "no
/// context available" and continue the generation flow with empty evidence.
#[derive(Debug, Error)]
#[error("retrieval unavailable: {0}")]
pub struct RetrievalUnavailable(#[from] pub EmbeddingError);

/// Chat-completion backend failures. Carries an HTTP-style status so the
/// UI collaborator can render an appropriate message.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("OPENAI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("chat completion request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("chat completion API error {status}: {message}")]
    Api { status: u16, message: String },
}

impl GenerationError {
    /// HTTP status to surface to the caller.
    pub fn status(&self) -> u16 {
        match self {
            Self::MissingApiKey => 500,
            Self::Transport(_) => 502,
            Self::Api { status, .. } => *status,
        }
    }
}

/// Text-to-speech backend failures. Upstream auth/permission/validation
/// statuses pass through so the UI can distinguish a bad voice id (404)
/// from a bad API key (401).
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("ELEVENLABS_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("speech request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("speech API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("speech service returned an empty audio stream")]
    EmptyAudio,
}

impl SpeechError {
    /// HTTP status to surface to the caller.
    pub fn status(&self) -> u16 {
        match self {
            Self::MissingApiKey => 401,
            Self::Transport(_) => 502,
            Self::Api { status, .. } => *status,
            Self::EmptyAudio => 500,
        }
    }
}
