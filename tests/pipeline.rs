//! End-to-end pipeline tests: lore documents on disk → flatten → chunk →
//! embed → index → retrieve → prompt.
//!
//! Embeddings are computed by a deterministic in-process token-hash
//! embedder, so no network is involved and every run produces the same
//! vectors.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tempfile::TempDir;

use oracolo::config::{
    ChunkingConfig, Config, DataConfig, EmbeddingConfig, GenerationConfig, RetrievalConfig,
    ServerConfig, SpeechConfig,
};
use oracolo::embedding::Embedder;
use oracolo::error::EmbeddingError;
use oracolo::index::{IndexService, IndexStatus};
use oracolo::prompt::{compose_system_prompt, Persona};
use oracolo::retrieve::retrieve_and_augment;

const DIMS: usize = 64;

/// Deterministic embedder: a bag-of-tokens histogram hashed into a fixed
/// number of buckets. Similar texts share buckets; identical texts get
/// identical vectors.
struct HashEmbedder {
    calls: AtomicUsize,
}

impl HashEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vectorize(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; DIMS];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            // FNV-1a
            let mut hash: u64 = 0xcbf29ce484222325;
            for byte in token.as_bytes() {
                hash ^= u64::from(*byte);
                hash = hash.wrapping_mul(0x100000001b3);
            }
            vector[(hash % DIMS as u64) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "token-hash"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vectorize(t)).collect())
    }
}

/// Embedder that always fails, as an unreachable backend would.
struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Api {
            status: 503,
            message: "backend unavailable".to_string(),
        })
    }
}

fn test_config(data_dir: &Path) -> Config {
    Config {
        data: DataConfig {
            dir: data_dir.to_path_buf(),
        },
        chunking: ChunkingConfig::default(),
        retrieval: RetrievalConfig::default(),
        embedding: EmbeddingConfig::default(),
        generation: GenerationConfig::default(),
        speech: SpeechConfig::default(),
        server: ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        },
    }
}

fn write_lore(dir: &TempDir, name: &str, content: &str) {
    std::fs::write(dir.path().join(name), content).unwrap();
}

#[tokio::test]
async fn test_lore_question_retrieves_archive_fact() {
    let dir = TempDir::new().unwrap();
    write_lore(
        &dir,
        "manuale.json",
        r#"{ "capitolo1": { "storia": "Il Metro-Centro fu costruito nel 2347." } }"#,
    );

    let config = test_config(dir.path());
    let embedder = HashEmbedder::new();
    let index = IndexService::new();
    index.build_once(&embedder, &config).await;

    assert!(matches!(index.status(), IndexStatus::Ready { .. }));

    let evidence = retrieve_and_augment(
        &index,
        &embedder,
        "quando fu costruito il Metro-Centro?",
        5,
    )
    .await
    .unwrap();
    assert!(
        evidence.contains("2347"),
        "expected the archive fact in {evidence:?}"
    );
}

#[tokio::test]
async fn test_empty_data_dir_degrades_to_pure_generation() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let embedder = HashEmbedder::new();
    let index = IndexService::new();
    index.build_once(&embedder, &config).await;

    assert!(matches!(index.status(), IndexStatus::Inactive));

    let evidence = retrieve_and_augment(&index, &embedder, "qualsiasi domanda", 5)
        .await
        .unwrap();
    assert_eq!(evidence, "");
    assert_eq!(embedder.call_count(), 0, "inactive index must not embed");

    // The composed prompt must take the no-data branch.
    let persona = Persona::default();
    let prompt = compose_system_prompt(&persona, true, &evidence);
    assert!(prompt.contains(&persona.no_data_line));
    assert!(!prompt.contains("fonte primaria di verità"));
}

#[tokio::test]
async fn test_failed_embedding_build_degrades_to_empty_context() {
    let dir = TempDir::new().unwrap();
    write_lore(
        &dir,
        "manuale.json",
        r#"{ "storia": "Le gallerie inferiori ospitano i Custodi." }"#,
    );

    let config = test_config(dir.path());
    let index = IndexService::new();
    index.build_once(&FailingEmbedder, &config).await;

    assert!(matches!(index.status(), IndexStatus::Inactive));

    // Query-time retrieval returns empty context, not an error.
    let query_embedder = HashEmbedder::new();
    let evidence = retrieve_and_augment(&index, &query_embedder, "any query", 5)
        .await
        .unwrap();
    assert_eq!(evidence, "");
}

#[tokio::test]
async fn test_malformed_document_is_skipped() {
    let dir = TempDir::new().unwrap();
    write_lore(&dir, "rotto.json", "{ this is not json");
    write_lore(
        &dir,
        "sano.json",
        r#"{ "fazioni": "Il Culto della Ruggine controlla i condotti orientali." }"#,
    );

    let config = test_config(dir.path());
    let embedder = HashEmbedder::new();
    let index = IndexService::new();
    index.build_once(&embedder, &config).await;

    assert!(matches!(index.status(), IndexStatus::Ready { .. }));

    let evidence = retrieve_and_augment(&index, &embedder, "chi controlla i condotti?", 5)
        .await
        .unwrap();
    assert!(evidence.contains("Culto della Ruggine"));
}

#[tokio::test]
async fn test_build_once_is_idempotent() {
    let dir = TempDir::new().unwrap();
    write_lore(
        &dir,
        "manuale.json",
        r#"{ "storia": "Il Consiglio delle Turbine si riunisce ogni dieci anni." }"#,
    );

    let config = test_config(dir.path());
    let embedder = HashEmbedder::new();
    let index = IndexService::new();

    index.build_once(&embedder, &config).await;
    let calls_after_first = embedder.call_count();
    assert!(calls_after_first > 0);

    index.build_once(&embedder, &config).await;
    assert_eq!(
        embedder.call_count(),
        calls_after_first,
        "second build must be a no-op"
    );
    assert!(matches!(index.status(), IndexStatus::Ready { .. }));
}

#[tokio::test]
async fn test_blank_query_skips_the_embedding_call() {
    let dir = TempDir::new().unwrap();
    write_lore(&dir, "manuale.json", r#"{ "voce": "Qualcosa di indicizzato." }"#);

    let config = test_config(dir.path());
    let embedder = HashEmbedder::new();
    let index = IndexService::new();
    index.build_once(&embedder, &config).await;

    let calls_after_build = embedder.call_count();
    let evidence = retrieve_and_augment(&index, &embedder, "   \n\t ", 5)
        .await
        .unwrap();
    assert_eq!(evidence, "");
    assert_eq!(embedder.call_count(), calls_after_build);
}

#[tokio::test]
async fn test_chunks_carry_their_source_document_label() {
    let dir = TempDir::new().unwrap();
    write_lore(
        &dir,
        "bestiario.json",
        r#"{ "creature": "I ratti luminescenti nidificano nelle condotte di aerazione." }"#,
    );

    let config = test_config(dir.path());
    let embedder = HashEmbedder::new();
    let index = IndexService::new();
    index.build_once(&embedder, &config).await;

    let snapshot = index.snapshot().unwrap();
    let query = HashEmbedder::vectorize("ratti luminescenti");
    let hits = snapshot.search(&query, 1);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].source_label, "bestiario");
    assert!(hits[0].text.contains("bestiario > creature:"));
}

#[tokio::test]
async fn test_retrieval_ranks_the_matching_document_first() {
    let dir = TempDir::new().unwrap();
    write_lore(
        &dir,
        "luoghi.json",
        r#"{ "metro": "Il Metro-Centro fu costruito nel 2347 sotto la vecchia stazione." }"#,
    );
    write_lore(
        &dir,
        "piante.json",
        r#"{ "flora": "I funghi fosforescenti crescono dove l'acqua gocciola dalle volte." }"#,
    );

    // Small chunk size so each document lands in its own chunk.
    let mut config = test_config(dir.path());
    config.chunking = ChunkingConfig {
        chunk_size: 80,
        chunk_overlap: 10,
    };

    let embedder = HashEmbedder::new();
    let index = IndexService::new();
    index.build_once(&embedder, &config).await;

    let evidence = retrieve_and_augment(
        &index,
        &embedder,
        "quando fu costruito il Metro-Centro?",
        1,
    )
    .await
    .unwrap();
    assert!(evidence.contains("2347"));
    assert!(!evidence.contains("funghi fosforescenti"));
}

#[tokio::test]
async fn test_first_and_later_turns_compose_differently_end_to_end() {
    let dir = TempDir::new().unwrap();
    write_lore(
        &dir,
        "manuale.json",
        r#"{ "storia": "Il Metro-Centro fu costruito nel 2347." }"#,
    );

    let config = test_config(dir.path());
    let embedder = HashEmbedder::new();
    let index = IndexService::new();
    index.build_once(&embedder, &config).await;

    let evidence = retrieve_and_augment(&index, &embedder, "il Metro-Centro", 5)
        .await
        .unwrap();

    let persona = Persona::default();
    let first = compose_system_prompt(&persona, true, &evidence);
    let later = compose_system_prompt(&persona, false, &evidence);

    assert!(first.contains("**DEVI** iniziare la tua risposta"));
    assert!(!later.contains("**DEVI** iniziare la tua risposta"));
    assert!(later.contains("**NON DEVI** presentarti di nuovo"));
    // Both carry the retrieved evidence as ground truth.
    assert!(first.contains("2347"));
    assert!(later.contains("2347"));
}
