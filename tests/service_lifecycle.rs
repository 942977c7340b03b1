//! Service-level tests for the ingestion lifecycle and retrieval, run against
//! a temporary SQLite store with a deterministic in-process embedder.

use anyhow::Result;
use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parlance::config::{
    AgentConfig, ChunkingConfig, Config, EmbeddingConfig, IngestConfig, InferenceConfig,
    RetrievalConfig, RoomsConfig, ServerConfig, StoreConfig,
};
use parlance::embedding::EmbeddingProvider;
use parlance::ingest::{IngestContext, IngestService, IngestStatus, SubmitError};
use parlance::store::{MetadataFilter, VectorStore};

/// Maps each text to a fixed 4-dim vector from its byte content, so
/// similarity is stable and no network is involved.
struct ByteSumEmbedder;

#[async_trait]
impl EmbeddingProvider for ByteSumEmbedder {
    fn model_name(&self) -> &str {
        "byte-sum-test"
    }
    fn dims(&self) -> usize {
        4
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let sum: u32 = t.bytes().map(u32::from).sum();
                vec![
                    (sum % 97) as f32,
                    (sum % 89) as f32,
                    t.len() as f32,
                    1.0,
                ]
            })
            .collect())
    }
}

fn test_config(store_path: &Path) -> Config {
    Config {
        store: StoreConfig {
            path: store_path.to_path_buf(),
        },
        chunking: ChunkingConfig {
            max_tokens: 64,
            overlap_tokens: 8,
        },
        retrieval: RetrievalConfig::default(),
        embedding: EmbeddingConfig::default(),
        inference: InferenceConfig::default(),
        rooms: RoomsConfig::default(),
        server: ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        },
        ingest: IngestConfig {
            workers: 2,
            queue_depth: 16,
            enrichers: false,
        },
        agent: AgentConfig::default(),
    }
}

async fn start_service(dir: &tempfile::TempDir) -> (Arc<IngestService>, VectorStore) {
    let config = test_config(&dir.path().join("store.db"));
    let pool = parlance::store::connect(&config.store).await.unwrap();
    parlance::migrate::run_migrations(&pool).await.unwrap();
    let store = VectorStore::new(pool);

    let context = Arc::new(IngestContext {
        config,
        store: store.clone(),
        embedder: Arc::new(ByteSumEmbedder),
        chat: None,
    });
    (IngestService::start(context), store)
}

fn write_doc(dir: &Path, name: &str, text: &str) {
    let mut f = std::fs::File::create(dir.join(name)).unwrap();
    write!(f, "{}", text).unwrap();
}

async fn wait_terminal(service: &IngestService, id: &str) -> IngestStatus {
    for _ in 0..100 {
        match service.status(id) {
            Some(s @ (IngestStatus::Completed | IngestStatus::Failed)) => return s,
            Some(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            None => panic!("status entry disappeared for {}", id),
        }
    }
    panic!("job {} never reached a terminal state", id);
}

#[tokio::test]
async fn submit_reports_pending_before_work_starts() {
    let store_dir = tempfile::tempdir().unwrap();
    let docs = tempfile::tempdir().unwrap();
    write_doc(docs.path(), "a.txt", "A sentence of text.");
    let (service, _store) = start_service(&store_dir).await;

    let id = service
        .submit(
            "u1",
            "p1",
            "demo",
            docs.path().to_path_buf(),
            vec!["a.txt".to_string()],
            false,
        )
        .unwrap();

    // No await since submit, so the worker task cannot have started.
    let status = service.status(&id).unwrap();
    assert!(matches!(
        status,
        IngestStatus::Pending | IngestStatus::Processing
    ));

    assert_eq!(wait_terminal(&service, &id).await, IngestStatus::Completed);
}

#[tokio::test]
async fn all_blank_names_fail_without_store_write() {
    let store_dir = tempfile::tempdir().unwrap();
    let (service, store) = start_service(&store_dir).await;

    let id = service
        .submit(
            "u1",
            "p1",
            "demo",
            std::env::temp_dir(),
            vec!["".to_string(), "   ".to_string()],
            false,
        )
        .unwrap();

    assert_eq!(wait_terminal(&service, &id).await, IngestStatus::Failed);
    assert!(!store.collection_exists("u1").await.unwrap());
}

#[tokio::test]
async fn empty_document_list_is_rejected_at_submit() {
    let store_dir = tempfile::tempdir().unwrap();
    let (service, _store) = start_service(&store_dir).await;

    let err = service
        .submit("u1", "p1", "demo", std::env::temp_dir(), vec![], false)
        .unwrap_err();
    assert_eq!(err, SubmitError::EmptyDocumentList);
}

#[tokio::test]
async fn unknown_submission_id_is_distinct_from_failure() {
    let store_dir = tempfile::tempdir().unwrap();
    let (service, _store) = start_service(&store_dir).await;
    assert_eq!(service.status("no-such-id"), None);
}

#[tokio::test]
async fn missing_document_fails_the_job() {
    let store_dir = tempfile::tempdir().unwrap();
    let docs = tempfile::tempdir().unwrap();
    let (service, store) = start_service(&store_dir).await;

    let id = service
        .submit(
            "u1",
            "p1",
            "demo",
            docs.path().to_path_buf(),
            vec!["ghost.txt".to_string()],
            false,
        )
        .unwrap();

    assert_eq!(wait_terminal(&service, &id).await, IngestStatus::Failed);
    assert!(!store.collection_exists("u1").await.unwrap());
}

#[tokio::test]
async fn project_filter_scopes_retrieval() {
    let store_dir = tempfile::tempdir().unwrap();
    let docs = tempfile::tempdir().unwrap();
    write_doc(docs.path(), "one.txt", "Notes about the first project.");
    write_doc(docs.path(), "two.txt", "Notes about the second project.");
    let (service, store) = start_service(&store_dir).await;

    let first = service
        .submit(
            "u1",
            "P1",
            "first",
            docs.path().to_path_buf(),
            vec!["one.txt".to_string()],
            false,
        )
        .unwrap();
    assert_eq!(wait_terminal(&service, &first).await, IngestStatus::Completed);

    let second = service
        .submit(
            "u1",
            "P2",
            "second",
            docs.path().to_path_buf(),
            vec!["two.txt".to_string()],
            false,
        )
        .unwrap();
    assert_eq!(
        wait_terminal(&service, &second).await,
        IngestStatus::Completed
    );

    let embedder = ByteSumEmbedder;
    let query = parlance::embedding::embed_query(&embedder, "project notes")
        .await
        .unwrap();
    let filter = MetadataFilter {
        project_id: Some("P1".to_string()),
        project_name: None,
    };
    let results = store.query("u1", &query, &filter, 10).await.unwrap();

    assert!(!results.is_empty());
    assert!(results.iter().all(|n| n.project_id == "P1"));
}

#[tokio::test]
async fn concurrent_ingests_append_to_one_collection() {
    let store_dir = tempfile::tempdir().unwrap();
    let docs = tempfile::tempdir().unwrap();
    write_doc(docs.path(), "alpha.txt", "Alpha document contents here.");
    write_doc(docs.path(), "beta.txt", "Beta document contents here.");
    let (service, store) = start_service(&store_dir).await;

    let a = service
        .submit(
            "u1",
            "PA",
            "alpha",
            docs.path().to_path_buf(),
            vec!["alpha.txt".to_string()],
            false,
        )
        .unwrap();
    let b = service
        .submit(
            "u1",
            "PB",
            "beta",
            docs.path().to_path_buf(),
            vec!["beta.txt".to_string()],
            false,
        )
        .unwrap();

    assert_eq!(wait_terminal(&service, &a).await, IngestStatus::Completed);
    assert_eq!(wait_terminal(&service, &b).await, IngestStatus::Completed);

    let embedder = ByteSumEmbedder;
    let query = parlance::embedding::embed_query(&embedder, "document contents")
        .await
        .unwrap();
    let results = store
        .query("u1", &query, &MetadataFilter::default(), 10)
        .await
        .unwrap();

    let projects: std::collections::HashSet<_> =
        results.iter().map(|n| n.project_id.as_str()).collect();
    assert!(projects.contains("PA"));
    assert!(projects.contains("PB"));
}

#[tokio::test]
async fn full_queue_rejects_submission_without_status_entry() {
    let store_dir = tempfile::tempdir().unwrap();
    let docs = tempfile::tempdir().unwrap();
    write_doc(docs.path(), "a.txt", "Some text.");

    // Single worker, queue depth 1. Under this test's current-thread runtime
    // the worker never runs between submits, so the queue fills immediately.
    let mut config = test_config(&store_dir.path().join("store.db"));
    config.ingest.workers = 1;
    config.ingest.queue_depth = 1;
    let pool = parlance::store::connect(&config.store).await.unwrap();
    parlance::migrate::run_migrations(&pool).await.unwrap();
    let context = Arc::new(IngestContext {
        config,
        store: VectorStore::new(pool),
        embedder: Arc::new(ByteSumEmbedder),
        chat: None,
    });
    let service = IngestService::start(context);

    let submit = || {
        service.submit(
            "u1",
            "p1",
            "demo",
            docs.path().to_path_buf(),
            vec!["a.txt".to_string()],
            false,
        )
    };

    let first = submit().unwrap();
    let rejected = submit().unwrap_err();
    assert_eq!(rejected, SubmitError::QueueFull);

    // The accepted job still completes.
    assert_eq!(wait_terminal(&service, &first).await, IngestStatus::Completed);
}
