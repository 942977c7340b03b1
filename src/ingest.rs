//! Ingestion job lifecycle: submission, bounded queuing, and a fixed worker
//! pool.
//!
//! # Lifecycle
//!
//! ```text
//! submit ──> PENDING ──> PROCESSING ──> COMPLETED
//!                             │
//!                             └───────> FAILED
//! ```
//!
//! Terminal states are absorbing; workers never write PENDING back. The
//! status map lives in process memory under a mutex, so a restart forgets
//! in-flight and historical jobs. Callers learn a submission id from the
//! accepted response and poll status with it.
//!
//! # Backpressure
//!
//! Jobs flow through a bounded channel drained by `ingest.workers` tasks.
//! When the queue is full, submission fails and no status entry survives, so
//! the caller sees the rejection instead of a job that never runs.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::inference::ChatClient;
use crate::loader;
use crate::pipeline::IngestionPipeline;
use crate::store::VectorStore;

/// Lifecycle state of one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IngestStatus::Pending => "pending",
            IngestStatus::Processing => "processing",
            IngestStatus::Completed => "completed",
            IngestStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why a submission was rejected before any work ran. Rejections are typed
/// so callers can tell a bad request from a saturated or dead service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// The request named no documents at all.
    EmptyDocumentList,
    /// The bounded job queue is at capacity.
    QueueFull,
    /// The worker pool has shut down and can take no more jobs.
    WorkersUnavailable,
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            SubmitError::EmptyDocumentList => "No document names provided",
            SubmitError::QueueFull => "Ingestion queue is full",
            SubmitError::WorkersUnavailable => "Ingestion workers have shut down",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for SubmitError {}

/// One unit of ingestion work.
#[derive(Debug, Clone)]
pub struct IngestJob {
    pub submission_id: String,
    pub user_id: String,
    pub project_id: String,
    pub project_name: String,
    pub document_dir: PathBuf,
    pub document_names: Vec<String>,
    pub overwrite: bool,
}

/// Shared collaborators every worker needs to run a job.
pub struct IngestContext {
    pub config: Config,
    pub store: VectorStore,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub chat: Option<Arc<ChatClient>>,
}

type StatusMap = Arc<Mutex<HashMap<String, IngestStatus>>>;

/// Accepts submissions, tracks their status, and owns the worker pool.
pub struct IngestService {
    statuses: StatusMap,
    tx: mpsc::Sender<IngestJob>,
}

impl IngestService {
    /// Spawn the worker pool and return the service handle. Workers share
    /// one receiver behind an async mutex so each job is taken exactly once.
    pub fn start(context: Arc<IngestContext>) -> Arc<Self> {
        let workers = context.config.ingest.workers;
        let queue_depth = context.config.ingest.queue_depth;
        let (tx, rx) = mpsc::channel::<IngestJob>(queue_depth);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let statuses: StatusMap = Arc::new(Mutex::new(HashMap::new()));

        for worker_id in 0..workers {
            let rx = Arc::clone(&rx);
            let statuses = Arc::clone(&statuses);
            let context = Arc::clone(&context);
            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    let Some(job) = job else {
                        break;
                    };
                    process_job(worker_id, job, &statuses, &context).await;
                }
            });
        }

        Arc::new(Self { statuses, tx })
    }

    /// Queue a job and return its submission id. Fails on an empty document
    /// list or a full queue; a rejected submission leaves no status behind.
    pub fn submit(
        &self,
        user_id: &str,
        project_id: &str,
        project_name: &str,
        document_dir: PathBuf,
        document_names: Vec<String>,
        overwrite: bool,
    ) -> Result<String, SubmitError> {
        if document_names.is_empty() {
            return Err(SubmitError::EmptyDocumentList);
        }

        let submission_id = Uuid::new_v4().to_string();
        let job = IngestJob {
            submission_id: submission_id.clone(),
            user_id: user_id.to_string(),
            project_id: project_id.to_string(),
            project_name: project_name.to_string(),
            document_dir,
            document_names,
            overwrite,
        };

        self.set_status(&submission_id, IngestStatus::Pending);

        if let Err(e) = self.tx.try_send(job) {
            self.remove_status(&submission_id);
            return Err(match e {
                mpsc::error::TrySendError::Full(_) => SubmitError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => SubmitError::WorkersUnavailable,
            });
        }

        tracing::info!(%submission_id, user_id, "ingestion job queued");
        Ok(submission_id)
    }

    /// Look up a submission's status. Unknown ids return `None`; the HTTP
    /// layer maps that to 404 rather than reporting a phantom failure.
    pub fn status(&self, submission_id: &str) -> Option<IngestStatus> {
        self.statuses
            .lock()
            .ok()
            .and_then(|map| map.get(submission_id).copied())
    }

    fn set_status(&self, submission_id: &str, status: IngestStatus) {
        if let Ok(mut map) = self.statuses.lock() {
            map.insert(submission_id.to_string(), status);
        }
    }

    fn remove_status(&self, submission_id: &str) {
        if let Ok(mut map) = self.statuses.lock() {
            map.remove(submission_id);
        }
    }
}

async fn process_job(
    worker_id: usize,
    job: IngestJob,
    statuses: &StatusMap,
    context: &IngestContext,
) {
    let submission_id = job.submission_id.clone();
    set_status(statuses, &submission_id, IngestStatus::Processing);
    tracing::info!(worker_id, %submission_id, "processing ingestion job");

    match run_job(&job, context).await {
        Ok(nodes) => {
            set_status(statuses, &submission_id, IngestStatus::Completed);
            tracing::info!(worker_id, %submission_id, nodes, "ingestion job completed");
        }
        Err(e) => {
            set_status(statuses, &submission_id, IngestStatus::Failed);
            tracing::error!(worker_id, %submission_id, error = %e, "ingestion job failed");
        }
    }
}

fn set_status(statuses: &StatusMap, submission_id: &str, status: IngestStatus) {
    if let Ok(mut map) = statuses.lock() {
        map.insert(submission_id.to_string(), status);
    }
}

/// Load, chunk, enrich, embed, and persist one submission. Returns the node
/// count written.
async fn run_job(job: &IngestJob, context: &IngestContext) -> Result<usize> {
    let names: Vec<String> = job
        .document_names
        .iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();
    if names.is_empty() {
        bail!("All document names were blank");
    }

    let documents =
        loader::load_documents(&job.document_dir, &names).context("Failed to load documents")?;

    let pipeline = IngestionPipeline::build(
        &context.config.chunking,
        context.chat.clone(),
        context.config.ingest.enrichers,
    );
    let nodes = pipeline
        .run(&documents, &job.project_id, &job.project_name)
        .await?;
    if nodes.is_empty() {
        bail!("Pipeline produced no nodes; documents had no extractable text");
    }

    let texts: Vec<String> = nodes.iter().map(|n| n.text.clone()).collect();
    let mut embeddings = Vec::with_capacity(texts.len());
    for batch in texts.chunks(context.config.embedding.batch_size) {
        embeddings.extend(context.embedder.embed(batch).await?);
    }

    context
        .store
        .write_nodes(
            &job.user_id,
            &nodes,
            &embeddings,
            context.embedder.model_name(),
            context.embedder.dims(),
            job.overwrite,
        )
        .await?;

    Ok(nodes.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&IngestStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        assert_eq!(IngestStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn status_roundtrips() {
        let status: IngestStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(status, IngestStatus::Completed);
    }
}
