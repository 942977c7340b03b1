//! SQLite-backed vector store, partitioned by user.
//!
//! Each user owns one collection, named `embedding_store_<user_id>`. Nodes and
//! their embeddings live in the `nodes` and `node_vectors` tables keyed by
//! collection. Similarity search fetches the collection's vectors and ranks
//! them by cosine similarity in process, which is fine at the collection sizes
//! this system targets.

use anyhow::{bail, Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::config::StoreConfig;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{DocumentNode, RetrievedNode};

const COLLECTION_PREFIX: &str = "embedding_store_";

/// Open a pool against the configured database file, creating the file and
/// its parent directory on first use. WAL keeps readers unblocked while an
/// ingestion worker writes.
pub async fn connect(store: &StoreConfig) -> Result<SqlitePool> {
    if let Some(parent) = store.path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(&store.path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open store at {}", store.path.display()))?;
    Ok(pool)
}

/// Derive the collection name that owns a user's embeddings.
pub fn collection_name(user_id: &str) -> String {
    format!("{}{}", COLLECTION_PREFIX, user_id)
}

/// Optional metadata constraints applied to a similarity query. `None` fields
/// match everything.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    pub project_id: Option<String>,
    pub project_name: Option<String>,
}

impl MetadataFilter {
    fn matches(&self, project_id: &str, project_name: &str) -> bool {
        if let Some(want) = &self.project_id {
            if want != project_id {
                return false;
            }
        }
        if let Some(want) = &self.project_name {
            if want != project_name {
                return false;
            }
        }
        true
    }
}

/// Handle over the collections, nodes, and node_vectors tables.
#[derive(Clone)]
pub struct VectorStore {
    pool: SqlitePool,
}

impl VectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn collection_exists(&self, user_id: &str) -> Result<bool> {
        let name = collection_name(user_id);
        let row = sqlx::query("SELECT 1 FROM collections WHERE name = ?")
            .bind(&name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Persist nodes and their embeddings in one transaction. Creates the
    /// collection if needed; `overwrite` clears it first.
    pub async fn write_nodes(
        &self,
        user_id: &str,
        nodes: &[DocumentNode],
        embeddings: &[Vec<f32>],
        model: &str,
        dims: usize,
        overwrite: bool,
    ) -> Result<()> {
        if nodes.len() != embeddings.len() {
            bail!(
                "Node/embedding count mismatch: {} nodes, {} embeddings",
                nodes.len(),
                embeddings.len()
            );
        }

        let name = collection_name(user_id);
        let mut tx = self.pool.begin().await?;

        if overwrite {
            sqlx::query("DELETE FROM node_vectors WHERE collection = ?")
                .bind(&name)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM nodes WHERE collection = ?")
                .bind(&name)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "INSERT INTO collections (name, user_id, created_at) VALUES (?, ?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(&name)
        .bind(user_id)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for (node, embedding) in nodes.iter().zip(embeddings.iter()) {
            let metadata_json = serde_json::to_string(&node.metadata)
                .context("Failed to serialize node metadata")?;

            sqlx::query(
                "INSERT OR REPLACE INTO nodes
                 (id, collection, doc_name, chunk_index, text, project_id, project_name, metadata_json, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&node.id)
            .bind(&name)
            .bind(&node.doc_name)
            .bind(node.chunk_index)
            .bind(&node.text)
            .bind(&node.project_id)
            .bind(&node.project_name)
            .bind(&metadata_json)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT OR REPLACE INTO node_vectors (node_id, collection, model, dims, embedding)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&node.id)
            .bind(&name)
            .bind(model)
            .bind(dims as i64)
            .bind(vec_to_blob(embedding))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Similarity search over a user's collection. Errors if the collection
    /// has never been created; querying is never allowed to provision storage.
    pub async fn query(
        &self,
        user_id: &str,
        query_vec: &[f32],
        filter: &MetadataFilter,
        top_k: usize,
    ) -> Result<Vec<RetrievedNode>> {
        let name = collection_name(user_id);

        if !self.collection_exists(user_id).await? {
            bail!("Collection does not exist for user: {}", user_id);
        }

        let rows = sqlx::query(
            "SELECT n.id, n.doc_name, n.chunk_index, n.text,
                    n.project_id, n.project_name, n.metadata_json, v.embedding
             FROM nodes n
             JOIN node_vectors v ON v.node_id = n.id
             WHERE n.collection = ?",
        )
        .bind(&name)
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<RetrievedNode> = Vec::new();
        for row in rows {
            let project_id: String = row.get("project_id");
            let project_name: String = row.get("project_name");
            if !filter.matches(&project_id, &project_name) {
                continue;
            }

            let blob: Vec<u8> = row.get("embedding");
            let vec = blob_to_vec(&blob);
            let score = cosine_similarity(query_vec, &vec) as f64;

            let metadata_json: String = row.get("metadata_json");
            let metadata = serde_json::from_str(&metadata_json).unwrap_or_default();

            scored.push(RetrievedNode {
                id: row.get("id"),
                doc_name: row.get("doc_name"),
                chunk_index: row.get("chunk_index"),
                text: row.get("text"),
                project_id,
                project_name,
                metadata,
                score,
            });
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use std::collections::BTreeMap;

    async fn test_store() -> (VectorStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            path: dir.path().join("test.db"),
        };
        let pool = connect(&config).await.unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        (VectorStore::new(pool), dir)
    }

    fn node(id: &str, text: &str, project_id: &str, project_name: &str) -> DocumentNode {
        DocumentNode {
            id: id.to_string(),
            doc_name: "doc.txt".to_string(),
            chunk_index: 0,
            text: text.to_string(),
            project_id: project_id.to_string(),
            project_name: project_name.to_string(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn query_unknown_collection_errors() {
        let (store, _dir) = test_store().await;
        let err = store
            .query("nobody", &[1.0, 0.0], &MetadataFilter::default(), 5)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn write_and_query_ranks_by_similarity() {
        let (store, _dir) = test_store().await;
        let nodes = vec![
            node("a", "first", "p1", "proj"),
            node("b", "second", "p1", "proj"),
        ];
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        store
            .write_nodes("u1", &nodes, &embeddings, "m", 2, false)
            .await
            .unwrap();

        let results = store
            .query("u1", &[0.1, 0.9], &MetadataFilter::default(), 5)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "b");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn metadata_filter_restricts_results() {
        let (store, _dir) = test_store().await;
        let nodes = vec![
            node("a", "alpha", "p1", "one"),
            node("b", "beta", "p2", "two"),
        ];
        let embeddings = vec![vec![1.0, 0.0], vec![1.0, 0.0]];
        store
            .write_nodes("u1", &nodes, &embeddings, "m", 2, false)
            .await
            .unwrap();

        let filter = MetadataFilter {
            project_id: Some("p2".to_string()),
            project_name: None,
        };
        let results = store.query("u1", &[1.0, 0.0], &filter, 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");
    }

    #[tokio::test]
    async fn collections_are_isolated_per_user() {
        let (store, _dir) = test_store().await;
        store
            .write_nodes("u1", &[node("a", "x", "p", "p")], &[vec![1.0]], "m", 1, false)
            .await
            .unwrap();
        store
            .write_nodes("u2", &[node("b", "y", "p", "p")], &[vec![1.0]], "m", 1, false)
            .await
            .unwrap();

        let results = store
            .query("u1", &[1.0], &MetadataFilter::default(), 5)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn overwrite_clears_previous_nodes() {
        let (store, _dir) = test_store().await;
        store
            .write_nodes("u1", &[node("old", "x", "p", "p")], &[vec![1.0]], "m", 1, false)
            .await
            .unwrap();
        store
            .write_nodes("u1", &[node("new", "y", "p", "p")], &[vec![1.0]], "m", 1, true)
            .await
            .unwrap();

        let results = store
            .query("u1", &[1.0], &MetadataFilter::default(), 5)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "new");
    }

    #[tokio::test]
    async fn mismatched_embedding_count_errors() {
        let (store, _dir) = test_store().await;
        let err = store
            .write_nodes("u1", &[node("a", "x", "p", "p")], &[], "m", 1, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("mismatch"));
    }

    #[test]
    fn collection_name_has_prefix() {
        assert_eq!(collection_name("alice"), "embedding_store_alice");
    }
}
