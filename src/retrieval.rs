//! Retrieval augmentation for chat contexts.
//!
//! Before each completion, the retriever embeds the latest user message,
//! pulls the most similar nodes from the user's collection, and folds them
//! into the system message so the model answers with the user's own
//! documents in scope.

use anyhow::Result;
use std::sync::Arc;

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::models::{ChatContext, ChatMessage, Role};
use crate::store::{MetadataFilter, VectorStore};

pub const CONTEXT_HEADER: &str = "Context that might help answer the user's question:";

pub struct Retriever {
    store: VectorStore,
    embedder: Arc<dyn EmbeddingProvider>,
    top_k: usize,
}

impl Retriever {
    pub fn new(store: VectorStore, embedder: Arc<dyn EmbeddingProvider>, top_k: usize) -> Self {
        Self {
            store,
            embedder,
            top_k,
        }
    }

    /// Augment the context in place with nodes relevant to the latest user
    /// message. Errors propagate to the caller, including a query against a
    /// user with no collection.
    pub async fn augment(
        &self,
        user_id: &str,
        filter: &MetadataFilter,
        context: &mut ChatContext,
    ) -> Result<usize> {
        let Some(query) = context.latest_user_text().map(str::to_string) else {
            return Ok(0);
        };

        let query_vec = embed_query(self.embedder.as_ref(), &query).await?;
        let nodes = self
            .store
            .query(user_id, &query_vec, filter, self.top_k)
            .await?;
        if nodes.is_empty() {
            return Ok(0);
        }

        let mut block = String::from(CONTEXT_HEADER);
        for node in &nodes {
            block.push_str("\n\n");
            block.push_str(&node.text);
        }

        match context.messages.iter_mut().find(|m| m.role == Role::System) {
            Some(system) => {
                system.content.push_str("\n\n");
                system.content.push_str(&block);
            }
            None => context.messages.insert(0, ChatMessage::system(block)),
        }

        Ok(nodes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::models::DocumentNode;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    /// Deterministic embedder: "apple"-ish texts map near [1, 0],
    /// everything else near [0, 1].
    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword-test"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("apple") {
                        vec![1.0, 0.1]
                    } else {
                        vec![0.1, 1.0]
                    }
                })
                .collect())
        }
    }

    async fn seeded_retriever() -> (Retriever, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            path: dir.path().join("test.db"),
        };
        let pool = crate::store::connect(&config).await.unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        let store = VectorStore::new(pool);

        let embedder = Arc::new(KeywordEmbedder);
        let nodes = vec![
            DocumentNode {
                id: "fruit".to_string(),
                doc_name: "fruit.txt".to_string(),
                chunk_index: 0,
                text: "apple orchards thrive in cool climates".to_string(),
                project_id: "p".to_string(),
                project_name: "p".to_string(),
                metadata: BTreeMap::new(),
            },
            DocumentNode {
                id: "other".to_string(),
                doc_name: "other.txt".to_string(),
                chunk_index: 0,
                text: "submarines operate at great depths".to_string(),
                project_id: "p".to_string(),
                project_name: "p".to_string(),
                metadata: BTreeMap::new(),
            },
        ];
        let texts: Vec<String> = nodes.iter().map(|n| n.text.clone()).collect();
        let embeddings = embedder.embed(&texts).await.unwrap();
        store
            .write_nodes("u1", &nodes, &embeddings, "keyword-test", 2, false)
            .await
            .unwrap();

        (Retriever::new(store, embedder, 1), dir)
    }

    #[tokio::test]
    async fn augment_appends_to_existing_system_message() {
        let (retriever, _dir) = seeded_retriever().await;
        let mut context = ChatContext::with_instructions("Be helpful.");
        context.push(ChatMessage::user("tell me about apple farming"));

        let count = retriever
            .augment("u1", &MetadataFilter::default(), &mut context)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let system = &context.messages[0];
        assert_eq!(system.role, Role::System);
        assert!(system.content.starts_with("Be helpful."));
        assert!(system.content.contains(CONTEXT_HEADER));
        assert!(system.content.contains("apple orchards"));
        assert!(!system.content.contains("submarines"));
    }

    #[tokio::test]
    async fn augment_inserts_system_message_when_missing() {
        let (retriever, _dir) = seeded_retriever().await;
        let mut context = ChatContext::default();
        context.push(ChatMessage::user("apple pie recipes"));

        retriever
            .augment("u1", &MetadataFilter::default(), &mut context)
            .await
            .unwrap();

        assert_eq!(context.messages[0].role, Role::System);
        assert!(context.messages[0].content.starts_with(CONTEXT_HEADER));
    }

    #[tokio::test]
    async fn augment_without_user_message_is_noop() {
        let (retriever, _dir) = seeded_retriever().await;
        let mut context = ChatContext::with_instructions("Be helpful.");

        let count = retriever
            .augment("u1", &MetadataFilter::default(), &mut context)
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(context.messages.len(), 1);
        assert!(!context.messages[0].content.contains(CONTEXT_HEADER));
    }

    #[tokio::test]
    async fn augment_unknown_user_propagates_error() {
        let (retriever, _dir) = seeded_retriever().await;
        let mut context = ChatContext::default();
        context.push(ChatMessage::user("apple"));

        let err = retriever
            .augment("ghost", &MetadataFilter::default(), &mut context)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
