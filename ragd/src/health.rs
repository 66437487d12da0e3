//! Component health checks.
//!
//! Each store and the embedding provider gets a lightweight probe. Used by
//! `ragd health-check` and anything that wants a quick read on whether the
//! pipeline can actually serve requests before attempting real work.

use std::time::Instant;

use serde::Serialize;

use ragd_core::store::{KeywordStore, MetadataStore, VectorStore};

use ragd_core::embedding::EmbeddingProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub component: String,
    pub status: HealthStatus,
    pub message: String,
    pub latency_ms: u64,
}

async fn probe<F, Fut>(component: &str, f: F) -> ComponentHealth
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<String>>,
{
    let start = Instant::now();
    match f().await {
        Ok(message) => ComponentHealth {
            component: component.to_string(),
            status: HealthStatus::Healthy,
            message,
            latency_ms: start.elapsed().as_millis() as u64,
        },
        Err(e) => ComponentHealth {
            component: component.to_string(),
            status: HealthStatus::Unhealthy,
            message: e.to_string(),
            latency_ms: start.elapsed().as_millis() as u64,
        },
    }
}

pub async fn health_check(
    metadata: &dyn MetadataStore,
    vectors: &dyn VectorStore,
    keyword: &dyn KeywordStore,
    embedder: &dyn EmbeddingProvider,
) -> Vec<ComponentHealth> {
    let mut checks = Vec::new();

    checks.push(
        probe("metadata_store", || async {
            let n = metadata.count().await?;
            Ok(format!("{n} documents"))
        })
        .await,
    );

    checks.push(
        probe("vector_store", || async {
            let n = vectors.count().await?;
            Ok(format!("{n} vectors, dimension {}", vectors.dimension()))
        })
        .await,
    );

    checks.push(
        probe("keyword_store", || async {
            let n = keyword.count().await?;
            Ok(format!("{n} chunks indexed"))
        })
        .await,
    );

    let embedding_check = if embedder.dims() == 0 {
        ComponentHealth {
            component: "embedding_provider".to_string(),
            status: HealthStatus::Degraded,
            message: "embedding disabled, semantic search unavailable".to_string(),
            latency_ms: 0,
        }
    } else {
        probe("embedding_provider", || async {
            embedder.embed_one("health check").await?;
            Ok(format!("model {} responding", embedder.model_name()))
        })
        .await
    };
    checks.push(embedding_check);

    checks
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragd_core::store::memory::{InMemoryKeywordStore, InMemoryMetadataStore, InMemoryVectorStore};

    #[tokio::test]
    async fn healthy_stores_report_healthy() {
        let metadata = InMemoryMetadataStore::new();
        let vectors = InMemoryVectorStore::new(4);
        let keyword = InMemoryKeywordStore::new();
        let embedder = crate::embedding::DisabledProvider;

        let checks = health_check(&metadata, &vectors, &keyword, &embedder).await;
        assert_eq!(checks.len(), 4);
        assert!(checks.iter().take(3).all(|c| c.status == HealthStatus::Healthy));
        let embedding = checks.iter().find(|c| c.component == "embedding_provider").unwrap();
        assert_eq!(embedding.status, HealthStatus::Degraded);
    }
}
