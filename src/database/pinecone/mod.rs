// Pinecone serverless index over its REST data plane

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ScoredMatch, VectorMetadata, VectorRecord, VectorStore, rank_matches};
use crate::config::Config;
use crate::providers::{ApiClient, ProviderError};
use crate::{RagError, Result};

const PROVIDER: &str = "Pinecone";
const PERMISSION_HELP: &str = "Check that PINECONE_API_KEY is valid for the project that owns the index.
https://docs.pinecone.io/guides/projects/manage-api-keys";

/// Pinecone index addressed through its data-plane host
#[derive(Debug, Clone)]
pub struct PineconeStore {
    host: String,
    api_key: String,
    api_version: String,
    batch_size: usize,
    client: ApiClient,
}

#[derive(Debug, Serialize)]
struct UpsertRequest {
    vectors: Vec<VectorRecord>,
    namespace: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    namespace: String,
    vector: Vec<f32>,
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest {
    delete_all: bool,
    namespace: String,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    #[serde(default)]
    namespaces: HashMap<String, NamespaceStats>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceStats {
    #[serde(default)]
    vector_count: u64,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    host: String,
}

impl PineconeStore {
    /// Build a store for the configured index, resolving its host when it is
    /// not configured
    #[inline]
    pub async fn connect(config: &Config) -> Result<Self> {
        let api_key = config
            .secrets
            .pinecone_api_key
            .clone()
            .ok_or_else(|| RagError::Config("PINECONE_API_KEY is not set".to_string()))?;
        let settings = &config.vector_store;

        let mut store = Self {
            host: String::new(),
            api_key,
            api_version: settings.api_version.clone(),
            batch_size: settings.upsert_batch_size.max(1),
            client: ApiClient::new(PROVIDER, Duration::from_secs(settings.timeout_seconds))
                .with_permission_help(PERMISSION_HELP),
        };

        let host = match &settings.index_host {
            Some(host) => host.clone(),
            None => {
                let name = settings.index_name.as_deref().ok_or_else(|| {
                    RagError::Config("PINECONE_INDEX_NAME is not set".to_string())
                })?;
                store
                    .resolve_host(&settings.control_plane_url, name)
                    .await?
            }
        };
        store.host = normalize_host(&host);
        info!("Pinecone index host: {}", store.host);

        Ok(store)
    }

    #[inline]
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.client = self.client.with_backoff_unit(unit);
        self
    }

    #[inline]
    pub fn host(&self) -> &str {
        &self.host
    }

    async fn resolve_host(&self, control_plane_url: &str, index_name: &str) -> Result<String> {
        let url = format!(
            "{}/indexes/{}",
            control_plane_url.trim_end_matches('/'),
            index_name
        );
        debug!("Resolving Pinecone index host via {}", url);

        let client = self.client.clone();
        let headers = self.owned_headers();
        let description: IndexDescription = tokio::task::spawn_blocking(move || {
            client.get_json(&url, &borrow_headers(&headers))
        })
        .await
        .map_err(|e| RagError::VectorStore(format!("Pinecone request task failed: {}", e)))??;

        Ok(description.host)
    }

    async fn post<T, R>(&self, path: &str, body: T) -> std::result::Result<R, ProviderError>
    where
        T: Serialize + Send + 'static,
        R: DeserializeOwned + Send + 'static,
    {
        let url = format!("{}{}", self.host, path);
        let client = self.client.clone();
        let headers = self.owned_headers();

        tokio::task::spawn_blocking(move || client.post_json(&url, &borrow_headers(&headers), &body))
            .await
            .map_err(|e| ProviderError::Transport {
                provider: PROVIDER,
                message: format!("request task failed: {}", e),
            })?
    }

    fn owned_headers(&self) -> [(&'static str, String); 2] {
        [
            ("Api-Key", self.api_key.clone()),
            ("X-Pinecone-API-Version", self.api_version.clone()),
        ]
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    #[inline]
    fn name(&self) -> &'static str {
        PROVIDER
    }

    #[inline]
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<usize> {
        let mut upserted = 0;

        for batch in records.chunks(self.batch_size) {
            let request = UpsertRequest {
                vectors: batch.to_vec(),
                namespace: namespace.to_string(),
            };
            let response: UpsertResponse = self.post("/vectors/upsert", request).await?;
            upserted += response.upserted_count;
            debug!(
                "Upserted batch of {} vectors into namespace {}",
                response.upserted_count, namespace
            );
        }

        info!("Upserted {} vectors into namespace {}", upserted, namespace);
        Ok(upserted)
    }

    #[inline]
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>> {
        let request = QueryRequest {
            namespace: namespace.to_string(),
            vector: vector.to_vec(),
            top_k,
            include_metadata: true,
            include_values: false,
        };
        let response: QueryResponse = self.post("/query", request).await?;

        let matches = response
            .matches
            .into_iter()
            .map(|m| ScoredMatch {
                metadata: m.metadata.and_then(parse_metadata),
                id: m.id,
                score: m.score,
            })
            .collect();

        Ok(rank_matches(matches, top_k))
    }

    #[inline]
    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        let request = DeleteRequest {
            delete_all: true,
            namespace: namespace.to_string(),
        };

        match self
            .post::<_, serde_json::Value>("/vectors/delete", request)
            .await
        {
            Ok(_) => {
                info!("Deleted all vectors in namespace {}", namespace);
                Ok(())
            }
            Err(ProviderError::Status { status: 404, .. }) => {
                warn!("Namespace {} does not exist, nothing to delete", namespace);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    #[inline]
    async fn count(&self, namespace: &str) -> Result<u64> {
        let stats: StatsResponse = self
            .post("/describe_index_stats", serde_json::json!({}))
            .await?;

        Ok(stats
            .namespaces
            .get(namespace)
            .map_or(0, |ns| ns.vector_count))
    }
}

/// Data-plane hosts are reported without a scheme
fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

fn borrow_headers<'a>(headers: &'a [(&'static str, String); 2]) -> [(&'static str, &'a str); 2] {
    [
        (headers[0].0, headers[0].1.as_str()),
        (headers[1].0, headers[1].1.as_str()),
    ]
}

fn parse_metadata(value: serde_json::Value) -> Option<VectorMetadata> {
    match serde_json::from_value(value) {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            debug!("Ignoring match metadata in an unexpected shape: {}", e);
            None
        }
    }
}
