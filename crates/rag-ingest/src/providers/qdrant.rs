//! Qdrant REST client

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::VectorStoreConfig;
use crate::error::{Error, Result};
use crate::types::VectorPoint;

use super::retry::{check_status, classify_send_error, RequestError, RetryPolicy};
use super::vector_store::{ScrollPage, ScrolledPoint, VectorStoreProvider};

#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ScrollResult {
    points: Vec<RawPoint>,
    next_page_offset: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawPoint {
    id: Value,
    #[serde(default)]
    payload: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: usize,
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    config: CollectionConfig,
}

#[derive(Debug, Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Debug, Deserialize)]
struct CollectionParams {
    vectors: Value,
}

/// Vector store backed by a Qdrant collection
pub struct QdrantStore {
    client: Client,
    base_url: String,
    collection: String,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl QdrantStore {
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            api_key: config.api_key.clone(),
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, suffix)
    }

    fn with_key(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn send_json<T: serde::de::DeserializeOwned + Send>(
        &self,
        what: &str,
        method: reqwest::Method,
        url: &str,
        body: &Value,
    ) -> Result<T> {
        self.retry
            .run(what, || async {
                let response = self
                    .with_key(self.client.request(method.clone(), url))
                    .json(body)
                    .send()
                    .await
                    .map_err(classify_send_error)?;
                let response = check_status(response, Error::VectorDb).await?;
                response
                    .json::<QdrantResponse<T>>()
                    .await
                    .map(|r| r.result)
                    .map_err(|e| {
                        RequestError::Permanent(Error::vector_db(format!("Invalid response: {}", e)))
                    })
            })
            .await
    }

    /// Vector size of an existing collection, `None` if it does not exist
    async fn collection_dimensions(&self) -> Result<Option<usize>> {
        let response = self
            .with_key(self.client.get(self.url("")))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::vector_db(format!(
                "Failed to inspect collection '{}': HTTP {}",
                self.collection,
                response.status()
            )));
        }

        let info: QdrantResponse<CollectionInfo> = response.json().await?;
        Ok(vector_size(&info.result.config.params.vectors))
    }
}

/// Size of the unnamed vector, or of the first named vector
fn vector_size(vectors: &Value) -> Option<usize> {
    if let Some(size) = vectors.get("size").and_then(Value::as_u64) {
        return Some(size as usize);
    }
    vectors
        .as_object()?
        .values()
        .find_map(|v| v.get("size").and_then(Value::as_u64))
        .map(|size| size as usize)
}

fn id_to_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn point_json(point: &VectorPoint) -> Value {
    json!({
        "id": point.id,
        "vector": point.vector,
        "payload": point.payload,
    })
}

/// Filter matching every point whose payload `source` equals `source`
fn source_filter(source: &str) -> Value {
    json!({ "must": [{ "key": "source", "match": { "value": source } }] })
}

#[async_trait]
impl VectorStoreProvider for QdrantStore {
    async fn upsert(&self, points: &[VectorPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let body = json!({ "points": points.iter().map(point_json).collect::<Vec<_>>() });
        let _: Value = self
            .send_json("Qdrant upsert", reqwest::Method::PUT, &self.url("/points?wait=true"), &body)
            .await?;
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let body = json!({ "points": ids });
        let _: Value = self
            .send_json(
                "Qdrant delete",
                reqwest::Method::POST,
                &self.url("/points/delete?wait=true"),
                &body,
            )
            .await?;
        Ok(())
    }

    async fn delete_source(&self, source: &str) -> Result<()> {
        let body = json!({ "filter": source_filter(source) });
        let _: Value = self
            .send_json(
                "Qdrant delete by source",
                reqwest::Method::POST,
                &self.url("/points/delete?wait=true"),
                &body,
            )
            .await?;
        Ok(())
    }

    async fn scroll(&self, cursor: Option<String>, limit: usize) -> Result<ScrollPage> {
        let mut body = json!({
            "limit": limit,
            "with_payload": true,
            "with_vector": false,
        });
        if let Some(cursor) = cursor {
            body["offset"] = Value::String(cursor);
        }

        let result: ScrollResult = self
            .send_json("Qdrant scroll", reqwest::Method::POST, &self.url("/points/scroll"), &body)
            .await?;

        Ok(ScrollPage {
            points: result
                .points
                .into_iter()
                .map(|p| ScrolledPoint {
                    id: id_to_string(&p.id),
                    payload: p.payload.unwrap_or(Value::Null),
                })
                .collect(),
            next_cursor: result.next_page_offset.as_ref().filter(|v| !v.is_null()).map(id_to_string),
        })
    }

    async fn ensure_collection(&self, dimensions: usize) -> Result<()> {
        match self.collection_dimensions().await? {
            Some(existing) if existing == dimensions => {
                tracing::debug!("Collection '{}' exists ({} dims)", self.collection, existing);
                Ok(())
            }
            Some(existing) => Err(Error::config(format!(
                "Collection '{}' has {} dimensions, embeddings produce {}",
                self.collection, existing, dimensions
            ))),
            None => {
                tracing::info!("Creating collection '{}' ({} dims)", self.collection, dimensions);
                let body = json!({ "vectors": { "size": dimensions, "distance": "Cosine" } });
                let _: Value = self
                    .send_json("Qdrant create collection", reqwest::Method::PUT, &self.url(""), &body)
                    .await?;
                Ok(())
            }
        }
    }

    async fn len(&self) -> Result<usize> {
        let body = json!({ "exact": true });
        let result: CountResult = self
            .send_json("Qdrant count", reqwest::Method::POST, &self.url("/points/count"), &body)
            .await?;
        Ok(result.count)
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/readyz", self.base_url);
        match self.with_key(self.client.get(&url)).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}
