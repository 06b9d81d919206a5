//! Qdrant REST implementation of the backend contract.
//!
//! Speaks the collections and points HTTP API: `PUT /collections/{c}`,
//! `PUT /collections/{c}/points?wait=true`, `POST
//! /collections/{c}/points/query`. Failure classification: connect errors,
//! timeouts and 408/429/5xx responses are transient; every other non-success
//! status is permanent. Anything the client cannot attribute stays
//! transient, matching the engine's retry policy.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{BackendError, Error, Result};

use super::{
    CollectionInfo, CollectionSpec, DataPoint, QuantizationSpec, ScoredPoint, SearchOptions,
    VectorBackend,
};

// ============================================================================
// Configuration
// ============================================================================

/// Connection settings for a Qdrant deployment.
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    /// Base URL, e.g. `http://localhost:6333`.
    pub url: String,
    /// Sent as the `api-key` header when set. Local deployments usually
    /// run without one.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl QdrantConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::config("qdrant url must not be empty"));
        }
        Ok(())
    }
}

// ============================================================================
// Client
// ============================================================================

/// HTTP client for a Qdrant-style REST backend.
#[derive(Debug, Clone)]
pub struct QdrantBackend {
    client: reqwest::Client,
    config: QdrantConfig,
}

/// Envelope every Qdrant response is wrapped in.
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    result: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireCollectionInfo {
    status: String,
    #[serde(default)]
    points_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WireQueryResult {
    points: Vec<WireScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct WireScoredPoint {
    id: u64,
    score: f32,
}

impl QdrantBackend {
    pub fn new(config: QdrantConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, self.endpoint(path));
        if let Some(api_key) = &self.config.api_key {
            builder = builder.header("api-key", api_key);
        }
        builder
    }

    /// Send a request, classify failures, unwrap the response envelope.
    async fn send(&self, builder: reqwest::RequestBuilder, op: &str) -> Result<Value, BackendError> {
        let response = builder
            .send()
            .await
            .map_err(|e| classify_transport(op, &e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::transient(format!("{}: failed to read body: {}", op, e)))?;

        if !status.is_success() {
            return Err(classify_http(op, status, &body));
        }

        let envelope: ApiEnvelope = serde_json::from_str(&body).map_err(|e| {
            BackendError::transient(format!("{}: malformed response: {}", op, e))
        })?;
        Ok(envelope.result.unwrap_or(Value::Null))
    }
}

fn classify_transport(op: &str, error: &reqwest::Error) -> BackendError {
    let detail = if error.is_timeout() {
        "request timed out"
    } else if error.is_connect() {
        "connection failed"
    } else {
        "transport error"
    };
    BackendError::transient(format!("{}: {}: {}", op, detail, error))
}

fn classify_http(op: &str, status: StatusCode, body: &str) -> BackendError {
    let detail = error_detail(body);
    let message = format!("{}: HTTP {}: {}", op, status.as_u16(), detail);
    let transient = status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error();
    if transient {
        BackendError::transient(message)
    } else {
        BackendError::permanent(message)
    }
}

/// Pull the error string out of a Qdrant error body, falling back to the
/// raw text.
fn error_detail(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(detail) = value
            .get("status")
            .and_then(|s| s.get("error"))
            .and_then(|e| e.as_str())
        {
            return detail.to_string();
        }
    }
    let mut detail = body.trim().to_string();
    if detail.len() > 200 {
        detail.truncate(200);
    }
    detail
}

// ============================================================================
// Wire bodies
// ============================================================================

fn quantization_body(spec: &QuantizationSpec) -> Value {
    match spec {
        QuantizationSpec::Scalar {
            quantile,
            always_ram,
        } => json!({
            "scalar": {
                "type": "int8",
                "quantile": quantile,
                "always_ram": always_ram,
            }
        }),
        QuantizationSpec::Binary {
            encoding,
            always_ram,
        } => json!({
            "binary": {
                "always_ram": always_ram,
                "encoding": encoding,
            }
        }),
    }
}

fn collection_body(spec: &CollectionSpec) -> Value {
    let vector_params = json!({
        "size": spec.vector_size,
        "distance": spec.distance.as_str(),
        "on_disk": spec.on_disk,
    });
    let vectors = match &spec.vector_name {
        Some(name) => {
            let mut named = serde_json::Map::new();
            named.insert(name.clone(), vector_params);
            Value::Object(named)
        }
        None => vector_params,
    };
    let mut body = json!({ "vectors": vectors });
    if let Some(quantization) = &spec.quantization {
        body["quantization_config"] = quantization_body(quantization);
    }
    body
}

fn point_body(point: &DataPoint, vector_name: Option<&str>) -> Value {
    let vector = match vector_name {
        Some(name) => {
            let mut named = serde_json::Map::new();
            named.insert(name.to_string(), json!(point.vector));
            Value::Object(named)
        }
        None => json!(point.vector),
    };
    json!({
        "id": point.id,
        "vector": vector,
        "payload": point.payload,
    })
}

fn query_body(vector: &[f32], limit: usize, options: &SearchOptions) -> Value {
    let mut body = json!({
        "query": vector,
        "limit": limit,
        "with_payload": false,
    });
    if let Some(name) = &options.vector_name {
        body["using"] = json!(name);
    }
    if options.has_quantization_params() {
        let mut quantization = serde_json::Map::new();
        if let Some(rescore) = options.rescore {
            quantization.insert("rescore".to_string(), json!(rescore));
        }
        if let Some(oversampling) = options.oversampling {
            quantization.insert("oversampling".to_string(), json!(oversampling));
        }
        body["params"] = json!({ "quantization": Value::Object(quantization) });
    }
    body
}

// ============================================================================
// Contract implementation
// ============================================================================

#[async_trait]
impl VectorBackend for QdrantBackend {
    async fn create_collection(
        &self,
        name: &str,
        spec: &CollectionSpec,
    ) -> Result<(), BackendError> {
        tracing::debug!(collection = name, "creating collection");
        let builder = self
            .request(reqwest::Method::PUT, &format!("collections/{}", name))
            .json(&collection_body(spec));
        self.send(builder, "create_collection").await?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), BackendError> {
        tracing::debug!(collection = name, "deleting collection");
        let builder = self.request(reqwest::Method::DELETE, &format!("collections/{}", name));
        self.send(builder, "delete_collection").await?;
        Ok(())
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, BackendError> {
        let builder = self.request(reqwest::Method::GET, &format!("collections/{}", name));
        let result = self.send(builder, "collection_info").await?;
        let info: WireCollectionInfo = serde_json::from_value(result).map_err(|e| {
            BackendError::transient(format!("collection_info: malformed result: {}", e))
        })?;
        Ok(CollectionInfo {
            name: name.to_string(),
            points_count: info.points_count.unwrap_or(0),
            status: info.status,
        })
    }

    async fn upsert(
        &self,
        collection: &str,
        points: &[DataPoint],
        vector_name: Option<&str>,
    ) -> Result<(), BackendError> {
        let body = json!({
            "points": points
                .iter()
                .map(|p| point_body(p, vector_name))
                .collect::<Vec<_>>(),
        });
        let builder = self
            .request(
                reqwest::Method::PUT,
                &format!("collections/{}/points?wait=true", collection),
            )
            .json(&body);
        self.send(builder, "upsert").await?;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        options: &SearchOptions,
    ) -> Result<Vec<ScoredPoint>, BackendError> {
        let builder = self
            .request(
                reqwest::Method::POST,
                &format!("collections/{}/points/query", collection),
            )
            .json(&query_body(vector, limit, options));
        let result = self.send(builder, "search").await?;
        let parsed: WireQueryResult = serde_json::from_value(result)
            .map_err(|e| BackendError::transient(format!("search: malformed result: {}", e)))?;
        Ok(parsed
            .points
            .into_iter()
            .map(|p| ScoredPoint {
                id: p.id,
                score: p.score,
            })
            .collect())
    }
}
