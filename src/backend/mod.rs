//! Vector-search backend boundary.
//!
//! The engine talks to a backend only through [`VectorBackend`]: collection
//! lifecycle, point upsert, and parameterized search. Implementations
//! classify their failures as transient or permanent via
//! [`BackendError`](crate::error::BackendError); anything they cannot
//! classify is reported transient and the retry policy takes it from there.
//!
//! Two implementations ship:
//!
//! | Implementation | Use |
//! |----------------|-----|
//! | [`QdrantBackend`] | Qdrant REST API over HTTP |
//! | [`MemoryBackend`] | deterministic in-memory double for tests |

mod memory;
mod qdrant;

pub use memory::MemoryBackend;
pub use qdrant::{QdrantBackend, QdrantConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

// ============================================================================
// Boundary value objects
// ============================================================================

/// Free-form metadata attached to a point.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// A single point: stable id, embedding, free-form payload.
///
/// Ids are assigned from dataset position, so re-uploading the same dataset
/// overwrites the same ids (idempotent upsert).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub id: u64,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub payload: Payload,
}

impl DataPoint {
    pub fn new(id: u64, vector: Vec<f32>) -> Self {
        Self {
            id,
            vector,
            payload: Payload::new(),
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }
}

/// One search hit. Higher score means closer under the collection's metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: u64,
    pub score: f32,
}

/// Distance metric of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    Cosine,
    Dot,
    Euclid,
}

impl Distance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::Cosine => "Cosine",
            Distance::Dot => "Dot",
            Distance::Euclid => "Euclid",
        }
    }
}

/// Binary quantization encoding width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryEncoding {
    OneBit,
    TwoBits,
}

/// Backend-side compression of stored vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantizationSpec {
    /// int8 scalar quantization; `quantile` clips outliers before scaling.
    Scalar { quantile: f32, always_ram: bool },
    /// Binary quantization at one or two bits per dimension.
    Binary {
        encoding: BinaryEncoding,
        always_ram: bool,
    },
}

/// Layout of a collection to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub vector_size: usize,
    pub distance: Distance,
    /// Store original vectors on disk rather than in RAM.
    pub on_disk: bool,
    /// Register the vector field under this name instead of the default
    /// unnamed slot.
    pub vector_name: Option<String>,
    pub quantization: Option<QuantizationSpec>,
}

impl CollectionSpec {
    pub fn new(vector_size: usize, distance: Distance) -> Self {
        Self {
            vector_size,
            distance,
            on_disk: true,
            vector_name: None,
            quantization: None,
        }
    }

    pub fn with_on_disk(mut self, on_disk: bool) -> Self {
        self.on_disk = on_disk;
        self
    }

    pub fn with_vector_name(mut self, name: impl Into<String>) -> Self {
        self.vector_name = Some(name.into());
        self
    }

    pub fn with_quantization(mut self, quantization: QuantizationSpec) -> Self {
        self.quantization = Some(quantization);
        self
    }
}

/// Backend-reported collection state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub points_count: u64,
    /// Backend-defined health string, e.g. "green".
    pub status: String,
}

/// Search-time parameters.
///
/// The default value requests a plain search; quantization knobs are only
/// sent to the backend when set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Multiplier on `limit` applied inside quantized search before
    /// rescoring/truncation.
    pub oversampling: Option<f64>,
    /// Re-rank quantized hits with the original full-precision vectors.
    pub rescore: Option<bool>,
    /// Named vector to search, for collections with named vectors.
    pub vector_name: Option<String>,
}

impl SearchOptions {
    /// Parameters for a quantized search pass.
    pub fn quantized(oversampling: f64, rescore: bool) -> Self {
        Self {
            oversampling: Some(oversampling),
            rescore: Some(rescore),
            vector_name: None,
        }
    }

    pub fn with_oversampling(mut self, factor: f64) -> Self {
        self.oversampling = Some(factor);
        self
    }

    pub fn with_rescore(mut self, rescore: bool) -> Self {
        self.rescore = Some(rescore);
        self
    }

    pub fn with_vector_name(mut self, name: impl Into<String>) -> Self {
        self.vector_name = Some(name.into());
        self
    }

    /// True when the request carries quantization parameters the backend
    /// needs to see.
    pub fn has_quantization_params(&self) -> bool {
        self.oversampling.is_some() || self.rescore.is_some()
    }
}

// ============================================================================
// Capability contract
// ============================================================================

/// The capability set the engine consumes.
///
/// Every method is one independent logical operation; implementations must
/// be safe to share across tasks (`Arc<B>` is cloned per component and per
/// pool worker).
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Create `name` with the given layout. Creating an existing collection
    /// is a permanent error.
    async fn create_collection(&self, name: &str, spec: &CollectionSpec)
        -> Result<(), BackendError>;

    /// Drop `name`. Deleting a missing collection succeeds.
    async fn delete_collection(&self, name: &str) -> Result<(), BackendError>;

    /// Describe `name`. Missing collections are a permanent error.
    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, BackendError>;

    /// Insert or overwrite `points` by id. When `vector_name` is set the
    /// vectors are written under that named slot.
    async fn upsert(
        &self,
        collection: &str,
        points: &[DataPoint],
        vector_name: Option<&str>,
    ) -> Result<(), BackendError>;

    /// Top-`limit` points ranked best-first under the collection's metric.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        options: &SearchOptions,
    ) -> Result<Vec<ScoredPoint>, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_point_builder() {
        let mut payload = serde_json::Map::new();
        payload.insert("title".to_string(), serde_json::json!("intro to rust"));
        let point = DataPoint::new(7, vec![0.1, 0.2]).with_payload(payload);
        assert_eq!(point.id, 7);
        assert_eq!(point.vector.len(), 2);
        assert_eq!(point.payload["title"], "intro to rust");
    }

    #[test]
    fn test_collection_spec_builder() {
        let spec = CollectionSpec::new(384, Distance::Cosine)
            .with_on_disk(false)
            .with_vector_name("dense")
            .with_quantization(QuantizationSpec::Scalar {
                quantile: 0.99,
                always_ram: true,
            });
        assert_eq!(spec.vector_size, 384);
        assert!(!spec.on_disk);
        assert_eq!(spec.vector_name.as_deref(), Some("dense"));
        assert!(spec.quantization.is_some());
    }

    #[test]
    fn test_search_options_quantized() {
        let options = SearchOptions::quantized(3.0, true);
        assert_eq!(options.oversampling, Some(3.0));
        assert_eq!(options.rescore, Some(true));
        assert!(options.has_quantization_params());
        assert!(!SearchOptions::default().has_quantization_params());
    }

    #[test]
    fn test_distance_wire_names() {
        assert_eq!(Distance::Cosine.as_str(), "Cosine");
        assert_eq!(Distance::Euclid.as_str(), "Euclid");
        // serde names match the wire names
        assert_eq!(serde_json::to_string(&Distance::Dot).unwrap(), "\"Dot\"");
    }

    #[test]
    fn test_quantization_spec_serde_tags() {
        let spec = QuantizationSpec::Binary {
            encoding: BinaryEncoding::TwoBits,
            always_ram: true,
        };
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("\"binary\""));
        assert!(json.contains("\"two_bits\""));
        let back: QuantizationSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }
}
