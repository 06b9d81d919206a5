//! Deterministic in-memory backend for tests.
//!
//! Collections live behind an async mutex; upsert overwrites by id and
//! search is brute-force over every stored point, ranked by the
//! collection's metric with id as the tie-breaker. Fault queues let a test
//! script the next failures, and call counters expose how many requests a
//! component actually issued. Quantization search parameters are accepted
//! and ignored: the double measures engine behavior, not backend behavior.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::BackendError;

use super::{
    CollectionInfo, CollectionSpec, DataPoint, Distance, ScoredPoint, SearchOptions, VectorBackend,
};

struct Collection {
    spec: CollectionSpec,
    points: BTreeMap<u64, DataPoint>,
}

/// In-memory [`VectorBackend`] double.
#[derive(Default)]
pub struct MemoryBackend {
    collections: Mutex<HashMap<String, Collection>>,
    upsert_faults: Mutex<VecDeque<BackendError>>,
    search_faults: Mutex<VecDeque<BackendError>>,
    upsert_calls: AtomicU64,
    search_calls: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error consumed by the next upsert call (FIFO when queued
    /// repeatedly).
    pub async fn fail_next_upsert(&self, error: BackendError) {
        self.upsert_faults.lock().await.push_back(error);
    }

    /// Queue an error consumed by the next search call.
    pub async fn fail_next_search(&self, error: BackendError) {
        self.search_faults.lock().await.push_back(error);
    }

    /// Total upsert requests observed, including scripted failures.
    pub fn upsert_calls(&self) -> u64 {
        self.upsert_calls.load(Ordering::Relaxed)
    }

    /// Total search requests observed, including scripted failures.
    pub fn search_calls(&self) -> u64 {
        self.search_calls.load(Ordering::Relaxed)
    }
}

fn score(distance: Distance, query: &[f32], point: &[f32]) -> f32 {
    let dot: f32 = query.iter().zip(point).map(|(a, b)| a * b).sum();
    match distance {
        Distance::Dot => dot,
        Distance::Cosine => {
            let qn: f32 = query.iter().map(|x| x * x).sum::<f32>().sqrt();
            let pn: f32 = point.iter().map(|x| x * x).sum::<f32>().sqrt();
            if qn == 0.0 || pn == 0.0 {
                0.0
            } else {
                dot / (qn * pn)
            }
        }
        // Negated distance so that best-first means highest score here too.
        Distance::Euclid => {
            let dist: f32 = query
                .iter()
                .zip(point)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f32>()
                .sqrt();
            -dist
        }
    }
}

#[async_trait]
impl VectorBackend for MemoryBackend {
    async fn create_collection(
        &self,
        name: &str,
        spec: &CollectionSpec,
    ) -> Result<(), BackendError> {
        let mut collections = self.collections.lock().await;
        if collections.contains_key(name) {
            return Err(BackendError::permanent(format!(
                "collection '{}' already exists",
                name
            )));
        }
        collections.insert(
            name.to_string(),
            Collection {
                spec: spec.clone(),
                points: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), BackendError> {
        self.collections.lock().await.remove(name);
        Ok(())
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, BackendError> {
        let collections = self.collections.lock().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| BackendError::permanent(format!("collection '{}' not found", name)))?;
        Ok(CollectionInfo {
            name: name.to_string(),
            points_count: collection.points.len() as u64,
            status: "green".to_string(),
        })
    }

    async fn upsert(
        &self,
        collection: &str,
        points: &[DataPoint],
        _vector_name: Option<&str>,
    ) -> Result<(), BackendError> {
        self.upsert_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(error) = self.upsert_faults.lock().await.pop_front() {
            return Err(error);
        }

        let mut collections = self.collections.lock().await;
        let target = collections.get_mut(collection).ok_or_else(|| {
            BackendError::permanent(format!("collection '{}' not found", collection))
        })?;
        for point in points {
            if point.vector.len() != target.spec.vector_size {
                return Err(BackendError::permanent(format!(
                    "dimension mismatch for point {}: expected {}, got {}",
                    point.id,
                    target.spec.vector_size,
                    point.vector.len()
                )));
            }
        }
        for point in points {
            target.points.insert(point.id, point.clone());
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        _options: &SearchOptions,
    ) -> Result<Vec<ScoredPoint>, BackendError> {
        self.search_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(error) = self.search_faults.lock().await.pop_front() {
            return Err(error);
        }

        let collections = self.collections.lock().await;
        let target = collections.get(collection).ok_or_else(|| {
            BackendError::permanent(format!("collection '{}' not found", collection))
        })?;
        if vector.len() != target.spec.vector_size {
            return Err(BackendError::permanent(format!(
                "dimension mismatch: expected {}, got {}",
                target.spec.vector_size,
                vector.len()
            )));
        }

        let mut hits: Vec<ScoredPoint> = target
            .points
            .values()
            .map(|point| ScoredPoint {
                id: point.id,
                score: score(target.spec.distance, vector, &point.vector),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(dim: usize) -> CollectionSpec {
        CollectionSpec::new(dim, Distance::Cosine)
    }

    #[tokio::test]
    async fn test_upsert_and_search_roundtrip() {
        let backend = MemoryBackend::new();
        backend.create_collection("docs", &spec(2)).await.unwrap();
        backend
            .upsert(
                "docs",
                &[
                    DataPoint::new(0, vec![1.0, 0.0]),
                    DataPoint::new(1, vec![0.0, 1.0]),
                    DataPoint::new(2, vec![0.7, 0.7]),
                ],
                None,
            )
            .await
            .unwrap();

        let hits = backend
            .search("docs", &[1.0, 0.0], 2, &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, 0);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let backend = MemoryBackend::new();
        backend.create_collection("docs", &spec(2)).await.unwrap();
        let points = vec![
            DataPoint::new(0, vec![1.0, 0.0]),
            DataPoint::new(1, vec![0.0, 1.0]),
        ];
        backend.upsert("docs", &points, None).await.unwrap();
        backend.upsert("docs", &points, None).await.unwrap();

        let info = backend.collection_info("docs").await.unwrap();
        assert_eq!(info.points_count, 2);
        assert_eq!(info.status, "green");
    }

    #[tokio::test]
    async fn test_scripted_faults_consumed_in_order() {
        let backend = MemoryBackend::new();
        backend.create_collection("docs", &spec(2)).await.unwrap();
        backend
            .fail_next_upsert(BackendError::transient("busy"))
            .await;
        backend
            .fail_next_upsert(BackendError::permanent("bad payload"))
            .await;

        let points = [DataPoint::new(0, vec![1.0, 0.0])];
        let first = backend.upsert("docs", &points, None).await.unwrap_err();
        assert!(first.is_transient());
        let second = backend.upsert("docs", &points, None).await.unwrap_err();
        assert!(second.is_permanent());
        backend.upsert("docs", &points, None).await.unwrap();
        assert_eq!(backend.upsert_calls(), 3);
    }

    #[tokio::test]
    async fn test_missing_collection_is_permanent() {
        let backend = MemoryBackend::new();
        let err = backend
            .search("nope", &[1.0], 1, &SearchOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_permanent());

        let err = backend.collection_info("nope").await.unwrap_err();
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn test_delete_missing_collection_succeeds() {
        let backend = MemoryBackend::new();
        backend.delete_collection("nope").await.unwrap();
    }

    #[tokio::test]
    async fn test_create_existing_collection_fails() {
        let backend = MemoryBackend::new();
        backend.create_collection("docs", &spec(2)).await.unwrap();
        let err = backend
            .create_collection("docs", &spec(2))
            .await
            .unwrap_err();
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let backend = MemoryBackend::new();
        backend.create_collection("docs", &spec(3)).await.unwrap();
        let err = backend
            .upsert("docs", &[DataPoint::new(0, vec![1.0, 0.0])], None)
            .await
            .unwrap_err();
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn test_euclid_ranking_prefers_nearest() {
        let backend = MemoryBackend::new();
        backend
            .create_collection("grid", &CollectionSpec::new(1, Distance::Euclid))
            .await
            .unwrap();
        backend
            .upsert(
                "grid",
                &[
                    DataPoint::new(0, vec![0.0]),
                    DataPoint::new(1, vec![5.0]),
                    DataPoint::new(2, vec![1.0]),
                ],
                None,
            )
            .await
            .unwrap();
        let hits = backend
            .search("grid", &[0.9], 3, &SearchOptions::default())
            .await
            .unwrap();
        let ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![2, 0, 1]);
    }
}
