use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::MemoryError;
use crate::fs_util::write_atomic;

/// Metadata stored next to every vector: the exchange it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeMetadata {
    pub input: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ExchangeMetadata,
}

/// A ranked query hit. Higher score means more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: ExchangeMetadata,
}

/// A nearest-neighbour index partitioned by namespace.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn name(&self) -> &str;

    /// Insert or replace the entry with the same id.
    async fn upsert(&self, entry: VectorEntry, namespace: &str) -> Result<(), MemoryError>;

    /// Up to `top_k` matches, most similar first.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: &str,
    ) -> Result<Vec<VectorMatch>, MemoryError>;
}

/// Cosine similarity; zero when either vector has no magnitude or the
/// lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

type Namespaces = HashMap<String, Vec<VectorEntry>>;

/// In-process brute-force cosine index, optionally persisted as JSON.
pub struct LocalVectorIndex {
    dimension: usize,
    path: Option<PathBuf>,
    namespaces: RwLock<Namespaces>,
}

impl LocalVectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            path: None,
            namespaces: RwLock::new(HashMap::new()),
        }
    }

    /// Open an index persisted at `path`. A missing file starts empty; an
    /// unreadable one is an error so a bad path shows up at startup.
    pub fn open(dimension: usize, path: impl Into<PathBuf>) -> Result<Self, MemoryError> {
        let path = path.into();
        let namespaces: Namespaces = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        let count: usize = namespaces.values().map(|v| v.len()).sum();
        info!(path = %path.display(), entries = count, "opened local vector index");
        Ok(Self {
            dimension,
            path: Some(path),
            namespaces: RwLock::new(namespaces),
        })
    }

    pub async fn len(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .await
            .get(namespace)
            .map_or(0, |v| v.len())
    }

    fn check_dimension(&self, actual: usize) -> Result<(), MemoryError> {
        if actual != self.dimension {
            return Err(MemoryError::Dimension {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for LocalVectorIndex {
    fn name(&self) -> &str {
        "local"
    }

    async fn upsert(&self, entry: VectorEntry, namespace: &str) -> Result<(), MemoryError> {
        self.check_dimension(entry.values.len())?;
        let mut namespaces = self.namespaces.write().await;
        let id = entry.id.clone();
        let entries = namespaces.entry(namespace.to_string()).or_default();
        let replaced = match entries.iter().position(|e| e.id == id) {
            Some(i) => Some(std::mem::replace(&mut entries[i], entry)),
            None => {
                entries.push(entry);
                None
            }
        };

        let Some(path) = &self.path else {
            return Ok(());
        };
        let persisted = serde_json::to_vec(&*namespaces)
            .map_err(MemoryError::from)
            .and_then(|json| write_atomic(path, &json).map_err(MemoryError::from));
        if let Err(e) = persisted {
            // Undo so memory never holds an entry the durable copy lacks.
            if let Some(entries) = namespaces.get_mut(namespace) {
                match replaced {
                    Some(previous) => {
                        if let Some(slot) = entries.iter_mut().find(|e| e.id == id) {
                            *slot = previous;
                        }
                    }
                    None => {
                        entries.retain(|e| e.id != id);
                    }
                }
                if entries.is_empty() {
                    namespaces.remove(namespace);
                }
            }
            warn!(path = %path.display(), "local index not persisted, upsert undone: {e}");
            return Err(e);
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: &str,
    ) -> Result<Vec<VectorMatch>, MemoryError> {
        self.check_dimension(vector.len())?;
        let namespaces = self.namespaces.read().await;
        let Some(entries) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<VectorMatch> = entries
            .iter()
            .map(|e| VectorMatch {
                id: e.id.clone(),
                score: cosine_similarity(vector, &e.values),
                metadata: e.metadata.clone(),
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        debug!(namespace, hits = matches.len(), "local index query");
        Ok(matches)
    }
}

/// Pinecone-style REST index.
///
/// - `POST {url}/vectors/upsert` `{"vectors": [{id, values, metadata}], "namespace"}`
/// - `POST {url}/query` `{"vector", "topK", "namespace", "includeMetadata": true}`
///   → `{"matches": [{id, score, metadata}]}`
pub struct RemoteVectorIndex {
    client: Client,
    url: String,
    api_key: String,
}

impl RemoteVectorIndex {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, MemoryError> {
        let response = self
            .client
            .post(format!("{}{path}", self.url))
            .header("Api-Key", &self.api_key)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MemoryError::Status {
                service: "vector index",
                status,
                body,
            });
        }
        Ok(response)
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<RawMatch>,
}

#[derive(Deserialize)]
struct RawMatch {
    id: String,
    #[serde(default)]
    score: f32,
    metadata: Option<ExchangeMetadata>,
}

#[async_trait]
impl VectorIndex for RemoteVectorIndex {
    fn name(&self) -> &str {
        "remote"
    }

    async fn upsert(&self, entry: VectorEntry, namespace: &str) -> Result<(), MemoryError> {
        let body = serde_json::json!({
            "vectors": [entry],
            "namespace": namespace,
        });
        self.post("/vectors/upsert", &body).await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: &str,
    ) -> Result<Vec<VectorMatch>, MemoryError> {
        let body = serde_json::json!({
            "vector": vector,
            "topK": top_k,
            "namespace": namespace,
            "includeMetadata": true,
        });
        let response = self.post("/query", &body).await?;
        let parsed: QueryResponse =
            response
                .json()
                .await
                .map_err(|e| MemoryError::Malformed {
                    service: "vector index",
                    reason: e.to_string(),
                })?;

        let mut matches = Vec::with_capacity(parsed.matches.len());
        for raw in parsed.matches {
            match raw.metadata {
                Some(metadata) => matches.push(VectorMatch {
                    id: raw.id,
                    score: raw.score,
                    metadata,
                }),
                None => warn!(id = %raw.id, "remote match without metadata, skipping"),
            }
        }
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_and_orthogonal_vectors() {
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
