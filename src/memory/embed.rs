use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::MemoryError;

/// Turns text into a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError>;
}

/// OpenAI-compatible embeddings endpoint:
/// `{"model", "input"}` in, `{"data": [{"embedding": [...]}]}` out.
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
}

impl HttpEmbedder {
    pub fn new(endpoint: String, api_key: Option<String>, model: String, dimension: usize) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key,
            model,
            dimension,
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MemoryError::Status {
                service: "embedding",
                status,
                body,
            });
        }

        let parsed: serde_json::Value = response.json().await?;
        let values = parsed
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|d| d.first())
            .and_then(|d| d.get("embedding"))
            .and_then(|e| e.as_array())
            .ok_or_else(|| MemoryError::Malformed {
                service: "embedding",
                reason: "missing data[0].embedding".into(),
            })?;

        let vector = values
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| MemoryError::Malformed {
                service: "embedding",
                reason: "non-numeric embedding value".into(),
            })?;

        if vector.len() != self.dimension {
            return Err(MemoryError::Dimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        debug!(model = %self.model, dimension = vector.len(), "embedded text");
        Ok(vector)
    }
}

/// Deterministic local embedder: hashes lower-cased word unigrams into a
/// fixed number of signed buckets and normalizes to unit length. Texts that
/// share words land close together; no network needed.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return vector;
        }
        for word in text.split_whitespace() {
            let token: String = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            if token.is_empty() {
                continue;
            }
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        Ok(self.embed_sync(text))
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}
