pub mod embed;
pub mod history;
pub mod index;
pub mod log;
pub mod semantic;

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::config::MemoryConfig;
use crate::error::MemoryError;
use crate::fs_util::write_atomic;
use embed::{Embedder, HashingEmbedder, HttpEmbedder};
use index::{LocalVectorIndex, RemoteVectorIndex, VectorIndex};
use semantic::SemanticMemory;

/// Build the semantic memory store from config.
///
/// - Embedder: `hashing` (local) or `http` (needs `endpoint`)
/// - Primary: remote index when `primary_index` is set (needs an API key)
/// - Secondary: local index when `local_index.enabled`
///
/// Every problem found here is a configuration error; callers run without
/// semantic memory when this fails.
pub fn build_semantic_memory(config: &MemoryConfig) -> Result<SemanticMemory, MemoryError> {
    let embedding = &config.embedding;
    if embedding.dimension == 0 {
        return Err(MemoryError::Config("embedding dimension must be > 0".into()));
    }

    let embedder: Arc<dyn Embedder> = match embedding.provider.as_str() {
        "hashing" => Arc::new(HashingEmbedder::new(embedding.dimension)),
        "http" => {
            let endpoint = embedding.endpoint.clone().ok_or_else(|| {
                MemoryError::Config("memory.embedding.endpoint is required for http".into())
            })?;
            check_url("memory.embedding.endpoint", &endpoint)?;
            Arc::new(HttpEmbedder::new(
                endpoint,
                embedding.api_key.clone(),
                embedding.model.clone(),
                embedding.dimension,
            ))
        }
        other => {
            return Err(MemoryError::Config(format!(
                "unknown embedding provider '{other}'"
            )));
        }
    };

    let primary: Option<Arc<dyn VectorIndex>> = match &config.primary_index {
        Some(remote) => {
            check_url("memory.primary_index.url", &remote.url)?;
            let api_key = remote.api_key.clone().ok_or_else(|| {
                MemoryError::Config(
                    "no API key for the primary index. Set TATTVA_INDEX_API_KEY env var.".into(),
                )
            })?;
            Some(Arc::new(RemoteVectorIndex::new(remote.url.clone(), api_key)))
        }
        None => None,
    };

    let secondary: Option<Arc<dyn VectorIndex>> = if config.local_index.enabled {
        let local = match &config.local_index.path {
            Some(path) => LocalVectorIndex::open(embedding.dimension, path)?,
            None => LocalVectorIndex::new(embedding.dimension),
        };
        Some(Arc::new(local))
    } else {
        None
    };

    SemanticMemory::new(embedder, primary, secondary)
}

/// Read the user id stored at `path`, generating and saving one when the
/// file is missing or blank.
pub fn load_or_create_user_id(path: &Path) -> Result<String, MemoryError> {
    match std::fs::read_to_string(path) {
        Ok(raw) if !raw.trim().is_empty() => return Ok(raw.trim().to_string()),
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    let id = uuid::Uuid::new_v4().to_string();
    write_atomic(path, id.as_bytes())?;
    info!(path = %path.display(), user_id = %id, "generated memory user id");
    Ok(id)
}

fn check_url(field: &str, value: &str) -> Result<(), MemoryError> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| MemoryError::Config(format!("invalid {field} '{value}': {e}")))
}
