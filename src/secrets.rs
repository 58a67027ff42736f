use std::fmt;
use std::path::{Path, PathBuf};

use crate::fs_util::{default_state_dir, set_secure_dir_permissions, set_secure_file_permissions};

/// Remote services that authenticate with an API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Service {
    Completion,
    Embedding,
    Index,
}

impl Service {
    pub const ALL: [Service; 3] = [Service::Completion, Service::Embedding, Service::Index];

    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Completion => "completion",
            Service::Embedding => "embedding",
            Service::Index => "index",
        }
    }

    /// Environment variable checked before the credential store.
    pub fn env_var(&self) -> &'static str {
        match self {
            Service::Completion => "TATTVA_API_KEY",
            Service::Embedding => "TATTVA_EMBEDDING_API_KEY",
            Service::Index => "TATTVA_INDEX_API_KEY",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Service {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Service::ALL
            .into_iter()
            .find(|service| service.as_str() == wanted)
            .ok_or_else(|| anyhow::anyhow!("unsupported service for key store: {wanted}"))
    }
}

/// One key file per service under `<state dir>/credentials`, readable only
/// by the owner.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn at(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.join("credentials"),
        }
    }

    /// The directory holding the config file named by `TATTVA_CONFIG`, or
    /// `~/.tattva`.
    pub fn default_location() -> Self {
        let state_dir = std::env::var("TATTVA_CONFIG")
            .ok()
            .and_then(|path| PathBuf::from(path).parent().map(Path::to_path_buf))
            .unwrap_or_else(default_state_dir);
        Self::at(&state_dir)
    }

    pub fn path_for(&self, service: Service) -> PathBuf {
        self.dir.join(format!("{service}.key"))
    }

    /// Write a trimmed key, tightening permissions on the directory and file.
    pub fn write(&self, service: Service, api_key: &str) -> anyhow::Result<PathBuf> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            anyhow::bail!("API key cannot be empty");
        }

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| anyhow::anyhow!("failed to create {}: {e}", self.dir.display()))?;
        set_secure_dir_permissions(&self.dir)?;

        let path = self.path_for(service);
        std::fs::write(&path, api_key)
            .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))?;
        set_secure_file_permissions(&path)?;
        Ok(path)
    }

    /// The stored key, or `None` when absent or blank.
    pub fn read(&self, service: Service) -> Option<String> {
        let value = std::fs::read_to_string(self.path_for(service)).ok()?;
        Some(value.trim().to_string()).filter(|v| !v.is_empty())
    }
}

pub fn store_api_key(service: Service, api_key: &str) -> anyhow::Result<PathBuf> {
    CredentialStore::default_location().write(service, api_key)
}

pub fn load_api_key(service: Service) -> Option<String> {
    CredentialStore::default_location().read(service)
}
