use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::embed::Embedder;
use super::history::{NO_PRIOR_CONVERSATION, render_pairs};
use super::index::{ExchangeMetadata, VectorEntry, VectorIndex, VectorMatch};
use crate::error::MemoryError;

/// Which backing index a result or write refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Primary,
    Secondary,
}

/// Outcome of writing one entry to one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum WriteStatus {
    Written,
    Failed(String),
    /// Backend not configured.
    Skipped,
}

impl WriteStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, WriteStatus::Failed(_))
    }
}

/// Per-backend result of one `store` call. The two writes are independent;
/// nothing is rolled back when one of them fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreReport {
    pub id: String,
    pub primary: WriteStatus,
    pub secondary: WriteStatus,
}

impl StoreReport {
    /// Both configured backends now hold the entry.
    pub fn in_sync(&self) -> bool {
        !self.primary.is_failed() && !self.secondary.is_failed()
    }

    pub fn failures(&self) -> Vec<(Tier, &str)> {
        let mut out = Vec::new();
        if let WriteStatus::Failed(e) = &self.primary {
            out.push((Tier::Primary, e.as_str()));
        }
        if let WriteStatus::Failed(e) = &self.secondary {
            out.push((Tier::Secondary, e.as_str()));
        }
        out
    }
}

/// Running tally of dual-write outcomes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    pub stored: u64,
    /// Entries written to one backend but not the other.
    pub diverged: u64,
    pub primary_failures: u64,
    pub secondary_failures: u64,
    pub last_report: Option<StoreReport>,
}

impl SyncStatus {
    pub fn in_sync(&self) -> bool {
        self.diverged == 0
    }

    fn record(&mut self, report: &StoreReport) {
        self.stored += 1;
        if report.primary.is_failed() {
            self.primary_failures += 1;
        }
        if report.secondary.is_failed() {
            self.secondary_failures += 1;
        }
        let written = [&report.primary, &report.secondary]
            .iter()
            .filter(|s| matches!(s, WriteStatus::Written))
            .count();
        if written > 0 && !report.in_sync() {
            self.diverged += 1;
        }
        self.last_report = Some(report.clone());
    }
}

/// Ranked matches and the tier that produced them.
#[derive(Debug, Clone, Default)]
pub struct Recall {
    pub source: Option<Tier>,
    pub matches: Vec<VectorMatch>,
}

impl Recall {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// "User:"/"Assistant:" pairs, most similar first, or the placeholder.
    pub fn render(&self) -> String {
        if self.matches.is_empty() {
            return NO_PRIOR_CONVERSATION.to_string();
        }
        render_pairs(
            self.matches
                .iter()
                .map(|m| (m.metadata.input.as_str(), m.metadata.output.as_str())),
        )
    }
}

/// Embedding-backed recall over past exchanges, written to a primary and a
/// secondary index.
pub struct SemanticMemory {
    embedder: Arc<dyn Embedder>,
    primary: Option<Arc<dyn VectorIndex>>,
    secondary: Option<Arc<dyn VectorIndex>>,
    sync: SyncStatus,
}

impl SemanticMemory {
    /// At least one index is required.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        primary: Option<Arc<dyn VectorIndex>>,
        secondary: Option<Arc<dyn VectorIndex>>,
    ) -> Result<Self, MemoryError> {
        if primary.is_none() && secondary.is_none() {
            return Err(MemoryError::Config(
                "semantic memory needs a primary or a local index".into(),
            ));
        }
        info!(
            primary = primary.as_ref().map(|i| i.name()).unwrap_or("none"),
            secondary = secondary.as_ref().map(|i| i.name()).unwrap_or("none"),
            dimension = embedder.dimension(),
            "semantic memory ready"
        );
        Ok(Self {
            embedder,
            primary,
            secondary,
            sync: SyncStatus::default(),
        })
    }

    pub fn sync_status(&self) -> &SyncStatus {
        &self.sync
    }

    /// Entry key: user id plus creation time in milliseconds.
    pub fn entry_id(user_id: &str, created_at: DateTime<Utc>) -> String {
        format!("{user_id}-{}", created_at.timestamp_millis())
    }

    pub async fn store(
        &mut self,
        input: &str,
        output: &str,
        user_id: &str,
    ) -> Result<StoreReport, MemoryError> {
        self.store_at(input, output, user_id, Utc::now()).await
    }

    /// Embed `input` and write one entry to each backend. An embedding
    /// failure writes nothing and is returned; backend failures are
    /// reported per tier and tallied in [`SyncStatus`].
    pub async fn store_at(
        &mut self,
        input: &str,
        output: &str,
        user_id: &str,
        created_at: DateTime<Utc>,
    ) -> Result<StoreReport, MemoryError> {
        let values = self.embedder.embed(input).await?;
        let entry = VectorEntry {
            id: Self::entry_id(user_id, created_at),
            values,
            metadata: ExchangeMetadata {
                input: input.to_string(),
                output: output.to_string(),
            },
        };

        let primary = write_to(self.primary.as_deref(), &entry, user_id).await;
        let secondary = write_to(self.secondary.as_deref(), &entry, user_id).await;

        let report = StoreReport {
            id: entry.id,
            primary,
            secondary,
        };
        for (tier, error) in report.failures() {
            warn!(id = %report.id, ?tier, "vector write failed: {error}");
        }
        self.sync.record(&report);
        debug!(id = %report.id, in_sync = report.in_sync(), "stored exchange vector");
        Ok(report)
    }

    /// Query the preferred tier, then the other tier once if the first gave
    /// nothing. Failures degrade to an empty recall.
    pub async fn recall(
        &self,
        query: &str,
        top_k: usize,
        user_id: &str,
        prefer_primary: bool,
    ) -> Recall {
        let vector = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!("embedding failed during recall: {e}");
                return Recall::default();
            }
        };

        let order = if prefer_primary {
            [Tier::Primary, Tier::Secondary]
        } else {
            [Tier::Secondary, Tier::Primary]
        };

        for tier in order {
            let Some(index) = self.index(tier) else {
                continue;
            };
            match index.query(&vector, top_k, user_id).await {
                Ok(matches) if !matches.is_empty() => {
                    debug!(?tier, hits = matches.len(), "recall hit");
                    return Recall {
                        source: Some(tier),
                        matches,
                    };
                }
                Ok(_) => debug!(?tier, "recall empty, falling back"),
                Err(e) => warn!(?tier, "recall query failed: {e}"),
            }
        }
        Recall::default()
    }

    /// [`recall`](Self::recall) rendered as prompt context.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        user_id: &str,
        prefer_primary: bool,
    ) -> String {
        self.recall(query, top_k, user_id, prefer_primary)
            .await
            .render()
    }

    fn index(&self, tier: Tier) -> Option<&dyn VectorIndex> {
        match tier {
            Tier::Primary => self.primary.as_deref(),
            Tier::Secondary => self.secondary.as_deref(),
        }
    }
}

async fn write_to(
    index: Option<&dyn VectorIndex>,
    entry: &VectorEntry,
    namespace: &str,
) -> WriteStatus {
    match index {
        None => WriteStatus::Skipped,
        Some(index) => match index.upsert(entry.clone(), namespace).await {
            Ok(()) => WriteStatus::Written,
            Err(e) => WriteStatus::Failed(e.to_string()),
        },
    }
}
