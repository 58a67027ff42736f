use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::MemoryError;
use crate::fs_util::write_atomic;
use crate::types::{Exchange, Feedback, Topic};

/// What `load` found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Durable copy parsed; this many records were merged in.
    Loaded(usize),
    /// No durable copy existed; an empty one was created.
    Created,
    /// The durable copy was malformed and has been reset to empty.
    Reset,
    /// The log has no durable copy.
    InMemory,
}

/// Ordered, append-only record of exchanges for one session.
///
/// The durable copy is a single JSON array rewritten in full on every
/// change, so after each successful save disk and memory hold the same list.
#[derive(Debug, Default)]
pub struct ConversationLog {
    path: Option<PathBuf>,
    entries: Vec<Exchange>,
}

impl ConversationLog {
    /// A log with no durable copy. `save` is a no-op.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// A log bound to `path`, initially empty. Call [`load`](Self::load) to
    /// read the durable copy.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            entries: Vec::new(),
        }
    }

    /// Bind to `path` and load it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, MemoryError> {
        let mut log = Self::new(path);
        log.load()?;
        Ok(log)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_durable(&self) -> bool {
        self.path.is_some()
    }

    /// Read the durable copy and place its records before any records
    /// already held in memory.
    ///
    /// A missing file is created as `[]`. A file that is not valid JSON, or
    /// whose top level is not an array, is reset to `[]`. Inside an array,
    /// elements that cannot be read as an exchange are skipped and the file
    /// is left as it is.
    pub fn load(&mut self) -> Result<LoadOutcome, MemoryError> {
        let Some(path) = self.path.clone() else {
            return Ok(LoadOutcome::InMemory);
        };

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                write_atomic(&path, b"[]")?;
                info!(path = %path.display(), "created empty conversation log");
                return Ok(LoadOutcome::Created);
            }
            Err(e) => return Err(e.into()),
        };

        let elements = match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(serde_json::Value::Array(elements)) => elements,
            Ok(_) => {
                warn!(path = %path.display(), "conversation log is not an array, resetting");
                write_atomic(&path, b"[]")?;
                return Ok(LoadOutcome::Reset);
            }
            Err(e) => {
                warn!(path = %path.display(), "conversation log is malformed, resetting: {e}");
                write_atomic(&path, b"[]")?;
                return Ok(LoadOutcome::Reset);
            }
        };

        let mut durable = Vec::with_capacity(elements.len());
        for (position, element) in elements.into_iter().enumerate() {
            match serde_json::from_value::<Exchange>(element) {
                Ok(exchange) => durable.push(exchange),
                Err(e) => warn!(path = %path.display(), position, "skipping unreadable record: {e}"),
            }
        }

        let count = durable.len();
        durable.append(&mut self.entries);
        self.entries = durable;
        info!(path = %path.display(), records = count, "loaded conversation log");
        Ok(LoadOutcome::Loaded(count))
    }

    /// Rewrite the durable copy with the full in-memory sequence.
    pub fn save(&self) -> Result<(), MemoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.entries)?;
        write_atomic(path, json.as_bytes())?;
        debug!(path = %path.display(), records = self.entries.len(), "saved conversation log");
        Ok(())
    }

    /// Append and flush. The record stays in memory even when the flush
    /// fails; the error only reports that the durable copy is stale.
    pub fn append(&mut self, exchange: Exchange) -> Result<(), MemoryError> {
        self.entries.push(exchange);
        self.save()
    }

    /// Set binary feedback on the most recent record and flush. Setting it
    /// again overwrites.
    pub fn set_feedback(&mut self, feedback: Feedback) -> Result<(), MemoryError> {
        let last = self.entries.last_mut().ok_or(MemoryError::EmptyLog)?;
        last.feedback = Some(feedback);
        self.save()
    }

    /// Set free-text feedback on the most recent record and flush.
    pub fn set_text_feedback(&mut self, text: impl Into<String>) -> Result<(), MemoryError> {
        let last = self.entries.last_mut().ok_or(MemoryError::EmptyLog)?;
        last.text_feedback = text.into();
        self.save()
    }

    pub fn entries(&self) -> &[Exchange] {
        &self.entries
    }

    pub fn last(&self) -> Option<&Exchange> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The last `n` records grouped by topic, groups ordered by the first
    /// appearance of their topic and records chronological within a group.
    pub fn recent_by_topic(&self, n: usize) -> Vec<(Topic, Vec<&Exchange>)> {
        let start = self.entries.len().saturating_sub(n);
        let mut groups: Vec<(Topic, Vec<&Exchange>)> = Vec::new();
        for exchange in &self.entries[start..] {
            match groups.iter_mut().find(|(t, _)| *t == exchange.topic()) {
                Some((_, list)) => list.push(exchange),
                None => groups.push((exchange.topic(), vec![exchange])),
            }
        }
        groups
    }
}
