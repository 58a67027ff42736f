use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Topic label attached to every exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "Culture/History")]
    CultureHistory,
    #[serde(rename = "Pop Culture/Sports")]
    PopCultureSports,
    #[serde(rename = "Science/Technology")]
    ScienceTechnology,
    #[serde(rename = "Spirituality")]
    Spirituality,
    #[serde(rename = "General")]
    #[default]
    General,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::CultureHistory => "Culture/History",
            Topic::PopCultureSports => "Pop Culture/Sports",
            Topic::ScienceTechnology => "Science/Technology",
            Topic::Spirituality => "Spirituality",
            Topic::General => "General",
        }
    }

    /// Parse a display label such as `"Culture/History"`.
    pub fn from_label(label: &str) -> Option<Topic> {
        [
            Topic::CultureHistory,
            Topic::PopCultureSports,
            Topic::ScienceTechnology,
            Topic::Spirituality,
            Topic::General,
        ]
        .into_iter()
        .find(|topic| topic.as_str() == label.trim())
    }

    /// Reflective topics are sampled cooler than conversational ones.
    pub fn is_reflective(&self) -> bool {
        matches!(self, Topic::Spirituality | Topic::ScienceTechnology)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tone hint sent alongside the completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Spiritual,
    Playful,
    Neutral,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Spiritual => "spiritual",
            Tone::Playful => "playful",
            Tone::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binary user feedback on a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    ThumbsUp,
    ThumbsDown,
}

impl std::str::FromStr for Feedback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thumbs_up" | "up" | "+" | "👍" => Ok(Feedback::ThumbsUp),
            "thumbs_down" | "down" | "-" | "👎" => Ok(Feedback::ThumbsDown),
            other => Err(format!("unknown feedback '{other}'")),
        }
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feedback::ThumbsUp => f.write_str("thumbs_up"),
            Feedback::ThumbsDown => f.write_str("thumbs_down"),
        }
    }
}

/// One user/assistant turn as recorded in the conversation log.
///
/// `input`, `output`, `topic` and `timestamp` are fixed at creation. The
/// feedback fields change only through [`crate::memory::log::ConversationLog`].
///
/// Records written by older versions may lack fields: a missing or unknown
/// topic reads as `General`, a missing timestamp as the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    instruction: Option<String>,
    #[serde(default)]
    input: String,
    #[serde(default)]
    output: String,
    #[serde(default)]
    pub(crate) feedback: Option<Feedback>,
    #[serde(default, deserialize_with = "string_or_null")]
    pub(crate) text_feedback: String,
    #[serde(default, deserialize_with = "topic_or_general")]
    topic: Topic,
    #[serde(default, with = "log_timestamp")]
    timestamp: DateTime<Utc>,
}

impl Exchange {
    /// Create an exchange stamped with the current time.
    pub fn new(input: impl Into<String>, output: impl Into<String>, topic: Topic) -> Self {
        Self::at(input, output, topic, Utc::now())
    }

    /// Create an exchange with an explicit timestamp.
    pub fn at(
        input: impl Into<String>,
        output: impl Into<String>,
        topic: Topic,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            instruction: None,
            input: input.into(),
            output: output.into(),
            feedback: None,
            text_feedback: String::new(),
            topic,
            // Durable format has second precision.
            timestamp: truncate_to_seconds(timestamp),
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn instruction(&self) -> Option<&str> {
        self.instruction.as_deref()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn feedback(&self) -> Option<Feedback> {
        self.feedback
    }

    /// Free-text feedback, `None` when the user left none.
    pub fn text_feedback(&self) -> Option<&str> {
        if self.text_feedback.is_empty() {
            None
        } else {
            Some(&self.text_feedback)
        }
    }
}

fn topic_or_general<'de, D: Deserializer<'de>>(d: D) -> Result<Topic, D::Error> {
    let raw = Option::<String>::deserialize(d)?;
    Ok(raw.as_deref().and_then(Topic::from_label).unwrap_or_default())
}

fn string_or_null<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.timestamp(), 0).unwrap_or(ts)
}

/// Timestamps are written as `%Y-%m-%d %H:%M:%S` in the machine's local
/// time zone, with no offset marker. RFC 3339 is accepted on read so logs
/// written by other tools still load.
mod log_timestamp {
    use super::*;

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.with_timezone(&Local).format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        if let Ok(naive) = NaiveDateTime::parse_from_str(&raw, FORMAT) {
            // A wall time skipped by a DST jump has no local instant.
            return Ok(naive
                .and_local_timezone(Local)
                .earliest()
                .map(|local| local.with_timezone(&Utc))
                .unwrap_or_else(|| naive.and_utc()));
        }
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{raw}': {e}")))
    }
}

/// Severity of a user-visible notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A message surfaced to the user instead of a propagated error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        write!(f, "[{tag}] {}", self.message)
    }
}
