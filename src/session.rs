use serde::Serialize;
use tracing::{info, warn};

use crate::agent::RequestBuilder;
use crate::agent::providers::{self, CompletionProvider};
use crate::classify::sentiment::LexiconSentiment;
use crate::classify::{ToneDetector, TopicClassifier};
use crate::config::{ContextSource, TattvaConfig};
use crate::error::MemoryError;
use crate::memory::{build_semantic_memory, load_or_create_user_id};
use crate::memory::history::HistoryFormatter;
use crate::memory::log::ConversationLog;
use crate::memory::semantic::{SemanticMemory, Tier};
use crate::types::{Exchange, Feedback, Notice, Tone, Topic};

/// Result of one submitted input.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// A reply was produced and recorded. `notices` carries any non-fatal
    /// persistence or memory warnings.
    Reply {
        text: String,
        topic: Topic,
        tone: Tone,
        notices: Vec<Notice>,
    },
    /// The service answered with no candidates. Nothing was recorded.
    Empty { notice: Notice },
    /// The completion call failed. Nothing was recorded.
    Failed { notice: Notice },
    /// Blank input; no call was made.
    Skipped { notice: Notice },
}

impl TurnOutcome {
    pub fn notices(&self) -> Vec<&Notice> {
        match self {
            TurnOutcome::Reply { notices, .. } => notices.iter().collect(),
            TurnOutcome::Empty { notice }
            | TurnOutcome::Failed { notice }
            | TurnOutcome::Skipped { notice } => vec![notice],
        }
    }
}

/// Knobs that shape context assembly, taken from `[memory]`.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub user_id: String,
    pub history_window: usize,
    pub context: ContextSource,
    pub recall_top_k: usize,
    pub prefer_primary: bool,
    pub use_sentiment: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            user_id: uuid::Uuid::new_v4().to_string(),
            history_window: 3,
            context: ContextSource::History,
            recall_top_k: 3,
            prefer_primary: true,
            use_sentiment: false,
        }
    }
}

/// One user's chat session. Owns the conversation log, the optional
/// semantic memory and the completion provider; nothing is shared.
pub struct ChatSession {
    options: SessionOptions,
    log: ConversationLog,
    memory: Option<SemanticMemory>,
    provider: Box<dyn CompletionProvider>,
    requests: RequestBuilder,
    topics: TopicClassifier,
    tone: ToneDetector,
    history: HistoryFormatter,
    startup_notices: Vec<Notice>,
}

impl ChatSession {
    pub fn new(
        provider: Box<dyn CompletionProvider>,
        requests: RequestBuilder,
        log: ConversationLog,
        memory: Option<SemanticMemory>,
        options: SessionOptions,
    ) -> Self {
        let tone = if options.use_sentiment {
            ToneDetector::with_sentiment(Box::new(LexiconSentiment))
        } else {
            ToneDetector::new()
        };
        Self {
            history: HistoryFormatter::new(options.history_window),
            options,
            log,
            memory,
            provider,
            requests,
            topics: TopicClassifier::new(),
            tone,
            startup_notices: Vec::new(),
        }
    }

    /// Start a session from config with the provider built from
    /// `[completion]`. A missing completion key is the only fatal error.
    pub fn from_config(config: &TattvaConfig) -> anyhow::Result<Self> {
        let provider = providers::from_config(&config.completion)?;
        Ok(Self::start(config, provider))
    }

    /// Start a session from config. Log and memory problems do not fail
    /// startup: the session runs degraded and reports them through
    /// [`startup_notices`](Self::startup_notices).
    pub fn start(config: &TattvaConfig, provider: Box<dyn CompletionProvider>) -> Self {
        let mut notices = Vec::new();

        let log = match ConversationLog::open(&config.memory.log_path) {
            Ok(log) => log,
            Err(e) => {
                warn!(path = %config.memory.log_path.display(), "conversation log unavailable: {e}");
                notices.push(Notice::error(format!(
                    "Failed to initialize conversation log: {e}. History will not be saved."
                )));
                ConversationLog::in_memory()
            }
        };

        let memory = if config.memory.semantic_enabled {
            match build_semantic_memory(&config.memory) {
                Ok(memory) => Some(memory),
                Err(e) => {
                    warn!("semantic memory unavailable: {e}");
                    notices.push(Notice::error(format!("Semantic memory disabled: {e}")));
                    None
                }
            }
        } else {
            None
        };

        let requests = match RequestBuilder::from_config(&config.completion) {
            Ok(builder) => builder,
            Err(e) => {
                warn!("{e}");
                notices.push(Notice::warning(format!(
                    "{e}. Using the built-in instructions."
                )));
                RequestBuilder::new(
                    config.completion.clone(),
                    crate::agent::DEFAULT_INSTRUCTIONS,
                )
            }
        };

        let context = if config.memory.context == ContextSource::Semantic && memory.is_none() {
            ContextSource::History
        } else {
            config.memory.context
        };

        let user_id = match (&config.memory.user_id, &memory) {
            (Some(id), _) => id.clone(),
            (None, Some(_)) => {
                let path = config.memory.user_id_path();
                load_or_create_user_id(&path).unwrap_or_else(|e| {
                    warn!(path = %path.display(), "user id not persisted: {e}");
                    notices.push(Notice::warning(format!(
                        "Failed to save the memory user id: {e}. Memories from this session will not be recalled later."
                    )));
                    uuid::Uuid::new_v4().to_string()
                })
            }
            (None, None) => uuid::Uuid::new_v4().to_string(),
        };

        let options = SessionOptions {
            user_id,
            history_window: config.memory.history_window as usize,
            context,
            recall_top_k: config.memory.recall_top_k as usize,
            prefer_primary: config.memory.prefer_primary,
            use_sentiment: config.completion.tone_sentiment,
        };

        info!(
            user_id = %options.user_id,
            records = log.len(),
            semantic = memory.is_some(),
            "chat session started"
        );

        let mut session = Self::new(provider, requests, log, memory, options);
        session.startup_notices = notices;
        session
    }

    /// Errors and warnings raised while starting the session.
    pub fn startup_notices(&self) -> &[Notice] {
        &self.startup_notices
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn memory(&self) -> Option<&SemanticMemory> {
        self.memory.as_ref()
    }

    pub fn classify(&self, input: &str) -> (Topic, Tone) {
        (self.topics.classify(input), self.tone.detect(input))
    }

    /// Context block for the prompt: similarity recall when configured,
    /// otherwise the recent history window.
    pub async fn context_for(&self, input: &str) -> String {
        match (self.options.context, &self.memory) {
            (ContextSource::Semantic, Some(memory)) => {
                memory
                    .retrieve(
                        input,
                        self.options.recall_top_k,
                        &self.options.user_id,
                        self.options.prefer_primary,
                    )
                    .await
            }
            _ => self.history.format(self.log.entries()),
        }
    }

    /// How many turns the context block covers, as shown in the prompt.
    fn context_size(&self) -> usize {
        match (self.options.context, &self.memory) {
            (ContextSource::Semantic, Some(_)) => self.options.recall_top_k,
            _ => self.history.window(),
        }
    }

    /// Run one request: classify, assemble context, call the completion
    /// service, then record the exchange. Every failure comes back as a
    /// notice; nothing is recorded unless a reply was produced.
    pub async fn submit(&mut self, input: &str) -> TurnOutcome {
        if input.trim().is_empty() {
            return TurnOutcome::Skipped {
                notice: Notice::warning("Please enter a question first."),
            };
        }

        let (topic, tone) = self.classify(input);
        let context = self.context_for(input).await;
        let request = self
            .requests
            .build(&context, self.context_size(), input, topic, tone);

        info!(%topic, %tone, context_len = context.len(), "sending completion request");

        let choices = match self.provider.complete(&request).await {
            Ok(choices) => choices,
            Err(e) => {
                warn!("completion failed: {e}");
                return TurnOutcome::Failed {
                    notice: Notice::error(format!("An error occurred: {e}")),
                };
            }
        };

        let Some(first) = choices.first() else {
            warn!("completion returned no choices");
            return TurnOutcome::Empty {
                notice: Notice::warning(
                    "No response received. Please check your API settings or prompt formatting.",
                ),
            };
        };
        let text = first.trim().to_string();

        let mut notices = Vec::new();
        let exchange = Exchange::new(input, text.clone(), topic)
            .with_instruction(self.requests.instruction_layer());
        if let Err(e) = self.log.append(exchange) {
            warn!("failed to save conversation log: {e}");
            notices.push(Notice::warning(format!(
                "Failed to save conversation history: {e}"
            )));
        }

        if let Some(memory) = self.memory.as_mut() {
            match memory.store(input, &text, &self.options.user_id).await {
                Ok(report) => {
                    for (tier, error) in report.failures() {
                        notices.push(Notice::warning(format!(
                            "Memory write to the {} index failed: {error}",
                            match tier {
                                Tier::Primary => "primary",
                                Tier::Secondary => "local",
                            }
                        )));
                    }
                }
                Err(e) => {
                    warn!("failed to store memory: {e}");
                    notices.push(Notice::warning(format!("Failed to store memory: {e}")));
                }
            }
        }

        TurnOutcome::Reply {
            text,
            topic,
            tone,
            notices,
        }
    }

    /// Rate the most recent reply. Rating again overwrites.
    pub fn feedback(&mut self, feedback: Feedback) -> Notice {
        match self.log.set_feedback(feedback) {
            Ok(()) => match feedback {
                Feedback::ThumbsUp => Notice::info("Thanks for your feedback!"),
                Feedback::ThumbsDown => Notice::info("Thanks for your feedback! We'll improve."),
            },
            Err(e) => feedback_failure(e, "feedback"),
        }
    }

    /// Attach free-text feedback to the most recent reply.
    pub fn text_feedback(&mut self, text: &str) -> Notice {
        match self.log.set_text_feedback(text.trim()) {
            Ok(()) => Notice::info("Thanks for telling us why!"),
            Err(e) => feedback_failure(e, "text feedback"),
        }
    }
}

fn feedback_failure(error: MemoryError, what: &str) -> Notice {
    match error {
        MemoryError::EmptyLog => Notice::warning("There is no reply to give feedback on yet."),
        other => {
            warn!("failed to save {what}: {other}");
            Notice::warning(format!("Failed to save {what}: {other}"))
        }
    }
}
