pub mod providers;

use serde::Serialize;

use crate::config::{CompletionConfig, FeedbackWeights};
use crate::types::{Tone, Topic};

/// Used when no instruction file is configured.
pub const DEFAULT_INSTRUCTIONS: &str = "\
You are Tattva AI, a friendly guide to meditation, tattva philosophy and world culture.
Reply in 4-6 upbeat sentences, tie the answer to one tattva and one chakra, and use the
conversation history to personalize the reply.

Instruction Layer:
Greeting, then a tattva or chakra insight, then a cultural tie-in, then one action step.";

const INSTRUCTION_LAYER_MARKER: &str = "Instruction Layer:";

/// Body of a completion call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub stop: Vec<String>,
    pub feedback_weights: FeedbackWeights,
    pub context_retention: ContextRetention,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextRetention {
    pub max_history_tokens: u32,
    pub user_tone: Tone,
}

/// Assembles prompts and requests from config and the instruction block.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    config: CompletionConfig,
    instructions: String,
}

impl RequestBuilder {
    pub fn new(config: CompletionConfig, instructions: impl Into<String>) -> Self {
        Self {
            config,
            instructions: instructions.into(),
        }
    }

    /// Read the instruction block from `instructions_path`, or fall back to
    /// the built-in one.
    pub fn from_config(config: &CompletionConfig) -> anyhow::Result<Self> {
        let instructions = match &config.instructions_path {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                anyhow::anyhow!("failed to read instructions {}: {e}", path.display())
            })?,
            None => DEFAULT_INSTRUCTIONS.to_string(),
        };
        Ok(Self::new(config.clone(), instructions))
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// The "Instruction Layer" section recorded with each exchange.
    pub fn instruction_layer(&self) -> String {
        match self.instructions.split_once(INSTRUCTION_LAYER_MARKER) {
            Some((_, layer)) => layer.trim().to_string(),
            None => "Default instruction".to_string(),
        }
    }

    pub fn prompt(&self, context: &str, window: usize, input: &str) -> String {
        format!(
            "{}\n### Conversation History (Last {window}): {context}\n### User: {input}\n### {}:",
            self.instructions, self.config.assistant_name
        )
    }

    pub fn temperature_for(&self, topic: Topic) -> f32 {
        if topic.is_reflective() {
            self.config.reflective_temperature
        } else {
            self.config.temperature
        }
    }

    pub fn build(
        &self,
        context: &str,
        window: usize,
        input: &str,
        topic: Topic,
        tone: Tone,
    ) -> CompletionRequest {
        CompletionRequest {
            model: self.config.model.clone(),
            prompt: self.prompt(context, window, input),
            max_tokens: self.config.max_tokens,
            temperature: self.temperature_for(topic),
            top_p: self.config.top_p,
            top_k: self.config.top_k,
            stop: self.config.stop.clone(),
            feedback_weights: self.config.feedback_weights,
            context_retention: ContextRetention {
                max_history_tokens: self.config.max_history_tokens,
                user_tone: tone,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> RequestBuilder {
        RequestBuilder::new(CompletionConfig::default(), "SYSTEM")
    }

    #[test]
    fn prompt_layout() {
        let prompt = builder().prompt("No prior conversation.", 3, "hi");
        assert_eq!(
            prompt,
            "SYSTEM\n### Conversation History (Last 3): No prior conversation.\n### User: hi\n### Tattva:"
        );
    }

    #[test]
    fn reflective_topics_sample_cooler() {
        let b = builder();
        assert_eq!(b.temperature_for(Topic::Spirituality), 0.6);
        assert_eq!(b.temperature_for(Topic::ScienceTechnology), 0.6);
        assert_eq!(b.temperature_for(Topic::General), 0.75);
        assert_eq!(b.temperature_for(Topic::CultureHistory), 0.75);
    }

    #[test]
    fn request_carries_tone_and_generation_parameters() {
        let request = builder().build("ctx", 3, "yoga", Topic::Spirituality, Tone::Spiritual);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "peft-model");
        assert_eq!(json["max_tokens"], 320);
        assert_eq!(json["top_k"], 50);
        assert_eq!(json["context_retention"]["user_tone"], "spiritual");
        assert_eq!(json["context_retention"]["max_history_tokens"], 100);
        assert_eq!(json["stop"][0], "### User:");
    }

    #[test]
    fn instruction_layer_is_extracted() {
        let b = RequestBuilder::new(CompletionConfig::default(), DEFAULT_INSTRUCTIONS);
        assert!(b.instruction_layer().starts_with("Greeting"));
        assert_eq!(builder().instruction_layer(), "Default instruction");
    }
}
