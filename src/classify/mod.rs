pub mod sentiment;

use crate::types::{Tone, Topic};
use sentiment::SentimentSignal;

/// A keyword rule: matches when any keyword occurs in the lower-cased input.
#[derive(Debug, Clone)]
pub struct Rule<L> {
    pub label: L,
    pub keywords: &'static [&'static str],
    /// Whether a positive sentiment score may select this rule when no
    /// keyword rule matched.
    pub sentiment_qualified: bool,
}

impl<L> Rule<L> {
    pub const fn keywords(label: L, keywords: &'static [&'static str]) -> Self {
        Self {
            label,
            keywords,
            sentiment_qualified: false,
        }
    }

    pub const fn sentiment_qualified(mut self) -> Self {
        self.sentiment_qualified = true;
        self
    }

    fn matches(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|k| lowered.contains(k))
    }
}

/// Ordered first-match rule list. Priority is list order; the fallback is
/// returned when nothing matches.
#[derive(Debug, Clone)]
pub struct RuleSet<L: Copy> {
    rules: Vec<Rule<L>>,
    fallback: L,
}

impl<L: Copy> RuleSet<L> {
    pub fn new(rules: Vec<Rule<L>>, fallback: L) -> Self {
        Self { rules, fallback }
    }

    pub fn fallback(&self) -> L {
        self.fallback
    }

    pub fn rules(&self) -> &[Rule<L>] {
        &self.rules
    }

    /// Label of the first rule whose keywords occur in `text`.
    pub fn first_match(&self, text: &str) -> Option<L> {
        let lowered = text.to_lowercase();
        self.rules
            .iter()
            .find(|r| r.matches(&lowered))
            .map(|r| r.label)
    }

    pub fn evaluate(&self, text: &str) -> L {
        self.first_match(text).unwrap_or(self.fallback)
    }

    /// Keyword rules decide first. Only when none matched does a positive
    /// sentiment score select the first sentiment-qualified rule.
    pub fn evaluate_with_sentiment(&self, text: &str, sentiment_score: f32) -> L {
        if let Some(label) = self.first_match(text) {
            return label;
        }
        if sentiment_score > 0.0 {
            if let Some(rule) = self.rules.iter().find(|r| r.sentiment_qualified) {
                return rule.label;
            }
        }
        self.fallback
    }
}

const CULTURE_HISTORY: &[&str] = &[
    "history", "culture", "india", "japan", "brazil", "europe", "sanskrit", "tibetan", "vedanta",
];
const POP_CULTURE_SPORTS: &[&str] = &[
    "movie",
    "cartoon",
    "wwe",
    "wwf",
    "music",
    "sport",
    "cricket",
    "soccer",
    "playful",
    "kids",
    "food",
    "vegetarian",
];
const SCIENCE_TECHNOLOGY: &[&str] = &[
    "science",
    "technology",
    "research",
    "ai",
    "origin",
    "guide",
    "awareness",
    "space",
    "evolution",
    "scientist",
    "training",
    "claims",
];
const SPIRITUALITY: &[&str] = &[
    "meditation",
    "tattva",
    "chakra",
    "yoga",
    "awareness",
    "exciting",
    "cosmic",
];

const TONE_SPIRITUAL: &[&str] = &[
    "meditation",
    "tattva",
    "chakra",
    "yoga",
    "awareness",
    "cosmic",
    "spiritual",
];
const TONE_PLAYFUL: &[&str] = &["bro", "kids", "food", "wwe", "music", "sport"];

/// Topic rules in priority order: Culture/History > Pop Culture/Sports >
/// Science/Technology > Spirituality > General.
pub fn topic_rules() -> RuleSet<Topic> {
    RuleSet::new(
        vec![
            Rule::keywords(Topic::CultureHistory, CULTURE_HISTORY),
            Rule::keywords(Topic::PopCultureSports, POP_CULTURE_SPORTS),
            Rule::keywords(Topic::ScienceTechnology, SCIENCE_TECHNOLOGY),
            Rule::keywords(Topic::Spirituality, SPIRITUALITY),
        ],
        Topic::General,
    )
}

pub fn tone_rules() -> RuleSet<Tone> {
    RuleSet::new(
        vec![
            Rule::keywords(Tone::Spiritual, TONE_SPIRITUAL),
            Rule::keywords(Tone::Playful, TONE_PLAYFUL).sentiment_qualified(),
        ],
        Tone::Neutral,
    )
}

pub struct TopicClassifier {
    rules: RuleSet<Topic>,
}

impl Default for TopicClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicClassifier {
    pub fn new() -> Self {
        Self {
            rules: topic_rules(),
        }
    }

    pub fn classify(&self, text: &str) -> Topic {
        self.rules.evaluate(text)
    }
}

/// Maps input text to a tone hint, optionally consulting a sentiment signal.
pub struct ToneDetector {
    rules: RuleSet<Tone>,
    sentiment: Option<Box<dyn SentimentSignal>>,
}

impl Default for ToneDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ToneDetector {
    pub fn new() -> Self {
        Self {
            rules: tone_rules(),
            sentiment: None,
        }
    }

    pub fn with_sentiment(sentiment: Box<dyn SentimentSignal>) -> Self {
        Self {
            rules: tone_rules(),
            sentiment: Some(sentiment),
        }
    }

    pub fn detect(&self, text: &str) -> Tone {
        match &self.sentiment {
            Some(signal) => self.rules.evaluate_with_sentiment(text, signal.score(text)),
            None => self.rules.evaluate(text),
        }
    }
}

/// Convenience for callers that only need the default topic rules.
pub fn classify_topic(text: &str) -> Topic {
    topic_rules().evaluate(text)
}

/// Convenience for callers that only need keyword-based tone detection.
pub fn detect_tone(text: &str) -> Tone {
    tone_rules().evaluate(text)
}
