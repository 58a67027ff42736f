/// Auxiliary sentiment signal used by the tone detector.
///
/// Scores are in `[-1.0, 1.0]`; anything above zero counts as positive.
pub trait SentimentSignal: Send + Sync {
    fn score(&self, text: &str) -> f32;
}

const POSITIVE: &[&str] = &[
    "amazing", "awesome", "beautiful", "best", "excited", "fantastic", "fun", "glad", "good",
    "great", "happy", "joy", "love", "lovely", "nice", "peaceful", "thanks", "wonderful",
];

const NEGATIVE: &[&str] = &[
    "angry", "awful", "bad", "boring", "hate", "horrible", "sad", "stressed", "terrible", "tired",
    "upset", "worried", "worst",
];

/// Word-list polarity scorer: (positive - negative) / matched words.
#[derive(Debug, Default, Clone)]
pub struct LexiconSentiment;

impl SentimentSignal for LexiconSentiment {
    fn score(&self, text: &str) -> f32 {
        let mut positive = 0i32;
        let mut negative = 0i32;
        for word in text.split_whitespace() {
            let word: String = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            if POSITIVE.contains(&word.as_str()) {
                positive += 1;
            } else if NEGATIVE.contains(&word.as_str()) {
                negative += 1;
            }
        }
        let total = positive + negative;
        if total == 0 {
            return 0.0;
        }
        (positive - negative) as f32 / total as f32
    }
}
