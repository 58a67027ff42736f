use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tattva::agent::providers::{CompletionProvider, HttpCompletionProvider};
use tattva::agent::{CompletionRequest, RequestBuilder};
use tattva::config::{CompletionConfig, ContextSource, TattvaConfig};
use tattva::error::CompletionError;
use tattva::memory::log::ConversationLog;
use tattva::session::{ChatSession, SessionOptions, TurnOutcome};
use tattva::types::{Feedback, NoticeLevel, Tone, Topic};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn tmp_dir(label: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("tattva-session-{label}-{nanos}"));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Replays one canned answer and records every request it receives.
struct ScriptedProvider {
    answer: Result<Vec<String>, (u16, String)>,
    seen: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedProvider {
    fn replying(texts: &[&str]) -> (Box<Self>, Arc<Mutex<Vec<CompletionRequest>>>) {
        Self::with(Ok(texts.iter().map(|t| t.to_string()).collect()))
    }

    fn failing(status: u16, body: &str) -> (Box<Self>, Arc<Mutex<Vec<CompletionRequest>>>) {
        Self::with(Err((status, body.to_string())))
    }

    fn with(
        answer: Result<Vec<String>, (u16, String)>,
    ) -> (Box<Self>, Arc<Mutex<Vec<CompletionRequest>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (
            Box::new(Self {
                answer,
                seen: seen.clone(),
            }),
            seen,
        )
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Vec<String>, CompletionError> {
        self.seen.lock().unwrap().push(request.clone());
        match &self.answer {
            Ok(texts) => Ok(texts.clone()),
            Err((status, body)) => Err(CompletionError::Status {
                status: *status,
                body: body.clone(),
            }),
        }
    }
}

fn session_with(provider: Box<dyn CompletionProvider>, log: ConversationLog) -> ChatSession {
    ChatSession::new(
        provider,
        RequestBuilder::new(CompletionConfig::default(), "SYSTEM"),
        log,
        None,
        SessionOptions {
            user_id: "tester".into(),
            ..SessionOptions::default()
        },
    )
}

// =============================================================
// Submit
// =============================================================

#[tokio::test]
async fn reply_is_trimmed_and_recorded() {
    let dir = tmp_dir("reply");
    let path = dir.join("log.json");
    let (provider, seen) = ScriptedProvider::replying(&["  Namaste! Try Anahata today.  "]);
    let mut session = session_with(provider, ConversationLog::open(&path).unwrap());

    let outcome = session.submit("tell me about yoga and chakra").await;
    match &outcome {
        TurnOutcome::Reply {
            text,
            topic,
            tone,
            notices,
        } => {
            assert_eq!(text, "Namaste! Try Anahata today.");
            assert_eq!(*topic, Topic::Spirituality);
            assert_eq!(*tone, Tone::Spiritual);
            assert!(notices.is_empty());
        }
        other => panic!("expected reply, got {other:?}"),
    }

    let reopened = ConversationLog::open(&path).unwrap();
    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened.entries()[0].output(), "Namaste! Try Anahata today.");
    assert_eq!(reopened.entries()[0].topic(), Topic::Spirituality);
    assert_eq!(
        reopened.entries()[0].instruction(),
        Some("Default instruction")
    );

    let requests = seen.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].temperature, 0.6);
    assert_eq!(requests[0].context_retention.user_tone, Tone::Spiritual);
    assert!(
        requests[0]
            .prompt
            .contains("### Conversation History (Last 3): No prior conversation.")
    );

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn only_the_first_choice_is_used() {
    let (provider, _) = ScriptedProvider::replying(&["first", "second"]);
    let mut session = session_with(provider, ConversationLog::in_memory());
    let outcome = session.submit("hello").await;
    assert!(matches!(outcome, TurnOutcome::Reply { ref text, .. } if text == "first"));
    assert_eq!(session.log().len(), 1);
}

#[tokio::test]
async fn empty_choices_warn_and_leave_log_unchanged() {
    let dir = tmp_dir("empty");
    let path = dir.join("log.json");
    let (provider, _) = ScriptedProvider::replying(&[]);
    let mut session = session_with(provider, ConversationLog::open(&path).unwrap());
    let before = std::fs::read(&path).unwrap();

    let outcome = session.submit("hello").await;
    match outcome {
        TurnOutcome::Empty { notice } => {
            assert_eq!(notice.level, NoticeLevel::Warning);
            assert!(notice.message.starts_with("No response received."));
        }
        other => panic!("expected empty outcome, got {other:?}"),
    }
    assert!(session.log().is_empty());
    assert_eq!(std::fs::read(&path).unwrap(), before);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn failed_call_reports_error_and_records_nothing() {
    let (provider, _) = ScriptedProvider::failing(503, "overloaded");
    let mut session = session_with(provider, ConversationLog::in_memory());

    let outcome = session.submit("hello").await;
    match outcome {
        TurnOutcome::Failed { notice } => {
            assert_eq!(notice.level, NoticeLevel::Error);
            assert!(notice.message.starts_with("An error occurred:"));
            assert!(notice.message.contains("503"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(session.log().is_empty());
}

#[tokio::test]
async fn blank_input_makes_no_call() {
    let (provider, seen) = ScriptedProvider::replying(&["unused"]);
    let mut session = session_with(provider, ConversationLog::in_memory());
    let outcome = session.submit("   ").await;
    assert!(matches!(outcome, TurnOutcome::Skipped { .. }));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn history_window_feeds_the_next_prompt() {
    let (provider, seen) = ScriptedProvider::replying(&["ok"]);
    let mut session = session_with(provider, ConversationLog::in_memory());
    for q in ["q1", "q2", "q3", "q4"] {
        session.submit(q).await;
    }

    let requests = seen.lock().unwrap();
    let last = &requests[3].prompt;
    assert!(last.contains("User: q1\nAssistant: ok\nUser: q2\nAssistant: ok\nUser: q3\nAssistant: ok"));
    assert!(last.ends_with("### User: q4\n### Tattva:"));
    // Three history turns plus the current input.
    assert_eq!(last.matches("User: q").count(), 4);
}

// =============================================================
// Feedback
// =============================================================

#[tokio::test]
async fn feedback_notices() {
    let (provider, _) = ScriptedProvider::replying(&["ok"]);
    let mut session = session_with(provider, ConversationLog::in_memory());

    let early = session.feedback(Feedback::ThumbsUp);
    assert_eq!(early.level, NoticeLevel::Warning);

    session.submit("hello").await;
    assert_eq!(
        session.feedback(Feedback::ThumbsUp).message,
        "Thanks for your feedback!"
    );
    assert_eq!(
        session.feedback(Feedback::ThumbsDown).message,
        "Thanks for your feedback! We'll improve."
    );
    assert_eq!(
        session.text_feedback("  too vague  ").message,
        "Thanks for telling us why!"
    );

    let last = session.log().last().unwrap();
    assert_eq!(last.feedback(), Some(Feedback::ThumbsDown));
    assert_eq!(last.text_feedback(), Some("too vague"));
}

// =============================================================
// Startup from config
// =============================================================

#[tokio::test]
async fn unwritable_log_degrades_to_in_memory() {
    let dir = tmp_dir("degraded");
    let blocker = dir.join("not-a-dir");
    std::fs::write(&blocker, "file").unwrap();

    let mut config = TattvaConfig::default();
    config.memory.log_path = blocker.join("log.json");
    let (provider, _) = ScriptedProvider::replying(&["ok"]);

    let mut session = ChatSession::start(&config, provider);
    assert!(!session.log().is_durable());
    assert_eq!(session.startup_notices().len(), 1);
    assert_eq!(session.startup_notices()[0].level, NoticeLevel::Error);

    let outcome = session.submit("hello").await;
    assert!(matches!(outcome, TurnOutcome::Reply { ref notices, .. } if notices.is_empty()));
    assert_eq!(session.log().len(), 1);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn semantic_context_recalls_similar_turns() {
    let dir = tmp_dir("semantic");
    let mut config = TattvaConfig::default();
    config.memory.log_path = dir.join("log.json");
    config.memory.semantic_enabled = true;
    config.memory.context = ContextSource::Semantic;
    config.memory.user_id = Some("seeker".into());
    config.memory.embedding.dimension = 64;
    config.memory.recall_top_k = 2;

    let (provider, seen) = ScriptedProvider::replying(&["Root chakra grounds you."]);
    let mut session = ChatSession::start(&config, provider);
    assert!(session.startup_notices().is_empty());
    assert_eq!(session.options().context, ContextSource::Semantic);

    session.submit("what does the root chakra do").await;
    session.submit("root chakra again please").await;

    let status = session.memory().unwrap().sync_status();
    assert_eq!(status.stored, 2);
    assert!(status.in_sync());

    let requests = seen.lock().unwrap();
    assert!(
        requests[0]
            .prompt
            .contains("### Conversation History (Last 2): No prior conversation.")
    );
    assert!(
        requests[1]
            .prompt
            .contains("User: what does the root chakra do\nAssistant: Root chakra grounds you.")
    );

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn default_user_id_recalls_across_restarts() {
    let dir = tmp_dir("restart");
    let mut config = TattvaConfig::default();
    config.memory.log_path = dir.join("log.json");
    config.memory.semantic_enabled = true;
    config.memory.context = ContextSource::Semantic;
    config.memory.embedding.dimension = 64;
    config.memory.local_index.path = Some(dir.join("index.json"));
    assert!(config.memory.user_id.is_none());

    let first_id = {
        let (provider, _) = ScriptedProvider::replying(&["Root chakra grounds you."]);
        let mut session = ChatSession::start(&config, provider);
        assert!(session.startup_notices().is_empty());
        session.submit("what does the root chakra do").await;
        session.options().user_id.clone()
    };
    assert_eq!(
        std::fs::read_to_string(dir.join("user_id")).unwrap(),
        first_id
    );

    let (provider, seen) = ScriptedProvider::replying(&["ok"]);
    let mut session = ChatSession::start(&config, provider);
    assert_eq!(session.options().user_id, first_id);
    session.submit("tell me about the root chakra").await;

    let requests = seen.lock().unwrap();
    assert!(
        requests[0]
            .prompt
            .contains("User: what does the root chakra do\nAssistant: Root chakra grounds you.")
    );

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn broken_memory_config_disables_semantic_context() {
    let dir = tmp_dir("nomemory");
    let mut config = TattvaConfig::default();
    config.memory.log_path = dir.join("log.json");
    config.memory.semantic_enabled = true;
    config.memory.context = ContextSource::Semantic;
    config.memory.embedding.provider = "http".into();

    let (provider, _) = ScriptedProvider::replying(&["ok"]);
    let session = ChatSession::start(&config, provider);
    assert!(session.memory().is_none());
    assert_eq!(session.options().context, ContextSource::History);
    assert!(
        session.startup_notices()[0]
            .message
            .starts_with("Semantic memory disabled")
    );

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn missing_completion_key_is_fatal() {
    let mut config = TattvaConfig::default();
    config.completion.api_key = None;
    let err = ChatSession::from_config(&config).err().unwrap();
    assert!(err.to_string().contains("TATTVA_API_KEY"));
}

// =============================================================
// Over HTTP
// =============================================================

#[tokio::test]
async fn http_provider_with_no_choices_yields_empty_outcome() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .expect(1)
        .mount(&server)
        .await;

    let provider = HttpCompletionProvider::new(
        format!("{}/v1/completions", server.uri()),
        "test-key".into(),
    );
    let mut session = session_with(Box::new(provider), ConversationLog::in_memory());
    let outcome = session.submit("hello").await;
    assert!(matches!(outcome, TurnOutcome::Empty { .. }));
    assert!(session.log().is_empty());
}

#[tokio::test]
async fn http_provider_reply_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"text": " The Vedas came first. "}]
        })))
        .mount(&server)
        .await;

    let provider = HttpCompletionProvider::new(
        format!("{}/v1/completions", server.uri()),
        "test-key".into(),
    );
    let mut session = session_with(Box::new(provider), ConversationLog::in_memory());
    let outcome = session.submit("history of india").await;
    match outcome {
        TurnOutcome::Reply { text, topic, .. } => {
            assert_eq!(text, "The Vedas came first.");
            assert_eq!(topic, Topic::CultureHistory);
        }
        other => panic!("expected reply, got {other:?}"),
    }

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["model"], "peft-model");
    assert_eq!(body["temperature"], json!(0.75));
    assert_eq!(body["feedback_weights"]["thumbs_up"], json!(1.2));
}

#[tokio::test]
async fn http_provider_server_error_is_failed_outcome() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let provider = HttpCompletionProvider::new(server.uri(), "k".into());
    let mut session = session_with(Box::new(provider), ConversationLog::in_memory());
    match session.submit("hello").await {
        TurnOutcome::Failed { notice } => assert!(notice.message.contains("500")),
        other => panic!("expected failure, got {other:?}"),
    }
}
