use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::TattvaConfig;
use crate::memory::semantic::SyncStatus;
use crate::session::{ChatSession, TurnOutcome};
use crate::types::{Exchange, Feedback, Notice, Topic};

/// The one session this process serves. Requests are handled one at a time.
pub struct AppState {
    pub session: Mutex<ChatSession>,
}

/// Bind to the configured address and serve `session`.
///
/// Only loopback addresses are accepted: the surface has no authentication.
pub async fn run(config: &TattvaConfig, session: ChatSession) -> anyhow::Result<()> {
    let is_loopback = config.gateway.bind == "127.0.0.1"
        || config.gateway.bind == "::1"
        || config.gateway.bind == "localhost";
    if !is_loopback {
        anyhow::bail!(
            "refusing to bind {}: the chat surface has no authentication, use a loopback address",
            config.gateway.bind
        );
    }

    let addr = format!("{}:{}", config.gateway.bind, config.gateway.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("tattva gateway listening on {addr}");
    serve(listener, session).await
}

/// Serve `session` on an already-bound listener.
pub async fn serve(listener: TcpListener, session: ChatSession) -> anyhow::Result<()> {
    let state = Arc::new(AppState {
        session: Mutex::new(session),
    });
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/chat", post(chat))
        .route("/feedback", post(feedback))
        .route("/feedback/text", post(text_feedback))
        .route("/history", get(history))
        .route("/history/recent", get(recent_history))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct StatusBody {
    records: usize,
    durable: bool,
    semantic: Option<SyncStatus>,
    notices: Vec<Notice>,
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusBody> {
    let session = state.session.lock().await;
    Json(StatusBody {
        records: session.log().len(),
        durable: session.log().is_durable(),
        semantic: session.memory().map(|m| m.sync_status().clone()),
        notices: session.startup_notices().to_vec(),
    })
}

#[derive(Deserialize)]
struct ChatBody {
    input: String,
}

async fn chat(State(state): State<Arc<AppState>>, Json(body): Json<ChatBody>) -> Json<TurnOutcome> {
    let mut session = state.session.lock().await;
    Json(session.submit(&body.input).await)
}

#[derive(Deserialize)]
struct FeedbackBody {
    feedback: Feedback,
}

async fn feedback(
    State(state): State<Arc<AppState>>,
    Json(body): Json<FeedbackBody>,
) -> Json<Notice> {
    let mut session = state.session.lock().await;
    Json(session.feedback(body.feedback))
}

#[derive(Deserialize)]
struct TextFeedbackBody {
    text: String,
}

async fn text_feedback(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TextFeedbackBody>,
) -> Json<Notice> {
    let mut session = state.session.lock().await;
    Json(session.text_feedback(&body.text))
}

async fn history(State(state): State<Arc<AppState>>) -> Json<Vec<Exchange>> {
    let session = state.session.lock().await;
    Json(session.log().entries().to_vec())
}

#[derive(Deserialize)]
struct RecentQuery {
    #[serde(default = "default_recent")]
    limit: usize,
}

fn default_recent() -> usize {
    5
}

#[derive(Serialize)]
struct TopicGroup {
    topic: Topic,
    exchanges: Vec<Exchange>,
}

async fn recent_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentQuery>,
) -> Json<Vec<TopicGroup>> {
    let session = state.session.lock().await;
    let groups = session
        .log()
        .recent_by_topic(query.limit)
        .into_iter()
        .map(|(topic, exchanges)| TopicGroup {
            topic,
            exchanges: exchanges.into_iter().cloned().collect(),
        })
        .collect();
    Json(groups)
}
