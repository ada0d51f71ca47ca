use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, html};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::{error, info};
use uuid::Uuid;

use super::AppState;
use super::error::ApiError;
use crate::chat::{ChatSession, ConversationTurn, Role, TurnState};
use crate::rag::IngestReport;

const INDEX_HTML: &str = include_str!("index.html");

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedSession {
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct TurnView {
    pub role: Role,
    pub content: String,
    /// Markdown rendered to HTML
    pub html: String,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub state: TurnState,
    pub history: Vec<TurnView>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<IngestReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ConversationTurn> for TurnView {
    fn from(turn: ConversationTurn) -> Self {
        let html = render_markdown(&turn.content);
        Self {
            role: turn.role,
            content: turn.content,
            html,
        }
    }
}

impl From<ChatSession> for SessionView {
    fn from(session: ChatSession) -> Self {
        Self {
            id: session.id(),
            state: session.state(),
            history: session
                .history()
                .iter()
                .cloned()
                .map(TurnView::from)
                .collect(),
        }
    }
}

/// Schemes a rendered link or image may point at; relative URLs are always kept
const SAFE_SCHEMES: &[&str] = &["http", "https", "mailto"];

/// CommonMark to HTML; raw HTML in the source is shown as text and link or
/// image destinations with any other scheme are emptied
#[inline]
pub fn render_markdown(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH)
        .map(|event| match event {
            Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                title,
                id,
            }) if !is_safe_url(&dest_url) => Event::Start(Tag::Link {
                link_type,
                dest_url: CowStr::Borrowed(""),
                title,
                id,
            }),
            Event::Start(Tag::Image {
                link_type,
                dest_url,
                title,
                id,
            }) if !is_safe_url(&dest_url) => Event::Start(Tag::Image {
                link_type,
                dest_url: CowStr::Borrowed(""),
                title,
                id,
            }),
            other => other,
        });

    let mut output = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut output, parser);
    output
}

fn is_safe_url(url: &str) -> bool {
    // Browsers skip whitespace and control characters inside a scheme
    let cleaned: String = url
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_control())
        .collect();

    match cleaned.split_once(':') {
        Some((scheme, _)) if !scheme.contains(['/', '?', '#']) => {
            SAFE_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str())
        }
        _ => true,
    }
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn health(State(state): State<AppState>) -> Response {
    match state.engine.store().count_records().await {
        Ok(records) => Json(serde_json::json!({
            "status": "ok",
            "collection": state.engine.store().collection_name(),
            "records": records,
            "sessions": state.sessions.len().await,
        }))
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<CreatedSession>) {
    let id = state.sessions.create().await;
    (StatusCode::CREATED, Json(CreatedSession { id }))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.sessions.get(id).await?;
    Ok(Json(SessionView::from(session)))
}

pub async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.sessions.end(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<TurnView>, ApiError> {
    let turn = state
        .sessions
        .submit(id, &request.content, &state.engine)
        .await?;
    Ok(Json(TurnView::from(turn)))
}

/// Raw PDF body, staged in a temporary file that is removed on every path
pub async fn ingest(State(state): State<AppState>, body: Bytes) -> Response {
    if body.is_empty() {
        return ApiError::BadRequest("Request body must contain a PDF file".to_string())
            .into_response();
    }

    let staged = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(".pdf")
        .tempfile()
        .and_then(|mut file| {
            file.write_all(&body)?;
            file.flush()?;
            Ok(file)
        });

    let file = match staged {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to stage upload: {}", e);
            return ApiError::from(crate::RagError::Io(e)).into_response();
        }
    };

    info!("Ingesting uploaded document ({} bytes)", body.len());
    let result = state.engine.ingest_document(file.path()).await;

    if let Err(e) = file.close() {
        error!("Failed to remove staged upload: {}", e);
    }

    match result {
        Ok(report) => Json(IngestResponse {
            success: true,
            report: Some(report),
            error: None,
        })
        .into_response(),
        Err(e) => {
            error!("Upload ingestion failed: {}", e);
            let message = e.to_string();
            (
                ApiError::from(e).status(),
                Json(IngestResponse {
                    success: false,
                    report: None,
                    error: Some(message),
                }),
            )
                .into_response()
        }
    }
}
