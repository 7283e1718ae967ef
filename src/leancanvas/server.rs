//! HTTP surface: the chat endpoint streaming [`StreamEvent`]s over SSE, thread history, and
//! the saved-canvas endpoints.
//!
//! | Method | Path | Result |
//! |---|---|---|
//! | `POST` | `/api/chat` | SSE stream of one turn |
//! | `GET` | `/api/chat?canvasId=` | thread history as UI messages |
//! | `GET` | `/api/canvases` | saved canvas summaries, newest first |
//! | `GET` | `/api/canvases/{id}` | one saved canvas |
//! | `GET` | `/api/canvases/{id}/export` | the canvas as a pretty-printed JSON download |
//! | `PUT` | `/api/canvases/{id}` | schedule a debounced save, `202` |
//! | `PATCH` | `/api/canvases/{id}` | rename |
//! | `DELETE` | `/api/canvases/{id}` | delete |

use crate::leancanvas::agent::{AgentCapability, NetworkRequest};
use crate::leancanvas::canvas::{kebab_case, CanvasState};
use crate::leancanvas::config::LeanCanvasConfig;
use crate::leancanvas::memory::StorageError;
use crate::leancanvas::runtime::Runtime;
use crate::leancanvas::stream_event::{StreamEvent, UiMessage};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Debug)]
pub enum ChatApiError {
    BadRequest(String),
    NotFound(String),
    /// The agent network could not start the turn.
    Upstream { details: String },
    Storage(StorageError),
}

impl fmt::Display for ChatApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatApiError::BadRequest(msg) => write!(f, "{}", msg),
            ChatApiError::NotFound(what) => write!(f, "{} not found", what),
            ChatApiError::Upstream { details } => {
                write!(f, "Failed to process chat request: {}", details)
            }
            ChatApiError::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl Error for ChatApiError {}

impl From<StorageError> for ChatApiError {
    fn from(e: StorageError) -> Self {
        ChatApiError::Storage(e)
    }
}

impl IntoResponse for ChatApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ChatApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ChatApiError::NotFound(_) => {
                (StatusCode::NOT_FOUND, json!({ "error": self.to_string() }))
            }
            ChatApiError::Upstream { details } => {
                log::error!("server: chat request failed: {}", details);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Failed to process chat request", "details": details }),
                )
            }
            ChatApiError::Storage(e) => {
                log::error!("server: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Storage failure", "details": e.to_string() }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Body of `POST /api/chat`. `messages` are UI messages in whatever shape the client sends;
/// only the last one is read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<Value>,
    pub canvas_id: Option<String>,
    pub canvas_state: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub canvas_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

/// Text of a UI message: its first `text` part, else its `content` string.
pub fn message_text(message: &Value) -> Option<String> {
    let from_parts = message
        .get("parts")
        .and_then(Value::as_array)
        .and_then(|parts| {
            parts
                .iter()
                .find(|part| part.get("type").and_then(Value::as_str) == Some("text"))
        })
        .and_then(|part| part.get("text"))
        .and_then(Value::as_str);

    from_parts
        .or_else(|| message.get("content").and_then(Value::as_str))
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
}

fn required_canvas_id(canvas_id: Option<String>) -> Result<String, ChatApiError> {
    canvas_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ChatApiError::BadRequest("canvasId is required".to_string()))
}

async fn chat(
    State(runtime): State<Arc<Runtime>>,
    Json(body): Json<ChatRequest>,
) -> Result<Sse<impl futures_util::Stream<Item = Result<Event, Infallible>>>, ChatApiError> {
    let canvas_id = required_canvas_id(body.canvas_id)?;
    let last = body
        .messages
        .last()
        .ok_or_else(|| ChatApiError::BadRequest("No message provided".to_string()))?;
    let text = message_text(last)
        .ok_or_else(|| ChatApiError::BadRequest("No message text found".to_string()))?;

    let canvas = match body.canvas_state.as_ref().map(CanvasState::from_loose_json) {
        Some(Ok(state)) => {
            runtime.saver.schedule(&canvas_id, state.clone()).await;
            state
        }
        Some(Err(e)) => {
            log::warn!("server: unreadable canvasState for {}: {}", canvas_id, e);
            runtime.canvases.state_or_initial(&canvas_id).await
        }
        None => runtime.canvases.state_or_initial(&canvas_id).await,
    };

    log::info!("server: chat turn for canvas {}", canvas_id);
    let request = NetworkRequest::new(canvas_id, text).with_canvas(canvas);
    let events = runtime
        .network
        .network(request)
        .await
        .map_err(|e| ChatApiError::Upstream {
            details: e.to_string(),
        })?;

    let stream = events.map(|event: StreamEvent| Ok::<Event, Infallible>(event.to_sse()));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn history(
    State(runtime): State<Arc<Runtime>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<UiMessage>>, ChatApiError> {
    let canvas_id = required_canvas_id(query.canvas_id)?;
    let messages = runtime
        .threads
        .history(&canvas_id)
        .await
        .iter()
        .map(|m| m.to_ui_message())
        .collect();
    Ok(Json(messages))
}

async fn list_canvases(State(runtime): State<Arc<Runtime>>) -> impl IntoResponse {
    Json(runtime.canvases.list().await)
}

async fn get_canvas(
    State(runtime): State<Arc<Runtime>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ChatApiError> {
    runtime
        .canvases
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| ChatApiError::NotFound(format!("canvas '{}'", id)))
}

async fn export_canvas(
    State(runtime): State<Arc<Runtime>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ChatApiError> {
    let record = runtime
        .canvases
        .get(&id)
        .await
        .ok_or_else(|| ChatApiError::NotFound(format!("canvas '{}'", id)))?;
    let body = record
        .state
        .to_pretty_json()
        .map_err(|e| ChatApiError::Storage(e.into()))?;
    let stem = kebab_case(&record.name);
    let disposition = format!(
        "attachment; filename=\"{}.json\"",
        if stem.is_empty() { "lean-canvas" } else { stem.as_str() }
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

async fn put_canvas(
    State(runtime): State<Arc<Runtime>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<StatusCode, ChatApiError> {
    let state = CanvasState::from_loose_json(&body)
        .map_err(|e| ChatApiError::BadRequest(format!("invalid canvas: {}", e)))?;
    runtime.saver.schedule(&id, state).await;
    Ok(StatusCode::ACCEPTED)
}

async fn rename_canvas(
    State(runtime): State<Arc<Runtime>>,
    Path(id): Path<String>,
    Json(body): Json<RenameRequest>,
) -> Result<StatusCode, ChatApiError> {
    if runtime.canvases.rename(&id, body.name.trim()).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ChatApiError::NotFound(format!("canvas '{}'", id)))
    }
}

async fn delete_canvas(
    State(runtime): State<Arc<Runtime>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ChatApiError> {
    if runtime.canvases.delete(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ChatApiError::NotFound(format!("canvas '{}'", id)))
    }
}

pub fn router(runtime: Arc<Runtime>) -> Router {
    Router::new()
        .route("/api/chat", get(history).post(chat))
        .route("/api/canvases", get(list_canvases))
        .route(
            "/api/canvases/{id}",
            get(get_canvas)
                .put(put_canvas)
                .patch(rename_canvas)
                .delete(delete_canvas),
        )
        .route("/api/canvases/{id}/export", get(export_canvas))
        .with_state(runtime)
}

/// Bind `config.bind_addr` and serve until Ctrl-C, then flush pending canvas saves.
pub async fn serve(
    runtime: Arc<Runtime>,
    config: &LeanCanvasConfig,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(&config.bind_addr).await?;
    serve_with_shutdown(runtime, listener, shutdown_signal()).await
}

/// Serve on `listener` until `signal` resolves. In-flight requests finish first, then every
/// debounced save still waiting is written.
pub async fn serve_with_shutdown(
    runtime: Arc<Runtime>,
    listener: TcpListener,
    signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    log::info!("server: listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(runtime.clone()))
        .with_graceful_shutdown(signal)
        .await?;

    log::info!("server: shutting down");
    let saved = runtime.saver.flush().await?;
    log::info!("server: flushed {} pending canvas save(s)", saved);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("server: could not listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
