//! Agents: one LLM persona each, behind the [`AgentCapability`] interface.
//!
//! An [`Agent`] pairs instructions with a [`ClientWrapper`]. Anything that can answer a
//! prompt implements [`AgentCapability`]; the [`AgentNetwork`](crate::network::AgentNetwork)
//! additionally implements [`AgentCapability::network`] to run a full multi-agent turn.
//! [`LoggedAgent`] wraps any capability and reports each call through `log`.
//!
//! The orchestrator talks to the network through two JSON directives embedded in its reply:
//!
//! ```text
//! {"delegate": {"agent": "monetization-agent", "task": "Propose pricing tiers"}}
//! {"tool_call": {"name": "canvas_add_item", "parameters": {"sectionId": "channels", "value": "Dev forums"}}}
//! ```

use crate::leancanvas::canvas::CanvasState;
use crate::leancanvas::client_wrapper::{
    ClientError, ClientWrapper, Message, MessageChunkStream, Role, TokenUsage,
};
use crate::leancanvas::event::preview;
use crate::leancanvas::stream_event::StreamEvent;
use async_trait::async_trait;
use futures_util::Stream;
use serde_json::Value;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Reply produced by [`AgentCapability::generate`].
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub content: String,
    pub tokens_used: Option<TokenUsage>,
}

/// Everything needed to run one network turn.
#[derive(Debug, Clone)]
pub struct NetworkRequest {
    /// Conversation thread, one per canvas id.
    pub thread_id: String,
    /// Id of the assistant message this turn produces.
    pub message_id: String,
    /// The user's message text.
    pub message: String,
    /// Current canvas, injected as system context and read by `canvas_analyze`.
    pub canvas: Option<CanvasState>,
    /// Step budget override; the network default applies when `None`.
    pub max_steps: Option<usize>,
}

impl NetworkRequest {
    pub fn new(thread_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            message_id: format!("msg-{}", uuid::Uuid::new_v4()),
            message: message.into(),
            canvas: None,
            max_steps: None,
        }
    }

    pub fn with_canvas(mut self, canvas: CanvasState) -> Self {
        self.canvas = Some(canvas);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    /// The messages a turn starts from, as [`LoggedAgent`] reports them.
    pub fn preview_messages(&self) -> Vec<Message> {
        let mut messages = Vec::new();
        if let Some(canvas) = &self.canvas {
            messages.push(Message::system(canvas.to_prompt_context()));
        }
        messages.push(Message::user(self.message.clone()));
        messages
    }
}

pub type StreamEventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

#[derive(Debug, Clone, PartialEq)]
pub enum AgentError {
    /// The capability has no multi-agent mode.
    NetworkUnsupported(String),
    UnknownSpecialist(String),
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::NetworkUnsupported(id) => {
                write!(f, "agent '{}' does not support network mode", id)
            }
            AgentError::UnknownSpecialist(id) => write!(f, "unknown specialist '{}'", id),
        }
    }
}

impl std::error::Error for AgentError {}

#[async_trait]
pub trait AgentCapability: Send + Sync {
    /// Stable identifier, e.g. `"monetization-agent"`.
    fn id(&self) -> &str;

    /// One-line summary shown to the orchestrator when it picks a specialist.
    fn description(&self) -> &str;

    async fn generate(&self, messages: &[Message]) -> Result<AgentResponse, ClientError>;

    async fn stream(&self, messages: &[Message]) -> Result<MessageChunkStream, ClientError>;

    /// Run a full multi-agent turn, yielding the client event stream.
    async fn network(&self, _request: NetworkRequest) -> Result<StreamEventStream, ClientError> {
        Err(AgentError::NetworkUnsupported(self.id().to_string()).into())
    }
}

/// A single LLM persona.
pub struct Agent {
    pub id: String,
    pub description: String,
    pub instructions: String,
    client: Arc<dyn ClientWrapper>,
}

impl Agent {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        instructions: impl Into<String>,
        client: Arc<dyn ClientWrapper>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            instructions: instructions.into(),
            client,
        }
    }

    pub fn client(&self) -> &Arc<dyn ClientWrapper> {
        &self.client
    }

    fn with_instructions(&self, messages: &[Message]) -> Vec<Message> {
        let mut full = Vec::with_capacity(messages.len() + 1);
        full.push(Message::system(self.instructions.trim()));
        full.extend_from_slice(messages);
        full
    }
}

#[async_trait]
impl AgentCapability for Agent {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn generate(&self, messages: &[Message]) -> Result<AgentResponse, ClientError> {
        let reply = self
            .client
            .send_message(&self.with_instructions(messages))
            .await?;
        Ok(AgentResponse {
            content: reply.content,
            tokens_used: self.client.get_last_usage(),
        })
    }

    async fn stream(&self, messages: &[Message]) -> Result<MessageChunkStream, ClientError> {
        self.client
            .send_message_stream(&self.with_instructions(messages))
            .await
    }
}

/// Decorator that logs every call made through the wrapped capability.
pub struct LoggedAgent<A> {
    inner: A,
}

impl<A: AgentCapability> LoggedAgent<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    fn log_messages(&self, messages: &[Message]) {
        let (system, conversation): (Vec<&Message>, Vec<&Message>) =
            messages.iter().partition(|m| m.role == Role::System);

        if !system.is_empty() {
            log::info!("[Agent: {}] context messages ({}):", self.inner.id(), system.len());
            for (i, msg) in system.iter().enumerate() {
                log::info!("  {}. {}", i + 1, preview(&msg.content, 200));
            }
        }
        if !conversation.is_empty() {
            log::info!(
                "[Agent: {}] conversation messages ({}):",
                self.inner.id(),
                conversation.len()
            );
            let skip = conversation.len().saturating_sub(3);
            for (i, msg) in conversation.iter().skip(skip).enumerate() {
                log::info!(
                    "  {}. [{}]: {}",
                    i + 1,
                    msg.role.as_str(),
                    preview(&msg.content, 100)
                );
            }
        }
    }
}

#[async_trait]
impl<A: AgentCapability> AgentCapability for LoggedAgent<A> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    async fn generate(&self, messages: &[Message]) -> Result<AgentResponse, ClientError> {
        log::info!("[Agent: {}] starting generation", self.id());
        self.log_messages(messages);
        let started = Instant::now();
        match self.inner.generate(messages).await {
            Ok(response) => {
                log::info!(
                    "[Agent: {}] generation completed in {}ms ({} chars)",
                    self.id(),
                    started.elapsed().as_millis(),
                    response.content.len()
                );
                log::debug!("[Agent: {}] reply: {}", self.id(), response.content);
                Ok(response)
            }
            Err(e) => {
                log::error!(
                    "[Agent: {}] generation failed after {}ms: {}",
                    self.id(),
                    started.elapsed().as_millis(),
                    e
                );
                Err(e)
            }
        }
    }

    async fn stream(&self, messages: &[Message]) -> Result<MessageChunkStream, ClientError> {
        log::info!("[Agent: {}] starting stream", self.id());
        self.log_messages(messages);
        match self.inner.stream(messages).await {
            Ok(stream) => {
                log::info!("[Agent: {}] stream started", self.id());
                Ok(stream)
            }
            Err(e) => {
                log::error!("[Agent: {}] stream failed: {}", self.id(), e);
                Err(e)
            }
        }
    }

    async fn network(&self, request: NetworkRequest) -> Result<StreamEventStream, ClientError> {
        let separator = "=".repeat(60);
        log::info!("{}", separator);
        log::info!(
            "[Agent: {}] starting network request (thread {})",
            self.id(),
            request.thread_id
        );
        self.log_messages(&request.preview_messages());

        let started = Instant::now();
        let result = self.inner.network(request).await;
        match &result {
            Ok(_) => log::info!(
                "[Agent: {}] network request completed in {}ms",
                self.id(),
                started.elapsed().as_millis()
            ),
            Err(e) => log::error!(
                "[Agent: {}] network request failed after {}ms: {}",
                self.id(),
                started.elapsed().as_millis(),
                e
            ),
        }
        log::info!("{}", separator);
        result
    }
}

/// A parsed `{"tool_call": {...}}` directive.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub parameters: Value,
}

/// A parsed `{"delegate": {...}}` directive.
#[derive(Debug, Clone, PartialEq)]
pub struct Delegation {
    pub agent: String,
    pub task: String,
}

/// Byte range of the balanced JSON object starting at `start`, skipping braces in strings.
fn balanced_object_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// Find the first `{"<key>": ...}` object in `text` and return its `<key>` value.
fn find_directive(text: &str, key: &str) -> Option<(Value, std::ops::Range<usize>)> {
    let needle = format!("\"{}\"", key);
    let mut search_from = 0;
    while let Some(found) = text[search_from..].find(&needle) {
        let key_at = search_from + found;
        // Walk back over whitespace to the opening brace.
        let open = text[..key_at].trim_end().len().checked_sub(1);
        if let Some(open) = open.filter(|&i| text.as_bytes()[i] == b'{') {
            if let Some(end) = balanced_object_end(text, open) {
                if let Ok(parsed) = serde_json::from_str::<Value>(&text[open..end]) {
                    if let Some(inner) = parsed.get(key) {
                        return Some((inner.clone(), open..end));
                    }
                }
            }
        }
        search_from = key_at + needle.len();
    }
    None
}

pub fn parse_tool_call(response: &str) -> Option<ToolCall> {
    let (inner, _) = find_directive(response, "tool_call")?;
    let name = inner.get("name")?.as_str()?.to_string();
    let parameters = inner
        .get("parameters")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));
    Some(ToolCall { name, parameters })
}

pub fn parse_delegation(response: &str) -> Option<Delegation> {
    let (inner, _) = find_directive(response, "delegate")?;
    let agent = inner.get("agent")?.as_str()?.trim().to_string();
    let task = inner
        .get("task")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if agent.is_empty() {
        return None;
    }
    Some(Delegation { agent, task })
}

/// `response` with every `tool_call` and `delegate` directive removed.
pub fn strip_directives(response: &str) -> String {
    let mut text = response.to_string();
    for key in ["tool_call", "delegate"] {
        while let Some((_, range)) = find_directive(&text, key) {
            text.replace_range(range, "");
        }
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tool_call_with_nested_braces() {
        let reply = r#"Adding it now. {"tool_call": {"name": "canvas_add_item", "parameters": {"sectionId": "channels", "value": "Forums {dev}"}}} done"#;
        let call = parse_tool_call(reply).unwrap();
        assert_eq!(call.name, "canvas_add_item");
        assert_eq!(call.parameters, json!({"sectionId": "channels", "value": "Forums {dev}"}));
    }

    #[test]
    fn parses_delegation() {
        let reply = "Let me check.\n{ \"delegate\": {\"agent\": \"edge-auditor-agent\", \"task\": \"Audit the moat\"} }";
        let delegation = parse_delegation(reply).unwrap();
        assert_eq!(delegation.agent, "edge-auditor-agent");
        assert_eq!(delegation.task, "Audit the moat");
        assert!(parse_tool_call(reply).is_none());
    }

    #[test]
    fn ignores_malformed_directives() {
        assert!(parse_tool_call(r#"{"tool_call": {"parameters": {}}}"#).is_none());
        assert!(parse_tool_call(r#"{"tool_call": {"name": "x""#).is_none());
        assert!(parse_delegation("no directive here").is_none());
        assert!(parse_delegation(r#"{"delegate": {"agent": ""}}"#).is_none());
    }

    #[test]
    fn strips_directives() {
        let reply = r#"Here you go. {"tool_call": {"name": "canvas_analyze", "parameters": {"analysisType": "summary"}}}"#;
        assert_eq!(strip_directives(reply), "Here you go.");
    }

    #[test]
    fn preview_messages_include_canvas() {
        let request = NetworkRequest::new("canvas-1", "hi").with_canvas(CanvasState::initial());
        let messages = request.preview_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(request.message_id.starts_with("msg-"));
    }
}
