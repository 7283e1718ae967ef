//! Streaming chat event contract.
//!
//! A chat turn is delivered as an ordered sequence of [`StreamEvent`]s over server-sent
//! events. The client folds them into render-ready [`UiMessage`]s with a
//! [`MessageAssembler`], and the [`Reconciler`](crate::reconciler::Reconciler) reads tool
//! steps out of those messages.
//!
//! # Event Flow (one turn with a delegation and a tool call)
//!
//! ```text
//! start { messageId }
//!   ├─ data-network { step: 0, agent "monetization-agent", running }
//!   ├─ data-network { step: 0, agent "monetization-agent", success, output }
//!   ├─ data-network { step: 1, tool "canvas_add_item", running }
//!   ├─ data-network { step: 1, tool "canvas_add_item", success, output: {changes: [...]} }
//!   ├─ text-delta { delta: "Here is..." }
//!   └─ text-delta { delta: " your pricing." }
//! finish { messageId }
//! ```
//!
//! Unrecognised event types decode to [`StreamEvent::Unknown`] and are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Whether a network step is a specialist consultation or a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Agent,
    Tool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Running,
    Success,
    Error,
}

/// One reasoning/progress step inside an assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStep {
    /// Position of the step within its turn.
    pub index: usize,
    /// Agent id or tool name.
    pub name: String,
    pub kind: StepKind,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl NetworkStep {
    pub fn running(index: usize, name: impl Into<String>, kind: StepKind, input: Option<Value>) -> Self {
        Self {
            index,
            name: name.into(),
            kind,
            status: StepStatus::Running,
            input,
            output: None,
        }
    }

    /// Mark the step finished with `output`.
    pub fn succeed(mut self, output: Value) -> Self {
        self.status = StepStatus::Success;
        self.output = Some(output);
        self
    }

    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.status = StepStatus::Error;
        self.output = Some(Value::String(error.into()));
        self
    }

    /// A step counts as complete when it succeeded or already carries output.
    ///
    /// Some producers never send an explicit success status.
    pub fn is_complete(&self) -> bool {
        if self.status == StepStatus::Success {
            return true;
        }
        match &self.output {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
            Some(_) => true,
        }
    }
}

/// Wire events of a streamed chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum StreamEvent {
    Start { message_id: String },
    TextDelta { message_id: String, delta: String },
    DataNetwork { message_id: String, step: NetworkStep },
    Finish { message_id: String },
    Error { message: String },
    #[serde(other)]
    Unknown,
}

impl StreamEvent {
    /// The `type` tag, also used as the SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Start { .. } => "start",
            StreamEvent::TextDelta { .. } => "text-delta",
            StreamEvent::DataNetwork { .. } => "data-network",
            StreamEvent::Finish { .. } => "finish",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Unknown => "unknown",
        }
    }

    pub fn message_id(&self) -> Option<&str> {
        match self {
            StreamEvent::Start { message_id }
            | StreamEvent::TextDelta { message_id, .. }
            | StreamEvent::DataNetwork { message_id, .. }
            | StreamEvent::Finish { message_id } => Some(message_id),
            StreamEvent::Error { .. } | StreamEvent::Unknown => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Finish { .. })
    }

    /// Encode as one SSE frame (`event: ...\ndata: ...\n\n`).
    pub fn to_sse_frame(&self) -> String {
        let data = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("event: {}\ndata: {}\n\n", self.kind(), data)
    }

    /// The same frame as an axum SSE event.
    #[cfg(feature = "server")]
    pub fn to_sse(&self) -> axum::response::sse::Event {
        let data = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        axum::response::sse::Event::default()
            .event(self.kind())
            .data(data)
    }
}

type NameStrategy = fn(&Value) -> Option<&str>;

fn payload_agent_name(v: &Value) -> Option<&str> {
    v.get("payload")?.get("agentName")?.as_str()
}

fn payload_name(v: &Value) -> Option<&str> {
    v.get("payload")?.get("name")?.as_str()
}

fn top_level_agent_name(v: &Value) -> Option<&str> {
    v.get("agentName")?.as_str()
}

fn top_level_name(v: &Value) -> Option<&str> {
    v.get("name")?.as_str()
}

fn data_name(v: &Value) -> Option<&str> {
    v.get("data")?.get("name")?.as_str()
}

/// Ordered strategies for pulling an agent name out of a loosely shaped envelope.
const AGENT_NAME_STRATEGIES: &[NameStrategy] = &[
    payload_agent_name,
    payload_name,
    top_level_agent_name,
    top_level_name,
    data_name,
];

/// Best-effort agent name from an arbitrary event envelope; `"unknown"` when nothing fits.
pub fn agent_name_of(envelope: &Value) -> String {
    AGENT_NAME_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(envelope).filter(|name| !name.is_empty()))
        .unwrap_or("unknown")
        .to_string()
}

/// `"monetization-agent"` → `"Monetization"`.
pub fn display_agent_name(agent_name: &str) -> String {
    let trimmed = agent_name
        .strip_suffix("-agent")
        .or_else(|| agent_name.strip_suffix("-Agent"))
        .unwrap_or(agent_name);
    trimmed
        .split('-')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Incremental decoder for the SSE wire format.
///
/// Bytes may arrive split anywhere, including inside a CRLF pair or a multi-byte
/// character; complete frames are emitted as they close.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every event whose frame is now complete.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..]
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')
        {
            let end = start + offset;
            let next = match (self.buffer[end], self.buffer.get(end + 1).copied()) {
                (b'\r', Some(b'\n')) => end + 2,
                // A trailing CR may be the first half of a CRLF.
                (b'\r', None) => break,
                _ => end + 1,
            };
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            start = next;
            if let Some(event) = self.accept_line(&line) {
                events.push(event);
            }
        }
        self.buffer.drain(..start);
        events
    }

    fn accept_line(&mut self, line: &str) -> Option<StreamEvent> {
        if line.is_empty() {
            let data = std::mem::take(&mut self.data);
            return Self::decode_frame(data);
        }
        if let Some(value) = line.strip_prefix("data:") {
            self.data
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        None
    }

    fn decode_frame(data: Vec<String>) -> Option<StreamEvent> {
        if data.is_empty() {
            return None;
        }
        let data = data.join("\n");
        if data.trim() == "[DONE]" {
            return None;
        }
        match serde_json::from_str::<StreamEvent>(&data) {
            Ok(event) => Some(event),
            Err(e) => {
                log::debug!("stream_event: undecodable frame ({}): {}", e, data);
                Some(StreamEvent::Unknown)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiRole {
    User,
    Assistant,
    System,
}

/// One renderable fragment of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiPart {
    Text { text: String },
    DataNetwork { data: NetworkStep },
    #[serde(other)]
    Unknown,
}

/// A chat message shaped for the UI: an id, a role and ordered parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiMessage {
    pub id: String,
    pub role: UiRole,
    #[serde(default)]
    pub parts: Vec<UiPart>,
}

impl UiMessage {
    pub fn text(id: impl Into<String>, role: UiRole, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            parts: vec![UiPart::Text { text: text.into() }],
        }
    }

    /// Concatenation of all text parts.
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                UiPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// `(part position, step)` for every network step in the message.
    pub fn steps(&self) -> impl Iterator<Item = (usize, &NetworkStep)> {
        self.parts.iter().enumerate().filter_map(|(i, part)| match part {
            UiPart::DataNetwork { data } => Some((i, data)),
            _ => None,
        })
    }
}

/// Folds a stream of events into [`UiMessage`]s.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    messages: Vec<UiMessage>,
    finished: HashSet<String>,
    last_error: Option<String>,
    synced: usize,
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing history (e.g. loaded from `GET /api/chat`).
    pub fn with_history(messages: Vec<UiMessage>) -> Self {
        let finished = messages.iter().map(|m| m.id.clone()).collect();
        Self {
            messages,
            finished,
            last_error: None,
            synced: 0,
        }
    }

    pub fn push_user(&mut self, id: impl Into<String>, text: impl Into<String>) {
        self.messages.push(UiMessage::text(id, UiRole::User, text));
    }

    fn assistant_mut(&mut self, message_id: &str) -> &mut UiMessage {
        let pos = match self.messages.iter().position(|m| m.id == message_id) {
            Some(pos) => pos,
            None => {
                self.messages.push(UiMessage {
                    id: message_id.to_string(),
                    role: UiRole::Assistant,
                    parts: Vec::new(),
                });
                self.messages.len() - 1
            }
        };
        &mut self.messages[pos]
    }

    /// Apply one event. Text deltas append in arrival order; a step that shares an index
    /// with an earlier step of the same message replaces it in place.
    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Start { message_id } => {
                self.assistant_mut(message_id);
            }
            StreamEvent::TextDelta { message_id, delta } => {
                let message = self.assistant_mut(message_id);
                match message.parts.last_mut() {
                    Some(UiPart::Text { text }) => text.push_str(delta),
                    _ => message.parts.push(UiPart::Text {
                        text: delta.clone(),
                    }),
                }
            }
            StreamEvent::DataNetwork { message_id, step } => {
                let message = self.assistant_mut(message_id);
                let existing = message.parts.iter_mut().find_map(|part| match part {
                    UiPart::DataNetwork { data } if data.index == step.index => Some(data),
                    _ => None,
                });
                match existing {
                    Some(data) => *data = step.clone(),
                    None => message.parts.push(UiPart::DataNetwork { data: step.clone() }),
                }
            }
            StreamEvent::Finish { message_id } => {
                self.finished.insert(message_id.clone());
            }
            StreamEvent::Error { message } => {
                self.last_error = Some(message.clone());
            }
            StreamEvent::Unknown => {}
        }
    }

    /// Fold a growing event log. Events already folded by an earlier call are skipped, so
    /// the same prefix can be passed any number of times.
    pub fn sync(&mut self, events: &[StreamEvent]) {
        if events.len() < self.synced {
            log::warn!(
                "stream_event: event log shrank from {} to {}, ignoring",
                self.synced,
                events.len()
            );
            return;
        }
        for event in &events[self.synced..] {
            self.apply(event);
        }
        self.synced = events.len();
    }

    pub fn messages(&self) -> &[UiMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<UiMessage> {
        self.messages
    }

    pub fn is_finished(&self, message_id: &str) -> bool {
        self.finished.contains(message_id)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_event_types_decode() {
        let event: StreamEvent =
            serde_json::from_value(json!({"type": "tool-input-start", "foo": 1})).unwrap();
        assert_eq!(event, StreamEvent::Unknown);
    }

    #[test]
    fn agent_name_strategies_in_order() {
        assert_eq!(
            agent_name_of(&json!({"payload": {"agentName": "a", "name": "b"}})),
            "a"
        );
        assert_eq!(agent_name_of(&json!({"payload": {"name": "b"}})), "b");
        assert_eq!(agent_name_of(&json!({"data": {"name": "c"}})), "c");
        assert_eq!(agent_name_of(&json!({"payload": {"agentName": ""}})), "unknown");
        assert_eq!(agent_name_of(&json!(42)), "unknown");
    }

    #[test]
    fn display_names() {
        assert_eq!(display_agent_name("monetization-agent"), "Monetization");
        assert_eq!(display_agent_name("customer-insight-agent"), "Customer Insight");
    }

    #[test]
    fn decoder_handles_split_frames() {
        let frame = StreamEvent::TextDelta {
            message_id: "m1".into(),
            delta: "Hello".into(),
        }
        .to_sse_frame();
        let (a, b) = frame.split_at(10);

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(a.as_bytes()).is_empty());
        let events = decoder.push(b.as_bytes());
        assert_eq!(
            events,
            vec![StreamEvent::TextDelta {
                message_id: "m1".into(),
                delta: "Hello".into()
            }]
        );
        assert!(decoder.push(b"data: [DONE]\n\n").is_empty());
    }

    #[test]
    fn decoder_handles_crlf_split_across_chunks() {
        let start = r#"data: {"type":"start","messageId":"m1"}"#;
        let finish = r#"data: {"type":"finish","messageId":"m1"}"#;

        let mut decoder = SseDecoder::new();
        let mut events = decoder.push(format!("{}\r\n\r", start).as_bytes());
        events.extend(decoder.push(format!("\n{}\r\n\r\n", finish).as_bytes()));
        assert_eq!(
            events,
            vec![
                StreamEvent::Start { message_id: "m1".into() },
                StreamEvent::Finish { message_id: "m1".into() },
            ]
        );

        let mut cr_only = SseDecoder::new();
        let events = cr_only.push(format!("{}\r\r{}\r\r", start, finish).as_bytes());
        assert_eq!(events.len(), 1);
        assert_eq!(cr_only.push(b"x").len(), 1);
    }

    #[test]
    fn decoder_handles_multibyte_characters_split_across_chunks() {
        let frame = StreamEvent::TextDelta {
            message_id: "m1".into(),
            delta: "café ☕".into(),
        }
        .to_sse_frame();
        let bytes = frame.as_bytes();
        let cut = frame.find('☕').unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..cut]).is_empty());
        assert_eq!(
            decoder.push(&bytes[cut..]),
            vec![StreamEvent::TextDelta {
                message_id: "m1".into(),
                delta: "café ☕".into()
            }]
        );
    }

    #[test]
    fn sync_skips_events_already_folded() {
        let mut log = vec![
            StreamEvent::Start { message_id: "m1".into() },
            StreamEvent::TextDelta { message_id: "m1".into(), delta: "Hello".into() },
        ];

        let mut assembler = MessageAssembler::new();
        assembler.sync(&log);
        assembler.sync(&log);
        assert_eq!(assembler.messages()[0].text_content(), "Hello");

        log.push(StreamEvent::TextDelta { message_id: "m1".into(), delta: " world".into() });
        log.push(StreamEvent::Finish { message_id: "m1".into() });
        assembler.sync(&log);
        assembler.sync(&log[..2]);
        assert_eq!(assembler.messages().len(), 1);
        assert_eq!(assembler.messages()[0].text_content(), "Hello world");
        assert!(assembler.is_finished("m1"));
    }

    #[test]
    fn assembler_builds_messages() {
        let mut assembler = MessageAssembler::new();
        assembler.push_user("u1", "Help me price this");
        let step = NetworkStep::running(0, "canvas_add_item", StepKind::Tool, None);
        for event in [
            StreamEvent::Start { message_id: "m1".into() },
            StreamEvent::TextDelta { message_id: "m1".into(), delta: "Hi".into() },
            StreamEvent::TextDelta { message_id: "m1".into(), delta: " there".into() },
            StreamEvent::DataNetwork { message_id: "m1".into(), step: step.clone() },
            StreamEvent::DataNetwork {
                message_id: "m1".into(),
                step: step.clone().succeed(json!({"changes": []})),
            },
            StreamEvent::Unknown,
            StreamEvent::Finish { message_id: "m1".into() },
        ] {
            assembler.apply(&event);
        }

        let messages = assembler.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].text_content(), "Hi there");
        let steps: Vec<_> = messages[1].steps().collect();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].1.status, StepStatus::Success);
        assert!(assembler.is_finished("m1"));
    }

    #[test]
    fn step_completeness() {
        let step = NetworkStep::running(0, "t", StepKind::Tool, None);
        assert!(!step.is_complete());
        let mut with_output = step.clone();
        with_output.output = Some(json!("done"));
        assert!(with_output.is_complete());
        assert!(step.succeed(Value::Null).is_complete());
    }
}
