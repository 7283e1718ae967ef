//! Observability hooks for the agent network.
//!
//! The network reports its progress to an optional [`EventHandler`]. These events are for
//! operators (logs, metrics); the client-facing stream is
//! [`StreamEvent`](crate::stream_event::StreamEvent).
//!
//! # Event Flow (one turn)
//!
//! ```text
//! TurnStarted
//!   ├─ LLMCallStarted { step: 1 }
//!   ├─ LLMCallCompleted { step: 1 }
//!   ├─ DelegationStarted / DelegationCompleted   (specialist consulted)
//!   ├─ ToolCallDetected / ToolExecutionCompleted (canvas tool invoked)
//!   └─ ... up to max_steps
//! TurnCompleted | TurnFailed
//! ```
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use leancanvas::event::{EventHandler, NetworkEvent};
//!
//! struct CountingHandler(std::sync::atomic::AtomicUsize);
//!
//! #[async_trait]
//! impl EventHandler for CountingHandler {
//!     async fn on_network_event(&self, _event: &NetworkEvent) {
//!         self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
//!     }
//! }
//! ```

use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    TurnStarted {
        thread_id: String,
        message_id: String,
        /// First ~120 characters of the user message.
        message_preview: String,
    },
    /// Before each orchestrator round-trip. `step` is 1-based.
    LLMCallStarted { agent_id: String, step: usize },
    LLMCallCompleted {
        agent_id: String,
        step: usize,
        response_length: usize,
    },
    DelegationStarted {
        specialist: String,
        task_preview: String,
    },
    DelegationCompleted {
        specialist: String,
        success: bool,
        response_length: usize,
    },
    ToolCallDetected {
        tool_name: String,
        parameters: serde_json::Value,
    },
    ToolExecutionCompleted {
        tool_name: String,
        success: bool,
        error: Option<String>,
        changes: usize,
    },
    /// The orchestrator still wanted to act when the step budget ran out.
    MaxStepsReached { max_steps: usize },
    TurnCompleted {
        thread_id: String,
        message_id: String,
        steps: usize,
        elapsed: Duration,
    },
    TurnFailed {
        thread_id: String,
        message_id: String,
        error: String,
    },
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_network_event(&self, _event: &NetworkEvent) {}
}

/// Writes every event to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn on_network_event(&self, event: &NetworkEvent) {
        match event {
            NetworkEvent::TurnFailed { .. } => log::error!("network: {:?}", event),
            NetworkEvent::MaxStepsReached { .. } => log::warn!("network: {:?}", event),
            NetworkEvent::TurnStarted { .. } | NetworkEvent::TurnCompleted { .. } => {
                log::info!("network: {:?}", event)
            }
            _ => log::debug!("network: {:?}", event),
        }
    }
}

/// Truncate `text` to at most `max_chars` characters, appending `...` when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
