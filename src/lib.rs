//! # leancanvas
//!
//! Backend for co-authoring a Lean Canvas with a team of AI advisors.
//!
//! The crate is layered bottom-up:
//!
//! * **Canvas model**: [`CanvasState`] and the pure edit functions in [`mutation`]
//! * **Change descriptors**: [`ChangeDescriptor`] records emitted by canvas tools, and the
//!   [`Reconciler`] that applies each tool step to the canvas exactly once
//! * **Event contract**: [`StreamEvent`], the `start` / `text-delta` / `data-network` /
//!   `finish` / `error` records a chat turn streams to the client, plus [`think`] for
//!   separating `<think>` reasoning from visible text
//! * **Agents**: [`ClientWrapper`] for model access, [`Agent`] and [`LoggedAgent`] for
//!   personas, and [`AgentNetwork`] which routes a turn between the orchestrator, five
//!   specialists and the canvas tools
//! * **Storage and serving**: [`memory::ThreadStore`], [`canvas_store::CanvasStore`],
//!   the process-wide [`runtime`] and, on the `server` feature, the axum [`server`]
//!
//! ## Applying tool steps
//!
//! ```rust
//! use leancanvas::{CanvasState, ChangeDescriptor, Reconciler};
//! use leancanvas::stream_event::{NetworkStep, StepKind, UiMessage, UiPart, UiRole};
//! use serde_json::json;
//!
//! let step = NetworkStep::running(0, "canvas_add_item", StepKind::Tool, None).succeed(json!({
//!     "changes": [ChangeDescriptor::add("solution", "Shared checklist")],
//!     "message": "Added item to section solution"
//! }));
//! let mut message = UiMessage::text("msg-1", UiRole::Assistant, "");
//! message.parts.push(UiPart::DataNetwork { data: step });
//!
//! let mut reconciler = Reconciler::new();
//! let first = reconciler.reconcile(&[message.clone()], &CanvasState::initial());
//! assert_eq!(first.changes_applied, 1);
//!
//! // Replaying the same history applies nothing new.
//! let again = reconciler.reconcile(&[message], &first.canvas);
//! assert!(!again.changed());
//! ```
//!
//! ## Running the server
//!
//! ```rust,no_run
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     leancanvas::init_logger();
//!
//!     let runtime = leancanvas::runtime::get().await;
//!     let config = runtime.config.clone();
//!     leancanvas::server::serve(runtime, &config).await
//! }
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Honours `RUST_LOG`; repeated calls are no-ops.
///
/// ```rust
/// leancanvas::init_logger();
/// leancanvas::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

pub mod leancanvas;

pub use leancanvas::{
    agent, canvas, canvas_store, canvas_tools, change, client_wrapper, clients, config, event,
    memory, mutation, network, reconciler, runtime, specialists, stream_event, think,
    tool_protocol,
};
#[cfg(feature = "server")]
pub use leancanvas::server;

pub use leancanvas::agent::{Agent, AgentCapability, LoggedAgent, NetworkRequest};
pub use leancanvas::canvas::{CanvasSection, CanvasState, MAX_ITEMS};
pub use leancanvas::change::ChangeDescriptor;
pub use leancanvas::client_wrapper::{ClientWrapper, Message, Role};
pub use leancanvas::config::LeanCanvasConfig;
pub use leancanvas::network::AgentNetwork;
pub use leancanvas::reconciler::Reconciler;
pub use leancanvas::stream_event::StreamEvent;
