//! Orchestrator plus specialists, run as one streamed chat turn.
//!
//! Each turn the orchestrator is called up to `max_steps` times. A reply carrying a
//! `delegate` directive consults a specialist; a reply carrying a `tool_call` directive runs
//! a canvas tool. Both surface to the client as `data-network` steps (`running`, then
//! `success` or `error`) and their results are fed back to the orchestrator. The first reply
//! without a directive is the answer and is streamed as `text-delta` events.
//!
//! ```text
//! start
//!   ├─ data-network { 0, agent  "customer-insight-agent", running → success }
//!   ├─ data-network { 1, tool   "canvas_update_item",     running → success }
//!   └─ text-delta ...
//! finish
//! ```
//!
//! Events go to a bounded channel. When the receiver is dropped (client disconnect) the
//! producing task stops at its next send.

use crate::leancanvas::agent::{
    parse_delegation, parse_tool_call, strip_directives, AgentCapability, AgentError,
    AgentResponse, Delegation, NetworkRequest, StreamEventStream, ToolCall,
};
use crate::leancanvas::canvas_tools::CanvasToolProtocol;
use crate::leancanvas::client_wrapper::{
    ClientError, ClientWrapper, Message, MessageChunkStream, Role,
};
use crate::leancanvas::event::{preview, EventHandler, NetworkEvent};
use crate::leancanvas::memory::{ThreadMessage, ThreadStore};
use crate::leancanvas::reconciler::parse_changes;
use crate::leancanvas::specialists;
use crate::leancanvas::stream_event::{NetworkStep, StepKind, StreamEvent};
use crate::leancanvas::think::strip_think_blocks;
use crate::leancanvas::tool_protocol::ToolRegistry;
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

pub const DEFAULT_MAX_STEPS: usize = 3;
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum NetworkError {
    /// The turn could not be set up (tool listing, context).
    Setup(String),
    /// The orchestrator's model call failed.
    Upstream(String),
    /// The event receiver is gone.
    Disconnected,
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::Setup(msg) => write!(f, "could not start turn: {}", msg),
            NetworkError::Upstream(msg) => write!(f, "orchestrator call failed: {}", msg),
            NetworkError::Disconnected => write!(f, "client disconnected"),
        }
    }
}

impl std::error::Error for NetworkError {}

/// A turn with its tools and opening messages assembled.
struct PreparedTurn {
    request: NetworkRequest,
    registry: ToolRegistry,
    messages: Vec<Message>,
    max_steps: usize,
}

#[derive(Clone)]
pub struct AgentNetwork {
    orchestrator: Arc<dyn AgentCapability>,
    specialists: Arc<BTreeMap<String, Arc<dyn AgentCapability>>>,
    threads: Arc<ThreadStore>,
    max_steps: usize,
    events: Option<Arc<dyn EventHandler>>,
}

impl AgentNetwork {
    pub fn new(orchestrator: Arc<dyn AgentCapability>, threads: Arc<ThreadStore>) -> Self {
        Self {
            orchestrator,
            specialists: Arc::new(BTreeMap::new()),
            threads,
            max_steps: DEFAULT_MAX_STEPS,
            events: None,
        }
    }

    /// The Lean Canvas orchestrator with all five specialists on one client.
    pub fn lean_canvas(client: Arc<dyn ClientWrapper>, threads: Arc<ThreadStore>) -> Self {
        Self::new(Arc::new(specialists::orchestrator(client.clone())), threads)
            .with_specialists(specialists::default_specialists(client))
    }

    pub fn with_specialist(mut self, specialist: Arc<dyn AgentCapability>) -> Self {
        Arc::make_mut(&mut self.specialists).insert(specialist.id().to_string(), specialist);
        self
    }

    pub fn with_specialists(
        self,
        specialists: impl IntoIterator<Item = Arc<dyn AgentCapability>>,
    ) -> Self {
        specialists
            .into_iter()
            .fold(self, |network, specialist| network.with_specialist(specialist))
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.events = Some(handler);
        self
    }

    pub fn threads(&self) -> &Arc<ThreadStore> {
        &self.threads
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn specialist_ids(&self) -> Vec<&str> {
        self.specialists.keys().map(String::as_str).collect()
    }

    async fn emit(&self, event: NetworkEvent) {
        if let Some(handler) = &self.events {
            handler.on_network_event(&event).await;
        }
    }

    fn routing_prompt(&self, registry: &ToolRegistry) -> String {
        let mut prompt = String::new();
        if !self.specialists.is_empty() {
            prompt.push_str("## Specialists\n\nYou can consult these specialists:\n");
            for (id, specialist) in self.specialists.iter() {
                prompt.push_str(&format!("- {}: {}\n", id, specialist.description()));
            }
            prompt.push_str(
                "\nTo consult a specialist, respond with a JSON object in the following format:\n\
                 {\"delegate\": {\"agent\": \"specialist-id\", \"task\": \"what you need from them\"}}\n\
                 Their answer will be returned to you.\n\n",
            );
        }
        prompt.push_str(&registry.describe_tools());
        prompt.push_str(
            "\nWhen you have what you need, answer the user in plain text without any JSON directive.\n",
        );
        prompt
    }

    async fn prepare(&self, request: NetworkRequest) -> Result<PreparedTurn, NetworkError> {
        let protocol = match &request.canvas {
            Some(canvas) => CanvasToolProtocol::with_canvas(canvas.clone()),
            None => CanvasToolProtocol::new(),
        };
        let registry = ToolRegistry::from_protocol(Arc::new(protocol))
            .await
            .map_err(|e| NetworkError::Setup(e.to_string()))?;

        let mut messages = vec![Message::system(self.routing_prompt(&registry))];
        if let Some(canvas) = &request.canvas {
            messages.push(Message::system(canvas.to_prompt_context()));
        }
        messages.extend(
            self.threads
                .history(&request.thread_id)
                .await
                .iter()
                .map(ThreadMessage::to_message),
        );
        messages.push(Message::user(request.message.clone()));

        let max_steps = request.max_steps.unwrap_or(self.max_steps).max(1);
        Ok(PreparedTurn {
            request,
            registry,
            messages,
            max_steps,
        })
    }

    async fn send(
        tx: &mpsc::Sender<StreamEvent>,
        event: StreamEvent,
    ) -> Result<(), NetworkError> {
        tx.send(event).await.map_err(|_| NetworkError::Disconnected)
    }

    async fn send_step(
        tx: &mpsc::Sender<StreamEvent>,
        message_id: &str,
        step: NetworkStep,
    ) -> Result<(), NetworkError> {
        Self::send(
            tx,
            StreamEvent::DataNetwork {
                message_id: message_id.to_string(),
                step,
            },
        )
        .await
    }

    async fn call_orchestrator(
        &self,
        messages: &[Message],
        step: usize,
    ) -> Result<AgentResponse, NetworkError> {
        let agent_id = self.orchestrator.id().to_string();
        self.emit(NetworkEvent::LLMCallStarted {
            agent_id: agent_id.clone(),
            step,
        })
        .await;
        let response = self
            .orchestrator
            .generate(messages)
            .await
            .map_err(|e| NetworkError::Upstream(e.to_string()))?;
        self.emit(NetworkEvent::LLMCallCompleted {
            agent_id,
            step,
            response_length: response.content.len(),
        })
        .await;
        Ok(response)
    }

    /// Ask a specialist; returns the note fed back to the orchestrator.
    async fn consult(
        &self,
        turn: &PreparedTurn,
        delegation: Delegation,
        index: usize,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<String, NetworkError> {
        let message_id = &turn.request.message_id;
        let running = NetworkStep::running(
            index,
            delegation.agent.clone(),
            StepKind::Agent,
            Some(json!({ "task": delegation.task })),
        );
        Self::send_step(tx, message_id, running.clone()).await?;
        self.emit(NetworkEvent::DelegationStarted {
            specialist: delegation.agent.clone(),
            task_preview: preview(&delegation.task, 120),
        })
        .await;

        let outcome = match self.specialists.get(&delegation.agent) {
            None => Err(AgentError::UnknownSpecialist(delegation.agent.clone()).to_string()),
            Some(specialist) => {
                let mut messages = Vec::new();
                if let Some(canvas) = &turn.request.canvas {
                    messages.push(Message::system(canvas.to_prompt_context()));
                }
                messages.push(Message::user(delegation.task.clone()));
                specialist
                    .generate(&messages)
                    .await
                    .map(|response| response.content)
                    .map_err(|e| e.to_string())
            }
        };

        let (step, note, success, length) = match outcome {
            Ok(content) => (
                running.succeed(json!({ "text": content })),
                format!("Specialist '{}' responded:\n{}", delegation.agent, content),
                true,
                content.len(),
            ),
            Err(error) => {
                log::warn!("network: delegation to {} failed: {}", delegation.agent, error);
                (
                    running.fail(error.clone()),
                    format!(
                        "Specialist '{}' is unavailable ({}). Available specialists: {}.",
                        delegation.agent,
                        error,
                        self.specialist_ids().join(", ")
                    ),
                    false,
                    0,
                )
            }
        };
        Self::send_step(tx, message_id, step).await?;
        self.emit(NetworkEvent::DelegationCompleted {
            specialist: delegation.agent,
            success,
            response_length: length,
        })
        .await;
        Ok(note)
    }

    /// Run a tool; returns the note fed back to the orchestrator.
    async fn call_tool(
        &self,
        turn: &PreparedTurn,
        call: ToolCall,
        index: usize,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<String, NetworkError> {
        let message_id = &turn.request.message_id;
        let running = NetworkStep::running(
            index,
            call.name.clone(),
            StepKind::Tool,
            Some(call.parameters.clone()),
        );
        Self::send_step(tx, message_id, running.clone()).await?;
        self.emit(NetworkEvent::ToolCallDetected {
            tool_name: call.name.clone(),
            parameters: call.parameters.clone(),
        })
        .await;

        let outcome = match turn
            .registry
            .execute_tool(&call.name, call.parameters)
            .await
        {
            Ok(result) if result.success => Ok(result.output),
            Ok(result) => Err(result
                .error
                .unwrap_or_else(|| "Unknown error".to_string())),
            Err(e) => Err(e.to_string()),
        };

        let (step, note, error, changes) = match outcome {
            Ok(output) => {
                let changes = parse_changes(Some(&output)).len();
                let note = format!(
                    "Tool '{}' executed successfully. Result: {}",
                    call.name,
                    serde_json::to_string_pretty(&output).unwrap_or_else(|_| output.to_string())
                );
                (running.succeed(output), note, None, changes)
            }
            Err(error) => {
                log::warn!("network: tool {} failed: {}", call.name, error);
                (
                    running.fail(error.clone()),
                    format!("Tool '{}' failed. Error: {}", call.name, error),
                    Some(error),
                    0,
                )
            }
        };
        Self::send_step(tx, message_id, step).await?;
        self.emit(NetworkEvent::ToolExecutionCompleted {
            tool_name: call.name,
            success: error.is_none(),
            error,
            changes,
        })
        .await;
        Ok(note)
    }

    async fn drive(
        &self,
        mut turn: PreparedTurn,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<(), NetworkError> {
        let started = Instant::now();
        let thread_id = turn.request.thread_id.clone();
        let message_id = turn.request.message_id.clone();

        self.emit(NetworkEvent::TurnStarted {
            thread_id: thread_id.clone(),
            message_id: message_id.clone(),
            message_preview: preview(&turn.request.message, 120),
        })
        .await;
        Self::send(
            tx,
            StreamEvent::Start {
                message_id: message_id.clone(),
            },
        )
        .await?;

        let mut steps = 0;
        let mut answer = None;
        for round in 1..=turn.max_steps {
            let reply = self.call_orchestrator(&turn.messages, round).await?.content;
            // Directives quoted inside <think> reasoning are not acted on.
            let visible = strip_think_blocks(&reply);

            let note = if let Some(delegation) = parse_delegation(&visible) {
                self.consult(&turn, delegation, steps, tx).await?
            } else if let Some(call) = parse_tool_call(&visible) {
                self.call_tool(&turn, call, steps, tx).await?
            } else {
                answer = Some(reply);
                break;
            };
            steps += 1;
            turn.messages.push(Message::assistant(reply));
            turn.messages.push(Message::user(note));
        }

        let answer = match answer {
            Some(answer) => answer,
            None => {
                self.emit(NetworkEvent::MaxStepsReached {
                    max_steps: turn.max_steps,
                })
                .await;
                turn.messages.push(Message::system(
                    "Step budget exhausted. Answer the user now in plain text, without tool calls or delegation.",
                ));
                let reply = self
                    .call_orchestrator(&turn.messages, turn.max_steps + 1)
                    .await?
                    .content;
                strip_directives(&reply)
            }
        };

        for piece in answer.split_inclusive('\n') {
            Self::send(
                tx,
                StreamEvent::TextDelta {
                    message_id: message_id.clone(),
                    delta: piece.to_string(),
                },
            )
            .await?;
        }

        let exchange = vec![
            ThreadMessage::new(
                format!("msg-{}", uuid::Uuid::new_v4()),
                Role::User,
                turn.request.message.clone(),
            ),
            ThreadMessage::new(message_id.clone(), Role::Assistant, answer),
        ];
        if let Err(e) = self.threads.append(&thread_id, exchange).await {
            log::warn!("network: could not store thread {}: {}", thread_id, e);
        }

        Self::send(
            tx,
            StreamEvent::Finish {
                message_id: message_id.clone(),
            },
        )
        .await?;
        self.emit(NetworkEvent::TurnCompleted {
            thread_id,
            message_id,
            steps,
            elapsed: started.elapsed(),
        })
        .await;
        Ok(())
    }

    /// Run one turn, writing its events to `tx`.
    pub async fn run_turn(
        &self,
        request: NetworkRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), NetworkError> {
        let turn = self.prepare(request).await?;
        self.drive(turn, &tx).await
    }
}

fn receiver_stream(rx: mpsc::Receiver<StreamEvent>) -> StreamEventStream {
    Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    }))
}

#[async_trait]
impl AgentCapability for AgentNetwork {
    fn id(&self) -> &str {
        self.orchestrator.id()
    }

    fn description(&self) -> &str {
        self.orchestrator.description()
    }

    async fn generate(&self, messages: &[Message]) -> Result<AgentResponse, ClientError> {
        self.orchestrator.generate(messages).await
    }

    async fn stream(&self, messages: &[Message]) -> Result<MessageChunkStream, ClientError> {
        self.orchestrator.stream(messages).await
    }

    /// Prepare the turn, then drive it on a spawned task. Setup failures are returned here;
    /// later failures arrive in-stream as an `error` event followed by `finish`.
    async fn network(
        &self,
        request: NetworkRequest,
    ) -> Result<StreamEventStream, ClientError> {
        let turn = self.prepare(request).await?;
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let network = self.clone();

        tokio::spawn(async move {
            let thread_id = turn.request.thread_id.clone();
            let message_id = turn.request.message_id.clone();
            match network.drive(turn, &tx).await {
                Ok(()) => {}
                Err(NetworkError::Disconnected) => {
                    log::info!("network: client left turn {} early", message_id);
                }
                Err(e) => {
                    log::error!("network: turn {} failed: {}", message_id, e);
                    network
                        .emit(NetworkEvent::TurnFailed {
                            thread_id,
                            message_id: message_id.clone(),
                            error: e.to_string(),
                        })
                        .await;
                    let _ = tx
                        .send(StreamEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                    let _ = tx.send(StreamEvent::Finish { message_id }).await;
                }
            }
        });

        Ok(receiver_stream(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leancanvas::agent::Agent;
    use futures_util::StreamExt;
    use std::sync::Mutex;

    /// Replies with scripted answers in order, then repeats the last one.
    struct ScriptedClient {
        replies: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
            })
        }
    }

    #[async_trait]
    impl ClientWrapper for ScriptedClient {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn send_message(&self, _messages: &[Message]) -> Result<Message, ClientError> {
            let mut replies = self.replies.lock().unwrap();
            let reply = if replies.len() > 1 {
                replies.pop().unwrap()
            } else {
                replies.last().cloned().unwrap_or_default()
            };
            Ok(Message::assistant(reply))
        }
    }

    fn network_with(replies: &[&str]) -> AgentNetwork {
        let client = ScriptedClient::new(replies);
        AgentNetwork::new(
            Arc::new(Agent::new("orchestrator", "routes", "route", client)),
            Arc::new(ThreadStore::in_memory()),
        )
    }

    #[tokio::test]
    async fn plain_answer_streams_text_and_finish() {
        let network = network_with(&["Hello\nthere"]);
        let events: Vec<StreamEvent> = network
            .network(NetworkRequest::new("c1", "hi"))
            .await
            .unwrap()
            .collect()
            .await;
        let kinds: Vec<&str> = events.iter().map(StreamEvent::kind).collect();
        assert_eq!(kinds, vec!["start", "text-delta", "text-delta", "finish"]);
        assert_eq!(network.threads().history("c1").await.len(), 2);
    }

    #[tokio::test]
    async fn tool_call_surfaces_as_step() {
        let network = network_with(&[
            r#"{"tool_call": {"name": "canvas_add_item", "parameters": {"sectionId": "channels", "value": "Forums"}}}"#,
            "Added a channel.",
        ]);
        let events: Vec<StreamEvent> = network
            .network(NetworkRequest::new("c1", "add a channel"))
            .await
            .unwrap()
            .collect()
            .await;
        let steps: Vec<&NetworkStep> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::DataNetwork { step, .. } => Some(step),
                _ => None,
            })
            .collect();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].kind, StepKind::Tool);
        assert!(steps[1].is_complete());
        assert_eq!(parse_changes(steps[1].output.as_ref()).len(), 1);
    }

    #[tokio::test]
    async fn unknown_specialist_is_an_error_step() {
        let network = network_with(&[
            r#"{"delegate": {"agent": "nobody", "task": "help"}}"#,
            "Moving on.",
        ]);
        let events: Vec<StreamEvent> = network
            .network(NetworkRequest::new("c1", "hi"))
            .await
            .unwrap()
            .collect()
            .await;
        let failed = events.iter().any(|e| {
            matches!(e, StreamEvent::DataNetwork { step, .. }
                if step.status == crate::leancanvas::stream_event::StepStatus::Error)
        });
        assert!(failed);
        assert!(events.last().map_or(false, StreamEvent::is_terminal));
    }

    #[tokio::test]
    async fn directives_inside_reasoning_are_ignored() {
        let network = network_with(&[
            "<think>maybe {\"delegate\": {\"agent\": \"x\", \"task\": \"y\"}}</think>Just answering.",
        ]);
        let events: Vec<StreamEvent> = network
            .network(NetworkRequest::new("c1", "hi"))
            .await
            .unwrap()
            .collect()
            .await;
        assert!(!events
            .iter()
            .any(|e| matches!(e, StreamEvent::DataNetwork { .. })));
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::TextDelta { delta, .. } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert!(text.starts_with("<think>"));
        assert!(text.ends_with("Just answering."));
    }

    #[tokio::test]
    async fn step_budget_forces_an_answer() {
        let looping = r#"{"tool_call": {"name": "canvas_analyze", "parameters": {"analysisType": "summary"}}}"#;
        let network = network_with(&[looping]).with_max_steps(2);
        let events: Vec<StreamEvent> = network
            .network(NetworkRequest::new("c1", "loop"))
            .await
            .unwrap()
            .collect()
            .await;
        let step_events = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::DataNetwork { .. }))
            .count();
        assert_eq!(step_events, 4);
        assert_eq!(events.last().map(StreamEvent::kind), Some("finish"));
    }
}
