use async_trait::async_trait;
use futures_util::StreamExt;
use leancanvas::client_wrapper::{ClientError, ClientWrapper, Message, Role};
use leancanvas::memory::ThreadStore;
use leancanvas::reconciler::Reconciler;
use leancanvas::specialists::CUSTOMER_INSIGHT_ID;
use leancanvas::stream_event::{MessageAssembler, StepKind, StepStatus, StreamEvent};
use leancanvas::{AgentCapability, AgentNetwork, CanvasState, LoggedAgent, NetworkRequest};
use std::sync::{Arc, Mutex};

/// Plays back replies in order and records every conversation it was sent.
struct MockClient {
    replies: Mutex<Vec<String>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl MockClient {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClientWrapper for MockClient {
    fn model_name(&self) -> &str {
        "mock"
    }

    async fn send_message(&self, messages: &[Message]) -> Result<Message, ClientError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        match self.replies.lock().unwrap().pop() {
            Some(reply) => Ok(Message::assistant(reply)),
            None => Err("mock client ran out of replies".into()),
        }
    }
}

async fn collect(network: &AgentNetwork, request: NetworkRequest) -> Vec<StreamEvent> {
    network.network(request).await.unwrap().collect().await
}

#[tokio::test]
async fn test_delegation_then_tool_then_answer() {
    leancanvas::init_logger();

    let client = MockClient::new(&[
        r#"{"delegate": {"agent": "customer-insight-agent", "task": "Narrow the segment"}}"#,
        "- Early adopter: ops leads at 10-50 person agencies",
        r#"Adding it. {"tool_call": {"name": "canvas_add_item", "parameters": {"sectionId": "customer-segments", "subsectionTitle": "Early Adopter", "value": "Agency ops leads"}}}"#,
        "I narrowed your early adopter.\nNext: rank the problems.",
    ]);
    let threads = Arc::new(ThreadStore::in_memory());
    let network = AgentNetwork::lean_canvas(client.clone(), threads.clone());

    let request = NetworkRequest::new("canvas-1", "Who should I target?")
        .with_canvas(CanvasState::initial());
    let message_id = request.message_id.clone();
    let events = collect(&network, request).await;

    assert_eq!(events.first().map(StreamEvent::kind), Some("start"));
    assert_eq!(events.last().map(StreamEvent::kind), Some("finish"));
    assert!(events
        .iter()
        .all(|e| e.message_id().map_or(true, |id| id == message_id)));

    let mut assembler = MessageAssembler::new();
    assembler.push_user("u1", "Who should I target?");
    assembler.sync(&events[..events.len() / 2]);
    assembler.sync(&events);
    assembler.sync(&events);
    assert!(assembler.is_finished(&message_id));
    let reply = &assembler.messages()[1];
    let steps: Vec<_> = reply.steps().map(|(_, step)| step.clone()).collect();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].kind, StepKind::Agent);
    assert_eq!(steps[0].name, CUSTOMER_INSIGHT_ID);
    assert_eq!(steps[0].status, StepStatus::Success);
    assert_eq!(steps[1].kind, StepKind::Tool);
    assert_eq!(
        reply.text_content(),
        "I narrowed your early adopter.\nNext: rank the problems."
    );

    let mut reconciler = Reconciler::new();
    let outcome = reconciler.reconcile(assembler.messages(), &CanvasState::initial());
    let segment = outcome.canvas.get("customer-segments").unwrap();
    assert_eq!(
        segment.subsections.as_ref().unwrap()["early-adopter"].items,
        vec!["Agency ops leads".to_string()]
    );

    // The specialist sees the canvas and its task, not the routing prompt.
    let calls = client.calls();
    assert_eq!(calls.len(), 4);
    let specialist_call = &calls[1];
    assert!(specialist_call
        .iter()
        .any(|m| m.role == Role::User && m.content == "Narrow the segment"));
    assert!(specialist_call
        .iter()
        .any(|m| m.content.contains("=== Start of Lean Canvas State ===")));

    let history = threads.history("canvas-1").await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[1].id, message_id);
}

#[tokio::test]
async fn test_history_is_replayed_to_the_orchestrator() {
    let client = MockClient::new(&["First answer.", "Second answer."]);
    let network = AgentNetwork::lean_canvas(client.clone(), Arc::new(ThreadStore::in_memory()));

    collect(&network, NetworkRequest::new("c", "first question")).await;
    collect(&network, NetworkRequest::new("c", "second question")).await;

    let calls = client.calls();
    let second = &calls[1];
    let conversation: Vec<&str> = second
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(
        conversation,
        vec!["first question", "First answer.", "second question"]
    );
}

#[tokio::test]
async fn test_upstream_failure_becomes_error_event() {
    let client = MockClient::new(&[]);
    let network = AgentNetwork::lean_canvas(client, Arc::new(ThreadStore::in_memory()));

    let events = collect(&network, NetworkRequest::new("c", "hello")).await;
    let kinds: Vec<&str> = events.iter().map(StreamEvent::kind).collect();
    assert_eq!(kinds, vec!["start", "error", "finish"]);
    match &events[1] {
        StreamEvent::Error { message } => assert!(message.contains("ran out of replies")),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_logged_network_passes_events_through() {
    let client = MockClient::new(&["Done."]);
    let network = LoggedAgent::new(AgentNetwork::lean_canvas(
        client,
        Arc::new(ThreadStore::in_memory()),
    ));
    assert_eq!(network.inner().specialist_ids().len(), 5);

    let events: Vec<StreamEvent> = network
        .network(NetworkRequest::new("c", "hi"))
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(
        events.iter().map(StreamEvent::kind).collect::<Vec<_>>(),
        vec!["start", "text-delta", "finish"]
    );
}

#[tokio::test]
async fn test_single_agent_has_no_network_mode() {
    let agent = leancanvas::specialists::monetization(MockClient::new(&[]));
    let result = agent.network(NetworkRequest::new("c", "hi")).await;
    assert!(result.is_err());
}
