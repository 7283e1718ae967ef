//! Applies tool-call change descriptors to the canvas exactly once.
//!
//! While a turn streams in, the client re-folds the whole message list on every chunk and
//! hands it to [`Reconciler::reconcile`]. Each completed tool step is keyed by
//! `"{message_id}:{part_position}"`; a key already in the ledger is never applied again, so
//! calling `reconcile` repeatedly with a growing message list is safe.
//!
//! ```rust
//! use leancanvas::canvas::CanvasState;
//! use leancanvas::reconciler::Reconciler;
//! use leancanvas::stream_event::{NetworkStep, StepKind, UiMessage, UiPart, UiRole};
//! use serde_json::json;
//!
//! let step = NetworkStep::running(0, "canvas_add_item", StepKind::Tool, None).succeed(json!({
//!     "changes": [{"type": "add", "sectionId": "solution", "value": "Automate testing"}]
//! }));
//! let messages = vec![UiMessage {
//!     id: "m1".into(),
//!     role: UiRole::Assistant,
//!     parts: vec![UiPart::DataNetwork { data: step }],
//! }];
//!
//! let mut reconciler = Reconciler::new();
//! let first = reconciler.reconcile(&messages, &CanvasState::initial());
//! let second = reconciler.reconcile(&messages, &first.canvas);
//! assert_eq!(first.changes_applied, 1);
//! assert_eq!(second.changes_applied, 0);
//! assert_eq!(second.canvas, first.canvas);
//! ```

use crate::leancanvas::canvas::CanvasState;
use crate::leancanvas::change::ChangeDescriptor;
use crate::leancanvas::mutation;
use crate::leancanvas::stream_event::{StepKind, UiMessage};
use serde_json::Value;
use std::collections::HashSet;

/// Extract change descriptors from a tool step's output.
///
/// Accepts a JSON string (parsed first), an object with `changes`, or an object with
/// `result.changes`. Anything else yields an empty list; elements that are not valid
/// descriptors are skipped individually.
pub fn parse_changes(output: Option<&Value>) -> Vec<ChangeDescriptor> {
    let parsed;
    let payload = match output {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(value) => {
                parsed = value;
                &parsed
            }
            Err(e) => {
                log::debug!("reconciler: tool output is not JSON ({})", e);
                return Vec::new();
            }
        },
        Some(value) => value,
    };

    let changes = payload
        .get("changes")
        .or_else(|| payload.get("result").and_then(|r| r.get("changes")));

    let Some(Value::Array(elements)) = changes else {
        return Vec::new();
    };

    elements
        .iter()
        .filter_map(|element| {
            match serde_json::from_value::<ChangeDescriptor>(element.clone()) {
                Ok(change) => Some(change),
                Err(e) => {
                    log::warn!("reconciler: skipping malformed change {}: {}", element, e);
                    None
                }
            }
        })
        .collect()
}

/// Ledger key for the step stored at `part_position` of message `message_id`.
pub fn ledger_key(message_id: &str, part_position: usize) -> String {
    format!("{}:{}", message_id, part_position)
}

/// Keys of the tool steps whose changes have already been applied.
#[derive(Debug, Clone, Default)]
pub struct AppliedLedger {
    keys: HashSet<String>,
}

impl AppliedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Returns `false` if the key was already present.
    pub fn record(&mut self, key: String) -> bool {
        self.keys.insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

/// Result of one [`Reconciler::reconcile`] pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub canvas: CanvasState,
    /// Ledger keys newly recorded by this pass, in message order.
    pub applied_keys: Vec<String>,
    /// Number of descriptors applied by this pass.
    pub changes_applied: usize,
}

impl ReconcileOutcome {
    pub fn changed(&self) -> bool {
        self.changes_applied > 0
    }
}

/// Session-scoped dedup layer between streamed tool steps and the mutation API.
#[derive(Debug, Default)]
pub struct Reconciler {
    ledger: AppliedLedger,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ledger(&self) -> &AppliedLedger {
        &self.ledger
    }

    /// Apply the changes of every completed, not yet applied tool step in `messages`.
    pub fn reconcile(&mut self, messages: &[UiMessage], canvas: &CanvasState) -> ReconcileOutcome {
        let mut current = canvas.clone();
        let mut applied_keys = Vec::new();
        let mut changes_applied = 0;

        for message in messages {
            for (position, step) in message.steps() {
                if step.kind != StepKind::Tool || !step.is_complete() {
                    continue;
                }
                let key = ledger_key(&message.id, position);
                if self.ledger.contains(&key) {
                    continue;
                }

                let changes = parse_changes(step.output.as_ref());
                if !changes.is_empty() {
                    log::info!(
                        "reconciler: applying {} change(s) from {} ({})",
                        changes.len(),
                        step.name,
                        key
                    );
                }
                current = mutation::apply_changes(&current, &changes);
                changes_applied += changes.len();

                self.ledger.record(key.clone());
                applied_keys.push(key);
            }
        }

        ReconcileOutcome {
            canvas: current,
            applied_keys,
            changes_applied,
        }
    }

    /// Forget every applied key, e.g. when the chat session restarts.
    pub fn reset(&mut self) {
        self.ledger.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leancanvas::stream_event::{NetworkStep, StepStatus, UiPart, UiRole};
    use serde_json::json;

    fn tool_message(id: &str, output: Value) -> UiMessage {
        UiMessage {
            id: id.into(),
            role: UiRole::Assistant,
            parts: vec![UiPart::DataNetwork {
                data: NetworkStep::running(0, "canvas_add_item", StepKind::Tool, None)
                    .succeed(output),
            }],
        }
    }

    #[test]
    fn parses_string_and_nested_payloads() {
        let raw = json!(r#"{"changes":[{"type":"add","sectionId":"channels","value":"SEO"}]}"#);
        assert_eq!(parse_changes(Some(&raw)).len(), 1);

        let nested = json!({"result": {"changes": [{"type": "remove", "sectionId": "problem", "index": 0}]}});
        assert_eq!(parse_changes(Some(&nested)).len(), 1);
    }

    #[test]
    fn malformed_payloads_yield_nothing() {
        assert!(parse_changes(None).is_empty());
        assert!(parse_changes(Some(&json!("not json"))).is_empty());
        assert!(parse_changes(Some(&json!({"changes": "nope"}))).is_empty());
        assert!(parse_changes(Some(&json!(42))).is_empty());
    }

    #[test]
    fn bad_elements_are_skipped_individually() {
        let payload = json!({"changes": [
            {"type": "update", "sectionId": "solution"},
            {"type": "add", "sectionId": "solution", "value": "kept"},
            {"type": "teleport"}
        ]});
        let changes = parse_changes(Some(&payload));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind(), "add");
    }

    #[test]
    fn running_steps_are_not_applied() {
        let message = UiMessage {
            id: "m1".into(),
            role: UiRole::Assistant,
            parts: vec![UiPart::DataNetwork {
                data: NetworkStep::running(0, "canvas_add_item", StepKind::Tool, None),
            }],
        };
        let mut reconciler = Reconciler::new();
        let outcome = reconciler.reconcile(&[message], &CanvasState::initial());
        assert!(outcome.applied_keys.is_empty());
        assert!(reconciler.ledger().is_empty());
    }

    #[test]
    fn output_without_success_status_counts_as_complete() {
        let mut step = NetworkStep::running(0, "canvas_add_item", StepKind::Tool, None);
        step.output = Some(json!({"changes": [{"type": "add", "sectionId": "solution", "value": "x"}]}));
        assert_eq!(step.status, StepStatus::Running);
        let message = UiMessage {
            id: "m1".into(),
            role: UiRole::Assistant,
            parts: vec![UiPart::DataNetwork { data: step }],
        };
        let outcome = Reconciler::new().reconcile(&[message], &CanvasState::initial());
        assert_eq!(outcome.changes_applied, 1);
    }

    #[test]
    fn key_recorded_even_without_changes() {
        let mut reconciler = Reconciler::new();
        let outcome =
            reconciler.reconcile(&[tool_message("m1", json!({"message": "analysis"}))], &CanvasState::initial());
        assert_eq!(outcome.applied_keys, vec!["m1:0".to_string()]);
        assert_eq!(outcome.changes_applied, 0);
        assert!(reconciler.ledger().contains("m1:0"));
    }

    #[test]
    fn agent_steps_are_ignored() {
        let message = UiMessage {
            id: "m1".into(),
            role: UiRole::Assistant,
            parts: vec![UiPart::DataNetwork {
                data: NetworkStep::running(0, "growth-agent", StepKind::Agent, None).succeed(
                    json!({"changes": [{"type": "add", "sectionId": "solution", "value": "x"}]}),
                ),
            }],
        };
        let outcome = Reconciler::new().reconcile(&[message], &CanvasState::initial());
        assert_eq!(outcome.changes_applied, 0);
    }

    #[test]
    fn reset_allows_reapplying() {
        let messages =
            vec![tool_message("m1", json!({"changes": [{"type": "add", "sectionId": "solution", "value": "x"}]}))];
        let mut reconciler = Reconciler::new();
        let once = reconciler.reconcile(&messages, &CanvasState::initial());
        reconciler.reset();
        let twice = reconciler.reconcile(&messages, &once.canvas);
        assert_eq!(twice.changes_applied, 1);
        assert_eq!(
            twice.canvas.get("solution").unwrap().items.as_ref().unwrap().len(),
            2
        );
    }
}
