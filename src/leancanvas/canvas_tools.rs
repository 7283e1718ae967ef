//! Canvas tools exposed to the orchestrator.
//!
//! None of these tools touch the canvas directly. Each mutating tool answers with
//! `{"changes": [ChangeDescriptor...], "message": "..."}`; the client-side
//! [`Reconciler`](crate::reconciler::Reconciler) applies the descriptors once the tool step
//! completes.

use crate::leancanvas::canvas::CanvasState;
use crate::leancanvas::change::ChangeDescriptor;
use crate::leancanvas::tool_protocol::{
    ToolError, ToolMetadata, ToolParameter, ToolParameterType, ToolProtocol, ToolResult,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::error::Error;

pub const CANVAS_UPDATE_ITEM: &str = "canvas_update_item";
pub const CANVAS_ADD_ITEM: &str = "canvas_add_item";
pub const CANVAS_REMOVE_ITEM: &str = "canvas_remove_item";
pub const CANVAS_REPLACE_STATE: &str = "canvas_replace_state";
pub const CANVAS_ANALYZE: &str = "canvas_analyze";
pub const CANVAS_BATCH_UPDATE: &str = "canvas_batch_update";

const ANALYSIS_TYPES: &[&str] = &["completeness", "coherence", "suggestions", "summary"];

fn section_id_param() -> ToolParameter {
    ToolParameter::new("sectionId", ToolParameterType::String)
        .with_description(
            "The ID of the canvas section (e.g., 'problem', 'solution', 'customer-segments')",
        )
        .required()
}

fn subsection_param(action: &str) -> ToolParameter {
    ToolParameter::new("subsectionTitle", ToolParameterType::String).with_description(format!(
        "Optional: The title of the subsection if {} a subsection item",
        action
    ))
}

/// The six canvas tools behind one protocol.
///
/// When built with [`CanvasToolProtocol::with_canvas`], `canvas_analyze` inspects that
/// snapshot; otherwise it only acknowledges the request.
#[derive(Debug, Clone, Default)]
pub struct CanvasToolProtocol {
    canvas: Option<CanvasState>,
}

impl CanvasToolProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_canvas(canvas: CanvasState) -> Self {
        Self {
            canvas: Some(canvas),
        }
    }

    pub fn metadata() -> Vec<ToolMetadata> {
        vec![
            ToolMetadata::new(
                CANVAS_UPDATE_ITEM,
                "Update a specific item in a canvas section or subsection",
            )
            .with_parameter(section_id_param())
            .with_parameter(
                ToolParameter::new("index", ToolParameterType::Integer)
                    .with_description("The index of the item to update")
                    .required(),
            )
            .with_parameter(
                ToolParameter::new("value", ToolParameterType::String)
                    .with_description("The new value for the item")
                    .required(),
            )
            .with_parameter(subsection_param("updating")),
            ToolMetadata::new(
                CANVAS_ADD_ITEM,
                "Add a new item to a canvas section or subsection",
            )
            .with_parameter(section_id_param())
            .with_parameter(subsection_param("adding"))
            .with_parameter(
                ToolParameter::new("value", ToolParameterType::String)
                    .with_description("Text of the new item"),
            ),
            ToolMetadata::new(
                CANVAS_REMOVE_ITEM,
                "Remove an item from a canvas section or subsection",
            )
            .with_parameter(section_id_param())
            .with_parameter(
                ToolParameter::new("index", ToolParameterType::Integer)
                    .with_description("The index of the item to remove")
                    .required(),
            )
            .with_parameter(subsection_param("removing")),
            ToolMetadata::new(
                CANVAS_REPLACE_STATE,
                "Replace the entire canvas state with new content",
            )
            .with_parameter(
                ToolParameter::new("newState", ToolParameterType::Object)
                    .with_description("The complete new canvas state object")
                    .required(),
            ),
            ToolMetadata::new(
                CANVAS_ANALYZE,
                "Analyze the current canvas state and provide insights",
            )
            .with_parameter(
                ToolParameter::new("analysisType", ToolParameterType::String)
                    .with_description("The type of analysis to perform")
                    .required()
                    .one_of(ANALYSIS_TYPES),
            ),
            ToolMetadata::new(
                CANVAS_BATCH_UPDATE,
                "Perform multiple canvas operations in a single call",
            )
            .with_parameter(
                ToolParameter::new("operations", ToolParameterType::Array)
                    .with_description(
                        "Array of operations: {type: update|add|remove|replace, sectionId, index?, value?, subsectionTitle?, newState?}",
                    )
                    .with_items(ToolParameterType::Object)
                    .required(),
            ),
        ]
    }

    fn analyze(&self, analysis_type: &str) -> Value {
        let Some(canvas) = &self.canvas else {
            return json!({
                "analysisType": analysis_type,
                "message": format!("Canvas analysis of type '{}' completed", analysis_type),
            });
        };

        let empty: Vec<&str> = canvas
            .sorted_sections()
            .into_iter()
            .filter(|(_, section)| section.item_count() == 0)
            .map(|(_, section)| section.title.as_str())
            .collect();
        let filled = canvas.len() - empty.len();

        let message = match analysis_type {
            "completeness" | "suggestions" if !empty.is_empty() => format!(
                "{} of {} sections filled. Still empty: {}",
                filled,
                canvas.len(),
                empty.join(", ")
            ),
            "completeness" | "suggestions" => {
                format!("All {} sections have content", canvas.len())
            }
            _ => format!(
                "Canvas has {} item(s) across {} of {} sections",
                canvas.item_count(),
                filled,
                canvas.len()
            ),
        };

        json!({
            "analysisType": analysis_type,
            "message": message,
            "filledSections": filled,
            "emptySections": empty,
        })
    }
}

/// Deserialize `params` as a descriptor of kind `kind`, stamping the current time.
fn descriptor_from(kind: &str, params: &Value) -> Result<ChangeDescriptor, ToolError> {
    let Value::Object(fields) = params else {
        return Err(ToolError::InvalidParameters(format!(
            "expected an object for {}, got {}",
            kind, params
        )));
    };
    let mut fields: Map<String, Value> = fields.clone();
    fields.insert("type".into(), Value::String(kind.to_string()));
    fields.insert(
        "timestamp".into(),
        json!(chrono::Utc::now().timestamp_millis()),
    );
    // Optional string parameters arrive as null from some models.
    if fields.get("subsectionTitle") == Some(&Value::Null) {
        fields.remove("subsectionTitle");
    }
    serde_json::from_value(Value::Object(fields))
        .map_err(|e| ToolError::InvalidParameters(format!("{}: {}", kind, e)))
}

fn subsection_suffix(change: &ChangeDescriptor) -> String {
    change
        .subsection_title()
        .map(|s| format!(" subsection {}", s))
        .unwrap_or_default()
}

fn single_change_message(change: &ChangeDescriptor) -> String {
    match change {
        ChangeDescriptor::Update { index, value, .. } => format!(
            "Updated item at index {} in section {}{} to: \"{}\"",
            index,
            change.section_id(),
            subsection_suffix(change),
            value
        ),
        ChangeDescriptor::Add { .. } => format!(
            "Added new item to section {}{}",
            change.section_id(),
            subsection_suffix(change)
        ),
        ChangeDescriptor::Remove { index, .. } => format!(
            "Removed item at index {} from section {}{}",
            index,
            change.section_id(),
            subsection_suffix(change)
        ),
        ChangeDescriptor::Replace { .. } => {
            "Replaced entire canvas state with new content".to_string()
        }
    }
}

fn changes_output(changes: &[ChangeDescriptor], message: String) -> Result<Value, ToolError> {
    let changes = serde_json::to_value(changes)
        .map_err(|e| ToolError::ExecutionFailed(format!("could not encode changes: {}", e)))?;
    Ok(json!({ "changes": changes, "message": message }))
}

#[async_trait]
impl ToolProtocol for CanvasToolProtocol {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        log::debug!("canvas_tools: {} {}", tool_name, parameters);

        let output = match tool_name {
            CANVAS_UPDATE_ITEM => {
                let change = descriptor_from("update", &parameters)?;
                changes_output(&[change.clone()], single_change_message(&change))?
            }
            CANVAS_ADD_ITEM => {
                let change = descriptor_from("add", &parameters)?;
                changes_output(&[change.clone()], single_change_message(&change))?
            }
            CANVAS_REMOVE_ITEM => {
                let change = descriptor_from("remove", &parameters)?;
                changes_output(&[change.clone()], single_change_message(&change))?
            }
            CANVAS_REPLACE_STATE => {
                let change = descriptor_from("replace", &parameters)?;
                changes_output(&[change.clone()], single_change_message(&change))?
            }
            CANVAS_ANALYZE => {
                let analysis_type = parameters
                    .get("analysisType")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        ToolError::InvalidParameters("analysisType is required".to_string())
                    })?;
                if !ANALYSIS_TYPES.contains(&analysis_type) {
                    return Err(ToolError::InvalidParameters(format!(
                        "unknown analysisType '{}'",
                        analysis_type
                    ))
                    .into());
                }
                self.analyze(analysis_type)
            }
            CANVAS_BATCH_UPDATE => {
                let operations = parameters
                    .get("operations")
                    .and_then(Value::as_array)
                    .ok_or_else(|| {
                        ToolError::InvalidParameters("operations must be an array".to_string())
                    })?;
                let changes = operations
                    .iter()
                    .map(|op| {
                        let kind = op.get("type").and_then(Value::as_str).ok_or_else(|| {
                            ToolError::InvalidParameters("operation without type".to_string())
                        })?;
                        descriptor_from(kind, op)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let summary = changes
                    .iter()
                    .map(ChangeDescriptor::describe)
                    .collect::<Vec<_>>()
                    .join("; ");
                let message = if summary.is_empty() {
                    format!("Performed {} canvas operations", changes.len())
                } else {
                    summary
                };
                changes_output(&changes, message)?
            }
            other => return Err(ToolError::NotFound(other.to_string()).into()),
        };

        Ok(ToolResult::success(output))
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        Ok(Self::metadata())
    }

    fn protocol_name(&self) -> &str {
        "canvas"
    }
}
