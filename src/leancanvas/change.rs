//! Change descriptors: one atomic canvas mutation each.
//!
//! Tools emit descriptors inside their output (`{"changes": [...]}`); the
//! [`Reconciler`](crate::reconciler::Reconciler) later applies them to the canvas.
//! The wire form is tagged by `type`:
//!
//! ```json
//! {"type": "update", "sectionId": "solution", "index": 0, "value": "Automate testing", "timestamp": 0}
//! ```

use crate::leancanvas::canvas::CanvasState;
use serde::{Deserialize, Deserializer, Serialize};

/// One atomic mutation to a [`CanvasState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ChangeDescriptor {
    /// Replace the item at `index` (or append when `index` is at the end).
    Update {
        section_id: String,
        #[serde(deserialize_with = "deserialize_index")]
        index: usize,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subsection_title: Option<String>,
        #[serde(default)]
        timestamp: i64,
    },
    /// Append `value` to the target list.
    Add {
        section_id: String,
        #[serde(default, deserialize_with = "deserialize_value_or_empty")]
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subsection_title: Option<String>,
        #[serde(default)]
        timestamp: i64,
    },
    /// Remove the item at `index`.
    Remove {
        section_id: String,
        #[serde(deserialize_with = "deserialize_index")]
        index: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subsection_title: Option<String>,
        #[serde(default)]
        timestamp: i64,
    },
    /// Swap in an entire new document. `sectionId` is carried for wire compatibility only.
    Replace {
        #[serde(default)]
        section_id: String,
        new_state: CanvasState,
        #[serde(default)]
        timestamp: i64,
    },
}

impl ChangeDescriptor {
    pub fn update(section_id: impl Into<String>, index: usize, value: impl Into<String>) -> Self {
        ChangeDescriptor::Update {
            section_id: section_id.into(),
            index,
            value: value.into(),
            subsection_title: None,
            timestamp: now_millis(),
        }
    }

    pub fn add(section_id: impl Into<String>, value: impl Into<String>) -> Self {
        ChangeDescriptor::Add {
            section_id: section_id.into(),
            value: value.into(),
            subsection_title: None,
            timestamp: now_millis(),
        }
    }

    pub fn remove(section_id: impl Into<String>, index: usize) -> Self {
        ChangeDescriptor::Remove {
            section_id: section_id.into(),
            index,
            subsection_title: None,
            timestamp: now_millis(),
        }
    }

    pub fn replace(new_state: CanvasState) -> Self {
        ChangeDescriptor::Replace {
            section_id: String::new(),
            new_state,
            timestamp: now_millis(),
        }
    }

    /// Target a named subsection. Has no effect on `replace`.
    pub fn in_subsection(mut self, title: impl Into<String>) -> Self {
        let title = Some(title.into());
        match &mut self {
            ChangeDescriptor::Update {
                subsection_title, ..
            }
            | ChangeDescriptor::Add {
                subsection_title, ..
            }
            | ChangeDescriptor::Remove {
                subsection_title, ..
            } => *subsection_title = title,
            ChangeDescriptor::Replace { .. } => {}
        }
        self
    }

    /// Wire tag of this descriptor (`"update"`, `"add"`, ...).
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeDescriptor::Update { .. } => "update",
            ChangeDescriptor::Add { .. } => "add",
            ChangeDescriptor::Remove { .. } => "remove",
            ChangeDescriptor::Replace { .. } => "replace",
        }
    }

    pub fn section_id(&self) -> &str {
        match self {
            ChangeDescriptor::Update { section_id, .. }
            | ChangeDescriptor::Add { section_id, .. }
            | ChangeDescriptor::Remove { section_id, .. }
            | ChangeDescriptor::Replace { section_id, .. } => section_id,
        }
    }

    pub fn subsection_title(&self) -> Option<&str> {
        match self {
            ChangeDescriptor::Update {
                subsection_title, ..
            }
            | ChangeDescriptor::Add {
                subsection_title, ..
            }
            | ChangeDescriptor::Remove {
                subsection_title, ..
            } => subsection_title.as_deref(),
            ChangeDescriptor::Replace { .. } => None,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            ChangeDescriptor::Update { timestamp, .. }
            | ChangeDescriptor::Add { timestamp, .. }
            | ChangeDescriptor::Remove { timestamp, .. }
            | ChangeDescriptor::Replace { timestamp, .. } => *timestamp,
        }
    }

    /// One-line human summary, as shown back to the model after a tool call.
    pub fn describe(&self) -> String {
        let target = match self.subsection_title() {
            Some(sub) => format!("subsection '{}' for section '{}'", sub, self.section_id()),
            None => format!("section '{}'", self.section_id()),
        };
        match self {
            ChangeDescriptor::Add { value, .. } => format!("Added '{}' to {}", value, target),
            ChangeDescriptor::Update { index, value, .. } => {
                format!("Updated item at index {} in {} to '{}'", index, target, value)
            }
            ChangeDescriptor::Remove { index, .. } => {
                format!("Removed item at index {} from {}", index, target)
            }
            ChangeDescriptor::Replace { .. } => "Replaced entire canvas state".to_string(),
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Accepts `2`, `2.0` or `"2"`; models are not always strict about numbers.
fn deserialize_index<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = serde_json::Value::deserialize(deserializer)?;
    let index = match &value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    index
        .map(|i| i as usize)
        .ok_or_else(|| D::Error::custom(format!("invalid item index: {}", value)))
}

fn deserialize_value_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tagged_update() {
        let change: ChangeDescriptor = serde_json::from_value(json!({
            "type": "update",
            "sectionId": "solution",
            "index": 0,
            "value": "Automate regression testing",
            "timestamp": 1700000000000i64
        }))
        .unwrap();
        assert_eq!(change.kind(), "update");
        assert_eq!(change.section_id(), "solution");
        assert_eq!(change.timestamp(), 1700000000000);
    }

    #[test]
    fn add_value_defaults_to_empty() {
        let change: ChangeDescriptor = serde_json::from_value(json!({
            "type": "add",
            "sectionId": "channels",
            "subsectionTitle": null
        }))
        .unwrap();
        match change {
            ChangeDescriptor::Add { value, .. } => assert_eq!(value, ""),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn lenient_index_forms() {
        for raw in [json!(1), json!(1.0), json!("1")] {
            let change: ChangeDescriptor = serde_json::from_value(json!({
                "type": "remove",
                "sectionId": "problem",
                "index": raw
            }))
            .unwrap();
            assert!(matches!(change, ChangeDescriptor::Remove { index: 1, .. }));
        }
        let bad = serde_json::from_value::<ChangeDescriptor>(json!({
            "type": "remove",
            "sectionId": "problem",
            "index": -1
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn update_requires_value() {
        let missing = serde_json::from_value::<ChangeDescriptor>(json!({
            "type": "update",
            "sectionId": "solution",
            "index": 0
        }));
        assert!(missing.is_err());
    }

    #[test]
    fn serializes_camel_case() {
        let value =
            serde_json::to_value(ChangeDescriptor::remove("problem", 2).in_subsection("Problem"))
                .unwrap();
        assert_eq!(value["type"], "remove");
        assert_eq!(value["sectionId"], "problem");
        assert_eq!(value["subsectionTitle"], "Problem");
    }

    #[test]
    fn describe_mentions_target() {
        let change = ChangeDescriptor::add("customer-segments", "Solo founders")
            .in_subsection("Early Adopter");
        assert_eq!(
            change.describe(),
            "Added 'Solo founders' to subsection 'Early Adopter' for section 'customer-segments'"
        );
    }
}
