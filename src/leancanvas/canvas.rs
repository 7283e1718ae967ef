//! Lean Canvas document model.
//!
//! A canvas is a keyed mapping of section id to [`CanvasSection`]. Each section either
//! holds a flat list of up to [`MAX_ITEMS`] short text items, or a set of named
//! subsections that each hold their own list.
//!
//! The model is plain data: every mutation goes through the pure functions in
//! [`mutation`](crate::mutation), which return a fresh [`CanvasState`].
//!
//! # Example
//!
//! ```rust
//! use leancanvas::canvas::CanvasState;
//!
//! let canvas = CanvasState::initial();
//! assert_eq!(canvas.len(), 9);
//!
//! let json = serde_json::to_string(&canvas).unwrap();
//! let back: CanvasState = serde_json::from_str(&json).unwrap();
//! assert_eq!(canvas, back);
//! ```

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Maximum number of items a section (or subsection) may hold.
pub const MAX_ITEMS: usize = 3;

/// A nested `{title, items}` record living under a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subsection {
    pub title: String,
    #[serde(default)]
    pub items: Vec<String>,
}

impl Subsection {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            items: Vec::new(),
        }
    }
}

/// One named region of the canvas.
///
/// A section carries either `items` or `subsections`, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasSection {
    /// Display rank. Sections without one sort after ranked sections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsections: Option<BTreeMap<String, Subsection>>,
}

impl CanvasSection {
    /// A section holding a flat item list.
    pub fn with_items(order: i64, title: impl Into<String>) -> Self {
        Self {
            order: Some(order),
            title: title.into(),
            items: Some(Vec::new()),
            subsections: None,
        }
    }

    /// A section split into subsections, given as `(key, title)` pairs.
    pub fn with_subsections(order: i64, title: impl Into<String>, subs: &[(&str, &str)]) -> Self {
        let subsections = subs
            .iter()
            .map(|(key, title)| (key.to_string(), Subsection::new(*title)))
            .collect();
        Self {
            order: Some(order),
            title: title.into(),
            items: None,
            subsections: Some(subsections),
        }
    }

    pub fn has_subsections(&self) -> bool {
        self.subsections.is_some()
    }

    /// Total number of items across the section and all of its subsections.
    pub fn item_count(&self) -> usize {
        let own = self.items.as_ref().map_or(0, Vec::len);
        let nested: usize = self
            .subsections
            .as_ref()
            .map_or(0, |subs| subs.values().map(|s| s.items.len()).sum());
        own + nested
    }
}

lazy_static! {
    static ref INITIAL_CANVAS: CanvasState = {
        let mut sections = BTreeMap::new();
        sections.insert(
            "customer-segments".to_string(),
            CanvasSection::with_subsections(
                1,
                "Customer Segments",
                &[
                    ("customer-segments", "Customer Segments"),
                    ("early-adopter", "Early Adopter"),
                ],
            ),
        );
        sections.insert(
            "problem".to_string(),
            CanvasSection::with_subsections(
                2,
                "Problem",
                &[
                    ("problem", "Problem"),
                    ("existing-alternatives", "Existing Alternatives"),
                ],
            ),
        );
        sections.insert(
            "unique-value-proposition".to_string(),
            CanvasSection::with_subsections(
                3,
                "Unique Value Proposition",
                &[
                    ("unique-value-proposition", "Unique Value Proposition"),
                    ("high-level-concept", "High Level Concept"),
                ],
            ),
        );
        sections.insert("solution".to_string(), CanvasSection::with_items(4, "Solution"));
        sections.insert("channels".to_string(), CanvasSection::with_items(5, "Channels"));
        sections.insert(
            "revenue-streams".to_string(),
            CanvasSection::with_items(6, "Revenue Streams"),
        );
        sections.insert(
            "cost-structure".to_string(),
            CanvasSection::with_items(7, "Cost Structure"),
        );
        sections.insert("key-metrics".to_string(), CanvasSection::with_items(8, "Key Metrics"));
        sections.insert(
            "unfair-advantage".to_string(),
            CanvasSection::with_items(9, "Unfair Advantage"),
        );
        CanvasState { sections }
    };
}

/// The whole Lean Canvas document: section id to section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanvasState {
    pub sections: BTreeMap<String, CanvasSection>,
}

impl CanvasState {
    /// The canonical nine-section canvas a new document starts from.
    pub fn initial() -> Self {
        INITIAL_CANVAS.clone()
    }

    pub fn get(&self, section_id: &str) -> Option<&CanvasSection> {
        self.sections.get(section_id)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Sections in display order. Unranked sections come last, ties break on id.
    pub fn sorted_sections(&self) -> Vec<(&String, &CanvasSection)> {
        let mut sections: Vec<_> = self.sections.iter().collect();
        sections.sort_by(|(a_id, a), (b_id, b)| {
            let a_rank = a.order.unwrap_or(i64::MAX);
            let b_rank = b.order.unwrap_or(i64::MAX);
            a_rank.cmp(&b_rank).then_with(|| a_id.cmp(b_id))
        });
        sections
    }

    /// Total number of filled items across the document.
    pub fn item_count(&self) -> usize {
        self.sections.values().map(CanvasSection::item_count).sum()
    }

    /// Render the canvas as the markdown block handed to agents as context.
    pub fn to_prompt_context(&self) -> String {
        let mut out = String::from("=== Start of Lean Canvas State ===\n");

        for (_, section) in self.sorted_sections() {
            out.push_str(&format!("## {}\n\n", section.title));
            if let Some(items) = &section.items {
                for item in items {
                    out.push_str(&format!("* {}\n", item));
                }
                if !items.is_empty() {
                    out.push('\n');
                }
            }
            if let Some(subsections) = &section.subsections {
                for subsection in subsections.values() {
                    out.push_str(&format!("### {}:\n\n", subsection.title));
                    for item in &subsection.items {
                        out.push_str(&format!("* {}\n", item));
                    }
                    if !subsection.items.is_empty() {
                        out.push('\n');
                    }
                }
            }
        }

        out.push_str("\n=== End of Lean Canvas State ===\n");
        out
    }

    /// Pretty-printed JSON, used for canvas downloads.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Accept either the keyed form or a list of sections carrying their own `id`.
    ///
    /// In the list form, `subsections` may itself be a list of `{title, items}`; those get
    /// kebab-cased title keys.
    pub fn from_loose_json(value: &Value) -> Result<Self, serde_json::Error> {
        let Value::Array(sections) = value else {
            return serde_json::from_value(value.clone());
        };

        let mut state = CanvasState::default();
        for section in sections {
            let Some(id) = section.get("id").and_then(Value::as_str) else {
                log::debug!("canvas: skipping section without id: {}", section);
                continue;
            };
            let mut fields = section.clone();
            if let Some(Value::Array(subs)) = section.get("subsections") {
                let keyed: serde_json::Map<String, Value> = subs
                    .iter()
                    .filter_map(|sub| {
                        let title = sub.get("title")?.as_str()?;
                        Some((kebab_case(title), sub.clone()))
                    })
                    .collect();
                fields["subsections"] = Value::Object(keyed);
            }
            if fields.get("title").map_or(true, Value::is_null) {
                fields["title"] = Value::String(id.to_string());
            }
            let parsed: CanvasSection = serde_json::from_value(fields)?;
            state.sections.insert(id.to_string(), parsed);
        }
        Ok(state)
    }
}

/// `"Early Adopter"` → `"early-adopter"`.
pub fn kebab_case(title: &str) -> String {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_canvas_has_nine_sections_in_order() {
        let canvas = CanvasState::initial();
        let ids: Vec<&str> = canvas
            .sorted_sections()
            .into_iter()
            .map(|(id, _)| id.as_str())
            .collect();
        assert_eq!(
            ids,
            vec![
                "customer-segments",
                "problem",
                "unique-value-proposition",
                "solution",
                "channels",
                "revenue-streams",
                "cost-structure",
                "key-metrics",
                "unfair-advantage",
            ]
        );
        assert_eq!(canvas.item_count(), 0);
    }

    #[test]
    fn sections_are_items_or_subsections() {
        for section in CanvasState::initial().sections.values() {
            assert!(section.items.is_some() != section.subsections.is_some());
        }
    }

    #[test]
    fn unranked_sections_sort_last() {
        let mut canvas = CanvasState::default();
        canvas.sections.insert(
            "a".into(),
            CanvasSection {
                order: None,
                title: "A".into(),
                items: Some(vec![]),
                subsections: None,
            },
        );
        canvas
            .sections
            .insert("b".into(), CanvasSection::with_items(1, "B"));
        let ids: Vec<_> = canvas.sorted_sections().into_iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(ids, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn prompt_context_lists_items() {
        let mut canvas = CanvasState::initial();
        canvas
            .sections
            .get_mut("solution")
            .unwrap()
            .items
            .as_mut()
            .unwrap()
            .push("Automate testing".into());
        let ctx = canvas.to_prompt_context();
        assert!(ctx.starts_with("=== Start of Lean Canvas State ==="));
        assert!(ctx.contains("## Solution\n\n* Automate testing\n"));
        assert!(ctx.contains("### Early Adopter:"));
        assert!(ctx.trim_end().ends_with("=== End of Lean Canvas State ==="));
    }

    #[test]
    fn serializes_without_absent_fields() {
        let value = serde_json::to_value(CanvasState::initial()).unwrap();
        let solution = &value["solution"];
        assert_eq!(solution["title"], "Solution");
        assert!(solution.get("subsections").is_none());
        assert_eq!(value["problem"]["subsections"]["problem"]["title"], "Problem");
    }

    #[test]
    fn loose_json_accepts_keyed_form() {
        let value = serde_json::to_value(CanvasState::initial()).unwrap();
        assert_eq!(CanvasState::from_loose_json(&value).unwrap(), CanvasState::initial());
    }

    #[test]
    fn loose_json_accepts_section_list() {
        let value = serde_json::json!([
            {"id": "solution", "order": 4, "title": "Solution", "items": ["Sync"]},
            {"id": "problem", "title": "Problem", "subsections": [
                {"title": "Existing Alternatives", "items": ["Spreadsheets"]}
            ]},
            {"title": "no id"}
        ]);
        let canvas = CanvasState::from_loose_json(&value).unwrap();
        assert_eq!(canvas.len(), 2);
        assert_eq!(canvas.get("solution").unwrap().items, Some(vec!["Sync".to_string()]));
        let subs = canvas.get("problem").unwrap().subsections.as_ref().unwrap();
        assert_eq!(subs["existing-alternatives"].items, vec!["Spreadsheets".to_string()]);
    }

    #[test]
    fn kebab_case_collapses_punctuation() {
        assert_eq!(kebab_case("Early Adopter"), "early-adopter");
        assert_eq!(kebab_case("  High-Level  Concept "), "high-level-concept");
    }
}
