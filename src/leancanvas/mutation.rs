//! Pure canvas mutation API.
//!
//! Every function takes the current [`CanvasState`] by reference and returns a new one;
//! the input is never touched. Targets are located through [`resolve_section`], which is
//! forgiving about how a model spells a section: by id, by title, or by the id/title of a
//! subsection.
//!
//! Out-of-range indices and missing sections are silent no-ops: the returned state equals
//! the input.
//!
//! # Example
//!
//! ```rust
//! use leancanvas::canvas::CanvasState;
//! use leancanvas::mutation;
//!
//! let canvas = CanvasState::initial();
//! let canvas = mutation::add_item(&canvas, "Solution", None, "Automate testing");
//! assert_eq!(
//!     canvas.get("solution").unwrap().items.as_deref(),
//!     Some(&["Automate testing".to_string()][..])
//! );
//! ```

use crate::leancanvas::canvas::{CanvasState, Subsection, MAX_ITEMS};
use crate::leancanvas::change::ChangeDescriptor;
use std::collections::BTreeMap;

/// Where a `(sectionId, subsectionTitle)` pair points after fallback resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub section_id: String,
    pub subsection_title: Option<String>,
}

/// Find a subsection key by key or title.
///
/// Tries, in order: exact key, lowercase key, case-insensitive title, kebab-cased key.
pub fn find_subsection_key(subsections: &BTreeMap<String, Subsection>, title: &str) -> Option<String> {
    if subsections.contains_key(title) {
        return Some(title.to_string());
    }

    let lower = title.to_lowercase();
    if subsections.contains_key(&lower) {
        return Some(lower);
    }

    if let Some((key, _)) = subsections
        .iter()
        .find(|(_, sub)| sub.title.to_lowercase() == lower)
    {
        return Some(key.clone());
    }

    let kebab = lower.split_whitespace().collect::<Vec<_>>().join("-");
    if subsections.contains_key(&kebab) {
        return Some(kebab);
    }

    None
}

/// Resolve a loosely specified section reference against `state`.
///
/// Resolution order: exact top-level key, case-insensitive section title, then a
/// subsection (of any section) whose key or title matches `section_id`. Unresolvable
/// references come back unchanged, which makes the subsequent mutation a no-op.
pub fn resolve_section(
    state: &CanvasState,
    section_id: &str,
    subsection_title: Option<&str>,
) -> ResolvedTarget {
    let unchanged = || ResolvedTarget {
        section_id: section_id.to_string(),
        subsection_title: subsection_title.map(str::to_string),
    };

    if state.sections.contains_key(section_id) {
        return unchanged();
    }

    let lower = section_id.to_lowercase();
    if let Some((id, _)) = state
        .sections
        .iter()
        .find(|(_, section)| section.title.to_lowercase() == lower)
    {
        return ResolvedTarget {
            section_id: id.clone(),
            subsection_title: subsection_title.map(str::to_string),
        };
    }

    for (id, section) in &state.sections {
        if let Some(subsections) = &section.subsections {
            if let Some(key) = find_subsection_key(subsections, section_id) {
                return ResolvedTarget {
                    section_id: id.clone(),
                    subsection_title: Some(key),
                };
            }
        }
    }

    unchanged()
}

/// Run `edit` against the item list a reference points at, on a copy of `state`.
///
/// When no subsection is named and the section is split into subsections, the section id
/// doubles as the subsection key. A subsection named on a flat section matches nothing, so
/// the edit is a no-op.
fn edit_target_list<F>(
    state: &CanvasState,
    section_id: &str,
    subsection_title: Option<&str>,
    edit: F,
) -> CanvasState
where
    F: FnOnce(&mut Vec<String>),
{
    let target = resolve_section(state, section_id, subsection_title);
    let mut next = state.clone();

    let section = match next.sections.get_mut(&target.section_id) {
        Some(section) => section,
        None => {
            log::debug!("canvas: no section matches '{}'", section_id);
            return next;
        }
    };

    let effective_subsection = match (&target.subsection_title, &section.subsections) {
        (Some(sub), _) => Some(sub.clone()),
        (None, Some(_)) => Some(target.section_id.clone()),
        (None, None) => None,
    };

    match (effective_subsection, section.subsections.as_mut()) {
        (Some(sub), Some(subsections)) => {
            if let Some(key) = find_subsection_key(subsections, &sub) {
                if let Some(subsection) = subsections.get_mut(&key) {
                    edit(&mut subsection.items);
                }
            } else {
                log::debug!(
                    "canvas: section '{}' has no subsection '{}'",
                    target.section_id,
                    sub
                );
            }
        }
        (Some(sub), None) => {
            log::debug!(
                "canvas: section '{}' has no subsections (asked for '{}')",
                target.section_id,
                sub
            );
        }
        (None, _) => edit(section.items.get_or_insert_with(Vec::new)),
    }

    next
}

/// Set the item at `index`. An index at or past the end appends (within the item cap)
/// instead of leaving gaps.
pub fn update_item(
    state: &CanvasState,
    section_id: &str,
    index: usize,
    value: &str,
    subsection_title: Option<&str>,
) -> CanvasState {
    edit_target_list(state, section_id, subsection_title, |items| {
        if index < items.len() {
            items[index] = value.to_string();
        } else if items.len() < MAX_ITEMS {
            items.push(value.to_string());
        }
    })
}

/// Append `value` unless the list already holds [`MAX_ITEMS`] items.
pub fn add_item(
    state: &CanvasState,
    section_id: &str,
    subsection_title: Option<&str>,
    value: &str,
) -> CanvasState {
    edit_target_list(state, section_id, subsection_title, |items| {
        if items.len() < MAX_ITEMS {
            items.push(value.to_string());
        }
    })
}

/// Remove the item at `index`, if there is one.
pub fn remove_item(
    state: &CanvasState,
    section_id: &str,
    index: usize,
    subsection_title: Option<&str>,
) -> CanvasState {
    edit_target_list(state, section_id, subsection_title, |items| {
        if index < items.len() {
            items.remove(index);
        }
    })
}

/// Replace the whole document.
pub fn replace(new_state: &CanvasState) -> CanvasState {
    new_state.clone()
}

/// Reset to the initial nine-section canvas.
pub fn clear() -> CanvasState {
    CanvasState::initial()
}

/// Apply one descriptor.
pub fn apply_change(state: &CanvasState, change: &ChangeDescriptor) -> CanvasState {
    match change {
        ChangeDescriptor::Update {
            section_id,
            index,
            value,
            subsection_title,
            ..
        } => update_item(state, section_id, *index, value, subsection_title.as_deref()),
        ChangeDescriptor::Add {
            section_id,
            value,
            subsection_title,
            ..
        } => add_item(state, section_id, subsection_title.as_deref(), value),
        ChangeDescriptor::Remove {
            section_id,
            index,
            subsection_title,
            ..
        } => remove_item(state, section_id, *index, subsection_title.as_deref()),
        ChangeDescriptor::Replace { new_state, .. } => replace(new_state),
    }
}

/// Apply descriptors in list order.
pub fn apply_changes(state: &CanvasState, changes: &[ChangeDescriptor]) -> CanvasState {
    changes
        .iter()
        .fold(state.clone(), |acc, change| apply_change(&acc, change))
}
