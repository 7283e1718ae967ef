//! Incremental `<think>` tag scanner.
//!
//! Some models wrap internal reasoning in `<think>...</think>`. While a reply streams in,
//! a tag can be split across chunks (`"<thi"` + `"nk>"`), so the scanner keeps a small
//! carry-over of any trailing text that could still turn into a tag.
//!
//! ```rust
//! use leancanvas::think::{ThinkScanner, ThinkSpan};
//!
//! let mut scanner = ThinkScanner::new();
//! let mut spans = scanner.push("Hi <thi");
//! spans.extend(scanner.push("nk>plan</think> there"));
//! spans.extend(scanner.finish());
//! assert_eq!(
//!     spans,
//!     vec![
//!         ThinkSpan::Text("Hi ".into()),
//!         ThinkSpan::Reasoning("plan".into()),
//!         ThinkSpan::Text(" there".into()),
//!     ]
//! );
//! ```

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

/// A run of scanned output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThinkSpan {
    /// Visible reply text.
    Text(String),
    /// Content between `<think>` and `</think>`.
    Reasoning(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Outside,
    Inside,
}

/// Two-state scanner over an append-only text stream.
#[derive(Debug)]
pub struct ThinkScanner {
    state: ScanState,
    pending: String,
}

impl Default for ThinkScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of `tag`.
fn partial_tag_len(text: &str, tag: &str) -> usize {
    (1..tag.len())
        .rev()
        .find(|&n| text.len() >= n && text.is_char_boundary(text.len() - n) && text.ends_with(&tag[..n]))
        .unwrap_or(0)
}

impl ThinkScanner {
    pub fn new() -> Self {
        Self {
            state: ScanState::Outside,
            pending: String::new(),
        }
    }

    /// True while inside an unterminated `<think>` block.
    pub fn in_think(&self) -> bool {
        self.state == ScanState::Inside
    }

    fn emit(&self, spans: &mut Vec<ThinkSpan>, text: &str) {
        if text.is_empty() {
            return;
        }
        let span = match self.state {
            ScanState::Outside => ThinkSpan::Text(text.to_string()),
            ScanState::Inside => ThinkSpan::Reasoning(text.to_string()),
        };
        // Merge with the previous span of the same kind.
        match (spans.last_mut(), span) {
            (Some(ThinkSpan::Text(prev)), ThinkSpan::Text(next))
            | (Some(ThinkSpan::Reasoning(prev)), ThinkSpan::Reasoning(next)) => prev.push_str(&next),
            (_, span) => spans.push(span),
        }
    }

    /// Feed the next chunk; returns the spans that are now unambiguous.
    pub fn push(&mut self, chunk: &str) -> Vec<ThinkSpan> {
        let mut buffer = std::mem::take(&mut self.pending);
        buffer.push_str(chunk);

        let mut spans = Vec::new();
        let mut rest: &str = &buffer;
        loop {
            let tag = match self.state {
                ScanState::Outside => OPEN_TAG,
                ScanState::Inside => CLOSE_TAG,
            };
            match rest.find(tag) {
                Some(pos) => {
                    self.emit(&mut spans, &rest[..pos]);
                    rest = &rest[pos + tag.len()..];
                    self.state = match self.state {
                        ScanState::Outside => ScanState::Inside,
                        ScanState::Inside => ScanState::Outside,
                    };
                }
                None => {
                    let keep = partial_tag_len(rest, tag);
                    let split = rest.len() - keep;
                    self.emit(&mut spans, &rest[..split]);
                    self.pending = rest[split..].to_string();
                    break;
                }
            }
        }
        spans
    }

    /// Flush whatever is buffered. An unterminated block's content is reported as reasoning.
    pub fn finish(&mut self) -> Vec<ThinkSpan> {
        let pending = std::mem::take(&mut self.pending);
        let mut spans = Vec::new();
        self.emit(&mut spans, &pending);
        self.state = ScanState::Outside;
        spans
    }
}

/// One-shot split of a complete message.
pub fn split_think_blocks(text: &str) -> Vec<ThinkSpan> {
    let mut scanner = ThinkScanner::new();
    let mut spans = scanner.push(text);
    for span in scanner.finish() {
        match (spans.last_mut(), span) {
            (Some(ThinkSpan::Text(prev)), ThinkSpan::Text(next))
            | (Some(ThinkSpan::Reasoning(prev)), ThinkSpan::Reasoning(next)) => prev.push_str(&next),
            (_, span) => spans.push(span),
        }
    }
    spans
}

/// Only the visible text of a complete message.
pub fn strip_think_blocks(text: &str) -> String {
    split_think_blocks(text)
        .into_iter()
        .filter_map(|span| match span {
            ThinkSpan::Text(t) => Some(t),
            ThinkSpan::Reasoning(_) => None,
        })
        .collect()
}
