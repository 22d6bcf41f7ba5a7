//! Offset interleaving of assistant text and tool-call steps.
//!
//! Step offsets are byte positions into the UTF-8 encoding of the message
//! content, which is exactly how a Rust `str` is addressed. An offset that
//! lands inside a multi-byte character is rounded down to the preceding
//! character boundary; an offset past the end is clamped to the end.

use shared_types::Step;

/// One displayable unit of an assistant message.
#[derive(Debug, Clone, PartialEq)]
pub enum Part<'a> {
    Text(String),
    Step(&'a Step),
}

impl Part<'_> {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(text) => Some(text),
            Part::Step(_) => None,
        }
    }

    pub fn as_step(&self) -> Option<&Step> {
        match self {
            Part::Text(_) => None,
            Part::Step(step) => Some(step),
        }
    }
}

/// Split `content` and `steps` into an ordered sequence of parts.
pub fn interleave<'a>(content: &str, steps: &'a [Step]) -> Vec<Part<'a>> {
    if steps.is_empty() {
        if content.is_empty() {
            return Vec::new();
        }
        return vec![Part::Text(content.to_string())];
    }

    // Producers that never anchor steps: steps first, narrative last.
    if steps.iter().all(|step| step.anchor().is_none()) {
        let mut parts: Vec<Part<'a>> = steps.iter().map(Part::Step).collect();
        if !content.is_empty() {
            parts.push(Part::Text(content.to_string()));
        }
        return parts;
    }

    let mut ordered: Vec<&'a Step> = steps.iter().collect();
    ordered.sort_by_key(|step| step.content_offset.unwrap_or(0));

    let mut parts = Vec::with_capacity(ordered.len() * 2 + 1);
    let mut cursor = 0;
    for step in ordered {
        let offset = char_floor(content, step.content_offset.unwrap_or(0));
        if offset > cursor {
            push_trimmed(&mut parts, &content[cursor..offset]);
        }
        parts.push(Part::Step(step));
        cursor = cursor.max(offset);
    }
    if cursor < content.len() {
        push_trimmed(&mut parts, &content[cursor..]);
    }
    parts
}

/// Plain-text rendering: each step becomes a `🔧 label` line.
pub fn flatten(content: &str, steps: &[Step]) -> String {
    if steps.is_empty() {
        return content.to_string();
    }

    let mut out = String::new();
    for part in interleave(content, steps) {
        match part {
            Part::Text(text) => {
                out.push_str(text.trim());
                out.push('\n');
            }
            Part::Step(step) => {
                out.push_str("🔧 ");
                out.push_str(step_title(step));
                out.push('\n');
            }
        }
    }
    out.trim().to_string()
}

/// Text produced after the last step ran, i.e. the final answer.
pub fn final_text(content: &str, steps: &[Step]) -> String {
    if steps.is_empty() {
        return content.trim().to_string();
    }
    let last = steps
        .iter()
        .filter_map(|step| step.content_offset)
        .max()
        .unwrap_or(0);
    if last >= content.len() {
        return String::new();
    }
    content[char_floor(content, last)..].trim().to_string()
}

fn step_title(step: &Step) -> &str {
    if step.label.is_empty() {
        &step.tool
    } else {
        &step.label
    }
}

fn push_trimmed(parts: &mut Vec<Part<'_>>, slice: &str) {
    let text = slice.trim();
    if !text.is_empty() {
        parts.push(Part::Text(text.to_string()));
    }
}

/// Largest character boundary at or below `offset`, clamped to `text.len()`.
pub(crate) fn char_floor(text: &str, offset: usize) -> usize {
    let mut idx = offset.min(text.len());
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
