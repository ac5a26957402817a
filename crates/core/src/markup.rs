//! Code-block detection for message content.

use regex::Regex;
use std::sync::OnceLock;

/// A piece of message content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Prose outside any fence
    Text(String),
    /// Fenced code block
    Code(CodeBlock),
}

/// A fenced code block with its optional language tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub code: String,
}

fn fence_pattern() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?ms)^[ \t]*```[ \t]*([A-Za-z0-9_+#.\-]*)[^\n]*\n(.*?)^[ \t]*```[ \t]*$").ok())
        .as_ref()
}

/// Split content into text and fenced code segments, in order
///
/// An unterminated fence is left as text.
pub fn segments(content: &str) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut cursor = 0;
    let Some(pattern) = fence_pattern() else {
        return vec![Segment::Text(content.to_string())];
    };

    for caps in pattern.captures_iter(content) {
        let Some(whole) = caps.get(0) else { continue };

        let before = &content[cursor..whole.start()];
        if !before.trim().is_empty() {
            out.push(Segment::Text(before.trim_matches('\n').to_string()));
        }

        let language = caps.get(1).map(|m| m.as_str()).filter(|s| !s.is_empty()).map(str::to_string);
        let code = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        out.push(Segment::Code(CodeBlock { language, code: code.trim_end_matches('\n').to_string() }));

        cursor = whole.end();
    }

    let rest = &content[cursor..];
    if !rest.trim().is_empty() {
        out.push(Segment::Text(rest.trim_matches('\n').to_string()));
    }

    out
}

/// All fenced code blocks in content
pub fn code_blocks(content: &str) -> Vec<CodeBlock> {
    segments(content)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Code(block) => Some(block),
            Segment::Text(_) => None,
        })
        .collect()
}
