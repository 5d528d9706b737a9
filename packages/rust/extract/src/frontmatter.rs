//! Front matter parsing for source documents.
//!
//! A document may start with a `---` delimited YAML metadata block. A block
//! that fails to parse degrades to "no front matter"; the file is then
//! treated as body-only text, never rejected.

use serde_yaml::Value;
use tracing::debug;

/// Parsed front matter key-value block.
#[derive(Debug, Clone, Default)]
pub struct FrontMatter {
    map: serde_yaml::Mapping,
}

impl FrontMatter {
    /// Look up a key and coerce scalar values to a string.
    /// Non-scalar values (lists, nested maps) return `None`.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.map.get(&Value::String(key.to_string()))? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Whether the key was declared at all, regardless of value shape.
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(&Value::String(key.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Split a document into its front matter (if any) and body.
///
/// Returns the body unchanged (including the malformed block) when the
/// leading `---` block is absent or fails to parse as a YAML mapping.
pub fn split_front_matter(content: &str) -> (Option<FrontMatter>, &str) {
    let Some(rest) = strip_delimiter_line(content) else {
        return (None, content);
    };

    // Find the closing delimiter on its own line.
    let Some(end) = find_closing_delimiter(rest) else {
        debug!("unterminated front matter block, treating as body text");
        return (None, content);
    };

    let block = &rest[..end.block_end];
    let body = &rest[end.body_start..];

    match serde_yaml::from_str::<serde_yaml::Mapping>(block) {
        Ok(map) => (Some(FrontMatter { map }), body),
        Err(e) => {
            debug!(error = %e, "front matter parse failed, treating file as body-only");
            (None, content)
        }
    }
}

/// Strip a leading `---` line, returning the remainder.
fn strip_delimiter_line(content: &str) -> Option<&str> {
    let rest = content.strip_prefix("---")?;
    let rest = rest.strip_prefix('\r').unwrap_or(rest);
    rest.strip_prefix('\n')
}

struct ClosingDelimiter {
    block_end: usize,
    body_start: usize,
}

/// Locate the closing `---` line within the text following the opening delimiter.
fn find_closing_delimiter(rest: &str) -> Option<ClosingDelimiter> {
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some(ClosingDelimiter {
                block_end: offset,
                body_start: offset + line.len(),
            });
        }
        offset += line.len();
    }
    None
}
