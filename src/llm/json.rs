//! Best-effort JSON recovery from model output.
//!
//! Models wrap JSON in code fences, add prose around it, use trailing commas
//! or single quotes, and get cut off at the token limit. [`extract_json`]
//! handles all of these and reports irrecoverable input as
//! [`JsonExtraction::Fallback`] instead of an error.

use serde_json::Value;

/// Outcome of [`extract_json`].
#[derive(Debug, Clone, PartialEq)]
pub enum JsonExtraction {
    Parsed(Value),
    Fallback { reason: String },
}

impl JsonExtraction {
    pub fn is_parsed(&self) -> bool {
        matches!(self, JsonExtraction::Parsed(_))
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            JsonExtraction::Parsed(value) => Some(value),
            JsonExtraction::Fallback { .. } => None,
        }
    }
}

/// Cut-back attempts when repairing truncated output.
const MAX_REPAIR_ATTEMPTS: usize = 8;

/// Extract the first JSON object or array from `raw`.
pub fn extract_json(raw: &str) -> JsonExtraction {
    let body = strip_code_fences(raw.trim());
    if body.is_empty() {
        return fallback("empty response");
    }

    let Some(start) = body.find(['{', '[']) else {
        return fallback("no JSON object or array found");
    };
    let scan = scan(&body[start..]);

    if let Some(end) = scan.end {
        let candidate = &body[start..start + end];
        if let Some(value) = parse_lenient(candidate) {
            return JsonExtraction::Parsed(value);
        }
        return fallback("malformed JSON");
    }

    // Truncated: close whatever is open, cutting back to earlier separators if needed.
    let text = &body[start..];
    if let Some(value) = parse_lenient(&close_open(text, scan.in_string, &scan.stack)) {
        tracing::debug!(target: "llm", "Recovered truncated JSON by closing brackets");
        return JsonExtraction::Parsed(value);
    }
    for cut in scan.separators.iter().rev().take(MAX_REPAIR_ATTEMPTS) {
        let repaired = close_open(&text[..cut.pos], false, &cut.stack);
        if let Some(value) = parse_lenient(&repaired) {
            tracing::debug!(
                target: "llm",
                "Recovered truncated JSON by cutting at byte {}",
                cut.pos
            );
            return JsonExtraction::Parsed(value);
        }
    }

    fallback("truncated JSON could not be repaired")
}

fn fallback(reason: &str) -> JsonExtraction {
    JsonExtraction::Fallback {
        reason: reason.to_string(),
    }
}

fn parse_lenient(candidate: &str) -> Option<Value> {
    serde_json::from_str::<Value>(candidate)
        .ok()
        .or_else(|| serde_json5::from_str::<Value>(candidate).ok())
}

/// Content of the first fenced block, or the input when there is none.
///
/// An unclosed fence (truncated output) yields everything after it.
fn strip_code_fences(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after = &text[open + 3..];
    // Skip the language tag line ("json", "JSON", ...)
    let content = match after.find('\n') {
        Some(nl) if !after[..nl].contains(['{', '[']) => &after[nl + 1..],
        _ => after,
    };
    match content.find("```") {
        Some(close) => content[..close].trim(),
        None => content.trim(),
    }
}

struct Separator {
    pos: usize,
    stack: Vec<char>,
}

struct Scan {
    /// Byte offset one past the closing bracket of the first value.
    end: Option<usize>,
    in_string: bool,
    /// Closers still expected at the end of input.
    stack: Vec<char>,
    /// Positions of top-level-safe cut points (commas outside strings).
    separators: Vec<Separator>,
}

fn scan(text: &str) -> Scan {
    let mut stack: Vec<char> = Vec::new();
    let mut separators = Vec::new();
    let mut in_string = false;
    let mut quote = '"';
    let mut escaped = false;

    for (idx, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' | '\'' => {
                in_string = true;
                quote = c;
            }
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                }
                if stack.is_empty() {
                    return Scan {
                        end: Some(idx + c.len_utf8()),
                        in_string: false,
                        stack,
                        separators,
                    };
                }
            }
            ',' => separators.push(Separator {
                pos: idx,
                stack: stack.clone(),
            }),
            _ => {}
        }
    }

    Scan {
        end: None,
        in_string,
        stack,
        separators,
    }
}

fn close_open(text: &str, in_string: bool, stack: &[char]) -> String {
    let mut repaired = text.to_string();
    if in_string {
        repaired.push('"');
    }

    let trimmed_len = repaired.trim_end().len();
    repaired.truncate(trimmed_len);
    while repaired.ends_with(',') {
        repaired.pop();
    }
    if repaired.ends_with(':') {
        repaired.push_str("null");
    }

    for closer in stack.iter().rev() {
        repaired.push(*closer);
    }
    repaired
}
