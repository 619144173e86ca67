//! Turns a free-text model reply into a [`MetricRecord`].
//!
//! Every `{` in the reply is a candidate start. From a candidate the scanner walks to
//! the matching `}` (string literals and escapes are respected), and the first span
//! that parses as a JSON object wins. When a span is not JSON, or never closes, the
//! scan resumes just after its opening brace, so objects nested in prose braces or
//! following a stray `{` are still found. Nothing parseable means a fallback record
//! holding the raw reply.

use serde_json::{Map, Value};
use std::ops::Range;
use tracing::{debug, warn};

use crate::models::MetricRecord;

/// The balanced brace span opening at byte `start`, if it closes before the reply ends.
///
/// `reply[start..]` must begin with `{`.
pub fn balanced_span(reply: &str, start: usize) -> Option<Range<usize>> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in reply[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start..start + offset + 1);
                }
            }
            _ => {}
        }
    }

    None
}

/// First JSON object embedded anywhere in `reply`
pub fn find_json_object(reply: &str) -> Option<Map<String, Value>> {
    let mut cursor = 0usize;

    while let Some(found) = reply[cursor..].find('{') {
        let start = cursor + found;
        // '{' is one byte, so the next candidate search starts on a char boundary
        cursor = start + 1;

        let Some(span) = balanced_span(reply, start) else {
            debug!(start, "Brace never closes, trying the next one");
            continue;
        };

        match serde_json::from_str::<Value>(&reply[span.clone()]) {
            Ok(Value::Object(fields)) => return Some(fields),
            Ok(_) => {}
            Err(e) => {
                debug!(start = span.start, end = span.end, error = %e, "Skipping unparsable span");
            }
        }
    }

    None
}

/// Parse the model reply and guarantee every expected field is present.
///
/// Never fails: an unparsable reply yields [`MetricRecord::fallback`], which is
/// returned as is without sentinel fields.
pub fn normalize_reply(reply: &str, expected_fields: &[&str]) -> MetricRecord {
    match find_json_object(reply) {
        Some(fields) => {
            let mut record = MetricRecord::from_map(fields);
            record.fill_missing(expected_fields);
            record
        }
        None => {
            warn!(
                reply_len = reply.len(),
                "Parsing AI response failed, returning raw reply"
            );
            MetricRecord::fallback(reply)
        }
    }
}
