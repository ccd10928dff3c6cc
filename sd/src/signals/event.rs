//! `EVENT:` signal parsing
//!
//! Total over arbitrary strings: either a topic from the closed set is
//! found (with an optional JSON payload) or the scan yields nothing.
//! Unknown topics are skipped, not errors.

use crate::domain::Topic;

/// A recognized in-band event
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEvent {
    pub topic: Topic,
    pub payload: Option<serde_json::Value>,
}

const MARKER: &str = "EVENT:";

/// First recognized event in the text, if any
pub fn parse_event(text: &str) -> Option<ParsedEvent> {
    parse_events(text).into_iter().next()
}

/// Every recognized event, in order of appearance
pub fn parse_events(text: &str) -> Vec<ParsedEvent> {
    let mut events = Vec::new();
    let mut rest = text;

    while let Some(pos) = rest.find(MARKER) {
        let after = &rest[pos + MARKER.len()..];
        let (word, after_word) = take_topic_word(after);
        let trimmed = word.trim_end_matches('.');

        if let Some(topic) = Topic::parse(trimmed) {
            let payload = take_payload(after_word);
            events.push(ParsedEvent { topic, payload });
        }

        rest = after;
    }

    events
}

/// Whether the text carries the terminal completion event
pub fn has_task_complete(text: &str) -> bool {
    parse_events(text).iter().any(|e| e.topic == Topic::TaskComplete)
}

/// Take the topic word following the marker
fn take_topic_word(s: &str) -> (&str, &str) {
    let end = s
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '.' || *c == '_' || *c == '-'))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    (&s[..end], &s[end..])
}

/// Take a `:{...}` or `:"..."` payload if one follows the topic word
fn take_payload(s: &str) -> Option<serde_json::Value> {
    let rest = s.strip_prefix(':')?;
    match rest.chars().next() {
        Some('{') => {
            let raw = take_balanced_braces(rest)?;
            serde_json::from_str(raw).ok()
        }
        Some('"') => {
            let raw = take_quoted(rest)?;
            serde_json::from_str(raw).ok()
        }
        _ => None,
    }
}

/// Capture a balanced `{...}` span, honoring strings and escapes
fn take_balanced_braces(s: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Capture a `"..."` span, honoring escapes
fn take_quoted(s: &str) -> Option<&str> {
    let mut escaped = false;
    for (i, c) in s.char_indices().skip(1) {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => return Some(&s[..=i]),
            _ => {}
        }
    }
    None
}
