//! Prompt-injection scrubbing for model-authored text
//!
//! Scratchpad contents, memory bodies, and restored checkpoint turns all
//! pass through here before they are stored or replayed into a prompt.

use std::sync::LazyLock;

use regex::Regex;

/// Upper bound on sanitized text; anything longer is clipped
const MAX_LEN: usize = 20_000;

static ANSI_ESCAPES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("static regex"));

static INJECTION_PHRASES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(ignore\s+(?:all\s+)?previous\s+instructions|disregard\s+(?:all\s+)?prior\s+instructions|you\s+are\s+now\s+an?\s+|new\s+system\s+prompt\s*:)",
    )
    .expect("static regex")
});

static ROLE_MARKERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*(system|assistant)\s*:").expect("static regex"));

/// Scrub text the model authored before persisting or replaying it
pub fn sanitize(text: &str) -> String {
    let without_ansi = ANSI_ESCAPES.replace_all(text, "");

    let printable: String = without_ansi
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();

    let neutral = INJECTION_PHRASES.replace_all(&printable, "[redacted]");
    let neutral = ROLE_MARKERS.replace_all(&neutral, "[role]:");

    let mut out = neutral.into_owned();
    if out.len() > MAX_LEN {
        let mut end = MAX_LEN;
        while !out.is_char_boundary(end) {
            end -= 1;
        }
        out.truncate(end);
    }
    out
}
