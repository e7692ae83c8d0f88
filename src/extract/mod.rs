//! Draft isolation and fence stripping
//!
//! Base code models echo prompt structure back: comment lines, repeated
//! markers, sometimes a Markdown fence around the statement. These helpers
//! carve the SQL text out of that. Both are pure functions over strings so
//! the edge cases (missing marker, nested fences, empty drafts) are testable
//! in isolation.

use crate::prompt::OUTPUT_MARKER;

/// Extract the draft SQL from raw generator output.
///
/// Keeps only the text after the last `# Output:` marker (the whole text if
/// no marker is present), drops every line whose trimmed content starts
/// with `#`, and trims the result. An empty return value is a valid
/// outcome, not an error: it means the model produced nothing usable.
pub fn extract_sql(raw: &str) -> String {
    let tail = match raw.rfind(OUTPUT_MARKER) {
        Some(idx) => &raw[idx + OUTPUT_MARKER.len()..],
        None => raw,
    };

    let lines: Vec<&str> = tail
        .lines()
        .filter(|line| !line.trim().starts_with('#'))
        .collect();

    lines.join("\n").trim().to_string()
}

/// Remove Markdown code fences around a statement.
///
/// If the trimmed text opens with a triple-backtick line (bare or tagged,
/// e.g. ```` ```sql ````), that line is dropped, along with the last line
/// when it is a closing fence. Unfenced input comes back unchanged apart
/// from outer whitespace. Fences are peeled until none is left at the
/// front, so the function is idempotent even on nested fences.
pub fn strip_fences(text: &str) -> String {
    let mut current = text.trim().to_string();

    while current.starts_with("```") {
        let mut lines: Vec<&str> = current.lines().collect();
        lines.remove(0);
        if let Some(last) = lines.last() {
            if last.trim().starts_with("```") {
                lines.pop();
            }
        }
        current = lines.join("\n").trim().to_string();
    }

    current
}
