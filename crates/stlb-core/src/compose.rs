//! Assembly of the per-recipient notification body.
//!
//! Purely a formatter over already-localized lines: no lookups, no zone math.

use crate::domain::TemporalExpression;
use crate::localize::LocalizedLine;

/// Strip trailing sentence punctuation from a quoted span.
fn strip_trailing_punctuation(s: &str) -> &str {
    s.trim_end_matches(['.', ',', ';', ':', '!', '?'])
}

/// Compose one notification body.
///
/// Each expression renders as a quoted span followed by its conversion line;
/// blocks for multiple expressions in one message concatenate with a single
/// newline. When `edited_from` carries the permalink of the original message,
/// the whole body is prefixed with an "edited" annotation.
pub fn compose(
    blocks: &[(&TemporalExpression, LocalizedLine)],
    edited_from: Option<&str>,
) -> String {
    let mut out = String::new();
    if let Some(link) = edited_from {
        out.push_str(&format!("_<{link}|Message> edited:_\n"));
    }
    let rendered: Vec<String> = blocks
        .iter()
        .map(|(expr, line)| {
            format!(
                "> {}\n{}",
                strip_trailing_punctuation(&expr.text),
                line.render()
            )
        })
        .collect();
    out.push_str(&rendered.join("\n"));
    out
}
