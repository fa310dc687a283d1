//! Conversational text views of a response buffer.

use crate::{END_MARKER, START_MARKER};

/// Text before the first start marker, shown while a response streams.
#[must_use]
pub fn conversational_prefix(buffer: &str) -> &str {
    buffer
        .split_once(START_MARKER)
        .map_or(buffer, |(prefix, _)| prefix)
}

#[must_use]
pub fn has_envelope_start(buffer: &str) -> bool {
    buffer.contains(START_MARKER)
}

/// Removes every complete envelope block and anything after an unterminated
/// start marker, then trims.
#[must_use]
pub fn strip_envelopes(buffer: &str) -> String {
    let mut text = String::with_capacity(buffer.len());
    let mut rest = buffer;

    while let Some(start) = rest.find(START_MARKER) {
        text.push_str(&rest[..start]);
        let after_start = &rest[start + START_MARKER.len()..];
        match after_start.find(END_MARKER) {
            Some(end) => rest = &after_start[end + END_MARKER.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }

    text.push_str(rest);
    text.trim().to_string()
}
