use std::sync::OnceLock;

use file_patch::ChangeOperation;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::EnvelopeError;
use crate::{END_MARKER, START_MARKER};

/// Result of parsing a finished response.
///
/// `changes` is empty whenever `error` is set. A response without an envelope
/// yields no changes and no error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalExtraction {
    pub changes: Vec<ChangeOperation>,
    pub error: Option<EnvelopeError>,
}

impl FinalExtraction {
    fn parsed(changes: Vec<ChangeOperation>) -> Self {
        Self {
            changes,
            error: None,
        }
    }

    fn failed(error: EnvelopeError) -> Self {
        Self {
            changes: Vec::new(),
            error: Some(error),
        }
    }
}

fn code_fence_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?s)^```(\w*)?\s*\n?(.*?)\n?\s*```$").expect("fence regex must compile")
    })
}

/// Parses the envelope of a complete response.
#[must_use]
pub fn extract_final(buffer: &str) -> FinalExtraction {
    let Some(body) = envelope_body(buffer) else {
        return FinalExtraction::default();
    };

    match parse_envelope(body) {
        Ok(changes) => FinalExtraction::parsed(changes),
        Err(error) => {
            warn!(%error, "change envelope could not be parsed");
            FinalExtraction::failed(error)
        }
    }
}

fn envelope_body(buffer: &str) -> Option<&str> {
    let start = buffer.find(START_MARKER)? + START_MARKER.len();
    let rest = &buffer[start..];
    let end = rest.find(END_MARKER)?;
    let body = &rest[..end];

    if body.is_empty() {
        None
    } else {
        Some(body)
    }
}

fn parse_envelope(body: &str) -> Result<Vec<ChangeOperation>, EnvelopeError> {
    let json = bound_json_object(strip_code_fence(body.trim())).ok_or(EnvelopeError::NoJsonObject)?;

    let value = match serde_json::from_str::<Value>(json) {
        Ok(value) => value,
        Err(strict_error) => {
            let sanitized = remove_invalid_escapes(json);
            if sanitized == json {
                return Err(strict_error.into());
            }

            debug!(%strict_error, "retrying change envelope without invalid escapes");
            serde_json::from_str::<Value>(&sanitized).map_err(|_| EnvelopeError::from(strict_error))?
        }
    };

    let files = match value {
        Value::Object(mut object) => object.remove("files"),
        _ => None,
    };
    let Some(files @ Value::Array(_)) = files else {
        return Err(EnvelopeError::MissingFilesArray);
    };

    Ok(serde_json::from_value(files)?)
}

fn strip_code_fence(body: &str) -> &str {
    code_fence_regex()
        .captures(body)
        .and_then(|captures| captures.get(2))
        .map(|inner| inner.as_str().trim())
        .filter(|inner| !inner.is_empty())
        .unwrap_or(body)
}

fn bound_json_object(text: &str) -> Option<&str> {
    let first = text.find('{')?;
    let last = text.rfind('}')?;
    (last >= first).then(|| &text[first..=last])
}

/// Drops every backslash that does not start a valid JSON escape sequence.
fn remove_invalid_escapes(json: &str) -> String {
    let mut sanitized = String::with_capacity(json.len());
    let mut chars = json.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            sanitized.push(ch);
            continue;
        }

        match chars.peek().copied() {
            Some('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't') => {
                sanitized.push(ch);
                if let Some(escaped) = chars.next() {
                    sanitized.push(escaped);
                }
            }
            Some('u') if is_unicode_escape(chars.clone()) => sanitized.push(ch),
            _ => {}
        }
    }

    sanitized
}

fn is_unicode_escape(mut rest: impl Iterator<Item = char>) -> bool {
    rest.next() == Some('u')
        && (0..4).all(|_| rest.next().is_some_and(|digit| digit.is_ascii_hexdigit()))
}
