//! Classification of raw source failures into user-facing messages.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stream_source::SourceError;

pub const PROTOCOL_ERROR_MESSAGE: &str = "I had trouble formatting the code changes. The code might be incomplete. Please review it, and if something is wrong, ask me to try again.";
pub const ATTACHMENT_FAILURE_TEXT: &str =
    "Sorry, I failed to process one of the images you uploaded.";
pub const APPLIED_CHANGES_ACK: &str = "I've applied the requested code changes.";
pub const RESTORED_NOTE: &str = "I have restored the project to this checkpoint and removed subsequent changes from our conversation.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    Unauthorized,
    NetworkFailure,
    Timeout,
    Cancelled,
    Unknown,
}

impl ErrorKind {
    #[must_use]
    pub fn user_message(self) -> &'static str {
        match self {
            Self::RateLimited => "You've reached your usage limit for the AI model. Please check your plan and billing details.",
            Self::Unauthorized => "The API key is invalid or missing. Please check your settings and provide a valid key for the selected model.",
            Self::NetworkFailure => "Connection to the AI service failed. Please check your internet connection and try again.",
            Self::Timeout => "The request timed out. There might be a network issue or a problem with the AI service. Please try again later.",
            Self::Cancelled => "Generation stopped.",
            Self::Unknown => "An unexpected error occurred with the AI service. Please check your connection and try again.",
        }
    }
}

fn quota_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)resource[_ ]?exhausted|rate[ _-]?limit|quota")
            .expect("quota regex must compile")
    })
}

fn timeout_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)aborterror|timed[ _-]?out").expect("timeout regex must compile")
    })
}

fn embedded_object_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("object regex must compile"))
}

#[must_use]
pub fn classify(error: &SourceError) -> ErrorKind {
    match error {
        SourceError::Aborted => ErrorKind::Cancelled,
        SourceError::Status { status: 429, .. } => ErrorKind::RateLimited,
        SourceError::Status {
            status: 401 | 403, ..
        } => ErrorKind::Unauthorized,
        other => classify_message(&other.to_string()),
    }
}

/// Classifies free-form error text.
#[must_use]
pub fn classify_message(raw: &str) -> ErrorKind {
    if has_embedded_rate_limit(raw) || quota_regex().is_match(raw) {
        return ErrorKind::RateLimited;
    }
    if timeout_regex().is_match(raw) {
        return ErrorKind::Timeout;
    }

    let lowered = raw.to_lowercase();
    if lowered.contains("api key") || lowered.contains("401") {
        return ErrorKind::Unauthorized;
    }
    if ["failed to fetch", "network", "connection"]
        .iter()
        .any(|needle| lowered.contains(needle))
    {
        return ErrorKind::NetworkFailure;
    }

    ErrorKind::Unknown
}

fn has_embedded_rate_limit(raw: &str) -> bool {
    let Some(object) = embedded_object_regex().find(raw) else {
        return false;
    };
    let Ok(value) = serde_json::from_str::<Value>(object.as_str()) else {
        return false;
    };

    match &value["error"]["code"] {
        Value::Number(code) => code.as_u64() == Some(429),
        Value::String(code) => code == "429",
        _ => false,
    }
}
