use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("could not find a valid JSON object within the code block")]
    NoJsonObject,

    #[error("invalid format: 'files' array not found in change envelope")]
    MissingFilesArray,

    #[error("failed to parse code changes: {message}")]
    Malformed {
        message: String,
        line: usize,
        column: usize,
    },
}

impl From<serde_json::Error> for EnvelopeError {
    fn from(error: serde_json::Error) -> Self {
        Self::Malformed {
            message: error.to_string(),
            line: error.line(),
            column: error.column(),
        }
    }
}
