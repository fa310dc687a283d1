//! Recognition of the file-change envelope embedded in model output.
//!
//! Model responses are free-form conversational text that may contain one
//! marker-delimited block:
//!
//! ```text
//! Here is the plan...
//! [CODE_CHANGES]
//! {"files":[{"operation":"CREATE","path":"a.txt","description":"d","content":"hi"}]}
//! [CODE_CHANGES_END]
//! ```
//!
//! [`extract_streamed`] recovers the complete records from a buffer that is
//! still growing and is safe to call on every chunk. [`extract_final`] parses
//! the finished buffer strictly, with one recovery pass for invalid escape
//! sequences. Neither panics on malformed input.

pub mod display;
pub mod error;
pub mod final_parse;
pub mod streamed;

pub use display::{conversational_prefix, has_envelope_start, strip_envelopes};
pub use error::EnvelopeError;
pub use final_parse::{extract_final, FinalExtraction};
pub use streamed::extract_streamed;

/// Opens the change envelope.
pub const START_MARKER: &str = "[CODE_CHANGES]";
/// Closes the change envelope.
pub const END_MARKER: &str = "[CODE_CHANGES_END]";
