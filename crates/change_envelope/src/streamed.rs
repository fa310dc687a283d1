use file_patch::ChangeOperation;
use tracing::debug;

use crate::START_MARKER;

/// Returns the change records that are structurally complete in a buffer that
/// may still be growing.
///
/// Yields `None` while there is no start marker, while the `{"files":[`
/// opening has not fully arrived, before the first record closes, or when the
/// complete prefix does not parse. Rescans from the marker on every call.
#[must_use]
pub fn extract_streamed(buffer: &str) -> Option<Vec<ChangeOperation>> {
    let (_, after_marker) = buffer.split_once(START_MARKER)?;
    let records = skip_array_open(after_marker)?;
    let boundary = last_record_boundary(records)?;

    let parsable = records[..boundary].trim();
    let parsable = parsable.strip_suffix(',').unwrap_or(parsable);

    match serde_json::from_str::<Vec<ChangeOperation>>(&format!("[{parsable}]")) {
        Ok(changes) => Some(changes),
        Err(error) => {
            debug!(%error, "live change preview is not parseable yet");
            None
        }
    }
}

/// Skips whitespace, an optional fence line, and the `{"files":[` opening.
fn skip_array_open(text: &str) -> Option<&str> {
    let text = text.trim_start();
    let text = match text.strip_prefix("```") {
        Some(fenced) => fenced.trim_start_matches(|ch: char| ch.is_ascii_alphanumeric()),
        None => text,
    };

    let text = text.trim_start().strip_prefix('{')?.trim_start();
    let text = text.strip_prefix("\"files\"")?.trim_start();
    let text = text.strip_prefix(':')?.trim_start();
    text.strip_prefix('[')
}

/// Byte offset just past the last record whose braces balanced, counting
/// braces outside string literals only. Scanning stops at the array close.
fn last_record_boundary(records: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut backslashes = 0usize;
    let mut boundary = None;

    for (index, byte) in records.bytes().enumerate() {
        if byte == b'"' && backslashes % 2 == 0 {
            in_string = !in_string;
        }

        if byte == b'\\' {
            backslashes += 1;
        } else {
            backslashes = 0;
        }

        if in_string {
            continue;
        }

        match byte {
            b'{' => depth += 1,
            b'}' => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                if depth == 0 {
                    boundary = Some(index + 1);
                }
            }
            b']' if depth == 0 => break,
            _ => {}
        }
    }

    boundary
}
