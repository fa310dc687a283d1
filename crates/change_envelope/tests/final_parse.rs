use assert_matches::assert_matches;
use pretty_assertions::assert_eq;

use change_envelope::{extract_final, EnvelopeError, FinalExtraction};
use file_patch::{ChangeKind, ChangeOperation};

#[test]
fn parses_single_create_record() {
    let buffer = "Here you go.\n[CODE_CHANGES]\n{\"files\":[{\"operation\":\"CREATE\",\"path\":\"a.txt\",\"description\":\"d\",\"content\":\"hi\"}]}\n[CODE_CHANGES_END]";

    let extraction = extract_final(buffer);

    assert_eq!(
        extraction,
        FinalExtraction {
            changes: vec![ChangeOperation::create("a.txt", "hi").with_description("d")],
            error: None,
        }
    );
}

#[test]
fn response_without_envelope_is_error_free_and_empty() {
    assert_eq!(extract_final("Just chatting, no code."), FinalExtraction::default());
}

#[test]
fn unterminated_envelope_is_error_free_and_empty() {
    let buffer = "Plan\n[CODE_CHANGES]\n{\"files\":[{\"operation\":\"DELETE\",\"path\":\"a\"}]}";
    assert_eq!(extract_final(buffer), FinalExtraction::default());
}

#[test]
fn fenced_json_with_surrounding_prose_is_accepted() {
    let buffer = concat!(
        "Updating styles.\n[CODE_CHANGES]\n",
        "```json\n",
        "{\"files\":[{\"operation\":\"UPDATE\",\"path\":\"src/index.css\",\"description\":\"dark\",\"content\":\"body { color: #fff; }\"},",
        "{\"operation\":\"DELETE\",\"path\":\"src/old.css\",\"description\":\"cleanup\"}]}\n",
        "```\n",
        "[CODE_CHANGES_END]\nDone."
    );

    let extraction = extract_final(buffer);

    assert_eq!(extraction.error, None);
    assert_eq!(
        extraction
            .changes
            .iter()
            .map(|change| (change.kind, change.path.as_str()))
            .collect::<Vec<_>>(),
        vec![
            (ChangeKind::Update, "src/index.css"),
            (ChangeKind::Delete, "src/old.css"),
        ]
    );
    assert_eq!(
        extraction.changes[0].content.as_deref(),
        Some("body { color: #fff; }")
    );
}

#[test]
fn invalid_escape_is_recovered() {
    let buffer = r#"[CODE_CHANGES]{"files":[{"operation":"CREATE","path":"notes.txt","description":"d","content":"line1\qline2"}]}[CODE_CHANGES_END]"#;

    let extraction = extract_final(buffer);

    assert_eq!(extraction.error, None);
    assert_eq!(extraction.changes[0].content.as_deref(), Some("line1qline2"));
}

#[test]
fn unrecoverable_json_reports_strict_error() {
    let buffer = r#"[CODE_CHANGES]{"files":[{"operation":"CREATE","path":"a\q.txt" "content":"x"}]}[CODE_CHANGES_END]"#;

    let extraction = extract_final(buffer);

    assert!(extraction.changes.is_empty());
    assert_matches!(
        extraction.error,
        Some(EnvelopeError::Malformed { ref message, .. }) if message.contains("invalid escape")
    );
}

#[test]
fn missing_files_array_is_typed_error() {
    let buffer = r#"[CODE_CHANGES]{"changes":[]}[CODE_CHANGES_END]"#;
    assert_eq!(
        extract_final(buffer).error,
        Some(EnvelopeError::MissingFilesArray)
    );

    let buffer = r#"[CODE_CHANGES]{"files":{"path":"a"}}[CODE_CHANGES_END]"#;
    assert_eq!(
        extract_final(buffer).error,
        Some(EnvelopeError::MissingFilesArray)
    );
}

#[test]
fn envelope_without_object_is_typed_error() {
    let buffer = "[CODE_CHANGES]\nI forgot the JSON\n[CODE_CHANGES_END]";
    assert_eq!(extract_final(buffer).error, Some(EnvelopeError::NoJsonObject));
}

#[test]
fn record_shape_errors_are_malformed() {
    let buffer = r#"[CODE_CHANGES]{"files":[{"operation":"MOVE","path":"a"}]}[CODE_CHANGES_END]"#;
    assert_matches!(
        extract_final(buffer).error,
        Some(EnvelopeError::Malformed { .. })
    );
}

#[test]
fn empty_envelope_block_is_ignored() {
    assert_eq!(
        extract_final("Nothing [CODE_CHANGES][CODE_CHANGES_END] here"),
        FinalExtraction::default()
    );
}
