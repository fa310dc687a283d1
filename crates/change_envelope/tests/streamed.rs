use pretty_assertions::assert_eq;

use change_envelope::{extract_final, extract_streamed};
use file_patch::ChangeOperation;

const TWO_FILE_RESPONSE: &str = concat!(
    "I'll add a counter.\n\n",
    "[CODE_CHANGES]\n",
    "{\"files\":[",
    "{\"operation\":\"CREATE\",\"path\":\"src/components/Counter.tsx\",\"description\":\"counter\",",
    "\"content\":\"export const Counter = () => { const label = \\\"{count}\\\"; return <span>{label}</span>; };\"},",
    "{\"operation\":\"UPDATE\",\"path\":\"src/App.tsx\",\"description\":\"wire up\",",
    "\"content\":\"import { Counter } from './components/Counter';\\nexport default () => <Counter />;\"}",
    "]}\n",
    "[CODE_CHANGES_END]\n",
    "Let me know if you want \"more\" {features}."
);

#[test]
fn returns_none_without_marker() {
    assert_eq!(extract_streamed("Thinking about {braces} and \"quotes\""), None);
}

#[test]
fn returns_none_until_first_record_closes() {
    let partial = "[CODE_CHANGES]\n{\"files\":[{\"operation\":\"CREATE\",\"path\":\"a.txt\",\"description\":\"d\",\"content\":\"h";
    assert_eq!(extract_streamed(partial), None);

    let closed = format!("{partial}i\"}}");
    assert_eq!(
        extract_streamed(&closed),
        Some(vec![ChangeOperation::create("a.txt", "hi").with_description("d")])
    );
}

#[test]
fn returns_none_while_array_open_token_is_incomplete() {
    assert_eq!(extract_streamed("Plan\n[CODE_CHANGES]\n{\"fi"), None);
    assert_eq!(extract_streamed("Plan\n[CODE_CHANGES]"), None);
}

#[test]
fn keeps_complete_records_while_next_one_streams() {
    let cut = TWO_FILE_RESPONSE
        .find("\"wire up\"")
        .expect("second record present");

    let changes = extract_streamed(&TWO_FILE_RESPONSE[..cut]).expect("first record complete");

    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].path, "src/components/Counter.tsx");
}

#[test]
fn structurally_complete_but_invalid_record_yields_none() {
    let buffer = "[CODE_CHANGES]{\"files\":[{\"operation\":\"MOVE\",\"path\":\"a\"},";
    assert_eq!(extract_streamed(buffer), None);
}

#[test]
fn trailing_prose_after_envelope_does_not_disturb_result() {
    let changes = extract_streamed(TWO_FILE_RESPONSE).expect("records");
    assert_eq!(changes, extract_final(TWO_FILE_RESPONSE).changes);
}

#[test]
fn any_chunking_converges_to_final_result() {
    let expected = extract_final(TWO_FILE_RESPONSE);
    assert_eq!(expected.error, None);
    assert_eq!(expected.changes.len(), 2);

    let chars = TWO_FILE_RESPONSE.chars().collect::<Vec<_>>();
    for chunk_size in 1..=13 {
        let mut buffer = String::new();
        let mut live: Option<Vec<ChangeOperation>> = None;

        for chunk in chars.chunks(chunk_size) {
            buffer.extend(chunk);
            if let Some(changes) = extract_streamed(&buffer) {
                let seen = live.as_ref().map_or(0, Vec::len);
                assert!(
                    changes.len() >= seen,
                    "live records shrank at chunk size {chunk_size}"
                );
                live = Some(changes);
            }
        }

        assert_eq!(live.as_deref(), Some(expected.changes.as_slice()));
    }
}

#[test]
fn never_panics_on_truncated_prefixes() {
    let mut boundaries = TWO_FILE_RESPONSE
        .char_indices()
        .map(|(index, _)| index)
        .collect::<Vec<_>>();
    boundaries.push(TWO_FILE_RESPONSE.len());

    for end in boundaries {
        if let Some(changes) = extract_streamed(&TWO_FILE_RESPONSE[..end]) {
            assert!(!changes.is_empty());
            assert!(changes.iter().all(|change| !change.path.is_empty()));
        }
    }
}

#[test]
fn handles_multibyte_content() {
    let buffer = "[CODE_CHANGES]{\"files\":[{\"operation\":\"CREATE\",\"path\":\"i18n/ja.json\",\"description\":\"訳\",\"content\":\"{\\\"hello\\\":\\\"こんにちは\\\"}\"}";
    let changes = extract_streamed(buffer).expect("record");
    assert_eq!(changes[0].content.as_deref(), Some("{\"hello\":\"こんにちは\"}"));
}
