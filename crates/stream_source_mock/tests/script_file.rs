use futures_util::StreamExt;
use stream_source::{CancelSignal, ChunkSource, SourceRequest};
use stream_source_mock::ScriptedSource;

fn request() -> SourceRequest {
    SourceRequest {
        turn_id: 1,
        system_instructions: String::new(),
        history: Vec::new(),
        prompt: "build it".to_string(),
        images: Vec::new(),
    }
}

#[tokio::test]
async fn script_file_replays_full_response_text() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("response.txt");
    std::fs::write(&path, "Sure thing.\n[CODE_CHANGES]{\"files\":[]}[CODE_CHANGES_END]")
        .expect("write script");

    let source = ScriptedSource::from_script_file(&path).expect("load script");
    let text = source
        .open(request(), CancelSignal::new())
        .map(|item| item.expect("scripted chunk"))
        .collect::<String>()
        .await;

    assert_eq!(text, "Sure thing.\n[CODE_CHANGES]{\"files\":[]}[CODE_CHANGES_END]");
    assert_eq!(source.requests()[0].prompt, "build it");
}

#[test]
fn missing_script_file_is_init_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let error = ScriptedSource::from_script_file(&dir.path().join("absent.txt"))
        .expect_err("missing file");

    assert!(error.message().contains("absent.txt"));
}

#[tokio::test]
async fn default_script_carries_a_change_envelope() {
    let text = ScriptedSource::default()
        .open(request(), CancelSignal::new())
        .map(|item| item.expect("scripted chunk"))
        .collect::<String>()
        .await;

    assert!(text.contains("[CODE_CHANGES]"));
    assert!(text.contains("[CODE_CHANGES_END]"));
}
