mod support;

use file_patch::{FileRecord, FileStore};
use pretty_assertions::assert_eq;
use stream_source_mock::Script;
use studio_agent::errors::RESTORED_NOTE;
use studio_agent::{RestoreError, Role, TurnEvent, TurnInput};

use support::{harness, CREATE_A_TXT, UPDATE_A_TXT};

async fn two_turns() -> support::Harness {
    let h = harness(vec![
        Script::from_response_text(CREATE_A_TXT),
        Script::from_response_text(UPDATE_A_TXT),
        Script::from_response_text("Just chatting."),
    ]);

    for prompt in ["create", "update", "chat"] {
        h.controller
            .send_message(TurnInput::new(prompt))
            .await
            .expect("turn accepted");
    }
    h
}

#[tokio::test]
async fn restore_resets_store_and_truncates_history() {
    let h = two_turns().await;
    assert_eq!(
        h.controller.file_store().get("a.txt").map(FileRecord::content),
        Some("bye")
    );

    let update_reply = h.controller.messages()[3].clone();
    assert_eq!(update_reply.text, "Changing it.");

    let note = h
        .controller
        .restore_checkpoint(&update_reply.id)
        .expect("restore");

    assert_eq!(
        h.controller.file_store(),
        FileStore::new().with_record("a.txt", FileRecord::text("hi", "txt"))
    );

    let messages = h.controller.messages();
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[3].id, update_reply.id);
    assert_eq!(messages[4], note);
    assert_eq!(note.role, Role::Assistant);
    assert_eq!(note.text, RESTORED_NOTE);

    assert!(h
        .observer
        .events()
        .contains(&TurnEvent::HistoryTruncated { len: 4 }));
}

#[tokio::test]
async fn restoring_the_first_checkpoint_empties_the_store() {
    let h = two_turns().await;
    let create_reply_id = h.controller.messages()[1].id.clone();

    h.controller
        .restore_checkpoint(&create_reply_id)
        .expect("restore");

    assert!(h.controller.file_store().is_empty());
    assert_eq!(h.controller.messages().len(), 3);
}

#[tokio::test]
async fn messages_without_checkpoints_cannot_be_restored() {
    let h = two_turns().await;
    let messages = h.controller.messages();

    assert_eq!(
        h.controller.restore_checkpoint(&messages[0].id),
        Err(RestoreError::NoCheckpoint {
            id: messages[0].id.clone()
        })
    );
    assert_eq!(
        h.controller.restore_checkpoint(&messages[5].id),
        Err(RestoreError::NoCheckpoint {
            id: messages[5].id.clone()
        })
    );
    assert_eq!(
        h.controller.restore_checkpoint("missing"),
        Err(RestoreError::UnknownMessage {
            id: "missing".to_string()
        })
    );
    assert_eq!(h.controller.messages(), messages);
}

#[tokio::test]
async fn conversation_continues_from_restored_state() {
    let h = harness(vec![
        Script::from_response_text(CREATE_A_TXT),
        Script::from_response_text(UPDATE_A_TXT),
        Script::from_response_text("Noted."),
    ]);
    for prompt in ["create", "update"] {
        h.controller
            .send_message(TurnInput::new(prompt))
            .await
            .expect("turn accepted");
    }

    let update_reply_id = h.controller.messages()[3].id.clone();
    h.controller
        .restore_checkpoint(&update_reply_id)
        .expect("restore");
    h.controller
        .send_message(TurnInput::new("what now"))
        .await
        .expect("turn after restore");

    let last_request = h.source.requests().pop().expect("request");
    assert_eq!(last_request.history.len(), 5);
    assert!(last_request.prompt.contains("```txt\nhi\n```"));
}
