use thiserror::Error;
use tracing::info;

use crate::errors::RESTORED_NOTE;
use crate::lock_unpoisoned;
use crate::message::Message;
use crate::turn::{TurnController, TurnEvent};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RestoreError {
    #[error("a turn is active; stop it before restoring a checkpoint")]
    TurnActive,

    #[error("no message with id '{id}'")]
    UnknownMessage { id: String },

    #[error("message '{id}' has no checkpoint")]
    NoCheckpoint { id: String },
}

impl TurnController {
    /// Rolls the store back to the checkpoint carried by `message_id`.
    ///
    /// History is truncated to end at that message and a note is appended;
    /// the note is returned.
    pub fn restore_checkpoint(&self, message_id: &str) -> Result<Message, RestoreError> {
        let (note, kept) = {
            let mut state = lock_unpoisoned(&self.state);
            if state.is_busy() {
                return Err(RestoreError::TurnActive);
            }

            let index = state
                .messages
                .iter()
                .position(|message| message.id == message_id)
                .ok_or_else(|| RestoreError::UnknownMessage {
                    id: message_id.to_string(),
                })?;
            let checkpoint = state.messages[index].checkpoint.clone().ok_or_else(|| {
                RestoreError::NoCheckpoint {
                    id: message_id.to_string(),
                }
            })?;

            state.store = checkpoint;
            state.messages.truncate(index + 1);
            let kept = state.messages.len();

            let note = Message::assistant(RESTORED_NOTE);
            state.messages.push(note.clone());
            (note, kept)
        };

        info!(message_id, kept, "restored checkpoint");
        self.emit_all(vec![
            TurnEvent::StoreReplaced,
            TurnEvent::HistoryTruncated { len: kept },
            TurnEvent::MessageAppended(note.clone()),
        ]);
        Ok(note)
    }
}
