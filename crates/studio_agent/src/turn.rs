use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use change_envelope::{
    conversational_prefix, extract_final, extract_streamed, has_envelope_start, strip_envelopes,
};
use file_patch::{apply_changes, ChangeOperation, FileStore, PatchOutcome, PendingAsset};
use futures_util::StreamExt;
use stream_source::{
    CancelSignal, ChunkSource, ImagePayload, SourceError, SourceProfile, SourceRequest, TurnId,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::attachments::{
    encode_attachments, pending_asset, AttachmentError, ImageAttachment, PreviewGuard,
    PreviewLedger, PreviewRefs,
};
use crate::config::StudioConfig;
use crate::context::{apply_selection, outbound_prompt};
use crate::errors::{
    classify, ErrorKind, APPLIED_CHANGES_ACK, ATTACHMENT_FAILURE_TEXT, PROTOCOL_ERROR_MESSAGE,
};
use crate::lock_unpoisoned;
use crate::message::{history_turns, FailureKind, Message};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TurnStatus {
    #[default]
    Idle,
    Thinking,
    Streaming,
}

/// State change published to the [`TurnObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    StatusChanged(TurnStatus),
    MessageAppended(Message),
    MessageUpdated(Message),
    MessageFinalized(Message),
    StoreReplaced,
    HistoryTruncated { len: usize },
}

/// Receives every state change, outside the controller lock.
pub trait TurnObserver: Send + Sync {
    fn on_event(&self, event: &TurnEvent);
}

#[derive(Debug, Default)]
pub struct NoopObserver;

impl TurnObserver for NoopObserver {
    fn on_event(&self, _event: &TurnEvent) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("a turn is already active")]
    TurnActive,

    #[error("prompt is empty and no images are attached")]
    EmptyPrompt,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnInput {
    pub text: String,
    pub images: Vec<ImageAttachment>,
}

impl TurnInput {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            images: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.images.push(image);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    ProtocolError,
    Cancelled,
    TimedOut,
    Failed(ErrorKind),
    AttachmentFailed,
}

/// Summary of a finalized turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub turn_id: TurnId,
    pub assistant_message_id: String,
    pub outcome: TurnOutcome,
    /// Present when the response carried changes and they were applied.
    pub patch: Option<PatchOutcome>,
}

/// Cancels the turn it was taken from.
#[derive(Debug, Clone)]
pub struct TurnHandle {
    turn_id: TurnId,
    cancel: CancelSignal,
}

impl TurnHandle {
    #[must_use]
    pub fn turn_id(&self) -> TurnId {
        self.turn_id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

struct ActiveTurn {
    turn_id: TurnId,
    cancel: CancelSignal,
}

#[derive(Default)]
pub(crate) struct StudioState {
    pub(crate) status: TurnStatus,
    pub(crate) messages: Vec<Message>,
    pub(crate) store: FileStore,
    selected_elements: Vec<String>,
    active: Option<ActiveTurn>,
}

impl StudioState {
    pub(crate) fn is_busy(&self) -> bool {
        self.active.is_some() || self.status != TurnStatus::Idle
    }

    /// Clears the active slot if it still belongs to `turn_id`.
    fn settle(&mut self, turn_id: TurnId) -> bool {
        if self.active.as_ref().map(|active| active.turn_id) != Some(turn_id) {
            return false;
        }

        self.active = None;
        self.status = TurnStatus::Idle;
        true
    }

    fn finalize_message(
        &mut self,
        message_id: &str,
        update: impl FnOnce(&mut Message),
    ) -> Option<Message> {
        let message = self
            .messages
            .iter_mut()
            .find(|message| message.id == message_id)?;
        update(message);
        message.is_streaming = false;
        message.awaiting_changes = false;
        Some(message.clone())
    }
}

/// Live preview of streamed records; never retracts records already shown.
#[derive(Default)]
struct LiveChanges {
    records: Option<Vec<ChangeOperation>>,
}

impl LiveChanges {
    fn offer(&mut self, candidate: Option<Vec<ChangeOperation>>) -> bool {
        let shown = self.records.as_ref().map_or(0, Vec::len);
        match candidate {
            Some(records) if records.len() >= shown => {
                self.records = Some(records);
                true
            }
            _ => false,
        }
    }
}

enum StreamEnd {
    Completed,
    Cancelled,
    TimedOut,
    Failed(SourceError),
}

/// Owns the conversation and file store and runs one turn at a time.
pub struct TurnController {
    source: Arc<dyn ChunkSource>,
    config: StudioConfig,
    observer: Arc<dyn TurnObserver>,
    previews: Arc<dyn PreviewRefs>,
    next_turn_id: AtomicU64,
    pub(crate) state: Mutex<StudioState>,
}

impl TurnController {
    #[must_use]
    pub fn new(source: Arc<dyn ChunkSource>, config: StudioConfig) -> Self {
        Self {
            source,
            config,
            observer: Arc::new(NoopObserver),
            previews: Arc::new(PreviewLedger::new()),
            next_turn_id: AtomicU64::new(1),
            state: Mutex::new(StudioState::default()),
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn TurnObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn with_previews(mut self, previews: Arc<dyn PreviewRefs>) -> Self {
        self.previews = previews;
        self
    }

    #[must_use]
    pub fn with_file_store(self, store: FileStore) -> Self {
        lock_unpoisoned(&self.state).store = store;
        self
    }

    #[must_use]
    pub fn with_messages(self, messages: Vec<Message>) -> Self {
        lock_unpoisoned(&self.state).messages = messages;
        self
    }

    #[must_use]
    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    #[must_use]
    pub fn source_profile(&self) -> SourceProfile {
        self.source.profile()
    }

    #[must_use]
    pub fn status(&self) -> TurnStatus {
        lock_unpoisoned(&self.state).status
    }

    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        lock_unpoisoned(&self.state).messages.clone()
    }

    #[must_use]
    pub fn file_store(&self) -> FileStore {
        lock_unpoisoned(&self.state).store.clone()
    }

    #[must_use]
    pub fn selected_elements(&self) -> Vec<String> {
        lock_unpoisoned(&self.state).selected_elements.clone()
    }

    /// Sets the element selectors the next prompt is scoped to.
    pub fn set_selected_elements(&self, selectors: Vec<String>) {
        lock_unpoisoned(&self.state).selected_elements = selectors;
    }

    #[must_use]
    pub fn active_turn(&self) -> Option<TurnHandle> {
        lock_unpoisoned(&self.state)
            .active
            .as_ref()
            .map(|active| TurnHandle {
                turn_id: active.turn_id,
                cancel: active.cancel.clone(),
            })
    }

    /// Cancels the active turn. Returns false when no turn is active.
    pub fn stop_generation(&self) -> bool {
        match self.active_turn() {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Runs one turn to completion and returns its finalized summary.
    ///
    /// Every failure after validation resolves to a finalized assistant
    /// message and an `Idle` controller; only overlap and empty input are
    /// reported as errors.
    pub async fn send_message(&self, input: TurnInput) -> Result<TurnReport, SendError> {
        let TurnInput { text, images } = input;
        if text.trim().is_empty() && images.is_empty() {
            return Err(SendError::EmptyPrompt);
        }

        let (turn_id, cancel, prompt) = self.begin_turn(&text)?;
        let mut active = ActiveTurnGuard {
            controller: self,
            turn_id,
            assistant_id: None,
        };
        info!(turn_id, images = images.len(), "turn started");

        let previews = PreviewGuard::create(Arc::clone(&self.previews), &images);
        let user_message = Message::user(prompt.clone()).with_image_refs(previews.refs().to_vec());

        let payloads = match encode_attachments(&images) {
            Ok(payloads) => payloads,
            Err(error) => return Ok(self.finish_attachment_failure(turn_id, user_message, &error)),
        };
        let asset = pending_asset(&payloads);

        let (request, snapshot, assistant_id) =
            self.enter_streaming(turn_id, user_message, &prompt, payloads);
        active.assistant_id = Some(assistant_id.clone());

        let mut buffer = String::new();
        let mut live = LiveChanges::default();
        let end = self
            .consume_stream(request, &cancel, &assistant_id, &mut buffer, &mut live)
            .await;

        let report = match end {
            StreamEnd::Completed => self.finish_completed(
                turn_id,
                &assistant_id,
                &buffer,
                live,
                snapshot,
                asset.as_ref(),
            ),
            StreamEnd::Cancelled => {
                self.finish_stopped(turn_id, &assistant_id, &buffer, FailureKind::Cancelled)
            }
            StreamEnd::TimedOut => {
                self.finish_stopped(turn_id, &assistant_id, &buffer, FailureKind::TimedOut)
            }
            StreamEnd::Failed(error) => self.finish_failed(turn_id, &assistant_id, &error),
        };

        info!(turn_id, outcome = ?report.outcome, "turn finished");
        Ok(report)
    }

    fn begin_turn(&self, text: &str) -> Result<(TurnId, CancelSignal, String), SendError> {
        let mut state = lock_unpoisoned(&self.state);
        if state.is_busy() {
            return Err(SendError::TurnActive);
        }

        let turn_id = self.next_turn_id.fetch_add(1, Ordering::SeqCst);
        let cancel = CancelSignal::new();
        let selectors = std::mem::take(&mut state.selected_elements);
        let prompt = apply_selection(text, &selectors);

        state.active = Some(ActiveTurn {
            turn_id,
            cancel: cancel.clone(),
        });
        state.status = TurnStatus::Thinking;
        drop(state);

        self.emit(TurnEvent::StatusChanged(TurnStatus::Thinking));
        Ok((turn_id, cancel, prompt))
    }

    fn enter_streaming(
        &self,
        turn_id: TurnId,
        user_message: Message,
        prompt: &str,
        images: Vec<ImagePayload>,
    ) -> (SourceRequest, FileStore, String) {
        let placeholder = Message::streaming_placeholder();
        let assistant_id = placeholder.id.clone();

        let (request, snapshot) = {
            let mut state = lock_unpoisoned(&self.state);
            let snapshot = state.store.clone();
            let request = SourceRequest {
                turn_id,
                system_instructions: self.config.system_instructions.clone(),
                history: history_turns(&state.messages),
                prompt: outbound_prompt(prompt, &snapshot),
                images,
            };

            state.messages.push(user_message.clone());
            state.messages.push(placeholder.clone());
            state.status = TurnStatus::Streaming;
            (request, snapshot)
        };

        self.emit_all(vec![
            TurnEvent::MessageAppended(user_message),
            TurnEvent::MessageAppended(placeholder),
            TurnEvent::StatusChanged(TurnStatus::Streaming),
        ]);
        (request, snapshot, assistant_id)
    }

    async fn consume_stream(
        &self,
        request: SourceRequest,
        cancel: &CancelSignal,
        assistant_id: &str,
        buffer: &mut String,
        live: &mut LiveChanges,
    ) -> StreamEnd {
        let turn_id = request.turn_id;
        let mut stream = self.source.open(request, cancel.clone());
        let deadline = tokio::time::sleep(self.config.turn_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => return StreamEnd::Cancelled,
                () = &mut deadline => {
                    warn!(turn_id, timeout = ?self.config.turn_timeout, "turn timed out");
                    cancel.cancel();
                    return StreamEnd::TimedOut;
                }
                next = stream.next() => match next {
                    Some(Ok(chunk)) => {
                        buffer.push_str(&chunk);
                        debug!(
                            turn_id,
                            chunk_bytes = chunk.len(),
                            total_bytes = buffer.len(),
                            "chunk received"
                        );
                        self.record_chunk(assistant_id, buffer.as_str(), live);
                    }
                    Some(Err(error)) => return StreamEnd::Failed(error),
                    None => return StreamEnd::Completed,
                },
            }
        }
    }

    fn record_chunk(&self, assistant_id: &str, buffer: &str, live: &mut LiveChanges) {
        let accepted = live.offer(extract_streamed(buffer));

        let updated = {
            let mut state = lock_unpoisoned(&self.state);
            let Some(message) = state
                .messages
                .iter_mut()
                .find(|message| message.id == assistant_id)
            else {
                return;
            };

            message.text = conversational_prefix(buffer).to_string();
            message.awaiting_changes = has_envelope_start(buffer);
            if accepted {
                message.changes = live.records.clone();
            }
            message.clone()
        };

        self.emit(TurnEvent::MessageUpdated(updated));
    }

    fn finish_completed(
        &self,
        turn_id: TurnId,
        assistant_id: &str,
        buffer: &str,
        live: LiveChanges,
        snapshot: FileStore,
        asset: Option<&PendingAsset>,
    ) -> TurnReport {
        let extraction = extract_final(buffer);
        let mut text = strip_envelopes(buffer);
        let mut changes = live.records;
        let mut checkpoint = None;
        let mut patch = None;
        let mut protocol_error = false;
        let mut events = Vec::new();

        let mut state = lock_unpoisoned(&self.state);
        match extraction.error {
            Some(error) => {
                warn!(turn_id, %error, "response carried unusable code changes");
                protocol_error = true;
            }
            None if !extraction.changes.is_empty() => {
                let outcome = apply_changes(&extraction.changes, &state.store, asset);
                if outcome.applied_count() > 0 {
                    state.store = outcome.store.clone();
                    checkpoint = Some(snapshot);
                    events.push(TurnEvent::StoreReplaced);
                    if text.is_empty() {
                        text = APPLIED_CHANGES_ACK.to_string();
                    }
                }
                debug!(
                    turn_id,
                    applied = outcome.applied_count(),
                    asset_consumed = outcome.asset_consumed,
                    "code changes applied"
                );
                changes = Some(extraction.changes);
                patch = Some(outcome);
            }
            None => {}
        }

        let finalized = state.finalize_message(assistant_id, |message| {
            message.text = text;
            message.changes = changes;
            message.checkpoint = checkpoint;
            if protocol_error {
                message.failure = Some(FailureKind::Protocol);
                message.error = Some(PROTOCOL_ERROR_MESSAGE.to_string());
            }
        });
        let settled = state.settle(turn_id);
        drop(state);

        events.extend(finalized.map(TurnEvent::MessageFinalized));
        if settled {
            events.push(TurnEvent::StatusChanged(TurnStatus::Idle));
        }
        self.emit_all(events);

        TurnReport {
            turn_id,
            assistant_message_id: assistant_id.to_string(),
            outcome: if protocol_error {
                TurnOutcome::ProtocolError
            } else {
                TurnOutcome::Completed
            },
            patch,
        }
    }

    fn finish_stopped(
        &self,
        turn_id: TurnId,
        assistant_id: &str,
        buffer: &str,
        failure: FailureKind,
    ) -> TurnReport {
        let (error_kind, outcome) = match failure {
            FailureKind::TimedOut => (ErrorKind::Timeout, TurnOutcome::TimedOut),
            _ => (ErrorKind::Cancelled, TurnOutcome::Cancelled),
        };
        let text = conversational_prefix(buffer).trim().to_string();

        self.finalize_failure(turn_id, assistant_id, text, failure, error_kind.user_message());
        TurnReport {
            turn_id,
            assistant_message_id: assistant_id.to_string(),
            outcome,
            patch: None,
        }
    }

    fn finish_failed(&self, turn_id: TurnId, assistant_id: &str, error: &SourceError) -> TurnReport {
        let kind = classify(error);
        warn!(turn_id, %error, ?kind, "chunk source failed");

        let (failure, outcome) = match kind {
            ErrorKind::Cancelled => (FailureKind::Cancelled, TurnOutcome::Cancelled),
            ErrorKind::Timeout => (FailureKind::TimedOut, TurnOutcome::TimedOut),
            other => (FailureKind::Transport(other), TurnOutcome::Failed(other)),
        };

        self.finalize_failure(turn_id, assistant_id, String::new(), failure, kind.user_message());
        TurnReport {
            turn_id,
            assistant_message_id: assistant_id.to_string(),
            outcome,
            patch: None,
        }
    }

    fn finalize_failure(
        &self,
        turn_id: TurnId,
        assistant_id: &str,
        text: String,
        failure: FailureKind,
        error: &str,
    ) {
        let mut state = lock_unpoisoned(&self.state);
        let finalized = state.finalize_message(assistant_id, |message| {
            message.text = text;
            message.changes = None;
            message.failure = Some(failure);
            message.error = Some(error.to_string());
        });
        let settled = state.settle(turn_id);
        drop(state);

        let mut events: Vec<TurnEvent> =
            finalized.map(TurnEvent::MessageFinalized).into_iter().collect();
        if settled {
            events.push(TurnEvent::StatusChanged(TurnStatus::Idle));
        }
        self.emit_all(events);
    }

    fn finish_attachment_failure(
        &self,
        turn_id: TurnId,
        user_message: Message,
        error: &AttachmentError,
    ) -> TurnReport {
        warn!(turn_id, %error, "image attachment could not be processed");
        let reply = Message::assistant(ATTACHMENT_FAILURE_TEXT)
            .with_failure(FailureKind::Attachment, error.to_string());
        let assistant_message_id = reply.id.clone();

        let settled = {
            let mut state = lock_unpoisoned(&self.state);
            state.messages.push(user_message.clone());
            state.messages.push(reply.clone());
            state.settle(turn_id)
        };

        let mut events = vec![
            TurnEvent::MessageAppended(user_message),
            TurnEvent::MessageAppended(reply.clone()),
            TurnEvent::MessageFinalized(reply),
        ];
        if settled {
            events.push(TurnEvent::StatusChanged(TurnStatus::Idle));
        }
        self.emit_all(events);

        TurnReport {
            turn_id,
            assistant_message_id,
            outcome: TurnOutcome::AttachmentFailed,
            patch: None,
        }
    }

    /// Releases a turn whose future was dropped before it finalized.
    fn abandon_turn(&self, turn_id: TurnId, assistant_id: Option<&str>) {
        let mut state = lock_unpoisoned(&self.state);
        if !state.settle(turn_id) {
            return;
        }

        let finalized = assistant_id.and_then(|id| {
            state.finalize_message(id, |message| {
                message.changes = None;
                message.failure = Some(FailureKind::Cancelled);
                message.error = Some(ErrorKind::Cancelled.user_message().to_string());
            })
        });
        drop(state);

        debug!(turn_id, "turn abandoned before finalization");
        let mut events: Vec<TurnEvent> =
            finalized.map(TurnEvent::MessageFinalized).into_iter().collect();
        events.push(TurnEvent::StatusChanged(TurnStatus::Idle));
        self.emit_all(events);
    }

    pub(crate) fn emit(&self, event: TurnEvent) {
        self.observer.on_event(&event);
    }

    pub(crate) fn emit_all(&self, events: Vec<TurnEvent>) {
        for event in events {
            self.emit(event);
        }
    }
}

/// Frees the active-turn slot if `send_message` is dropped mid-turn.
struct ActiveTurnGuard<'a> {
    controller: &'a TurnController,
    turn_id: TurnId,
    assistant_id: Option<String>,
}

impl Drop for ActiveTurnGuard<'_> {
    fn drop(&mut self) {
        self.controller
            .abandon_turn(self.turn_id, self.assistant_id.as_deref());
    }
}

#[cfg(test)]
mod tests {
    use file_patch::ChangeOperation;

    use super::{LiveChanges, StudioState, TurnStatus};

    #[test]
    fn live_changes_never_shrink() {
        let mut live = LiveChanges::default();
        let one = vec![ChangeOperation::delete("a")];
        let two = vec![ChangeOperation::delete("a"), ChangeOperation::delete("b")];

        assert!(!live.offer(None));
        assert!(live.offer(Some(two.clone())));
        assert!(!live.offer(Some(one)));
        assert!(!live.offer(None));
        assert_eq!(live.records, Some(two));
    }

    #[test]
    fn settle_ignores_other_turns() {
        let mut state = StudioState::default();
        assert!(!state.settle(1));
        assert_eq!(state.status, TurnStatus::Idle);
        assert!(!state.is_busy());
    }
}
