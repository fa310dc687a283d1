//! Deterministic scripted implementation of the `stream_source` contract.
//!
//! Scripts replay fixed chunks with optional delays, failures, or an
//! indefinite hang, and honor cancellation at every step. Intended for local
//! runs and turn-level integration tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use futures_util::{stream, StreamExt};
use stream_source::{
    CancelSignal, ChunkSource, ChunkStream, SourceError, SourceInitError, SourceProfile,
    SourceRequest,
};
use tracing::debug;

/// Stable source identifier used for explicit startup selection.
pub const SCRIPTED_SOURCE_ID: &str = "scripted";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    Chunk(String),
    Delay(Duration),
    /// Yields the error and ends the stream.
    Fail(SourceError),
    /// Yields nothing until cancelled.
    Hang,
}

/// Ordered steps replayed for one turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    steps: Vec<ScriptStep>,
}

impl Script {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits `text` into word-sized chunks, each ending at a space or newline.
    #[must_use]
    pub fn from_response_text(text: &str) -> Self {
        let mut script = Self::new();
        let mut pending = String::new();

        for ch in text.chars() {
            pending.push(ch);
            if matches!(ch, ' ' | '\n') {
                script = script.chunk(std::mem::take(&mut pending));
            }
        }
        if !pending.is_empty() {
            script = script.chunk(pending);
        }

        script
    }

    #[must_use]
    pub fn chunk(mut self, text: impl Into<String>) -> Self {
        self.steps.push(ScriptStep::Chunk(text.into()));
        self
    }

    #[must_use]
    pub fn delay(mut self, duration: Duration) -> Self {
        self.steps.push(ScriptStep::Delay(duration));
        self
    }

    #[must_use]
    pub fn fail(mut self, error: SourceError) -> Self {
        self.steps.push(ScriptStep::Fail(error));
        self
    }

    #[must_use]
    pub fn hang(mut self) -> Self {
        self.steps.push(ScriptStep::Hang);
        self
    }

    /// Inserts `delay` before every chunk.
    #[must_use]
    pub fn paced(self, delay: Duration) -> Self {
        if delay.is_zero() {
            return self;
        }

        let steps = self
            .steps
            .into_iter()
            .flat_map(|step| match step {
                ScriptStep::Chunk(_) => vec![ScriptStep::Delay(delay), step],
                other => vec![other],
            })
            .collect();
        Self { steps }
    }

    #[must_use]
    pub fn steps(&self) -> &[ScriptStep] {
        &self.steps
    }
}

/// Scripted source replaying one script per opened turn.
///
/// Turn `n` replays the `n`th script; once scripts run out the last one is
/// repeated. Every request is recorded for later inspection.
#[derive(Debug)]
pub struct ScriptedSource {
    scripts: Vec<Script>,
    opened: AtomicUsize,
    requests: Mutex<Vec<SourceRequest>>,
}

impl ScriptedSource {
    #[must_use]
    pub fn new(script: Script) -> Self {
        Self::with_turns(vec![script])
    }

    #[must_use]
    pub fn with_turns(scripts: Vec<Script>) -> Self {
        Self {
            scripts,
            opened: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replays `text` word by word.
    #[must_use]
    pub fn from_response_text(text: &str) -> Self {
        Self::new(Script::from_response_text(text))
    }

    /// Loads a full response text from `path`.
    pub fn from_script_file(path: &Path) -> Result<Self, SourceInitError> {
        let text = std::fs::read_to_string(path).map_err(|error| {
            SourceInitError::new(format!(
                "failed to read response script {}: {error}",
                path.display()
            ))
        })?;
        Ok(Self::from_response_text(&text))
    }

    /// Requests received so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<SourceRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    #[must_use]
    pub fn opened_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn script_for_turn(&self, index: usize) -> Script {
        self.scripts
            .get(index)
            .or_else(|| self.scripts.last())
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for ScriptedSource {
    fn default() -> Self {
        Self::from_response_text(concat!(
            "I'll set up a small starter page.\n\n",
            "[CODE_CHANGES]\n",
            "{\"files\":[",
            "{\"operation\":\"CREATE\",\"path\":\"index.html\",\"description\":\"Entry page\",",
            "\"content\":\"<!doctype html>\\n<html>\\n  <body>\\n    <h1>Hello</h1>\\n  </body>\\n</html>\\n\"},",
            "{\"operation\":\"CREATE\",\"path\":\"styles/main.css\",\"description\":\"Base styles\",",
            "\"content\":\"body { font-family: sans-serif; }\\n\"}",
            "]}\n",
            "[CODE_CHANGES_END]\n",
            "The page is ready.\n",
        ))
    }
}

impl ChunkSource for ScriptedSource {
    fn profile(&self) -> SourceProfile {
        SourceProfile {
            source_id: SCRIPTED_SOURCE_ID.to_string(),
            model_id: "scripted-model".to_string(),
        }
    }

    fn open(&self, request: SourceRequest, cancel: CancelSignal) -> ChunkStream {
        let index = self.opened.fetch_add(1, Ordering::SeqCst);
        debug!(turn_id = request.turn_id, index, "opening scripted stream");
        lock_unpoisoned(&self.requests).push(request);

        let steps = self.script_for_turn(index).steps.into_iter();
        stream::unfold((steps, cancel), |(mut steps, cancel)| async move {
            loop {
                if cancel.is_cancelled() {
                    return None;
                }

                match steps.next()? {
                    ScriptStep::Chunk(text) => return Some((Ok(text), (steps, cancel))),
                    ScriptStep::Delay(duration) => {
                        tokio::select! {
                            () = cancel.cancelled() => return None,
                            () = tokio::time::sleep(duration) => {}
                        }
                    }
                    ScriptStep::Fail(error) => {
                        return Some((Err(error), (Vec::new().into_iter(), cancel)));
                    }
                    ScriptStep::Hang => {
                        cancel.cancelled().await;
                        return None;
                    }
                }
            }
        })
        .boxed()
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
