#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use stream_source_mock::{Script, ScriptedSource};
use studio_agent::{
    PreviewLedger, StudioConfig, TurnController, TurnEvent, TurnObserver, TurnStatus,
};

pub const CREATE_A_TXT: &str = "Here you go.\n[CODE_CHANGES]\n{\"files\":[{\"operation\":\"CREATE\",\"path\":\"a.txt\",\"description\":\"d\",\"content\":\"hi\"}]}\n[CODE_CHANGES_END]";

pub const UPDATE_A_TXT: &str = "Changing it.\n[CODE_CHANGES]\n{\"files\":[{\"operation\":\"UPDATE\",\"path\":\"a.txt\",\"description\":\"d\",\"content\":\"bye\"}]}\n[CODE_CHANGES_END]";

/// One complete record followed by an open second record.
pub const PARTIAL_ENVELOPE: &str = "Plan: two files.\n[CODE_CHANGES]\n{\"files\":[{\"operation\":\"CREATE\",\"path\":\"a.txt\",\"description\":\"d\",\"content\":\"hi\"},{\"operation\":\"CREATE\",\"path\":\"b.txt\"";

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<TurnEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<TurnEvent> {
        lock_unpoisoned(&self.events).clone()
    }

    pub fn statuses(&self) -> Vec<TurnStatus> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                TurnEvent::StatusChanged(status) => Some(status),
                _ => None,
            })
            .collect()
    }

    /// Live change counts seen on streaming updates, in order.
    pub fn live_change_counts(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                TurnEvent::MessageUpdated(message) => {
                    Some(message.changes.as_ref().map_or(0, Vec::len))
                }
                _ => None,
            })
            .collect()
    }
}

impl TurnObserver for RecordingObserver {
    fn on_event(&self, event: &TurnEvent) {
        lock_unpoisoned(&self.events).push(event.clone());
    }
}

pub struct Harness {
    pub controller: Arc<TurnController>,
    pub source: Arc<ScriptedSource>,
    pub observer: Arc<RecordingObserver>,
    pub previews: Arc<PreviewLedger>,
}

pub fn harness(scripts: Vec<Script>) -> Harness {
    harness_with_config(scripts, StudioConfig::default())
}

pub fn harness_with_config(scripts: Vec<Script>, config: StudioConfig) -> Harness {
    let source = Arc::new(ScriptedSource::with_turns(scripts));
    let observer = Arc::new(RecordingObserver::default());
    let previews = Arc::new(PreviewLedger::new());

    let controller = TurnController::new(source.clone(), config)
        .with_observer(observer.clone())
        .with_previews(previews.clone());

    Harness {
        controller: Arc::new(controller),
        source,
        observer,
        previews,
    }
}

pub fn short_timeout() -> StudioConfig {
    StudioConfig::default().with_turn_timeout(Duration::from_secs(5))
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
