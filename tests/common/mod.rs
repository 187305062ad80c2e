#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use concierge::actions::{ActionDispatcher, ActionHandler, ActionRequest, ActionResult, HandlerError};
use concierge::dialogue::{InMemorySessionStore, Mutator, SessionState, SessionStore, StoreError};
use concierge::intent::{
    ClassifierError, IntentCatalog, IntentClassifier, IntentDefinition, IntentResult, SlotDefinition,
};
use concierge::config::DEFAULT_WAKE_PHRASE;
use concierge::kernel::normalizer::Normalizer;
use concierge::kernel::time::ManualClock;
use concierge::kernel::utterance::NormalizedInput;
use concierge::{Orchestrator, TurnSettings};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub const IDLE_SECS: i64 = 600;

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

/// Returns queued results in order, then `unknown`. Records what it was asked.
#[derive(Default)]
pub struct ScriptedClassifier {
    script: Mutex<VecDeque<Result<IntentResult, ClassifierError>>>,
    pub seen: Mutex<Vec<String>>,
}

impl ScriptedClassifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, result: IntentResult) {
        self.script.lock().push_back(Ok(result));
    }

    pub fn push_err(&self, err: ClassifierError) {
        self.script.lock().push_back(Err(err));
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }
}

#[async_trait]
impl IntentClassifier for ScriptedClassifier {
    async fn classify(
        &self,
        input: &NormalizedInput,
        _recent_history: &[IntentResult],
    ) -> Result<IntentResult, ClassifierError> {
        self.seen.lock().push(input.canonical_text.clone());
        self.script.lock().pop_front().unwrap_or_else(|| Ok(IntentResult::unknown()))
    }
}

/// Counts calls and answers with a fixed result.
pub struct CountingHandler {
    pub calls: AtomicUsize,
    pub last: Mutex<Option<ActionRequest>>,
    result: ActionResult,
}

impl CountingHandler {
    pub fn ok() -> Arc<Self> {
        Self::returning(ActionResult::ok())
    }

    pub fn returning(result: ActionResult) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
            result,
        })
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionHandler for CountingHandler {
    async fn handle(&self, request: &ActionRequest) -> Result<ActionResult, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock() = Some(request.clone());
        Ok(self.result.clone())
    }
}

/// Signals `started`, then blocks until `release` before succeeding.
#[derive(Default)]
pub struct GatedHandler {
    pub started: Notify,
    pub release: Notify,
    pub finished: AtomicUsize,
}

#[async_trait]
impl ActionHandler for GatedHandler {
    async fn handle(&self, _request: &ActionRequest) -> Result<ActionResult, HandlerError> {
        self.started.notify_one();
        self.release.notified().await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(ActionResult::ok())
    }
}

/// Sleeps far past any test timeout.
pub struct SlowHandler(pub Duration);

#[async_trait]
impl ActionHandler for SlowHandler {
    async fn handle(&self, _request: &ActionRequest) -> Result<ActionResult, HandlerError> {
        tokio::time::sleep(self.0).await;
        Ok(ActionResult::ok())
    }
}

/// In-memory store that can be switched to fail every call.
pub struct FlakyStore {
    pub inner: InMemorySessionStore,
    pub down: AtomicBool,
}

impl FlakyStore {
    pub fn new(clock: Arc<ManualClock>) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemorySessionStore::new(chrono::Duration::seconds(IDLE_SECS), clock),
            down: AtomicBool::new(false),
        })
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("backend offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        self.check()?;
        self.inner.get(session_id).await
    }

    async fn get_or_create(&self, session_id: &str) -> Result<SessionState, StoreError> {
        self.check()?;
        self.inner.get_or_create(session_id).await
    }

    async fn update(&self, session_id: &str, mutator: Mutator) -> Result<SessionState, StoreError> {
        self.check()?;
        self.inner.update(session_id, mutator).await
    }

    async fn expire_idle(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        self.check()?;
        self.inner.expire_idle(now).await
    }

    async fn remove(&self, session_id: &str) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.remove(session_id).await
    }
}

pub fn catalog() -> IntentCatalog {
    IntentCatalog::new()
        .with(IntentDefinition::new("disable_network", "turn off the network"))
        .with(
            IntentDefinition::new("schedule_meeting", "schedule the meeting")
                .slot(SlotDefinition::required("time", "What time should the meeting be?"))
                .slot(SlotDefinition::optional("title")),
        )
        .with(IntentDefinition::new("send_email", "send the email"))
        .with(IntentDefinition::new("end_session", "end our conversation").ending_session())
}

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub classifier: Arc<ScriptedClassifier>,
    pub store: Arc<FlakyStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub async fn state(&self, session_id: &str) -> Option<SessionState> {
        self.store.inner.get(session_id).await.unwrap()
    }
}

pub fn harness(dispatcher: ActionDispatcher) -> Harness {
    let clock = Arc::new(ManualClock::new(epoch()));
    let classifier = ScriptedClassifier::new();
    let store = FlakyStore::new(clock.clone());
    let orchestrator = Orchestrator::builder(classifier.clone(), store.clone())
        .catalog(catalog())
        .dispatcher(dispatcher)
        .normalizer(Normalizer::with_wake_phrase(DEFAULT_WAKE_PHRASE))
        .clock(clock.clone())
        .settings(TurnSettings::default())
        .build();
    Harness {
        orchestrator: Arc::new(orchestrator),
        classifier,
        store,
        clock,
    }
}
