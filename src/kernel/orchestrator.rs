use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Instrument};

use super::normalizer::Normalizer;
use super::phase::{TurnEvent, TurnPhase, TurnTrace};
use super::telemetry::{TelemetryEvent, TelemetryRecorder, TelemetrySnapshot};
use super::time::{Clock, SystemClock};
use super::utterance::{NormalizedInput, Utterance};
use crate::actions::dispatcher::ActionDispatcher;
use crate::actions::types::{ActionRequest, ActionResult, ActionStatus};
use crate::config::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_HISTORY_CAP};
use crate::dialogue::locks::KeyedLocks;
use crate::dialogue::state::{SessionDelta, SessionState};
use crate::dialogue::store::{SessionStore, StoreError};
use crate::intent::catalog::IntentCatalog;
use crate::intent::classifier::{ClassifierError, IntentClassifier};
use crate::intent::types::{IntentResult, Pending, PendingStage};
use crate::outputs::composer::{Outcome, Response, ResponseComposer, DEFAULT_LOCALE};

const YES_WORDS: &[&str] = &[
    "yes", "yeah", "yep", "yup", "sure", "ok", "okay", "confirm", "correct", "right", "si", "sí", "claro", "vale",
];
const NO_WORDS: &[&str] = &[
    "no", "nope", "nah", "cancel", "stop", "don't", "dont", "negative", "not", "never", "nevermind",
];
/// Words that may pad a yes or no without changing it ("yes please", "no thanks").
const ANSWER_FILLER: &[&str] = &[
    "please", "thanks", "thank", "you", "it", "that", "this", "do", "now", "just", "go", "ahead", "of", "course",
    "mind", "forget", "then", "por", "favor", "gracias",
];
const YES_PHRASES: &[&str] = &["go ahead", "do it", "please do", "of course", "por favor"];
const NO_PHRASES: &[&str] = &["never mind", "nevermind", "forget it", "not now", "no thanks"];

#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    StateStore(#[from] StoreError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error("turn cancelled")]
    Cancelled,
}

/// Knobs that shape a turn. Everything else lives in the collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSettings {
    pub confidence_threshold: f32,
    pub locale: String,
    pub history_cap: usize,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            locale: DEFAULT_LOCALE.to_string(),
            history_cap: DEFAULT_HISTORY_CAP,
        }
    }
}

/// What the turn decided before any side effect happens.
enum Plan {
    /// Nothing to run; commit `pending` and answer with `outcome`.
    Reply {
        outcome: Outcome,
        pending: Option<SessionDelta>,
        event: TurnEvent,
    },
    Dispatch { intent: IntentResult, confirmed: bool },
}

/// Everything the dispatch task needs after the caller may have gone away.
struct DispatchJob {
    store: Arc<dyn SessionStore>,
    dispatcher: Arc<ActionDispatcher>,
    catalog: Arc<IntentCatalog>,
    telemetry: Arc<Mutex<TelemetryRecorder>>,
    history_cap: usize,
    request: ActionRequest,
    deltas: Vec<SessionDelta>,
    _gate: OwnedMutexGuard<()>,
}

struct Dispatched {
    result: ActionResult,
    ends_session: bool,
    committed: Result<(), StoreError>,
}

impl DispatchJob {
    async fn run(self) -> Dispatched {
        let DispatchJob {
            store,
            dispatcher,
            catalog,
            telemetry,
            history_cap,
            request,
            mut deltas,
            _gate,
        } = self;
        let session_id = request.session.session_id.clone();
        let intent = request.intent.clone();

        let result = dispatcher.dispatch(request).await;
        telemetry.lock().record(TelemetryEvent::from(&result));

        let ends_session = result.is_ok() && catalog.ends_session(&intent.label);
        let committed = if ends_session {
            store.remove(&session_id).await.map(|existed| {
                info!(existed, "session ended by intent");
                telemetry.lock().record(TelemetryEvent::SessionEnded);
            })
        } else {
            deltas.push(match result.status {
                ActionStatus::NeedsConfirmation => {
                    SessionDelta::PendingSet(Pending::new(intent, PendingStage::AwaitingConfirmation))
                }
                ActionStatus::Ok | ActionStatus::Failed => SessionDelta::PendingCleared,
            });
            store
                .update(&session_id, Box::new(move |s: &mut SessionState| s.apply_all(deltas, history_cap)))
                .await
                .map(|_| ())
        };
        if let Err(e) = &committed {
            error!(error = %e, "action ran but its session commit failed");
        }
        Dispatched {
            result,
            ends_session,
            committed,
        }
    }
}

pub struct OrchestratorBuilder {
    classifier: Arc<dyn IntentClassifier>,
    store: Arc<dyn SessionStore>,
    catalog: IntentCatalog,
    dispatcher: ActionDispatcher,
    normalizer: Normalizer,
    clock: Arc<dyn Clock>,
    settings: TurnSettings,
}

impl OrchestratorBuilder {
    pub fn catalog(mut self, catalog: IntentCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn dispatcher(mut self, dispatcher: ActionDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(mut self, settings: TurnSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Orchestrator {
        Orchestrator {
            normalizer: self.normalizer,
            classifier: self.classifier,
            catalog: Arc::new(self.catalog),
            store: self.store,
            dispatcher: Arc::new(self.dispatcher),
            composer: ResponseComposer::new(),
            gates: KeyedLocks::new(),
            telemetry: Arc::new(Mutex::new(TelemetryRecorder::new())),
            clock: self.clock,
            settings: self.settings,
        }
    }
}

/// Runs one turn per utterance: normalize, classify, merge with the session,
/// then either ask for what is missing or dispatch, and always answer once.
///
/// Turns of one session are serialized by a per-session gate held for the whole
/// turn. The store's own lock is only taken for the single commit at the end,
/// so no store lock is held across classifier or handler waits.
pub struct Orchestrator {
    normalizer: Normalizer,
    classifier: Arc<dyn IntentClassifier>,
    catalog: Arc<IntentCatalog>,
    store: Arc<dyn SessionStore>,
    dispatcher: Arc<ActionDispatcher>,
    composer: ResponseComposer,
    gates: KeyedLocks<()>,
    telemetry: Arc<Mutex<TelemetryRecorder>>,
    clock: Arc<dyn Clock>,
    settings: TurnSettings,
}

impl Orchestrator {
    pub fn builder(classifier: Arc<dyn IntentClassifier>, store: Arc<dyn SessionStore>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            classifier,
            store,
            catalog: IntentCatalog::new(),
            dispatcher: ActionDispatcher::builder().build(),
            normalizer: Normalizer::new(),
            clock: Arc::new(SystemClock),
            settings: TurnSettings::default(),
        }
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &IntentCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn telemetry_snapshot(&self) -> TelemetrySnapshot {
        self.telemetry.lock().snapshot()
    }

    /// Exactly one response per utterance. Store or classifier failures turn
    /// into an apology and leave the session as it was.
    pub async fn handle_turn(&self, utterance: Utterance) -> Response {
        let session_id = utterance.session_id.clone();
        let modality = utterance.modality;
        match self.handle_turn_cancellable(utterance, CancellationToken::new()).await {
            Ok(response) => response,
            // Unreachable with a token nobody holds.
            Err(_) => self.composer.compose(&Outcome::Apology, &self.settings.locale, &session_id, modality),
        }
    }

    /// Like `handle_turn`, but gives up when `cancel` fires. Before dispatch
    /// that leaves the session untouched. Once an action is running it and its
    /// commit complete in the background and only the response is lost.
    #[instrument(skip_all, fields(session_id = %utterance.session_id, utterance_id = %utterance.utterance_id))]
    pub async fn handle_turn_cancellable(
        &self,
        utterance: Utterance,
        cancel: CancellationToken,
    ) -> Result<Response, TurnError> {
        let started = Instant::now();
        let mut trace = TurnTrace::new();
        trace.advance(TurnEvent::UtteranceReceived);

        let input = self.normalizer.normalize(&utterance);
        if input.is_empty() {
            debug!("empty utterance, prompting");
            trace.advance(TurnEvent::EmptyInput);
            return Ok(self.respond(Outcome::PromptForInput, &utterance, &mut trace, started, false));
        }
        trace.advance(TurnEvent::TokensReady);

        match self.run_turn(&utterance, &input, &mut trace, &cancel, started).await {
            Ok(response) => Ok(response),
            Err(TurnError::Cancelled) => {
                let after_dispatch = trace.reached(TurnPhase::Dispatching);
                info!(after_dispatch, "turn cancelled");
                self.telemetry.lock().record(TelemetryEvent::TurnCancelled { after_dispatch });
                Err(TurnError::Cancelled)
            }
            Err(e) => {
                warn!(error = %e, "turn failed, session left unchanged");
                trace.advance(TurnEvent::Aborted);
                Ok(self.respond(Outcome::Apology, &utterance, &mut trace, started, false))
            }
        }
    }

    async fn run_turn(
        &self,
        utterance: &Utterance,
        input: &NormalizedInput,
        trace: &mut TurnTrace,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<Response, TurnError> {
        let session_id = utterance.session_id.as_str();

        let gate = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TurnError::Cancelled),
            gate = self.gates.lock(session_id) => gate,
        };

        let loaded = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TurnError::Cancelled),
            loaded = self.store.get(session_id) => loaded?,
        };
        let session = loaded.unwrap_or_else(|| SessionState::new(session_id, self.clock.now()));

        let mut deltas = vec![SessionDelta::Touched(self.clock.now()), SessionDelta::TurnCompleted];
        let plan = self.plan(&session, input, &mut deltas, cancel).await?;

        match plan {
            Plan::Reply { outcome, pending, event } => {
                deltas.extend(pending);
                if cancel.is_cancelled() {
                    return Err(TurnError::Cancelled);
                }
                let history_cap = self.settings.history_cap;
                self.store
                    .update(session_id, Box::new(move |s: &mut SessionState| s.apply_all(deltas, history_cap)))
                    .await?;
                drop(gate);
                if trace.advance(event) == TurnPhase::Clarifying {
                    trace.advance(TurnEvent::ResponseEmitted);
                }
                Ok(self.respond(outcome, utterance, trace, started, false))
            }
            Plan::Dispatch { intent, confirmed } => {
                if cancel.is_cancelled() {
                    return Err(TurnError::Cancelled);
                }
                trace.advance(TurnEvent::Resolved);
                let description = self.catalog.description(&intent.label);
                let mut request = ActionRequest::new(intent, session, utterance.utterance_id);
                if confirmed {
                    request = request.confirmed();
                }
                let job = DispatchJob {
                    store: self.store.clone(),
                    dispatcher: self.dispatcher.clone(),
                    catalog: self.catalog.clone(),
                    telemetry: self.telemetry.clone(),
                    history_cap: self.settings.history_cap,
                    request,
                    deltas,
                    _gate: gate,
                };
                // Detached: dropping the handle does not stop the action or its commit.
                let mut task = tokio::spawn(job.run().in_current_span());

                let dispatched = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(TurnError::Cancelled),
                    joined = &mut task => joined,
                };
                let outcome = match dispatched {
                    Ok(Dispatched { committed: Err(e), .. }) => return Err(e.into()),
                    Ok(Dispatched { result, ends_session, .. }) => match result.status {
                        ActionStatus::NeedsConfirmation => Outcome::Confirm {
                            description,
                            reprompt: false,
                        },
                        _ => Outcome::Completed {
                            description,
                            result,
                            ends_session,
                        },
                    },
                    Err(join_error) => {
                        error!(error = %join_error, "dispatch task failed");
                        Outcome::Apology
                    }
                };
                trace.advance(TurnEvent::ActionFinished);
                Ok(self.respond(outcome, utterance, trace, started, true))
            }
        }
    }

    /// Decide the turn against the session as loaded. Pushes history deltas;
    /// the caller adds the pending delta and commits.
    async fn plan(
        &self,
        session: &SessionState,
        input: &NormalizedInput,
        deltas: &mut Vec<SessionDelta>,
        cancel: &CancellationToken,
    ) -> Result<Plan, TurnError> {
        let pending = session.pending().cloned();

        match pending {
            Some(Pending {
                intent,
                stage: PendingStage::AwaitingConfirmation,
            }) => {
                let plan = match yes_or_no(input) {
                    Some(true) => Plan::Dispatch { intent, confirmed: true },
                    Some(false) => declined(),
                    None => Plan::Reply {
                        outcome: Outcome::Confirm {
                            description: self.catalog.description(&intent.label),
                            reprompt: true,
                        },
                        pending: None,
                        event: TurnEvent::NeedsClarification,
                    },
                };
                return Ok(plan);
            }
            Some(Pending {
                intent,
                stage: PendingStage::AwaitingDisambiguation,
            }) => match yes_or_no(input) {
                Some(true) => {
                    let mut promoted = intent;
                    promoted.confidence = 1.0;
                    deltas.push(SessionDelta::IntentObserved(promoted.clone()));
                    return Ok(self.gate(promoted));
                }
                Some(false) => return Ok(declined()),
                None => {}
            },
            Some(Pending {
                stage: PendingStage::AwaitingSlots { .. },
                ..
            }) if yes_or_no(input) == Some(false) => return Ok(declined()),
            _ => {}
        }

        let history = session.recent_history();
        let fresh = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TurnError::Cancelled),
            fresh = self.classifier.classify(input, &history) => fresh?,
        };
        let mut fresh = fresh;
        if !fresh.confidence.is_finite() {
            warn!(label = %fresh.label, "non-finite confidence treated as zero");
            fresh.confidence = 0.0;
        }
        debug!(label = %fresh.label, confidence = fresh.confidence, "classified");

        let merged = match session.pending() {
            Some(pending) => self.merge(pending, fresh, input),
            None => fresh,
        };
        deltas.push(SessionDelta::IntentObserved(merged.clone()));
        Ok(self.gate(merged))
    }

    /// A confident new goal replaces the parked one; anything else fills it in.
    /// An unrecognized reply to a slot question is taken as that slot's value.
    fn merge(&self, pending: &Pending, fresh: IntentResult, input: &NormalizedInput) -> IntentResult {
        let switches = fresh.label != pending.intent.label
            && !fresh.is_unknown()
            && fresh.confidence >= self.settings.confidence_threshold;
        if switches {
            debug!(from = %pending.intent.label, to = %fresh.label, "user changed goal");
            return fresh;
        }
        let mut merged = pending.intent.clone();
        merged.absorb(&fresh);

        if let PendingStage::AwaitingSlots { missing } = &pending.stage {
            let asked = missing.first().filter(|slot| merged.slot(slot).is_none());
            if let (Some(slot), true) = (asked, fresh.is_unknown()) {
                debug!(%slot, "bare reply fills the requested slot");
                merged.slots.insert(slot.clone(), Some(input.canonical_text.clone()));
            }
        }
        merged
    }

    /// Confidence first, then required slots.
    fn gate(&self, intent: IntentResult) -> Plan {
        if intent.is_unknown() || intent.label.trim().is_empty() {
            return Plan::Reply {
                outcome: Outcome::Disambiguate { description: None },
                pending: Some(SessionDelta::PendingCleared),
                event: TurnEvent::NeedsClarification,
            };
        }

        let description = self.catalog.description(&intent.label);
        if !intent.confidence.is_finite() || intent.confidence < self.settings.confidence_threshold {
            return Plan::Reply {
                outcome: Outcome::Disambiguate {
                    description: Some(description),
                },
                pending: Some(SessionDelta::PendingSet(Pending::new(
                    intent,
                    PendingStage::AwaitingDisambiguation,
                ))),
                event: TurnEvent::NeedsClarification,
            };
        }

        let missing = self.catalog.missing_slots(&intent);
        if let Some(slot) = missing.first().cloned() {
            let prompt = self.catalog.slot_prompt(&intent.label, &slot).map(str::to_string);
            return Plan::Reply {
                outcome: Outcome::MissingSlot {
                    description,
                    slot,
                    prompt,
                },
                pending: Some(SessionDelta::PendingSet(Pending::new(
                    intent,
                    PendingStage::AwaitingSlots { missing },
                ))),
                event: TurnEvent::NeedsClarification,
            };
        }

        Plan::Dispatch {
            intent,
            confirmed: false,
        }
    }

    fn respond(
        &self,
        outcome: Outcome,
        utterance: &Utterance,
        trace: &mut TurnTrace,
        started: Instant,
        dispatched: bool,
    ) -> Response {
        let response = self.composer.compose(
            &outcome,
            &self.settings.locale,
            &utterance.session_id,
            utterance.modality,
        );
        trace.advance(TurnEvent::ResponseEmitted);
        let latency_ms = started.elapsed().as_millis().min(u64::MAX as u128) as u64;
        self.telemetry.lock().record(TelemetryEvent::TurnCompleted {
            kind: response.kind,
            dispatched,
            latency_ms,
        });
        info!(kind = ?response.kind, dispatched, latency_ms, "turn complete");
        response
    }

    /// Expire idle sessions and forget gates nobody is waiting on.
    pub async fn sweep_idle(&self) -> Result<usize, StoreError> {
        let expired = self.store.expire_idle(self.clock.now()).await?;
        let pruned = self.gates.prune_unused();
        if expired > 0 {
            info!(expired, pruned, "idle sessions swept");
            self.telemetry.lock().record(TelemetryEvent::SessionsExpired { count: expired });
        }
        Ok(expired)
    }
}

fn declined() -> Plan {
    Plan::Reply {
        outcome: Outcome::Declined,
        pending: Some(SessionDelta::PendingCleared),
        event: TurnEvent::Declined,
    }
}

/// Reads a follow-up as an answer to a yes/no question, if it is one.
///
/// The whole reply must be answer words, so "stop at 5pm" stays a slot value.
/// Any negation makes it a no, whatever else it says.
fn yes_or_no(input: &NormalizedInput) -> Option<bool> {
    if input.is_empty() {
        return None;
    }
    let is_answer_word = |t: &str| YES_WORDS.contains(&t) || NO_WORDS.contains(&t) || ANSWER_FILLER.contains(&t);
    if !input.tokens.iter().all(|t| is_answer_word(t)) {
        return None;
    }
    if input.tokens.iter().any(|t| NO_WORDS.contains(&t.as_str()))
        || NO_PHRASES.iter().any(|p| input.contains_phrase(p))
    {
        return Some(false);
    }
    if input.tokens.iter().any(|t| YES_WORDS.contains(&t.as_str()))
        || YES_PHRASES.iter().any(|p| input.contains_phrase(p))
    {
        return Some(true);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yes_and_no_answers() {
        let n = Normalizer::new();
        assert_eq!(yes_or_no(&n.normalize_text("Yes please")), Some(true));
        assert_eq!(yes_or_no(&n.normalize_text("okay, go ahead")), Some(true));
        assert_eq!(yes_or_no(&n.normalize_text("No.")), Some(false));
        assert_eq!(yes_or_no(&n.normalize_text("never mind that")), Some(false));
        assert_eq!(yes_or_no(&n.normalize_text("at 3pm")), None);
    }

    #[test]
    fn negation_outweighs_yes_phrases() {
        let n = Normalizer::new();
        assert_eq!(yes_or_no(&n.normalize_text("no, don't do it")), Some(false));
        assert_eq!(yes_or_no(&n.normalize_text("of course not")), Some(false));
        assert_eq!(yes_or_no(&n.normalize_text("Do it")), Some(true));
        assert_eq!(yes_or_no(&n.normalize_text("sí, por favor")), Some(true));
    }

    #[test]
    fn answer_words_inside_a_longer_reply_do_not_count() {
        let n = Normalizer::new();
        assert_eq!(yes_or_no(&n.normalize_text("stop at 5pm")), None);
        assert_eq!(yes_or_no(&n.normalize_text("right after lunch")), None);
        assert_eq!(yes_or_no(&n.normalize_text("ok tomorrow")), None);
    }
}
