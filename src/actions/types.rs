use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

use crate::dialogue::state::SessionState;
use crate::intent::types::IntentResult;

/// Internal reasons attached to non-ok results. Logged, never shown verbatim.
pub mod hints {
    pub const UNSUPPORTED_INTENT: &str = "unsupported_intent";
    pub const HANDLER_TIMEOUT: &str = "handler_timeout";
    pub const HANDLER_FAULT: &str = "handler_fault";
    pub const PERMISSION_DENIED: &str = "permission_denied";
    pub const CONFIRMATION_REQUIRED: &str = "confirmation_required";
}

pub type Payload = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Ok,
    Failed,
    NeedsConfirmation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub status: ActionStatus,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default)]
    pub message_hint: Option<String>,
}

impl ActionResult {
    pub fn ok() -> Self {
        Self {
            status: ActionStatus::Ok,
            payload: Payload::new(),
            message_hint: None,
        }
    }

    pub fn failed(hint: &str) -> Self {
        Self {
            status: ActionStatus::Failed,
            payload: Payload::new(),
            message_hint: Some(hint.to_string()),
        }
    }

    pub fn needs_confirmation(hint: &str) -> Self {
        Self {
            status: ActionStatus::NeedsConfirmation,
            payload: Payload::new(),
            message_hint: Some(hint.to_string()),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == ActionStatus::Ok
    }
}

/// Everything a handler may look at. Built fresh per dispatch, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub intent: IntentResult,
    /// Read-only snapshot taken at the start of the turn.
    pub session: SessionState,
    pub utterance_id: Uuid,
    /// The user answered "yes" to a confirmation prompt for this intent.
    pub confirmed: bool,
}

impl ActionRequest {
    pub fn new(intent: IntentResult, session: SessionState, utterance_id: Uuid) -> Self {
        Self {
            intent,
            session,
            utterance_id,
            confirmed: false,
        }
    }

    pub fn confirmed(mut self) -> Self {
        self.confirmed = true;
        self
    }

    /// Replays of the same utterance (transport retries) share this key.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}:{}", self.session.session_id, self.utterance_id, self.confirmed)
    }
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler fault: {0}")]
    Fault(String),
}

/// A side-effecting capability registered under an intent label. What it does
/// (OS automation, network calls) is opaque to the core.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, request: &ActionRequest) -> Result<ActionResult, HandlerError>;
}

/// Adapts a synchronous closure into a handler.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> ActionHandler for FnHandler<F>
where
    F: Fn(&ActionRequest) -> Result<ActionResult, HandlerError> + Send + Sync,
{
    async fn handle(&self, request: &ActionRequest) -> Result<ActionResult, HandlerError> {
        (self.0)(request)
    }
}

pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&ActionRequest) -> Result<ActionResult, HandlerError> + Send + Sync,
{
    FnHandler(f)
}
