use serde::{Deserialize, Serialize};

use crate::actions::types::{hints, ActionResult, ActionStatus};
use crate::outputs::composer::ResponseKind;

// Allowed: kinds, statuses, durations, counts
// Forbidden: utterance text, slot values, payloads, free-form hints

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryEvent {
    TurnCompleted {
        kind: ResponseKind,
        dispatched: bool,
        latency_ms: u64,
    },

    TurnCancelled {
        /// Cancelled after the action started; its result was still committed.
        after_dispatch: bool,
    },

    ActionDispatched {
        status: ActionStatus,
        hint: Option<HintKind>,
    },

    SessionsExpired {
        count: usize,
    },

    SessionEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HintKind {
    UnsupportedIntent,
    HandlerTimeout,
    HandlerFault,
    PermissionDenied,
    ConfirmationRequired,
    /// Handler-specific hint; content stripped.
    Other,
}

impl From<&str> for HintKind {
    fn from(hint: &str) -> Self {
        match hint {
            hints::UNSUPPORTED_INTENT => HintKind::UnsupportedIntent,
            hints::HANDLER_TIMEOUT => HintKind::HandlerTimeout,
            hints::HANDLER_FAULT => HintKind::HandlerFault,
            hints::PERMISSION_DENIED => HintKind::PermissionDenied,
            hints::CONFIRMATION_REQUIRED => HintKind::ConfirmationRequired,
            _ => HintKind::Other,
        }
    }
}

impl From<&ActionResult> for TelemetryEvent {
    fn from(result: &ActionResult) -> Self {
        TelemetryEvent::ActionDispatched {
            status: result.status,
            hint: result.message_hint.as_deref().map(HintKind::from),
        }
    }
}
