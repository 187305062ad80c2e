use std::collections::VecDeque;

use super::event::{HintKind, TelemetryEvent};
use crate::actions::types::ActionStatus;
use crate::outputs::composer::ResponseKind;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub turn_stats: TurnStats,
    pub dispatch_stats: DispatchStats,
    pub session_stats: SessionStats,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnStats {
    pub total: u64,
    pub prompts: u64,
    pub clarifications: u64,
    pub confirmations: u64,
    pub successes: u64,
    pub declined: u64,
    pub unsupported: u64,
    pub failures: u64,
    pub apologies: u64,
    pub cancelled: u64,
    pub cancelled_after_dispatch: u64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchStats {
    pub ok: u64,
    pub failed: u64,
    pub needs_confirmation: u64,
    pub unsupported: u64,
    pub timeouts: u64,
    pub faults: u64,
    pub denied: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    pub expired: u64,
    pub ended: u64,
}

pub fn compute_snapshot(events: &VecDeque<TelemetryEvent>) -> TelemetrySnapshot {
    let mut snap = TelemetrySnapshot::default();
    let mut total_latency_ms: u64 = 0;

    for event in events {
        match event {
            TelemetryEvent::TurnCompleted { kind, latency_ms, .. } => {
                let turns = &mut snap.turn_stats;
                turns.total += 1;
                total_latency_ms += latency_ms;
                turns.max_latency_ms = turns.max_latency_ms.max(*latency_ms);
                match kind {
                    ResponseKind::Prompt => turns.prompts += 1,
                    ResponseKind::Clarification => turns.clarifications += 1,
                    ResponseKind::Confirmation => turns.confirmations += 1,
                    ResponseKind::Success => turns.successes += 1,
                    ResponseKind::Declined => turns.declined += 1,
                    ResponseKind::Unsupported => turns.unsupported += 1,
                    ResponseKind::Failure => turns.failures += 1,
                    ResponseKind::Apology => turns.apologies += 1,
                }
            }
            TelemetryEvent::TurnCancelled { after_dispatch } => {
                snap.turn_stats.cancelled += 1;
                if *after_dispatch {
                    snap.turn_stats.cancelled_after_dispatch += 1;
                }
            }
            TelemetryEvent::ActionDispatched { status, hint } => {
                let dispatch = &mut snap.dispatch_stats;
                match status {
                    ActionStatus::Ok => dispatch.ok += 1,
                    ActionStatus::Failed => dispatch.failed += 1,
                    ActionStatus::NeedsConfirmation => dispatch.needs_confirmation += 1,
                }
                match hint {
                    Some(HintKind::UnsupportedIntent) => dispatch.unsupported += 1,
                    Some(HintKind::HandlerTimeout) => dispatch.timeouts += 1,
                    Some(HintKind::HandlerFault) => dispatch.faults += 1,
                    Some(HintKind::PermissionDenied) => dispatch.denied += 1,
                    _ => {}
                }
            }
            TelemetryEvent::SessionsExpired { count } => {
                snap.session_stats.expired += *count as u64;
            }
            TelemetryEvent::SessionEnded => {
                snap.session_stats.ended += 1;
            }
        }
    }

    if snap.turn_stats.total > 0 {
        snap.turn_stats.avg_latency_ms = total_latency_ms as f64 / snap.turn_stats.total as f64;
    }

    snap
}
