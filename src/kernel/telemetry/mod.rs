//! Turn telemetry.
//!
//! # SAFETY INVARIANT
//! Nothing in the turn path reads telemetry back. The orchestrator, classifiers
//! and dispatcher only ever write to it.
//!
//! # PRIVACY INVARIANT
//! Events carry response kinds, action statuses, hint categories, counts and
//! latencies. Never utterance text, slot values, payloads or raw hints.

pub mod event;
pub mod metrics;
pub mod recorder;

pub use event::{HintKind, TelemetryEvent};
pub use metrics::{compute_snapshot, DispatchStats, SessionStats, TelemetrySnapshot, TurnStats};
pub use recorder::TelemetryRecorder;
