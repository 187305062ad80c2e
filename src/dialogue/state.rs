use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::intent::types::{IntentResult, Pending};

/// Conversation context for one session. Owned by the session store; every
/// other component only ever sees a cloned snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pending: Option<Pending>,
    turn_count: u64,
    last_active_at: DateTime<Utc>,
    /// Most recent last, capped.
    history: VecDeque<IntentResult>,
}

/// Strict state delta. This is the ONLY way session state mutates.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionDelta {
    Touched(DateTime<Utc>),
    TurnCompleted,
    IntentObserved(IntentResult),
    PendingSet(Pending),
    PendingCleared,
}

impl SessionState {
    pub fn new(session_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.to_string(),
            pending: None,
            turn_count: 0,
            last_active_at: now,
            history: VecDeque::new(),
        }
    }

    pub fn pending(&self) -> Option<&Pending> {
        self.pending.as_ref()
    }

    pub fn pending_intent(&self) -> Option<&IntentResult> {
        self.pending.as_ref().map(|p| &p.intent)
    }

    pub fn turn_count(&self) -> u64 {
        self.turn_count
    }

    pub fn last_active_at(&self) -> DateTime<Utc> {
        self.last_active_at
    }

    pub fn history(&self) -> &VecDeque<IntentResult> {
        &self.history
    }

    pub fn recent_history(&self) -> Vec<IntentResult> {
        self.history.iter().cloned().collect()
    }

    pub fn is_idle(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        now - self.last_active_at > idle_timeout
    }

    /// Pure reduction: State + Delta -> Mutated State
    pub fn reduce(&mut self, delta: SessionDelta, history_cap: usize) {
        match delta {
            SessionDelta::Touched(at) => {
                // Clock skew between nodes must not move activity backwards.
                if at > self.last_active_at {
                    self.last_active_at = at;
                }
            }
            SessionDelta::TurnCompleted => {
                self.turn_count += 1;
            }
            SessionDelta::IntentObserved(intent) => {
                self.history.push_back(intent);
                while self.history.len() > history_cap.max(1) {
                    self.history.pop_front();
                }
            }
            SessionDelta::PendingSet(pending) => {
                self.pending = Some(pending);
            }
            SessionDelta::PendingCleared => {
                self.pending = None;
            }
        }
    }

    pub fn apply_all(&mut self, deltas: Vec<SessionDelta>, history_cap: usize) {
        for delta in deltas {
            self.reduce(delta, history_cap);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::types::PendingStage;

    #[test]
    fn history_is_capped_most_recent_last() {
        let mut s = SessionState::new("s", Utc::now());
        for i in 0..5 {
            s.reduce(SessionDelta::IntentObserved(IntentResult::new(&format!("i{}", i), 0.9)), 3);
        }
        let labels: Vec<&str> = s.history().iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["i2", "i3", "i4"]);
    }

    #[test]
    fn pending_set_and_cleared() {
        let mut s = SessionState::new("s", Utc::now());
        let pending = Pending::new(IntentResult::new("x", 0.9), PendingStage::AwaitingConfirmation);
        s.reduce(SessionDelta::PendingSet(pending.clone()), 8);
        assert_eq!(s.pending(), Some(&pending));
        s.reduce(SessionDelta::PendingCleared, 8);
        assert!(s.pending_intent().is_none());
    }

    #[test]
    fn touch_never_moves_backwards() {
        let start = Utc::now();
        let mut s = SessionState::new("s", start);
        s.reduce(SessionDelta::Touched(start - Duration::seconds(10)), 8);
        assert_eq!(s.last_active_at(), start);
        assert!(s.is_idle(start + Duration::seconds(61), Duration::seconds(60)));
        assert!(!s.is_idle(start + Duration::seconds(60), Duration::seconds(60)));
    }
}
