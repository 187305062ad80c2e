use serde::{Deserialize, Serialize};

/// Per-turn orchestration phases. The machine is rebuilt for every turn;
/// only `SessionState` survives between turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TurnPhase {
    AwaitingInput,
    Normalizing,
    Classifying,
    /// Asking for a missing slot, a disambiguation, or a yes/no confirmation.
    Clarifying,
    Dispatching,
    Composing,
}

impl Default for TurnPhase {
    fn default() -> Self {
        Self::AwaitingInput
    }
}

/// What happened inside the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEvent {
    UtteranceReceived,
    EmptyInput,
    TokensReady,
    /// Low confidence, missing required slots, or an unanswered confirmation.
    NeedsClarification,
    /// The user declined a pending intent; nothing to dispatch.
    Declined,
    Resolved,
    ActionFinished,
    /// The turn could not complete (store or classifier unavailable).
    Aborted,
    ResponseEmitted,
}

pub struct TurnGraph;

impl TurnGraph {
    /// Pure function: (current phase, event) -> next phase.
    /// Returns None for transitions the machine does not allow.
    pub fn transition(current: TurnPhase, event: TurnEvent) -> Option<TurnPhase> {
        use TurnEvent::*;
        use TurnPhase::*;

        match (current, event) {
            (AwaitingInput, UtteranceReceived) => Some(Normalizing),

            (Normalizing, EmptyInput) => Some(Composing),
            (Normalizing, TokensReady) => Some(Classifying),

            (Classifying, NeedsClarification) => Some(Clarifying),
            (Classifying, Resolved) => Some(Dispatching),
            (Classifying, Declined) => Some(Composing),
            (Classifying, Aborted) => Some(Composing),

            (Clarifying, ResponseEmitted) => Some(Composing),
            (Clarifying, Aborted) => Some(Composing),

            (Dispatching, ActionFinished) => Some(Composing),
            (Dispatching, Aborted) => Some(Composing),

            (Composing, ResponseEmitted) => Some(AwaitingInput),

            _ => None,
        }
    }
}

/// Phase cursor for one turn. Records the path taken so tests and logs can
/// audit it.
#[derive(Debug, Clone, Default)]
pub struct TurnTrace {
    current: TurnPhase,
    visited: Vec<TurnPhase>,
}

impl TurnTrace {
    pub fn new() -> Self {
        Self {
            current: TurnPhase::AwaitingInput,
            visited: vec![TurnPhase::AwaitingInput],
        }
    }

    pub fn current(&self) -> TurnPhase {
        self.current
    }

    pub fn visited(&self) -> &[TurnPhase] {
        &self.visited
    }

    pub fn reached(&self, phase: TurnPhase) -> bool {
        self.visited.contains(&phase)
    }

    /// Advance through the graph. Invalid transitions are logged and ignored
    /// so a bookkeeping slip can never abort a turn.
    pub fn advance(&mut self, event: TurnEvent) -> TurnPhase {
        match TurnGraph::transition(self.current, event) {
            Some(next) => {
                tracing::debug!(from = ?self.current, to = ?next, ?event, "turn phase");
                self.current = next;
                self.visited.push(next);
            }
            None => {
                tracing::error!(phase = ?self.current, ?event, "invalid turn transition ignored");
            }
        }
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_returns_to_awaiting_input() {
        let mut trace = TurnTrace::new();
        trace.advance(TurnEvent::UtteranceReceived);
        trace.advance(TurnEvent::TokensReady);
        trace.advance(TurnEvent::Resolved);
        trace.advance(TurnEvent::ActionFinished);
        assert_eq!(trace.advance(TurnEvent::ResponseEmitted), TurnPhase::AwaitingInput);
        assert!(trace.reached(TurnPhase::Dispatching));
    }

    #[test]
    fn clarifying_cannot_dispatch() {
        assert_eq!(TurnGraph::transition(TurnPhase::Clarifying, TurnEvent::Resolved), None);
        assert_eq!(TurnGraph::transition(TurnPhase::Normalizing, TurnEvent::Resolved), None);
    }

    #[test]
    fn invalid_event_keeps_phase() {
        let mut trace = TurnTrace::new();
        assert_eq!(trace.advance(TurnEvent::ActionFinished), TurnPhase::AwaitingInput);
        assert_eq!(trace.visited().len(), 1);
    }
}
