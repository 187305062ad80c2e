use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label used when nothing in the catalog matches.
pub const UNKNOWN_INTENT: &str = "unknown";

/// Slot name -> extracted value. `None` marks a slot the classifier knows
/// about but could not fill.
pub type Slots = BTreeMap<String, Option<String>>;

/// Classified user goal for one utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub label: String,
    /// 0.0 - 1.0
    pub confidence: f32,
    #[serde(default)]
    pub slots: Slots,
}

impl IntentResult {
    pub fn new(label: &str, confidence: f32) -> Self {
        Self {
            label: label.to_string(),
            confidence: if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) },
            slots: Slots::new(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(UNKNOWN_INTENT, 0.0)
    }

    pub fn with_slot(mut self, name: &str, value: &str) -> Self {
        self.slots.insert(name.to_string(), Some(value.to_string()));
        self
    }

    pub fn with_missing_slot(mut self, name: &str) -> Self {
        self.slots.insert(name.to_string(), None);
        self
    }

    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_INTENT
    }

    pub fn slot(&self, name: &str) -> Option<&str> {
        self.slots.get(name).and_then(|v| v.as_deref())
    }

    pub fn filled_slots(&self) -> impl Iterator<Item = (&str, &str)> {
        self.slots
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
    }

    /// Required slot names (in the given order) that hold no value.
    pub fn missing_slots<'a, I>(&self, required: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        required
            .into_iter()
            .filter(|name| self.slot(name).is_none())
            .map(str::to_string)
            .collect()
    }

    /// Fold a follow-up turn's extraction into this (pending) intent.
    /// Filled slots overwrite; unfilled ones never erase an earlier value.
    /// A same-label result can only raise confidence.
    pub fn absorb(&mut self, fresh: &IntentResult) {
        for (name, value) in fresh.filled_slots() {
            self.slots.insert(name.to_string(), Some(value.to_string()));
        }
        if fresh.label == self.label {
            self.confidence = self.confidence.max(fresh.confidence);
        }
    }
}

/// Why an intent is parked in the session instead of being dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum PendingStage {
    AwaitingSlots { missing: Vec<String> },
    /// Confidence was below threshold; we asked "did you mean ...?".
    AwaitingDisambiguation,
    /// The action handler asked for a yes/no before running.
    AwaitingConfirmation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pending {
    pub intent: IntentResult,
    #[serde(flatten)]
    pub stage: PendingStage,
}

impl Pending {
    pub fn new(intent: IntentResult, stage: PendingStage) -> Self {
        Self { intent, stage }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(IntentResult::new("x", 1.7).confidence, 1.0);
        assert_eq!(IntentResult::new("x", -0.2).confidence, 0.0);
    }

    #[test]
    fn missing_slots_lists_unfilled_and_absent() {
        let intent = IntentResult::new("schedule_meeting", 0.9)
            .with_missing_slot("time")
            .with_slot("title", "standup");
        assert_eq!(
            intent.missing_slots(["time", "title", "room"]),
            vec!["time".to_string(), "room".to_string()]
        );
    }

    #[test]
    fn absorb_fills_without_erasing() {
        let mut pending = IntentResult::new("schedule_meeting", 0.7)
            .with_slot("title", "standup")
            .with_missing_slot("time");
        let fresh = IntentResult::new(UNKNOWN_INTENT, 0.1)
            .with_slot("time", "3pm")
            .with_missing_slot("title");
        pending.absorb(&fresh);
        assert_eq!(pending.slot("time"), Some("3pm"));
        assert_eq!(pending.slot("title"), Some("standup"));
        assert_eq!(pending.confidence, 0.7);

        pending.absorb(&IntentResult::new("schedule_meeting", 0.95));
        assert_eq!(pending.confidence, 0.95);
    }
}
