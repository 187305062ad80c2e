use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Voice,
    Text,
}

/// One unit of user input for a turn. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub utterance_id: Uuid,
    pub session_id: String,
    pub raw_text: String,
    pub modality: Modality,
    pub received_at: DateTime<Utc>,
}

impl Utterance {
    pub fn new(session_id: &str, raw_text: &str, modality: Modality, received_at: DateTime<Utc>) -> Self {
        Self {
            utterance_id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            raw_text: raw_text.to_string(),
            modality,
            received_at,
        }
    }

    pub fn text(session_id: &str, raw_text: &str) -> Self {
        Self::new(session_id, raw_text, Modality::Text, Utc::now())
    }

    pub fn voice(session_id: &str, raw_text: &str) -> Self {
        Self::new(session_id, raw_text, Modality::Voice, Utc::now())
    }
}

/// Canonical form of an utterance. Owned by the current turn only.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NormalizedInput {
    pub canonical_text: String,
    pub tokens: Vec<String>,
}

impl NormalizedInput {
    pub fn from_tokens(tokens: Vec<String>) -> Self {
        Self {
            canonical_text: tokens.join(" "),
            tokens,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// True if `phrase` (already normalized, space separated) occurs as a
    /// contiguous run of tokens.
    pub fn contains_phrase(&self, phrase: &str) -> bool {
        let needle: Vec<&str> = phrase.split_whitespace().collect();
        if needle.is_empty() || needle.len() > self.tokens.len() {
            return false;
        }
        self.tokens
            .windows(needle.len())
            .any(|w| w.iter().zip(&needle).all(|(a, b)| a == b))
    }
}
