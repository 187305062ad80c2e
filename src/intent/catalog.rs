use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::IntentResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotDefinition {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    /// Question asked when the slot is missing. Falls back to a generic prompt.
    #[serde(default)]
    pub prompt: Option<String>,
}

impl SlotDefinition {
    pub fn required(name: &str, prompt: &str) -> Self {
        Self {
            name: name.to_string(),
            required: true,
            prompt: Some(prompt.to_string()),
        }
    }

    pub fn optional(name: &str) -> Self {
        Self {
            name: name.to_string(),
            required: false,
            prompt: None,
        }
    }
}

/// What the core knows about an intent label independent of any classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDefinition {
    pub label: String,
    /// Verb phrase used in responses, e.g. "turn off the network".
    pub description: String,
    #[serde(default)]
    pub slots: Vec<SlotDefinition>,
    /// Successful dispatch closes the conversation.
    #[serde(default)]
    pub ends_session: bool,
}

impl IntentDefinition {
    pub fn new(label: &str, description: &str) -> Self {
        Self {
            label: label.to_string(),
            description: description.to_string(),
            slots: Vec::new(),
            ends_session: false,
        }
    }

    pub fn slot(mut self, slot: SlotDefinition) -> Self {
        self.slots.push(slot);
        self
    }

    pub fn ending_session(mut self) -> Self {
        self.ends_session = true;
        self
    }

    pub fn required_slots(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().filter(|s| s.required).map(|s| s.name.as_str())
    }
}

/// Label -> definition. Read-only once the orchestrator is built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentCatalog {
    entries: BTreeMap<String, IntentDefinition>,
}

impl IntentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, definition: IntentDefinition) -> Self {
        self.insert(definition);
        self
    }

    pub fn insert(&mut self, definition: IntentDefinition) {
        self.entries.insert(definition.label.clone(), definition);
    }

    pub fn get(&self, label: &str) -> Option<&IntentDefinition> {
        self.entries.get(label)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.entries.contains_key(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &IntentDefinition> {
        self.entries.values()
    }

    /// Required slots of `intent`'s label that are still unfilled.
    /// Unknown labels have no requirements.
    pub fn missing_slots(&self, intent: &IntentResult) -> Vec<String> {
        match self.get(&intent.label) {
            Some(def) => intent.missing_slots(def.required_slots()),
            None => Vec::new(),
        }
    }

    pub fn description(&self, label: &str) -> String {
        match self.get(label) {
            Some(def) => def.description.clone(),
            None => label.replace('_', " "),
        }
    }

    pub fn slot_prompt(&self, label: &str, slot: &str) -> Option<&str> {
        self.get(label)?
            .slots
            .iter()
            .find(|s| s.name == slot)?
            .prompt
            .as_deref()
    }

    pub fn ends_session(&self, label: &str) -> bool {
        self.get(label).map_or(false, |d| d.ends_session)
    }
}
