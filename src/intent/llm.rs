use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::catalog::IntentCatalog;
use super::classifier::{ClassifierError, IntentClassifier};
use super::types::{IntentResult, Slots, UNKNOWN_INTENT};
use crate::kernel::utterance::NormalizedInput;

pub const DEFAULT_LLM_URL: &str = "http://localhost:8080";

#[derive(Serialize)]
struct CompletionRequest {
    prompt: String,
    stream: bool,
    n_predict: usize,
    temperature: f32,
    stop: Vec<String>,
    json_schema: serde_json::Value,
}

#[derive(Deserialize)]
struct CompletionResponse {
    content: String,
}

/// Shape the model is constrained to emit.
#[derive(Deserialize)]
struct ModelIntent {
    label: String,
    confidence: f32,
    #[serde(default)]
    slots: BTreeMap<String, Option<String>>,
}

/// Intent classification through a llama-server style `/completion` endpoint.
#[derive(Clone)]
pub struct LlmClassifier {
    client: Client,
    base_url: String,
    catalog: IntentCatalog,
}

impl LlmClassifier {
    pub fn new(base_url: &str, timeout: Duration, catalog: IntentCatalog) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            catalog,
        }
    }

    fn prompt(&self, input: &NormalizedInput, recent_history: &[IntentResult]) -> String {
        let mut intents = String::new();
        for def in self.catalog.definitions() {
            let slots: Vec<String> = def
                .slots
                .iter()
                .map(|s| if s.required { format!("{} (required)", s.name) } else { s.name.clone() })
                .collect();
            intents.push_str(&format!("- {}: {}; slots: [{}]\n", def.label, def.description, slots.join(", ")));
        }
        let recent: Vec<&str> = recent_history.iter().map(|i| i.label.as_str()).collect();

        format!(
            "System: Classify the user's request into exactly one intent. Use \"{}\" if none fit. \
             List every slot of the chosen intent; use null for slots the user did not give.\n\
             INTENTS:\n{}RECENT: [{}]\nUser: {}\nAssistant:",
            UNKNOWN_INTENT,
            intents,
            recent.join(", "),
            input.canonical_text
        )
    }

    fn schema(&self) -> serde_json::Value {
        let mut labels: Vec<&str> = self.catalog.labels().collect();
        labels.push(UNKNOWN_INTENT);
        json!({
            "type": "object",
            "properties": {
                "label": { "type": "string", "enum": labels },
                "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
                "slots": { "type": "object", "additionalProperties": { "type": ["string", "null"] } }
            },
            "required": ["label", "confidence"]
        })
    }

    /// Strictly parse the model's `content`. Labels outside the catalog become
    /// `unknown` with zero confidence; slots not defined for the label are dropped.
    pub fn parse_content(&self, content: &str) -> Result<IntentResult, ClassifierError> {
        let raw: ModelIntent = serde_json::from_str(content.trim())
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;

        if !raw.confidence.is_finite() {
            return Err(ClassifierError::InvalidResponse("confidence is not a number".into()));
        }

        let Some(def) = self.catalog.get(&raw.label) else {
            return Ok(IntentResult::unknown());
        };

        let mut slots = Slots::new();
        for slot in &def.slots {
            let value = raw
                .slots
                .get(&slot.name)
                .cloned()
                .flatten()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
            slots.insert(slot.name.clone(), value);
        }

        let mut result = IntentResult::new(&def.label, raw.confidence);
        result.slots = slots;
        Ok(result)
    }
}

#[async_trait]
impl IntentClassifier for LlmClassifier {
    async fn classify(
        &self,
        input: &NormalizedInput,
        recent_history: &[IntentResult],
    ) -> Result<IntentResult, ClassifierError> {
        let request_body = CompletionRequest {
            prompt: self.prompt(input, recent_history),
            stream: false,
            n_predict: 128,
            temperature: 0.0,
            stop: vec!["User:".to_string(), "System:".to_string()],
            json_schema: self.schema(),
        };

        let response = self
            .client
            .post(format!("{}/completion", self.base_url))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassifierError::Timeout
                } else {
                    ClassifierError::Backend(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(ClassifierError::Backend(format!("model server error: {}", response.status())));
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;
        debug!(bytes = body.content.len(), "model classification received");
        self.parse_content(&body.content)
    }
}
