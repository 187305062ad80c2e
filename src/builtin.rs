//! The intents this assistant ships with, and wiring from config to a
//! ready orchestrator. Handlers only acknowledge; real automation plugs in
//! through `ActionHandler`.

use std::sync::Arc;
use tracing::info;

use crate::actions::dispatcher::ActionDispatcher;
use crate::actions::types::{handler_fn, ActionRequest, ActionResult, HandlerError};
use crate::config::{AssistantConfig, ClassifierConfig, StoreConfig};
use crate::dialogue::{InMemorySessionStore, JsonFileSessionStore, SessionStore, StoreError};
use crate::intent::{
    FallbackClassifier, IntentCatalog, IntentClassifier, IntentDefinition, IntentRule, LlmClassifier, RuleClassifier,
    SlotDefinition, SlotExtractor,
};
use crate::kernel::normalizer::Normalizer;
use crate::kernel::orchestrator::{Orchestrator, TurnSettings};
use crate::kernel::time::Clock;

pub const DISABLE_NETWORK: &str = "disable_network";
pub const ENABLE_NETWORK: &str = "enable_network";
pub const SCHEDULE_MEETING: &str = "schedule_meeting";
pub const OPEN_APPLICATION: &str = "open_application";
pub const SEND_EMAIL: &str = "send_email";
pub const SET_VOLUME: &str = "set_volume";
pub const END_SESSION: &str = "end_session";

pub fn catalog() -> IntentCatalog {
    IntentCatalog::new()
        .with(IntentDefinition::new(DISABLE_NETWORK, "turn off the network"))
        .with(IntentDefinition::new(ENABLE_NETWORK, "turn the network back on"))
        .with(
            IntentDefinition::new(SCHEDULE_MEETING, "schedule the meeting")
                .slot(SlotDefinition::required("time", "What time should the meeting be?"))
                .slot(SlotDefinition::optional("title")),
        )
        .with(
            IntentDefinition::new(OPEN_APPLICATION, "open the application")
                .slot(SlotDefinition::required("app", "Which application should I open?")),
        )
        .with(
            IntentDefinition::new(SEND_EMAIL, "send the email")
                .slot(SlotDefinition::required("recipient", "Who should I send it to?"))
                .slot(SlotDefinition::optional("subject")),
        )
        .with(
            IntentDefinition::new(SET_VOLUME, "change the volume")
                .slot(SlotDefinition::required("level", "What volume level do you want?")),
        )
        .with(IntentDefinition::new(END_SESSION, "end our conversation").ending_session())
}

fn after(markers: &[&str]) -> SlotExtractor {
    SlotExtractor::After {
        markers: markers.iter().map(|m| m.to_string()).collect(),
    }
}

pub fn rules() -> Vec<IntentRule> {
    vec![
        IntentRule::new(
            DISABLE_NETWORK,
            &["turn off wifi", "turn off the wifi", "disable wifi", "disable the network", "go offline", "disconnect"],
        ),
        IntentRule::new(
            ENABLE_NETWORK,
            &["turn on wifi", "turn on the wifi", "enable wifi", "enable the network", "go online", "reconnect"],
        ),
        IntentRule::new(SCHEDULE_MEETING, &["schedule a meeting", "book a meeting", "set up a meeting", "schedule"])
            .slot("time", SlotExtractor::TimeOfDay)
            .slot("title", after(&["about", "titled", "called"])),
        IntentRule::new(OPEN_APPLICATION, &["open", "launch", "start"]).slot("app", after(&["open", "launch", "start"])),
        IntentRule::new(SEND_EMAIL, &["send an email", "send email", "email", "write an email"])
            .slot("recipient", after(&["to", "email"]))
            .slot("subject", after(&["about"])),
        IntentRule::new(SET_VOLUME, &["set the volume", "set volume", "volume", "turn it up", "turn it down"])
            .slot("level", SlotExtractor::Number),
        IntentRule::new(END_SESSION, &["goodbye", "bye", "that's all", "stop listening", "we're done"]),
    ]
}

/// Acknowledges the request and echoes its filled slots back as payload.
fn acknowledge(request: &ActionRequest) -> Result<ActionResult, HandlerError> {
    let mut result = ActionResult::ok();
    for (name, value) in request.intent.filled_slots() {
        result = result.with(name, value);
    }
    Ok(result)
}

pub fn dispatcher(config: &AssistantConfig) -> ActionDispatcher {
    let mut builder = ActionDispatcher::builder()
        .policy(config.policy.clone())
        .timeout(config.handler_timeout());
    for label in [
        DISABLE_NETWORK,
        ENABLE_NETWORK,
        SCHEDULE_MEETING,
        OPEN_APPLICATION,
        SEND_EMAIL,
        END_SESSION,
    ] {
        builder = builder.register(label, handler_fn(acknowledge));
    }
    builder
        .register(
            SET_VOLUME,
            handler_fn(|request: &ActionRequest| {
                let level: f64 = request
                    .intent
                    .slot("level")
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| HandlerError::Fault("volume level is not a number".into()))?;
                Ok(ActionResult::ok().with("level", level.clamp(0.0, 100.0)))
            }),
        )
        .build()
}

pub fn classifier(config: &AssistantConfig) -> Arc<dyn IntentClassifier> {
    let rules = RuleClassifier::new(rules());
    let classifier: Arc<dyn IntentClassifier> = match &config.classifier {
        ClassifierConfig::Rules => Arc::new(rules),
        ClassifierConfig::Llm { url, timeout_ms } => {
            let llm = LlmClassifier::new(url, std::time::Duration::from_millis(*timeout_ms), catalog());
            Arc::new(FallbackClassifier::new(llm, rules))
        }
    };
    classifier
}

pub async fn store(config: &AssistantConfig, clock: Arc<dyn Clock>) -> Result<Arc<dyn SessionStore>, StoreError> {
    let store: Arc<dyn SessionStore> = match &config.store {
        StoreConfig::Memory => Arc::new(InMemorySessionStore::new(config.idle_timeout(), clock)),
        StoreConfig::File { dir } => Arc::new(JsonFileSessionStore::open(dir, config.idle_timeout(), clock).await?),
    };
    Ok(store)
}

/// Orchestrator over the built-in intents, shaped by `config`.
pub async fn assemble(config: &AssistantConfig, clock: Arc<dyn Clock>) -> Result<Orchestrator, StoreError> {
    let store = store(config, clock.clone()).await?;
    let normalizer = match config.wake_phrase.as_deref() {
        Some(phrase) => Normalizer::with_wake_phrase(phrase),
        None => Normalizer::new(),
    };
    info!(
        classifier = ?config.classifier,
        store = ?config.store,
        locale = %config.locale,
        "assembling orchestrator"
    );
    Ok(Orchestrator::builder(classifier(config), store)
        .catalog(catalog())
        .dispatcher(dispatcher(config))
        .normalizer(normalizer)
        .clock(clock)
        .settings(TurnSettings {
            confidence_threshold: config.confidence_threshold,
            locale: config.locale.clone(),
            history_cap: config.history_cap,
        })
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_rule_has_a_catalog_entry_and_handler() {
        let catalog = catalog();
        let dispatcher = dispatcher(&AssistantConfig::default());
        for rule in rules() {
            assert!(catalog.contains(&rule.label), "{} missing from catalog", rule.label);
            assert!(dispatcher.is_registered(&rule.label), "{} has no handler", rule.label);
        }
    }

    #[test]
    fn rule_slots_cover_required_slots() {
        let catalog = catalog();
        for rule in rules() {
            let def = catalog.get(&rule.label).unwrap();
            for required in def.required_slots() {
                assert!(rule.slots.iter().any(|s| s.name == required), "{}.{}", rule.label, required);
            }
        }
    }
}
