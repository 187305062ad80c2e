pub mod catalog;
pub mod classifier;
pub mod llm;
pub mod rules;
pub mod types;

pub use catalog::{IntentCatalog, IntentDefinition, SlotDefinition};
pub use classifier::{ClassifierError, FallbackClassifier, IntentClassifier};
pub use llm::LlmClassifier;
pub use rules::{IntentRule, RuleClassifier, SlotExtractor};
pub use types::{IntentResult, Pending, PendingStage, Slots, UNKNOWN_INTENT};
