pub mod actions;
pub mod builtin;
pub mod config;
pub mod dialogue;
pub mod intent;
pub mod kernel;
pub mod logging;
pub mod outputs;

// Re-export specific items if needed for convenient access
pub use config::AssistantConfig;
pub use kernel::orchestrator::{Orchestrator, TurnError, TurnSettings};
pub use kernel::utterance::{Modality, Utterance};
pub use outputs::Response;
