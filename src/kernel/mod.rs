pub mod normalizer;
pub mod orchestrator;
pub mod phase;
pub mod sweeper;
pub mod telemetry;
pub mod time;
pub mod utterance;
