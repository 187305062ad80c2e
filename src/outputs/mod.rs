pub mod composer;

pub use composer::{Outcome, Response, ResponseComposer, ResponseKind, DEFAULT_LOCALE};
