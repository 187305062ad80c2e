pub mod dispatcher;
pub mod types;

pub use dispatcher::{ActionDispatcher, ActionPolicy, DispatcherBuilder, DEFAULT_HANDLER_TIMEOUT};
pub use types::{hints, handler_fn, ActionHandler, ActionRequest, ActionResult, ActionStatus, FnHandler, HandlerError, Payload};
