pub mod file;
pub mod locks;
pub mod memory;
pub mod state;
pub mod store;

pub use file::JsonFileSessionStore;
pub use memory::InMemorySessionStore;
pub use state::{SessionDelta, SessionState};
pub use store::{Mutator, SessionStore, StoreError};
