use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::types::{hints, ActionHandler, ActionRequest, ActionResult, ActionStatus};

pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_IDEMPOTENCY_CAPACITY: usize = 256;

/// Which labels may run at all, and which must be confirmed first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionPolicy {
    #[serde(default)]
    pub denied: BTreeSet<String>,
    #[serde(default)]
    pub confirm: BTreeSet<String>,
}

/// Bounded memory of finished dispatches, oldest evicted first.
#[derive(Debug)]
struct RecentResults {
    order: VecDeque<String>,
    results: HashMap<String, ActionResult>,
    capacity: usize,
}

impl RecentResults {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            results: HashMap::with_capacity(capacity),
            capacity,
        }
    }

    fn get(&self, key: &str) -> Option<ActionResult> {
        self.results.get(key).cloned()
    }

    fn insert(&mut self, key: String, result: ActionResult) {
        if self.capacity == 0 {
            return;
        }
        if self.results.insert(key.clone(), result).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.results.remove(&oldest);
            }
        }
    }
}

pub struct DispatcherBuilder {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
    policy: ActionPolicy,
    timeout: Duration,
    idempotency_capacity: usize,
}

impl DispatcherBuilder {
    pub fn register<H: ActionHandler + 'static>(mut self, label: &str, handler: H) -> Self {
        self.handlers.insert(label.to_string(), Arc::new(handler));
        self
    }

    pub fn register_arc(mut self, label: &str, handler: Arc<dyn ActionHandler>) -> Self {
        self.handlers.insert(label.to_string(), handler);
        self
    }

    pub fn policy(mut self, policy: ActionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn idempotency_capacity(mut self, capacity: usize) -> Self {
        self.idempotency_capacity = capacity;
        self
    }

    pub fn build(self) -> ActionDispatcher {
        ActionDispatcher {
            handlers: self.handlers,
            policy: self.policy,
            timeout: self.timeout,
            recent: Mutex::new(RecentResults::new(self.idempotency_capacity)),
        }
    }
}

/// Maps a resolved intent to its handler and runs it.
///
/// The registry is frozen at build time and shared without locking. Every
/// failure mode (unknown label, denial, timeout, error, panic) comes back as
/// an `ActionResult` with status `failed`; nothing propagates.
pub struct ActionDispatcher {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
    policy: ActionPolicy,
    timeout: Duration,
    recent: Mutex<RecentResults>,
}

impl ActionDispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder {
            handlers: HashMap::new(),
            policy: ActionPolicy::default(),
            timeout: DEFAULT_HANDLER_TIMEOUT,
            idempotency_capacity: DEFAULT_IDEMPOTENCY_CAPACITY,
        }
    }

    pub fn is_registered(&self, label: &str) -> bool {
        self.handlers.contains_key(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub async fn dispatch(&self, request: ActionRequest) -> ActionResult {
        let label = request.intent.label.clone();
        let key = request.idempotency_key();

        if let Some(cached) = self.recent.lock().get(&key) {
            debug!(%label, "replayed dispatch served from idempotency cache");
            return cached;
        }

        let Some(handler) = self.handlers.get(&label).cloned() else {
            info!(%label, "no handler registered");
            return ActionResult::failed(hints::UNSUPPORTED_INTENT);
        };

        if self.policy.denied.contains(&label) {
            warn!(%label, "dispatch denied by policy");
            return ActionResult::failed(hints::PERMISSION_DENIED);
        }

        if self.policy.confirm.contains(&label) && !request.confirmed {
            debug!(%label, "policy requires confirmation");
            return ActionResult::needs_confirmation(hints::CONFIRMATION_REQUIRED);
        }

        // A spawned task turns a handler panic into a JoinError instead of
        // unwinding through the turn.
        let mut task = tokio::spawn(async move { handler.handle(&request).await });

        let result = match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) => {
                warn!(%label, error = %e, "handler returned an error");
                ActionResult::failed(hints::HANDLER_FAULT)
            }
            Ok(Err(join_error)) => {
                error!(%label, error = %join_error, "handler panicked");
                ActionResult::failed(hints::HANDLER_FAULT)
            }
            Err(_) => {
                task.abort();
                warn!(%label, timeout_ms = self.timeout.as_millis() as u64, "handler timed out");
                ActionResult::failed(hints::HANDLER_TIMEOUT)
            }
        };

        if result.status != ActionStatus::NeedsConfirmation {
            self.recent.lock().insert(key, result.clone());
        }
        result
    }
}
