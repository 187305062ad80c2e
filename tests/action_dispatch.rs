mod common;

use chrono::Utc;
use common::{CountingHandler, SlowHandler};
use concierge::actions::{
    handler_fn, hints, ActionDispatcher, ActionPolicy, ActionRequest, ActionResult, ActionStatus, HandlerError,
};
use concierge::dialogue::SessionState;
use concierge::intent::IntentResult;
use std::time::Duration;
use uuid::Uuid;

fn request(label: &str) -> ActionRequest {
    ActionRequest::new(
        IntentResult::new(label, 0.95),
        SessionState::new("s1", Utc::now()),
        Uuid::new_v4(),
    )
}

#[tokio::test]
async fn test_unregistered_label_is_unsupported() {
    let dispatcher = ActionDispatcher::builder().build();

    let result = dispatcher.dispatch(request("launch_rocket")).await;

    assert_eq!(result.status, ActionStatus::Failed);
    assert_eq!(result.message_hint.as_deref(), Some(hints::UNSUPPORTED_INTENT));
}

#[tokio::test]
async fn test_handler_timeout_becomes_failed() {
    let dispatcher = ActionDispatcher::builder()
        .register("slow", SlowHandler(Duration::from_secs(30)))
        .timeout(Duration::from_millis(50))
        .build();

    let result = dispatcher.dispatch(request("slow")).await;

    assert_eq!(result.status, ActionStatus::Failed);
    assert_eq!(result.message_hint.as_deref(), Some(hints::HANDLER_TIMEOUT));
}

#[tokio::test]
async fn test_handler_error_and_panic_become_faults() {
    let dispatcher = ActionDispatcher::builder()
        .register(
            "broken",
            handler_fn(|_: &ActionRequest| Err(HandlerError::Fault("device missing".into()))),
        )
        .register(
            "panics",
            handler_fn(|_: &ActionRequest| -> Result<ActionResult, HandlerError> { panic!("boom") }),
        )
        .build();

    for label in ["broken", "panics"] {
        let result = dispatcher.dispatch(request(label)).await;
        assert_eq!(result.status, ActionStatus::Failed, "{}", label);
        assert_eq!(result.message_hint.as_deref(), Some(hints::HANDLER_FAULT), "{}", label);
    }
}

#[tokio::test]
async fn test_denied_label_never_runs() {
    let handler = CountingHandler::ok();
    let dispatcher = ActionDispatcher::builder()
        .register_arc("format_disk", handler.clone())
        .policy(ActionPolicy {
            denied: ["format_disk".to_string()].into_iter().collect(),
            ..ActionPolicy::default()
        })
        .build();

    let result = dispatcher.dispatch(request("format_disk").confirmed()).await;

    assert_eq!(result.message_hint.as_deref(), Some(hints::PERMISSION_DENIED));
    assert_eq!(handler.count(), 0);
}

#[tokio::test]
async fn test_confirm_policy_gates_until_confirmed() {
    let handler = CountingHandler::ok();
    let dispatcher = ActionDispatcher::builder()
        .register_arc("send_email", handler.clone())
        .policy(ActionPolicy {
            confirm: ["send_email".to_string()].into_iter().collect(),
            ..ActionPolicy::default()
        })
        .build();

    let first = dispatcher.dispatch(request("send_email")).await;
    assert_eq!(first.status, ActionStatus::NeedsConfirmation);
    assert_eq!(handler.count(), 0);

    let second = dispatcher.dispatch(request("send_email").confirmed()).await;
    assert!(second.is_ok());
    assert_eq!(handler.count(), 1);
    assert!(handler.last.lock().as_ref().unwrap().confirmed);
}

#[tokio::test]
async fn test_replayed_request_served_from_cache() {
    let handler = CountingHandler::returning(ActionResult::ok().with("volume", 30));
    let dispatcher = ActionDispatcher::builder()
        .register_arc("set_volume", handler.clone())
        .build();
    let req = request("set_volume");

    let first = dispatcher.dispatch(req.clone()).await;
    let replay = dispatcher.dispatch(req.clone()).await;
    let fresh = dispatcher.dispatch(request("set_volume")).await;

    assert_eq!(first, replay);
    assert_eq!(fresh, first);
    assert_eq!(handler.count(), 2, "only the new utterance reaches the handler");
}

#[tokio::test]
async fn test_idempotency_cache_is_bounded() {
    let handler = CountingHandler::ok();
    let dispatcher = ActionDispatcher::builder()
        .register_arc("ping", handler.clone())
        .idempotency_capacity(1)
        .build();
    let a = request("ping");
    let b = request("ping");

    dispatcher.dispatch(a.clone()).await;
    dispatcher.dispatch(b).await;
    dispatcher.dispatch(a).await;

    assert_eq!(handler.count(), 3, "evicted entry runs again");
}
