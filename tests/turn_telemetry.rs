mod common;

use common::{harness, CountingHandler};
use concierge::actions::ActionDispatcher;
use concierge::intent::IntentResult;
use concierge::Utterance;

#[tokio::test]
async fn test_snapshot_counts_turn_outcomes() {
    let h = harness(
        ActionDispatcher::builder()
            .register_arc("disable_network", CountingHandler::ok())
            .build(),
    );
    h.classifier.push(IntentResult::new("disable_network", 0.95));
    h.classifier
        .push(IntentResult::new("schedule_meeting", 0.9).with_missing_slot("time"));

    for text in ["turn off wifi", "schedule", "", "never mind"] {
        h.orchestrator.handle_turn(Utterance::text("t1", text)).await;
    }

    let snap = h.orchestrator.telemetry_snapshot();
    assert_eq!(snap.turn_stats.total, 4);
    assert_eq!(snap.turn_stats.successes, 1);
    assert_eq!(snap.turn_stats.clarifications, 1);
    assert_eq!(snap.turn_stats.prompts, 1);
    assert_eq!(snap.turn_stats.declined, 1);
    assert_eq!(snap.dispatch_stats.ok, 1);
}

#[tokio::test]
async fn test_telemetry_never_carries_user_content() {
    let h = harness(ActionDispatcher::builder().build());
    h.classifier
        .push(IntentResult::new("send_email", 0.9).with_slot("recipient", "alice@secret.example"));

    let response = h
        .orchestrator
        .handle_turn(Utterance::text("t2", "email alice@secret.example"))
        .await;
    assert_eq!(response.text, "Sorry, I can't do that yet.");

    let snap = h.orchestrator.telemetry_snapshot();
    assert_eq!(snap.dispatch_stats.unsupported, 1);
    let dump = format!("{:?}", snap);
    assert!(!dump.contains("alice"), "telemetry leaked slot content: {}", dump);
}
