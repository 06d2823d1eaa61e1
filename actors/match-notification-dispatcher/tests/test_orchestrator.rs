mod common;

use common::*;
use match_notification_dispatcher::{DispatchError, NotificationOrchestrator};
use notification_common::{
    ChannelSender, ChannelStatus, DeliveryRecord, DeliveryStateStore, InMemoryDeliveryStore,
    JobStatus, NotificationChannel, NotificationStatus,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn orchestrator(
    store: &Arc<InMemoryDeliveryStore>,
    senders: &[Arc<ScriptedSender>],
) -> NotificationOrchestrator {
    NotificationOrchestrator::new(
        Arc::clone(store) as Arc<dyn DeliveryStateStore>,
        renderer(),
        senders
            .iter()
            .map(|sender| Arc::clone(sender) as Arc<dyn ChannelSender>)
            .collect(),
    )
}

fn seeded_email_sent(store: &InMemoryDeliveryStore, guest_id: &str) {
    let mut record = DeliveryRecord::default();
    record.email.sent = true;
    record.email.status = ChannelStatus::Sent;
    record.email.message_id = Some("earlier-msg".to_string());
    store.insert_record(key(guest_id), record);
}

#[tokio::test]
async fn test_already_delivered_job_is_skipped_without_writes() {
    let store = Arc::new(InMemoryDeliveryStore::new());
    seeded_email_sent(&store, "guest-1");
    let email = Arc::new(ScriptedSender::new(NotificationChannel::Email, Script::Deliver));

    let report = orchestrator(&store, &[email.clone()])
        .process(&email_job("guest-1"))
        .await
        .unwrap();

    assert_eq!(report.status, JobStatus::Skipped);
    assert_eq!(report.already_delivered, vec![NotificationChannel::Email]);
    assert_eq!(email.calls(), 0);
    assert_eq!(store.write_count(), 0);
    assert_eq!(
        store.record(&key("guest-1")).unwrap().email.message_id.as_deref(),
        Some("earlier-msg")
    );
}

#[tokio::test]
async fn test_concurrent_duplicates_record_a_single_message_id() {
    let store = Arc::new(InMemoryDeliveryStore::new());
    let email = Arc::new(
        ScriptedSender::new(NotificationChannel::Email, Script::Deliver)
            .with_delay(Duration::from_millis(50)),
    );
    let orchestrator = orchestrator(&store, &[email.clone()]);
    let job = email_job("guest-1");

    let (first, second) = tokio::join!(orchestrator.process(&job), orchestrator.process(&job));
    let (first, second) = (first.unwrap(), second.unwrap());

    // both attempts passed the state check before either committed
    assert_eq!(email.calls(), 2);

    let (winners, losers): (Vec<_>, Vec<_>) = [first, second]
        .into_iter()
        .partition(|report| !report.already_delivered.contains(&NotificationChannel::Email));
    assert_eq!(winners.len(), 1);
    assert_eq!(losers.len(), 1);

    let record = store.record(&key("guest-1")).unwrap();
    assert!(record.email.sent);
    assert_eq!(
        record.email.message_id,
        winners[0].outcomes[0].provider_message_id
    );
}

#[tokio::test]
async fn test_racing_runs_with_different_outcomes_converge() {
    let store = Arc::new(InMemoryDeliveryStore::new());
    let fast = orchestrator(
        &store,
        &[
            Arc::new(
                ScriptedSender::new(NotificationChannel::Email, Script::Deliver)
                    .with_delay(Duration::from_millis(10)),
            ),
            Arc::new(
                ScriptedSender::new(NotificationChannel::Chat, Script::Deliver)
                    .with_delay(Duration::from_millis(10)),
            ),
        ],
    );
    let slow = orchestrator(
        &store,
        &[
            Arc::new(
                ScriptedSender::new(NotificationChannel::Email, Script::Deliver)
                    .with_delay(Duration::from_millis(80)),
            ),
            Arc::new(
                ScriptedSender::new(NotificationChannel::Chat, Script::Fail("boom"))
                    .with_delay(Duration::from_millis(80)),
            ),
        ],
    );
    let job = raw_job("guest-1", Some("ana@example.com"), Some("+15550001111"));

    let (fast_report, slow_report) = tokio::join!(fast.process(&job), slow.process(&job));
    assert_eq!(fast_report.unwrap().status, JobStatus::Sent);
    let slow_report = slow_report.unwrap();
    assert_eq!(slow_report.already_delivered, vec![NotificationChannel::Email]);

    let record = store.record(&key("guest-1")).unwrap();
    assert!(record.email.sent);
    assert!(record.chat.sent);
    assert_eq!(record.chat.status, ChannelStatus::Sent);
    assert_eq!(record.notification_status, NotificationStatus::Sent);
    assert_eq!(record.notification_error, None);
}

#[tokio::test]
async fn test_all_channels_delivered_is_sent() {
    let store = Arc::new(InMemoryDeliveryStore::new());
    let email = Arc::new(ScriptedSender::new(NotificationChannel::Email, Script::Deliver));
    let chat = Arc::new(ScriptedSender::new(NotificationChannel::Chat, Script::Deliver));

    let report = orchestrator(&store, &[email.clone(), chat.clone()])
        .process(&raw_job("guest-1", Some("ana@example.com"), Some("+15550001111")))
        .await
        .unwrap();

    assert_eq!(report.status, JobStatus::Sent);
    assert_eq!(report.error_detail, None);
    assert_eq!(report.outcomes.len(), 2);

    let record = store.record(&key("guest-1")).unwrap();
    assert!(record.email.sent);
    assert!(record.chat.sent);
    assert_eq!(record.notification_status, NotificationStatus::Sent);
    assert_eq!(record.notification_error, None);
}

#[tokio::test]
async fn test_one_channel_failing_is_partial() {
    let store = Arc::new(InMemoryDeliveryStore::new());
    let email = Arc::new(ScriptedSender::new(NotificationChannel::Email, Script::Deliver));
    let chat = Arc::new(ScriptedSender::new(
        NotificationChannel::Chat,
        Script::Fail("session disconnected"),
    ));

    let report = orchestrator(&store, &[email, chat])
        .process(&raw_job("guest-1", Some("ana@example.com"), Some("+15550001111")))
        .await
        .unwrap();

    assert_eq!(report.status, JobStatus::Partial);
    assert_eq!(
        report.error_detail.as_deref(),
        Some("chat: session disconnected")
    );

    let record = store.record(&key("guest-1")).unwrap();
    assert!(record.email.sent);
    assert!(!record.chat.sent);
    assert_eq!(record.chat.status, ChannelStatus::Failed);
    assert_eq!(record.notification_status, NotificationStatus::Partial);
}

#[tokio::test]
async fn test_ineligible_channel_counts_as_failure_without_transport_call() {
    let store = Arc::new(InMemoryDeliveryStore::new());
    let email = Arc::new(ScriptedSender::new(NotificationChannel::Email, Script::Deliver));
    let chat = Arc::new(
        ScriptedSender::new(NotificationChannel::Chat, Script::Deliver).ineligible("no phone number"),
    );

    let report = orchestrator(&store, &[email, chat.clone()])
        .process(&email_job("guest-1"))
        .await
        .unwrap();

    assert_eq!(report.status, JobStatus::Partial);
    assert_eq!(report.error_detail.as_deref(), Some("chat: no phone number"));
    assert_eq!(chat.calls(), 0);

    let record = store.record(&key("guest-1")).unwrap();
    assert_eq!(record.chat.status, ChannelStatus::Unsent);
}

#[tokio::test]
async fn test_every_channel_failing_is_failed() {
    let store = Arc::new(InMemoryDeliveryStore::new());
    let email = Arc::new(ScriptedSender::new(
        NotificationChannel::Email,
        Script::Fail("Service unavailable"),
    ));

    let report = orchestrator(&store, &[email])
        .process(&email_job("guest-1"))
        .await
        .unwrap();

    assert_eq!(report.status, JobStatus::Failed);
    let record = store.record(&key("guest-1")).unwrap();
    assert_eq!(record.email.status, ChannelStatus::Failed);
    assert!(!record.email.sent);
    assert_eq!(record.notification_status, NotificationStatus::Failed);
    assert_eq!(
        record.notification_error.as_deref(),
        Some("email: Service unavailable")
    );
}

#[tokio::test]
async fn test_deferred_chat_counts_as_delivered() {
    let store = Arc::new(InMemoryDeliveryStore::new());
    let email = Arc::new(ScriptedSender::new(NotificationChannel::Email, Script::Deliver));
    let chat = Arc::new(ScriptedSender::new(NotificationChannel::Chat, Script::Defer));

    let report = orchestrator(&store, &[email, chat])
        .process(&raw_job("guest-1", Some("ana@example.com"), Some("+15550001111")))
        .await
        .unwrap();

    assert_eq!(report.status, JobStatus::Sent);
    let record = store.record(&key("guest-1")).unwrap();
    assert!(record.chat.sent);
    assert!(record.chat.deferred);
    assert_eq!(record.chat.message_id, None);
}

#[tokio::test]
async fn test_only_unsent_channels_are_attempted() {
    let store = Arc::new(InMemoryDeliveryStore::new());
    seeded_email_sent(&store, "guest-1");
    let email = Arc::new(ScriptedSender::new(NotificationChannel::Email, Script::Deliver));
    let chat = Arc::new(ScriptedSender::new(NotificationChannel::Chat, Script::Deliver));

    let report = orchestrator(&store, &[email.clone(), chat.clone()])
        .process(&raw_job("guest-1", Some("ana@example.com"), Some("+15550001111")))
        .await
        .unwrap();

    assert_eq!(report.status, JobStatus::Sent);
    assert_eq!(report.already_delivered, vec![NotificationChannel::Email]);
    assert_eq!(email.calls(), 0);
    assert_eq!(chat.calls(), 1);

    let record = store.record(&key("guest-1")).unwrap();
    assert_eq!(record.email.message_id.as_deref(), Some("earlier-msg"));
    assert_eq!(record.chat.message_id.as_deref(), Some("chat-msg-1"));
}

#[tokio::test]
async fn test_invalid_match_count_short_circuits_before_state_read() {
    let store = Arc::new(InMemoryDeliveryStore::new());
    let email = Arc::new(ScriptedSender::new(NotificationChannel::Email, Script::Deliver));
    let mut job = email_job("guest-1");
    if let Some(summary) = job.match_summary.as_mut() {
        summary.total_matches = Some(json!(0));
    }

    let report = orchestrator(&store, &[email.clone()])
        .process(&job)
        .await
        .unwrap();

    assert_eq!(report.status, JobStatus::Failed);
    assert!(report.error_detail.unwrap().contains("match"));
    assert_eq!(store.read_count(), 0);
    assert_eq!(email.calls(), 0);

    // the key was known, so the rejection is recorded
    assert_eq!(store.write_count(), 1);
    let record = store.record(&key("guest-1")).unwrap();
    assert_eq!(record.notification_status, NotificationStatus::Failed);
}

#[tokio::test]
async fn test_missing_guest_id_writes_nothing() {
    let store = Arc::new(InMemoryDeliveryStore::new());
    let email = Arc::new(ScriptedSender::new(NotificationChannel::Email, Script::Deliver));
    let mut job = email_job("guest-1");
    job.guest_id = None;

    let report = orchestrator(&store, &[email])
        .process(&job)
        .await
        .unwrap();

    assert_eq!(report.status, JobStatus::Failed);
    assert_eq!(report.key, None);
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn test_no_eligible_channel_records_failure() {
    let store = Arc::new(InMemoryDeliveryStore::new());
    let email = Arc::new(
        ScriptedSender::new(NotificationChannel::Email, Script::Deliver).ineligible("bounced address"),
    );

    let report = orchestrator(&store, &[email.clone()])
        .process(&email_job("guest-1"))
        .await
        .unwrap();

    assert_eq!(report.status, JobStatus::Failed);
    assert_eq!(email.calls(), 0);
    let record = store.record(&key("guest-1")).unwrap();
    assert_eq!(record.notification_status, NotificationStatus::Failed);
    assert!(record
        .notification_error
        .unwrap()
        .contains("email: bounced address"));
}

#[tokio::test]
async fn test_render_failure_records_failure_and_errors() {
    let store = Arc::new(InMemoryDeliveryStore::new());
    let email = Arc::new(ScriptedSender::new(NotificationChannel::Email, Script::Deliver));
    let orchestrator = NotificationOrchestrator::new(
        Arc::clone(&store) as Arc<dyn DeliveryStateStore>,
        Arc::new(FailingRenderer),
        vec![Arc::clone(&email) as Arc<dyn ChannelSender>],
    );

    let result = orchestrator.process(&email_job("guest-1")).await;

    assert!(matches!(result, Err(DispatchError::Render(_))));
    assert_eq!(email.calls(), 0);
    let record = store.record(&key("guest-1")).unwrap();
    assert_eq!(record.notification_status, NotificationStatus::Failed);
    assert!(!record.email.sent);
}

#[tokio::test]
async fn test_commit_failure_after_dispatch_errors() {
    let store = Arc::new(FailingCommitStore::default());
    let email = Arc::new(ScriptedSender::new(NotificationChannel::Email, Script::Deliver));
    let orchestrator = NotificationOrchestrator::new(
        Arc::clone(&store) as Arc<dyn DeliveryStateStore>,
        renderer(),
        vec![Arc::clone(&email) as Arc<dyn ChannelSender>],
    );

    let result = orchestrator.process(&email_job("guest-1")).await;

    assert!(matches!(result, Err(DispatchError::Store(_))));
    assert_eq!(email.calls(), 1);
    // the commit plus the best-effort failure record
    assert_eq!(store.commit_attempts.load(Ordering::SeqCst), 2);
}
