mod helpers;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use helpers::setup::{advance, advance_to, message, settle, setup, spawn_app, t0};
use helpers::utils::{FaultyStore, RecordingDispatcher};
use reminder_scheduler_api::{
    cancel, create_one_shot, create_repeat, edit, get, ApiError, SchedulerError,
};
use reminder_scheduler_domain::{FailureCause, ReminderKind, ReminderPatch};
use reminder_scheduler_infra::DispatchError;
use std::{sync::atomic::Ordering, time::Duration};

fn secs(seconds: i64) -> ChronoDuration {
    ChronoDuration::seconds(seconds)
}

#[tokio::test(start_paused = true)]
async fn one_shot_is_delivered_once_at_its_occurrence() {
    let t = setup();
    let dispatcher = RecordingDispatcher::new(t.sys.clone());
    let reminder = create_one_shot(&t.ctx, message("standup"), t0() + secs(5))
        .await
        .unwrap();

    let app = spawn_app(&t.ctx, dispatcher.clone()).await;
    advance(&t.sys, 4).await;
    assert!(dispatcher.calls().is_empty());

    advance(&t.sys, 3).await;
    let calls = dispatcher.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, t0() + secs(5));
    assert_eq!(calls[0].1, message("standup"));
    assert!(matches!(
        get(&t.ctx, reminder.id.clone()).await,
        Err(ApiError::NotFound(_))
    ));
    assert_eq!(app.metrics.snapshot().delivered, 1);

    app.cancel.cancel();
    assert_eq!(app.handle.await.unwrap(), Err(SchedulerError::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn repeat_is_delivered_at_every_minute() {
    let t = setup();
    let dispatcher = RecordingDispatcher::new(t.sys.clone());
    let reminder = create_repeat(&t.ctx, message("water"), "* * * * *".into())
        .await
        .unwrap();
    assert_eq!(reminder.activation_instant(), t0() + secs(60));

    let app = spawn_app(&t.ctx, dispatcher.clone()).await;
    advance(&t.sys, 210).await;

    assert_eq!(
        dispatcher.call_times(),
        vec![t0() + secs(60), t0() + secs(120), t0() + secs(180)]
    );
    let stored = get(&t.ctx, reminder.id.clone()).await.unwrap();
    assert_eq!(stored.activation_instant(), t0() + secs(240));
    assert_eq!(stored.kind(), ReminderKind::Repeat);

    app.cancel.cancel();
    let _ = app.handle.await;
}

#[tokio::test(start_paused = true)]
async fn crash_before_acknowledgement_redelivers_after_restart() {
    let mut t = setup();
    let store = FaultyStore::new(t.ctx.repos.reminders.clone());
    store.panic_on_mark_delivered.store(true, Ordering::SeqCst);
    t.ctx.repos.reminders = store.clone();

    let dispatcher = RecordingDispatcher::new(t.sys.clone());
    let reminder = create_one_shot(&t.ctx, message("deploy"), t0() + secs(2))
        .await
        .unwrap();

    let crashed = spawn_app(&t.ctx, dispatcher.clone()).await;
    advance(&t.sys, 2).await;
    assert_eq!(dispatcher.calls().len(), 1);
    assert!(crashed.handle.await.unwrap_err().is_panic());
    assert!(get(&t.ctx, reminder.id.clone()).await.is_ok());

    advance(&t.sys, 1).await;
    let restarted = spawn_app(&t.ctx, dispatcher.clone()).await;
    settle().await;

    assert_eq!(
        dispatcher.call_times(),
        vec![t0() + secs(2), t0() + secs(3)]
    );
    assert!(get(&t.ctx, reminder.id.clone()).await.is_err());

    restarted.cancel.cancel();
    let _ = restarted.handle.await;
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_with_backoff() {
    let t = setup();
    let dispatcher = RecordingDispatcher::failing_with(
        t.sys.clone(),
        vec![
            DispatchError::Transient("503 Service Unavailable".into()),
            DispatchError::Transient("503 Service Unavailable".into()),
        ],
    );
    let reminder = create_repeat(&t.ctx, message("water"), "* * * * *".into())
        .await
        .unwrap();

    let app = spawn_app(&t.ctx, dispatcher.clone()).await;
    advance(&t.sys, 90).await;

    assert_eq!(
        dispatcher.call_times(),
        vec![t0() + secs(60), t0() + secs(61), t0() + secs(63)]
    );
    let stored = get(&t.ctx, reminder.id.clone()).await.unwrap();
    assert_eq!(stored.activation_instant(), t0() + secs(120));

    let metrics = app.metrics.snapshot();
    assert_eq!(metrics.delivered, 1);
    assert_eq!(metrics.transient_failures, 2);
    assert!(t
        .ctx
        .repos
        .delivery_failures
        .find_by_reminder(&reminder.id)
        .await
        .unwrap()
        .is_empty());

    app.cancel.cancel();
    let _ = app.handle.await;
}

#[tokio::test(start_paused = true)]
async fn exhausted_recurrence_deletes_the_reminder() {
    let t = setup();
    let dispatcher = RecordingDispatcher::new(t.sys.clone());
    let reminder = create_repeat(&t.ctx, message("new year"), "5 0 1 1 * 2024".into())
        .await
        .unwrap();
    assert_eq!(reminder.activation_instant(), t0() + secs(300));

    let app = spawn_app(&t.ctx, dispatcher.clone()).await;
    advance(&t.sys, 301).await;

    assert_eq!(dispatcher.call_times(), vec![t0() + secs(300)]);
    assert!(get(&t.ctx, reminder.id.clone()).await.is_err());
    assert_eq!(app.metrics.snapshot().recurrences_exhausted, 1);

    app.cancel.cancel();
    let _ = app.handle.await;
}

#[tokio::test(start_paused = true)]
async fn cancellation_while_waiting_leaves_the_reminder_untouched() {
    let t = setup();
    let dispatcher = RecordingDispatcher::new(t.sys.clone());
    let reminder = create_one_shot(&t.ctx, message("standup"), t0() + secs(5))
        .await
        .unwrap();

    let app = spawn_app(&t.ctx, dispatcher.clone()).await;
    advance(&t.sys, 4).await;
    app.cancel.cancel();
    assert_eq!(app.handle.await.unwrap(), Err(SchedulerError::Cancelled));

    advance_to(&t.sys, t0() + secs(10)).await;
    assert!(dispatcher.calls().is_empty());
    assert_eq!(get(&t.ctx, reminder.id.clone()).await.unwrap(), reminder);
}

#[tokio::test(start_paused = true)]
async fn same_instant_reminders_are_dispatched_in_id_order() {
    let t = setup();
    let dispatcher = RecordingDispatcher::new(t.sys.clone());
    let mut reminders = Vec::new();
    for name in ["a", "b", "c", "d", "e"] {
        let reminder = create_one_shot(&t.ctx, message(name), t0() + secs(3))
            .await
            .unwrap();
        reminders.push(reminder);
    }
    reminders.sort_by(|a, b| a.id.cmp(&b.id));

    let app = spawn_app(&t.ctx, dispatcher.clone()).await;
    advance(&t.sys, 4).await;

    let dispatched: Vec<_> = dispatcher
        .calls()
        .into_iter()
        .map(|(_, message)| message.name)
        .collect();
    let expected: Vec<_> = reminders.into_iter().map(|r| r.message.name).collect();
    assert_eq!(dispatched, expected);

    app.cancel.cancel();
    let _ = app.handle.await;
}

#[tokio::test(start_paused = true)]
async fn dispatches_are_bounded_by_concurrency() {
    let mut t = setup();
    t.ctx.config.dispatch_concurrency = 2;
    let dispatcher = RecordingDispatcher::holding(t.sys.clone(), Duration::from_secs(2));
    for name in ["a", "b", "c", "d"] {
        create_one_shot(&t.ctx, message(name), t0() + secs(3))
            .await
            .unwrap();
    }

    let app = spawn_app(&t.ctx, dispatcher.clone()).await;
    advance(&t.sys, 8).await;

    assert_eq!(dispatcher.max_active(), 2);
    assert_eq!(
        dispatcher.call_times(),
        vec![
            t0() + secs(3),
            t0() + secs(3),
            t0() + secs(5),
            t0() + secs(5)
        ]
    );
    assert_eq!(app.metrics.snapshot().delivered, 4);

    app.cancel.cancel();
    let _ = app.handle.await;
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_are_audited() {
    let mut t = setup();
    t.ctx.config.retry_policy.max_attempts = 2;
    let dispatcher = RecordingDispatcher::failing_with(
        t.sys.clone(),
        vec![
            DispatchError::Transient("timeout".into()),
            DispatchError::Transient("timeout".into()),
        ],
    );
    let reminder = create_one_shot(&t.ctx, message("deploy"), t0() + secs(3))
        .await
        .unwrap();

    let app = spawn_app(&t.ctx, dispatcher.clone()).await;
    advance(&t.sys, 6).await;

    assert_eq!(
        dispatcher.call_times(),
        vec![t0() + secs(3), t0() + secs(4)]
    );
    assert!(get(&t.ctx, reminder.id.clone()).await.is_err());

    let failures = t
        .ctx
        .repos
        .delivery_failures
        .find_by_reminder(&reminder.id)
        .await
        .unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].cause, FailureCause::RetriesExhausted);
    assert_eq!(failures[0].attempts, 2);
    assert_eq!(failures[0].activation_instant, t0() + secs(3));
    assert_eq!(app.metrics.snapshot().retries_exhausted, 1);

    app.cancel.cancel();
    let _ = app.handle.await;
}

#[tokio::test(start_paused = true)]
async fn permanent_failure_advances_repeat_without_retrying() {
    let t = setup();
    let dispatcher = RecordingDispatcher::failing_with(
        t.sys.clone(),
        vec![DispatchError::Permanent("404 Not Found".into())],
    );
    let reminder = create_repeat(&t.ctx, message("water"), "* * * * *".into())
        .await
        .unwrap();

    let app = spawn_app(&t.ctx, dispatcher.clone()).await;
    advance(&t.sys, 70).await;

    assert_eq!(dispatcher.call_times(), vec![t0() + secs(60)]);
    let stored = get(&t.ctx, reminder.id.clone()).await.unwrap();
    assert_eq!(stored.activation_instant(), t0() + secs(120));

    let failures = t
        .ctx
        .repos
        .delivery_failures
        .find_by_reminder(&reminder.id)
        .await
        .unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].cause, FailureCause::Permanent);
    assert_eq!(failures[0].reason, "404 Not Found");
    assert_eq!(failures[0].reminder_kind, ReminderKind::Repeat);

    app.cancel.cancel();
    let _ = app.handle.await;
}

#[tokio::test(start_paused = true)]
async fn store_outage_is_retried_on_the_next_poll() {
    let mut t = setup();
    let store = FaultyStore::new(t.ctx.repos.reminders.clone());
    store.failing_polls.store(3, Ordering::SeqCst);
    t.ctx.repos.reminders = store.clone();

    let dispatcher = RecordingDispatcher::new(t.sys.clone());
    create_one_shot(&t.ctx, message("standup"), t0() + secs(5))
        .await
        .unwrap();

    let app = spawn_app(&t.ctx, dispatcher.clone()).await;
    advance(&t.sys, 6).await;

    assert_eq!(dispatcher.call_times(), vec![t0() + secs(5)]);
    let metrics = app.metrics.snapshot();
    assert_eq!(metrics.store_errors, 3);
    assert_eq!(metrics.delivered, 1);

    app.cancel.cancel();
    let _ = app.handle.await;
}

#[tokio::test(start_paused = true)]
async fn overdue_reminders_fire_on_the_first_poll() {
    let t = setup();
    let dispatcher = RecordingDispatcher::new(t.sys.clone());
    let reminder = create_one_shot(&t.ctx, message("late"), t0() + secs(2))
        .await
        .unwrap();

    advance_to(&t.sys, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 30).unwrap()).await;
    let app = spawn_app(&t.ctx, dispatcher.clone()).await;

    assert_eq!(dispatcher.call_times(), vec![t0() + secs(30)]);
    assert!(get(&t.ctx, reminder.id.clone()).await.is_err());

    app.cancel.cancel();
    let _ = app.handle.await;
}

#[tokio::test(start_paused = true)]
async fn expression_edited_during_delivery_is_kept() {
    let t = setup();
    let dispatcher = RecordingDispatcher::holding(t.sys.clone(), Duration::from_secs(5));
    let reminder = create_repeat(&t.ctx, message("water"), "* * * * *".into())
        .await
        .unwrap();

    let app = spawn_app(&t.ctx, dispatcher.clone()).await;
    advance(&t.sys, 62).await;
    assert_eq!(dispatcher.call_times(), vec![t0() + secs(60)]);

    let patch = ReminderPatch {
        cron_expression: Some("0 12 * * *".into()),
        ..Default::default()
    };
    let edited = edit(&t.ctx, reminder.id.clone(), patch).await.unwrap();
    let noon = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    assert_eq!(edited.activation_instant(), noon);

    advance(&t.sys, 120).await;
    assert_eq!(dispatcher.call_times(), vec![t0() + secs(60)]);
    let stored = get(&t.ctx, reminder.id.clone()).await.unwrap();
    assert_eq!(stored.cron_expression(), Some("0 12 * * *"));
    assert_eq!(stored.activation_instant(), noon);
    assert_eq!(app.metrics.snapshot().superseded, 1);

    app.cancel.cancel();
    let _ = app.handle.await;
}

#[tokio::test(start_paused = true)]
async fn one_shot_rescheduled_during_delivery_is_kept() {
    let t = setup();
    let dispatcher = RecordingDispatcher::holding(t.sys.clone(), Duration::from_secs(5));
    let reminder = create_one_shot(&t.ctx, message("standup"), t0() + secs(5))
        .await
        .unwrap();

    let app = spawn_app(&t.ctx, dispatcher.clone()).await;
    advance(&t.sys, 6).await;
    assert_eq!(dispatcher.call_times(), vec![t0() + secs(5)]);

    let patch = ReminderPatch {
        occurrence: Some(t0() + secs(3600)),
        ..Default::default()
    };
    edit(&t.ctx, reminder.id.clone(), patch).await.unwrap();

    advance(&t.sys, 10).await;
    let stored = get(&t.ctx, reminder.id.clone()).await.unwrap();
    assert_eq!(stored.activation_instant(), t0() + secs(3600));
    assert_eq!(dispatcher.calls().len(), 1);

    app.cancel.cancel();
    let _ = app.handle.await;
}

#[tokio::test(start_paused = true)]
async fn reminder_cancelled_while_waiting_is_not_delivered() {
    let t = setup();
    let dispatcher = RecordingDispatcher::new(t.sys.clone());
    let reminder = create_one_shot(&t.ctx, message("standup"), t0() + secs(5))
        .await
        .unwrap();

    let app = spawn_app(&t.ctx, dispatcher.clone()).await;
    // Fetched by the poll at t0 + 4s and waiting for its instant
    advance(&t.sys, 4).await;
    cancel(&t.ctx, reminder.id.clone()).await.unwrap();

    advance(&t.sys, 3).await;
    assert!(dispatcher.calls().is_empty());
    assert_eq!(app.metrics.snapshot().superseded, 1);

    app.cancel.cancel();
    let _ = app.handle.await;
}

#[tokio::test(start_paused = true)]
async fn edit_while_waiting_is_delivered_as_edited() {
    let t = setup();
    let dispatcher = RecordingDispatcher::new(t.sys.clone());
    let reminder = create_one_shot(&t.ctx, message("standup"), t0() + secs(5))
        .await
        .unwrap();

    let app = spawn_app(&t.ctx, dispatcher.clone()).await;
    advance(&t.sys, 4).await;
    let patch = ReminderPatch {
        name: Some("retro".into()),
        occurrence: Some(t0() + secs(8)),
        ..Default::default()
    };
    edit(&t.ctx, reminder.id.clone(), patch).await.unwrap();

    advance(&t.sys, 5).await;
    let calls = dispatcher.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, t0() + secs(8));
    assert_eq!(calls[0].1.name, "retro");
    assert!(get(&t.ctx, reminder.id.clone()).await.is_err());

    app.cancel.cancel();
    let _ = app.handle.await;
}
