use super::utils::RecordingDispatcher;
use chrono::{DateTime, TimeZone, Utc};
use reminder_scheduler_api::{Application, SchedulerError, SchedulerMetrics};
use reminder_scheduler_domain::Message;
use reminder_scheduler_infra::{ISys, ReminderContext, VirtualSys};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 2024-01-01T00:00:00Z, where the virtual clock of every test starts
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn message(name: &str) -> Message {
    Message {
        channel_id: "general".into(),
        ping_user_ids: vec!["alice".into(), "bob".into()],
        from_user_id: "carol".into(),
        name: name.into(),
        description: "Scheduled by a test".into(),
    }
}

pub struct TestContext {
    pub ctx: ReminderContext,
    pub sys: Arc<VirtualSys>,
}

/// Inmemory context driven by a virtual clock at `t0`
pub fn setup() -> TestContext {
    let sys = Arc::new(VirtualSys::new(t0()));
    let mut ctx = ReminderContext::create_inmemory();
    ctx.sys = sys.clone();
    TestContext { ctx, sys }
}

pub struct RunningApp {
    pub cancel: CancellationToken,
    pub handle: JoinHandle<Result<(), SchedulerError>>,
    pub metrics: Arc<SchedulerMetrics>,
}

// Launch the scheduler as a background task
pub async fn spawn_app(ctx: &ReminderContext, dispatcher: Arc<RecordingDispatcher>) -> RunningApp {
    let application = Application::new(ctx.clone(), dispatcher);
    let metrics = application.metrics();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(application.start(cancel.clone()));
    settle().await;
    RunningApp {
        cancel,
        handle,
        metrics,
    }
}

/// Lets every spawned task run until it waits on the clock again
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Moves the virtual clock forward one second at a time
pub async fn advance(sys: &VirtualSys, seconds: u64) {
    for _ in 0..seconds {
        sys.advance(Duration::from_secs(1));
        settle().await;
    }
}

pub async fn advance_to(sys: &VirtualSys, instant: DateTime<Utc>) {
    while sys.now() < instant {
        sys.advance(Duration::from_secs(1));
        settle().await;
    }
}
