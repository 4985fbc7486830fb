use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;

// Mocking out time so that it is possible to run tests that depend on time.
#[async_trait::async_trait]
pub trait ISys: Send + Sync {
    /// The current instant
    fn now(&self) -> DateTime<Utc>;

    /// The current timestamp in millis
    fn get_timestamp_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }

    /// Resolves once `duration` has passed
    async fn after(&self, duration: Duration);

    /// Resolves once `instant` has been reached. Resolves immediately for
    /// instants in the past.
    async fn until(&self, instant: DateTime<Utc>) {
        let remaining = (instant - self.now()).to_std().unwrap_or(Duration::ZERO);
        self.after(remaining).await
    }
}

/// System that gets the real time and is used when not testing
pub struct RealSys {}

#[async_trait::async_trait]
impl ISys for RealSys {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn after(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

/// Clock whose time only moves when told to. Pending `after` signals are
/// woken as soon as the clock reaches their deadline.
pub struct VirtualSys {
    now: watch::Sender<DateTime<Utc>>,
}

impl VirtualSys {
    pub fn new(start: DateTime<Utc>) -> Self {
        let (now, _) = watch::channel(start);
        Self { now }
    }

    /// Moves the clock `duration` forward
    pub fn advance(&self, duration: Duration) {
        let step = chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        self.now.send_modify(|now| {
            if let Some(next) = now.checked_add_signed(step) {
                *now = next;
            }
        });
    }

    /// Moves the clock to `instant`. Instants before the current time are ignored.
    pub fn set(&self, instant: DateTime<Utc>) {
        self.now.send_modify(|now| {
            if instant > *now {
                *now = instant;
            }
        });
    }
}

#[async_trait::async_trait]
impl ISys for VirtualSys {
    fn now(&self) -> DateTime<Utc> {
        *self.now.borrow()
    }

    async fn after(&self, duration: Duration) {
        let deadline = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|step| self.now().checked_add_signed(step));
        let deadline = match deadline {
            Some(deadline) => deadline,
            None => return std::future::pending().await,
        };

        let mut receiver = self.now.subscribe();
        let reached = receiver.wait_for(|now| *now >= deadline).await.is_ok();
        if !reached {
            // The clock is gone, so the deadline is never reached
            std::future::pending::<()>().await
        }
    }
}
