mod error;
mod job_schedulers;
mod reminder;
mod shared;

pub use error::ApiError;
pub use job_schedulers::{MetricsSnapshot, ReminderScheduler, SchedulerError, SchedulerMetrics};
pub use reminder::{cancel, create_one_shot, create_repeat, edit, get, list};
use reminder_scheduler_infra::{IMessageDispatcher, ReminderContext};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct Application {
    scheduler: ReminderScheduler,
}

impl Application {
    pub fn new(context: ReminderContext, dispatcher: Arc<dyn IMessageDispatcher>) -> Self {
        Self {
            scheduler: ReminderScheduler::new(context, dispatcher),
        }
    }

    pub fn metrics(&self) -> Arc<SchedulerMetrics> {
        self.scheduler.metrics()
    }

    /// Runs the scheduler loop until `cancel` fires
    pub async fn start(self, cancel: CancellationToken) -> Result<(), SchedulerError> {
        self.scheduler.run(cancel).await
    }
}
