use crate::shared::usecase::UseCase;
use chrono::{DateTime, Utc};
use reminder_scheduler_domain::Reminder;
use reminder_scheduler_infra::ReminderContext;

/// Fetches every reminder which becomes due before the next poll cycle starts
#[derive(Debug)]
pub struct GetDueRemindersUseCase {}

#[derive(Debug)]
pub enum UseCaseError {
    StorageError,
}

/// Reminders due before `cutoff`, ordered by activation instant and id
#[derive(Debug)]
pub struct DueReminders {
    pub cutoff: DateTime<Utc>,
    pub reminders: Vec<Reminder>,
}

#[async_trait::async_trait]
impl UseCase for GetDueRemindersUseCase {
    type Response = DueReminders;

    type Error = UseCaseError;

    const NAME: &'static str = "GetDueReminders";

    async fn execute(&mut self, ctx: &ReminderContext) -> Result<Self::Response, Self::Error> {
        let cutoff = ctx
            .sys
            .now()
            .checked_add_signed(ctx.config.fetch_window())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let reminders = ctx
            .repos
            .reminders
            .due_before(cutoff, ctx.config.batch_limit)
            .await
            .map_err(|_| UseCaseError::StorageError)?;

        Ok(DueReminders { cutoff, reminders })
    }
}
