use crate::{error::ApiError, shared::usecase::UseCase};
use reminder_scheduler_domain::ID;
use reminder_scheduler_infra::ReminderContext;
use tracing::info;

/// Deletes a reminder of any kind. Cancelling a reminder which does not exist
/// succeeds.
#[derive(Debug)]
pub struct CancelReminderUseCase {
    pub reminder_id: ID,
}

#[derive(Debug)]
pub enum UseCaseError {
    StorageError,
}

impl From<UseCaseError> for ApiError {
    fn from(e: UseCaseError) -> Self {
        match e {
            UseCaseError::StorageError => Self::StoreUnavailable,
        }
    }
}

#[async_trait::async_trait]
impl UseCase for CancelReminderUseCase {
    type Response = ();

    type Error = UseCaseError;

    const NAME: &'static str = "CancelReminder";

    async fn execute(&mut self, ctx: &ReminderContext) -> Result<Self::Response, Self::Error> {
        let deleted = ctx
            .repos
            .reminders
            .cancel(&self.reminder_id)
            .await
            .map_err(|_| UseCaseError::StorageError)?;
        if !deleted {
            info!(reminder_id = %self.reminder_id, "Reminder to cancel was already gone");
        }
        Ok(())
    }
}
