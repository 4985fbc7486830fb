use crate::{error::ApiError, shared::usecase::UseCase};
use reminder_scheduler_domain::Reminder;
use reminder_scheduler_infra::{ReminderContext, ReminderFilter};

#[derive(Debug)]
pub struct ListRemindersUseCase {
    pub filter: ReminderFilter,
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
impl UseCase for ListRemindersUseCase {
    type Response = Vec<Reminder>;

    type Error = UseCaseError;

    const NAME: &'static str = "ListReminders";

    async fn execute(&mut self, ctx: &ReminderContext) -> Result<Self::Response, Self::Error> {
        ctx.repos
            .reminders
            .list(&self.filter)
            .await
            .map_err(|_| UseCaseError::StorageError)
    }
}
