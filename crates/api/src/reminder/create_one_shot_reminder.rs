use crate::{error::ApiError, shared::usecase::UseCase};
use chrono::{DateTime, Utc};
use reminder_scheduler_domain::{validate_occurrence, Message, Reminder, ValidationError};
use reminder_scheduler_infra::{ReminderContext, StoreError};

#[derive(Debug)]
pub struct CreateOneShotReminderUseCase {
    pub message: Message,
    pub occurrence: DateTime<Utc>,
}

#[derive(Debug)]
pub enum UseCaseError {
    InvalidReminder(ValidationError),
    StorageError,
}

impl From<UseCaseError> for ApiError {
    fn from(e: UseCaseError) -> Self {
        match e {
            UseCaseError::InvalidReminder(e) => Self::Validation(e),
            UseCaseError::StorageError => Self::StoreUnavailable,
        }
    }
}

impl From<ValidationError> for UseCaseError {
    fn from(e: ValidationError) -> Self {
        Self::InvalidReminder(e)
    }
}

impl From<StoreError> for UseCaseError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(e) => Self::InvalidReminder(e),
            _ => Self::StorageError,
        }
    }
}

#[async_trait::async_trait]
impl UseCase for CreateOneShotReminderUseCase {
    type Response = Reminder;

    type Error = UseCaseError;

    const NAME: &'static str = "CreateOneShotReminder";

    async fn execute(&mut self, ctx: &ReminderContext) -> Result<Self::Response, Self::Error> {
        let now = ctx.sys.now();
        self.message.validate()?;
        validate_occurrence(self.occurrence, now, ctx.config.min_lead())?;

        let reminder = Reminder::new_one_shot(self.message.clone(), self.occurrence, now);
        ctx.repos.reminders.insert(&reminder).await?;

        Ok(reminder)
    }
}
