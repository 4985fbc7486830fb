use crate::{error::ApiError, shared::usecase::UseCase};
use reminder_scheduler_domain::{recurrence, Message, Reminder, ValidationError};
use reminder_scheduler_infra::{ReminderContext, StoreError};

#[derive(Debug)]
pub struct CreateRepeatReminderUseCase {
    pub message: Message,
    pub cron_expression: String,
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
impl UseCase for CreateRepeatReminderUseCase {
    type Response = Reminder;

    type Error = UseCaseError;

    const NAME: &'static str = "CreateRepeatReminder";

    async fn execute(&mut self, ctx: &ReminderContext) -> Result<Self::Response, Self::Error> {
        self.message.validate()?;
        let expression = recurrence::parse(&self.cron_expression).map_err(ValidationError::from)?;

        let reminder = Reminder::new_repeat(self.message.clone(), &expression, ctx.sys.now())?;
        ctx.repos.reminders.insert(&reminder).await?;

        Ok(reminder)
    }
}
