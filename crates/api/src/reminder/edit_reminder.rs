use crate::{error::ApiError, shared::usecase::UseCase};
use reminder_scheduler_domain::{
    validate_occurrence, Reminder, ReminderPatch, ValidationError, ID,
};
use reminder_scheduler_infra::{ReminderContext, StoreError};

/// How often an edit is applied to a fresh copy when the stored reminder
/// changed while it was being edited
const MAX_ATTEMPTS: usize = 3;

#[derive(Debug)]
pub struct EditReminderUseCase {
    pub reminder_id: ID,
    pub patch: ReminderPatch,
}

#[derive(Debug)]
pub enum UseCaseError {
    NotFound(ID),
    InvalidPatch(ValidationError),
    Conflict(ID),
    StorageError,
}

impl From<UseCaseError> for ApiError {
    fn from(e: UseCaseError) -> Self {
        match e {
            UseCaseError::NotFound(reminder_id) => Self::NotFound(format!(
                "The reminder with id: {}, was not found.",
                reminder_id
            )),
            UseCaseError::InvalidPatch(e) => Self::Validation(e),
            UseCaseError::Conflict(reminder_id) => Self::Conflict(format!(
                "The reminder with id: {}, was removed while being edited.",
                reminder_id
            )),
            UseCaseError::StorageError => Self::StoreUnavailable,
        }
    }
}

impl From<ValidationError> for UseCaseError {
    fn from(e: ValidationError) -> Self {
        Self::InvalidPatch(e)
    }
}

impl From<StoreError> for UseCaseError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(e) => Self::InvalidPatch(e),
            StoreError::Conflict(reminder_id) => Self::Conflict(reminder_id),
            StoreError::Unavailable(_) => Self::StorageError,
        }
    }
}

#[async_trait::async_trait]
impl UseCase for EditReminderUseCase {
    type Response = Reminder;

    type Error = UseCaseError;

    const NAME: &'static str = "EditReminder";

    async fn execute(&mut self, ctx: &ReminderContext) -> Result<Self::Response, Self::Error> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let reminder = match ctx.repos.reminders.find(&self.reminder_id).await? {
                Some(reminder) => reminder,
                None if attempts == 1 => {
                    return Err(UseCaseError::NotFound(self.reminder_id.clone()))
                }
                None => return Err(UseCaseError::Conflict(self.reminder_id.clone())),
            };

            let now = ctx.sys.now();
            let edited = reminder.patched(&self.patch, now)?;
            if let Some(occurrence) = self.patch.occurrence {
                validate_occurrence(occurrence, now, ctx.config.min_lead())?;
            }

            // The scheduler may have advanced or removed the reminder since it was read
            match ctx.repos.reminders.save(&edited, &reminder).await {
                Ok(()) => return Ok(edited),
                Err(StoreError::Conflict(_)) if attempts < MAX_ATTEMPTS => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
