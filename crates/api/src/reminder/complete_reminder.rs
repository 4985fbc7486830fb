use super::deliver_reminder::DeliveryOutcome;
use crate::shared::usecase::UseCase;
use chrono::{DateTime, Utc};
use reminder_scheduler_domain::{recurrence, DeliveryFailure, Reminder, ReminderSchedule};
use reminder_scheduler_infra::{MissedFiringPolicy, ReminderContext, StoreError};
use std::cmp::max;
use tracing::{error, info};

/// Store bookkeeping after a delivery attempt has finished. Permanent and
/// exhausted failures are audited and otherwise handled like a delivery.
#[derive(Debug)]
pub struct CompleteReminderUseCase {
    pub reminder: Reminder,
    pub outcome: DeliveryOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The one-shot reminder was removed
    Deleted,
    /// The repeating reminder now fires next at the given instant
    Advanced(DateTime<Utc>),
    /// The recurrence expression never fires again so the reminder was removed
    RecurrenceExhausted,
    /// The reminder was edited or cancelled while it was being delivered and
    /// is left as it is now
    Superseded,
}

#[derive(Debug)]
pub enum UseCaseError {
    StorageError(StoreError),
}

impl From<StoreError> for UseCaseError {
    fn from(e: StoreError) -> Self {
        Self::StorageError(e)
    }
}

#[async_trait::async_trait]
impl UseCase for CompleteReminderUseCase {
    type Response = Completion;

    type Error = UseCaseError;

    const NAME: &'static str = "CompleteReminder";

    async fn execute(&mut self, ctx: &ReminderContext) -> Result<Self::Response, Self::Error> {
        let now = ctx.sys.now();
        let reminder = &self.reminder;

        if let DeliveryOutcome::Failed {
            cause,
            reason,
            attempts,
        } = &self.outcome
        {
            error!(
                reminder_id = %reminder.id,
                activation_instant = %reminder.activation_instant(),
                attempt = attempts,
                cause = %cause,
                "Reminder could not be delivered: {}",
                reason
            );
            let failure = DeliveryFailure::new(reminder, *cause, reason.clone(), *attempts, now);
            ctx.repos.delivery_failures.insert(&failure).await?;
        }

        let (cron_expression, prior) = match &reminder.schedule {
            ReminderSchedule::OneShot { occurrence } => {
                let deleted = ctx
                    .repos
                    .reminders
                    .mark_delivered_one_shot(&reminder.id, *occurrence)
                    .await?;
                return Ok(if deleted {
                    Completion::Deleted
                } else {
                    superseded(reminder)
                });
            }
            ReminderSchedule::Repeat {
                cron_expression,
                next_occurrence,
            } => (cron_expression, *next_occurrence),
        };

        let reference = match ctx.config.missed_firing_policy {
            MissedFiringPolicy::ForwardSkip => max(now, prior),
            MissedFiringPolicy::CatchUp => prior,
        };
        let next = match recurrence::next(cron_expression, reference) {
            Ok(next) => next,
            Err(e) => {
                error!(
                    reminder_id = %reminder.id,
                    "Stored recurrence expression: {} does not parse: {}",
                    cron_expression,
                    e
                );
                None
            }
        };

        let repo = &ctx.repos.reminders;
        match next {
            Some(next) => match repo.advance_repeat(&reminder.id, prior, next).await {
                Ok(()) => Ok(Completion::Advanced(next)),
                Err(StoreError::Conflict(_)) => Ok(superseded(reminder)),
                Err(e) => Err(e.into()),
            },
            None => {
                if !repo.retire_repeat(&reminder.id, prior).await? {
                    return Ok(superseded(reminder));
                }
                info!(
                    reminder_id = %reminder.id,
                    "Recurrence expression: {} has no future occurrence, removed the reminder",
                    cron_expression
                );
                Ok(Completion::RecurrenceExhausted)
            }
        }
    }
}

fn superseded(reminder: &Reminder) -> Completion {
    info!(
        reminder_id = %reminder.id,
        activation_instant = %reminder.activation_instant(),
        "Reminder was edited or cancelled during delivery, leaving it as it is"
    );
    Completion::Superseded
}
