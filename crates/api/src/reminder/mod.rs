mod cancel_reminder;
pub(crate) mod complete_reminder;
mod create_one_shot_reminder;
mod create_repeat_reminder;
pub(crate) mod deliver_reminder;
mod edit_reminder;
pub(crate) mod get_due_reminders;
mod get_reminder;
mod list_reminders;

use crate::{error::ApiError, shared::usecase::execute};
use cancel_reminder::CancelReminderUseCase;
use chrono::{DateTime, Utc};
use create_one_shot_reminder::CreateOneShotReminderUseCase;
use create_repeat_reminder::CreateRepeatReminderUseCase;
use edit_reminder::EditReminderUseCase;
use get_reminder::GetReminderUseCase;
use list_reminders::ListRemindersUseCase;
use reminder_scheduler_domain::{Message, Reminder, ReminderPatch, ID};
use reminder_scheduler_infra::{ReminderContext, ReminderFilter};

/// Registers a reminder delivered once at `occurrence`, which must lie at least
/// one poll interval in the future
pub async fn create_one_shot(
    ctx: &ReminderContext,
    message: Message,
    occurrence: DateTime<Utc>,
) -> Result<Reminder, ApiError> {
    let usecase = CreateOneShotReminderUseCase {
        message,
        occurrence,
    };
    execute(usecase, ctx).await.map_err(ApiError::from)
}

/// Registers a reminder delivered at every occurrence of `cron_expression`
pub async fn create_repeat(
    ctx: &ReminderContext,
    message: Message,
    cron_expression: String,
) -> Result<Reminder, ApiError> {
    let usecase = CreateRepeatReminderUseCase {
        message,
        cron_expression,
    };
    execute(usecase, ctx).await.map_err(ApiError::from)
}

pub async fn list(ctx: &ReminderContext, filter: ReminderFilter) -> Result<Vec<Reminder>, ApiError> {
    let usecase = ListRemindersUseCase { filter };
    execute(usecase, ctx).await.map_err(ApiError::from)
}

pub async fn get(ctx: &ReminderContext, reminder_id: ID) -> Result<Reminder, ApiError> {
    let usecase = GetReminderUseCase { reminder_id };
    execute(usecase, ctx).await.map_err(ApiError::from)
}

pub async fn cancel(ctx: &ReminderContext, reminder_id: ID) -> Result<(), ApiError> {
    let usecase = CancelReminderUseCase { reminder_id };
    execute(usecase, ctx).await.map_err(ApiError::from)
}

/// Applies every change of `patch` or none of them
pub async fn edit(
    ctx: &ReminderContext,
    reminder_id: ID,
    patch: ReminderPatch,
) -> Result<Reminder, ApiError> {
    let usecase = EditReminderUseCase { reminder_id, patch };
    execute(usecase, ctx).await.map_err(ApiError::from)
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use chrono::{DateTime, TimeZone, Utc};
    use reminder_scheduler_domain::Message;
    use reminder_scheduler_infra::{ReminderContext, VirtualSys};
    use std::sync::Arc;

    /// Inmemory context with a virtual clock standing still at 2024-01-01T00:00:00Z
    pub fn setup() -> (ReminderContext, DateTime<Utc>) {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut ctx = ReminderContext::create_inmemory();
        ctx.sys = Arc::new(VirtualSys::new(t0));
        (ctx, t0)
    }

    pub fn message() -> Message {
        Message {
            channel_id: "general".into(),
            ping_user_ids: vec!["alice".into()],
            from_user_id: "bob".into(),
            name: "Deploy".into(),
            description: "Friday deploy window".into(),
        }
    }
}
