use crate::shared::usecase::UseCase;
use reminder_scheduler_domain::{FailureCause, Reminder};
use reminder_scheduler_infra::{DispatchError, IMessageDispatcher, ReminderContext};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Hands the message of a due reminder to the dispatcher, retrying transient
/// failures with exponential backoff. Does not touch the store.
pub struct DeliverReminderUseCase {
    pub reminder: Reminder,
    pub dispatcher: Arc<dyn IMessageDispatcher>,
    pub cancel: CancellationToken,
}

impl std::fmt::Debug for DeliverReminderUseCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliverReminderUseCase")
            .field("reminder", &self.reminder)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    Delivered {
        attempts: u32,
    },
    Failed {
        cause: FailureCause,
        reason: String,
        attempts: u32,
    },
}

impl DeliveryOutcome {
    /// Number of attempts which failed transiently
    pub fn transient_failures(&self) -> u32 {
        match self {
            Self::Delivered { attempts }
            | Self::Failed {
                cause: FailureCause::Permanent,
                attempts,
                ..
            } => attempts.saturating_sub(1),
            Self::Failed {
                cause: FailureCause::RetriesExhausted,
                attempts,
                ..
            } => *attempts,
        }
    }
}

#[derive(Debug)]
pub enum UseCaseError {
    /// Cancelled while waiting for the next attempt
    Cancelled { attempts: u32 },
}

#[async_trait::async_trait]
impl UseCase for DeliverReminderUseCase {
    type Response = DeliveryOutcome;

    type Error = UseCaseError;

    const NAME: &'static str = "DeliverReminder";

    fn is_expected(error: &Self::Error) -> bool {
        matches!(error, UseCaseError::Cancelled { .. })
    }

    async fn execute(&mut self, ctx: &ReminderContext) -> Result<Self::Response, Self::Error> {
        let policy = &ctx.config.retry_policy;
        let timeout = ctx.config.dispatch_timeout;
        let mut attempts = 0;

        loop {
            attempts += 1;
            let res =
                match tokio::time::timeout(timeout, self.dispatcher.dispatch(&self.reminder.message))
                    .await
                {
                    Ok(res) => res,
                    Err(_) => Err(DispatchError::Transient(format!(
                        "Dispatch timed out after {:?}",
                        timeout
                    ))),
                };

            let reason = match res {
                Ok(()) => return Ok(DeliveryOutcome::Delivered { attempts }),
                Err(DispatchError::Permanent(reason)) => {
                    return Ok(DeliveryOutcome::Failed {
                        cause: FailureCause::Permanent,
                        reason,
                        attempts,
                    })
                }
                Err(DispatchError::Transient(reason)) => reason,
            };

            warn!(
                reminder_id = %self.reminder.id,
                activation_instant = %self.reminder.activation_instant(),
                attempt = attempts,
                "Transient dispatch failure: {}",
                reason
            );
            if attempts >= policy.max_attempts {
                return Ok(DeliveryOutcome::Failed {
                    cause: FailureCause::RetriesExhausted,
                    reason,
                    attempts,
                });
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(UseCaseError::Cancelled { attempts }),
                _ = ctx.sys.after(policy.delay_after(attempts)) => {}
            }
        }
    }
}
