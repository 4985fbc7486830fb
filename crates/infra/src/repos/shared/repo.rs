use reminder_scheduler_domain::{ValidationError, ID};
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("The record with id: {0} does not exist")]
    Conflict(ID),
    #[error("The store is unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

impl StoreError {
    /// Logs the database error together with what was attempted
    pub(crate) fn unavailable(action: &str, e: sqlx::Error) -> Self {
        error!("Unable to {}. DB returned error: {:?}", action, e);
        Self::Unavailable(e.into())
    }
}
