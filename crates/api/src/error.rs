use reminder_scheduler_domain::ValidationError;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ApiError {
    #[error("Invalid data provided: {0}")]
    Validation(ValidationError),
    #[error("Not found. Error message: `{0}`")]
    NotFound(String),
    #[error("There was a conflict with the request. Error message: `{0}`")]
    Conflict(String),
    #[error("The reminder store is unavailable")]
    StoreUnavailable,
}
