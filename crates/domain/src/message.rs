use crate::validation::{
    validate_max_len, validate_required, ValidationError, DESCRIPTION_MAX_LEN, NAME_MAX_LEN,
    PING_USERS_MAX,
};
use serde::{Deserialize, Serialize};

/// The content of a `Reminder` which is handed to the chat service when the
/// `Reminder` is due.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Destination channel in the chat service
    pub channel_id: String,
    /// Users mentioned by the message, in the order they were given.
    /// Duplicates are kept.
    pub ping_user_ids: Vec<String>,
    /// The author of the reminder
    pub from_user_id: String,
    /// Short title
    pub name: String,
    /// Body text, may be empty
    pub description: String,
}

impl Message {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_required("channel_id", &self.channel_id)?;
        validate_required("from_user_id", &self.from_user_id)?;
        validate_required("name", &self.name)?;
        validate_max_len("name", &self.name, NAME_MAX_LEN)?;
        validate_max_len("description", &self.description, DESCRIPTION_MAX_LEN)?;
        if self.ping_user_ids.len() > PING_USERS_MAX {
            return Err(ValidationError::TooManyPings(PING_USERS_MAX));
        }
        if self.ping_user_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(ValidationError::EmptyField("ping_user_ids"));
        }
        Ok(())
    }
}
