use crate::{
    reminder::{Reminder, ReminderKind},
    shared::entity::{Entity, ID},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// The chat service refused the message
    Permanent,
    /// Every attempt allowed by the retry policy failed transiently
    RetriesExhausted,
}

impl FailureCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::RetriesExhausted => "retries_exhausted",
        }
    }
}

impl Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FailureCause {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "permanent" => Ok(Self::Permanent),
            "retries_exhausted" => Ok(Self::RetriesExhausted),
            _ => Err(format!("Unknown failure cause: {}", s)),
        }
    }
}

/// Audit record written when an occurrence of a `Reminder` could not be delivered.
/// It outlives the `Reminder` it refers to.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryFailure {
    pub id: ID,
    pub reminder_id: ID,
    pub reminder_kind: ReminderKind,
    pub activation_instant: DateTime<Utc>,
    pub cause: FailureCause,
    pub reason: String,
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

impl DeliveryFailure {
    pub fn new(
        reminder: &Reminder,
        cause: FailureCause,
        reason: String,
        attempts: u32,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Default::default(),
            reminder_id: reminder.id.clone(),
            reminder_kind: reminder.kind(),
            activation_instant: reminder.activation_instant(),
            cause,
            reason,
            attempts,
            recorded_at,
        }
    }
}

impl Entity for DeliveryFailure {
    fn id(&self) -> &ID {
        &self.id
    }
}
