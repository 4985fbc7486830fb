use crate::{
    recurrence::{self, ParsedExpression},
    shared::entity::{Entity, ID},
    validation::ValidationError,
    Message,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    OneShot,
    Repeat,
}

impl ReminderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneShot => "one_shot",
            Self::Repeat => "repeat",
        }
    }
}

impl Display for ReminderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReminderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one_shot" => Ok(Self::OneShot),
            "repeat" => Ok(Self::Repeat),
            _ => Err(format!("Unknown reminder kind: {}", s)),
        }
    }
}

/// When a `Reminder` is delivered
#[derive(Debug, Clone, PartialEq)]
pub enum ReminderSchedule {
    /// Delivered once at `occurrence` and then removed
    OneShot { occurrence: DateTime<Utc> },
    /// Delivered at every occurrence of `cron_expression`.
    /// `next_occurrence` is always the earliest occurrence after the last delivery,
    /// or after creation if it has never been delivered.
    Repeat {
        cron_expression: String,
        next_occurrence: DateTime<Utc>,
    },
}

/// A `Message` which should be delivered to the chat service at one or
/// more points in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Reminder {
    pub id: ID,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message: Message,
    pub schedule: ReminderSchedule,
}

impl Reminder {
    pub fn new_one_shot(message: Message, occurrence: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id: Default::default(),
            created_at: now,
            updated_at: now,
            message,
            schedule: ReminderSchedule::OneShot { occurrence },
        }
    }

    /// Creates a repeating `Reminder` whose first occurrence is the first
    /// occurrence of `expression` after `now`
    pub fn new_repeat(
        message: Message,
        expression: &ParsedExpression,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let next_occurrence = expression
            .next_after(now)
            .ok_or(ValidationError::NoFutureOccurrence)?;

        Ok(Self {
            id: Default::default(),
            created_at: now,
            updated_at: now,
            message,
            schedule: ReminderSchedule::Repeat {
                cron_expression: expression.source().to_string(),
                next_occurrence,
            },
        })
    }

    pub fn kind(&self) -> ReminderKind {
        match self.schedule {
            ReminderSchedule::OneShot { .. } => ReminderKind::OneShot,
            ReminderSchedule::Repeat { .. } => ReminderKind::Repeat,
        }
    }

    /// The instant at which this `Reminder` should be delivered next
    pub fn activation_instant(&self) -> DateTime<Utc> {
        match &self.schedule {
            ReminderSchedule::OneShot { occurrence } => *occurrence,
            ReminderSchedule::Repeat {
                next_occurrence, ..
            } => *next_occurrence,
        }
    }

    pub fn cron_expression(&self) -> Option<&str> {
        match &self.schedule {
            ReminderSchedule::OneShot { .. } => None,
            ReminderSchedule::Repeat {
                cron_expression, ..
            } => Some(cron_expression),
        }
    }

    /// Checks the invariants every stored `Reminder` must hold
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.message.validate()?;
        if let Some(expression) = self.cron_expression() {
            recurrence::parse(expression)?;
        }
        Ok(())
    }

    /// Returns a copy of this `Reminder` with `patch` applied. Nothing is
    /// returned unless the whole patch is valid.
    pub fn patched(
        &self,
        patch: &ReminderPatch,
        now: DateTime<Utc>,
    ) -> Result<Reminder, ValidationError> {
        let mut reminder = self.clone();

        if let Some(channel_id) = &patch.channel_id {
            reminder.message.channel_id = channel_id.clone();
        }
        if let Some(ping_user_ids) = &patch.ping_user_ids {
            reminder.message.ping_user_ids = ping_user_ids.clone();
        }
        if let Some(from_user_id) = &patch.from_user_id {
            reminder.message.from_user_id = from_user_id.clone();
        }
        if let Some(name) = &patch.name {
            reminder.message.name = name.clone();
        }
        if let Some(description) = &patch.description {
            reminder.message.description = description.clone();
        }
        reminder.message.validate()?;

        match (&mut reminder.schedule, &patch.occurrence, &patch.cron_expression) {
            (ReminderSchedule::OneShot { .. }, _, Some(_))
            | (ReminderSchedule::Repeat { .. }, Some(_), _) => {
                return Err(ValidationError::KindMismatch(self.kind()));
            }
            (ReminderSchedule::OneShot { occurrence }, Some(new_occurrence), None) => {
                *occurrence = *new_occurrence;
            }
            (
                ReminderSchedule::Repeat {
                    cron_expression,
                    next_occurrence,
                },
                None,
                Some(new_expression),
            ) => {
                let expression = recurrence::parse(new_expression)?;
                *next_occurrence = expression
                    .next_after(now)
                    .ok_or(ValidationError::NoFutureOccurrence)?;
                *cron_expression = expression.source().to_string();
            }
            _ => {}
        }

        reminder.updated_at = now;
        Ok(reminder)
    }
}

impl Entity for Reminder {
    fn id(&self) -> &ID {
        &self.id
    }
}

/// Partial update of a `Reminder`. Fields left as `None` are kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReminderPatch {
    pub channel_id: Option<String>,
    pub ping_user_ids: Option<Vec<String>>,
    pub from_user_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Only valid for one-shot reminders
    pub occurrence: Option<DateTime<Utc>>,
    /// Only valid for repeating reminders
    pub cron_expression: Option<String>,
}
