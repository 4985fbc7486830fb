use crate::{recurrence::ParseError, reminder::ReminderKind};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

pub const NAME_MAX_LEN: usize = 256;
pub const DESCRIPTION_MAX_LEN: usize = 4096;
pub const PING_USERS_MAX: usize = 100;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("The occurrence must be at least one poll interval in the future")]
    PastOrImmediate,
    #[error("Invalid recurrence expression: {0}")]
    InvalidRecurrence(#[from] ParseError),
    #[error("The recurrence expression has no future occurrence")]
    NoFutureOccurrence,
    #[error("The `{0}` field must not be empty")]
    EmptyField(&'static str),
    #[error("The `{field}` field is longer than {max} characters")]
    FieldTooLong { field: &'static str, max: usize },
    #[error("At most {0} users can be pinged by a reminder")]
    TooManyPings(usize),
    #[error("The change does not apply to a {0} reminder")]
    KindMismatch(ReminderKind),
}

/// An occurrence is admitted when it lies at least `min_lead` after `now`, which
/// guarantees that a poll cycle picks it up before it is due.
pub fn validate_occurrence(
    occurrence: DateTime<Utc>,
    now: DateTime<Utc>,
    min_lead: Duration,
) -> Result<(), ValidationError> {
    match now.checked_add_signed(min_lead) {
        Some(earliest) if occurrence >= earliest => Ok(()),
        _ => Err(ValidationError::PastOrImmediate),
    }
}

pub(crate) fn validate_required(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    Ok(())
}

pub(crate) fn validate_max_len(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::FieldTooLong { field, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn occurrence_needs_lead_time() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let lead = Duration::seconds(1);

        assert!(validate_occurrence(now + Duration::seconds(5), now, lead).is_ok());
        assert!(validate_occurrence(now + lead, now, lead).is_ok());
        assert_eq!(
            validate_occurrence(now + Duration::milliseconds(999), now, lead),
            Err(ValidationError::PastOrImmediate)
        );
        assert_eq!(
            validate_occurrence(now - Duration::hours(1), now, lead),
            Err(ValidationError::PastOrImmediate)
        );
        assert_eq!(
            validate_occurrence(now + Duration::days(365), now, Duration::max_value()),
            Err(ValidationError::PastOrImmediate)
        );
    }

    #[test]
    fn counts_characters_not_bytes() {
        let name = "ø".repeat(NAME_MAX_LEN);
        assert!(validate_max_len("name", &name, NAME_MAX_LEN).is_ok());
        let name = "ø".repeat(NAME_MAX_LEN + 1);
        assert!(validate_max_len("name", &name, NAME_MAX_LEN).is_err());
    }
}
