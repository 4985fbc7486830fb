mod delivery_failure;
mod message;
pub mod recurrence;
mod reminder;
mod shared;
mod validation;

pub use delivery_failure::{DeliveryFailure, FailureCause};
pub use message::Message;
pub use recurrence::{ParseError, ParsedExpression};
pub use reminder::{Reminder, ReminderKind, ReminderPatch, ReminderSchedule};
pub use shared::entity::{Entity, ID};
pub use validation::{
    validate_occurrence, ValidationError, DESCRIPTION_MAX_LEN, NAME_MAX_LEN, PING_USERS_MAX,
};
