mod inmemory;
mod postgres;

use super::shared::{query_structs::ReminderFilter, repo::StoreError};
use chrono::{DateTime, Utc};
pub use inmemory::InMemoryReminderRepo;
pub use postgres::PostgresReminderRepo;
use reminder_scheduler_domain::{Reminder, ID};

#[async_trait::async_trait]
pub trait IReminderRepo: Send + Sync {
    /// Persists a new `Reminder` after checking its invariants
    async fn insert(&self, reminder: &Reminder) -> Result<ID, StoreError>;
    async fn find(&self, reminder_id: &ID) -> Result<Option<Reminder>, StoreError>;
    /// Replaces the whole record, provided the stored one still has the
    /// `updated_at` and activation instant of `expected`. Fails with `Conflict`
    /// when it was edited, advanced or removed since `expected` was read.
    async fn save(&self, reminder: &Reminder, expected: &Reminder) -> Result<(), StoreError>;
    /// Reminders whose activation instant is strictly before `cutoff`, ordered by
    /// activation instant and then by id
    async fn due_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reminder>, StoreError>;
    /// Deletes the one-shot reminder if it still fires at `occurrence`.
    /// Returns false and leaves the store alone when it is gone or was rescheduled.
    async fn mark_delivered_one_shot(
        &self,
        reminder_id: &ID,
        occurrence: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
    /// Moves a repeat reminder from `prior` to `next_occurrence`. Fails with
    /// `Conflict` when it is gone or no longer fires at `prior`.
    async fn advance_repeat(
        &self,
        reminder_id: &ID,
        prior: DateTime<Utc>,
        next_occurrence: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    /// Deletes a repeat reminder whose recurrence has no occurrence after `prior`,
    /// if it still fires at `prior`. Returns whether it was deleted.
    async fn retire_repeat(&self, reminder_id: &ID, prior: DateTime<Utc>)
        -> Result<bool, StoreError>;
    /// Deletes the reminder of any kind. Returns whether something was deleted.
    async fn cancel(&self, reminder_id: &ID) -> Result<bool, StoreError>;
    async fn list(&self, filter: &ReminderFilter) -> Result<Vec<Reminder>, StoreError>;
}
