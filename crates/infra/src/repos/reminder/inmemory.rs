use super::IReminderRepo;
use crate::repos::shared::{inmemory_repo::*, query_structs::ReminderFilter, repo::StoreError};
use chrono::{DateTime, Utc};
use reminder_scheduler_domain::{Reminder, ReminderSchedule, ID};

pub struct InMemoryReminderRepo {
    reminders: std::sync::Mutex<Vec<Reminder>>,
}

impl InMemoryReminderRepo {
    pub fn new() -> Self {
        Self {
            reminders: std::sync::Mutex::new(Vec::new()),
        }
    }
}

impl Default for InMemoryReminderRepo {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `stored` is still the version `expected` was read from
fn is_version(stored: &Reminder, expected: &Reminder) -> bool {
    stored.updated_at == expected.updated_at
        && stored.activation_instant() == expected.activation_instant()
}

fn sort_by_activation(reminders: &mut [Reminder]) {
    reminders.sort_by(|a, b| {
        a.activation_instant()
            .cmp(&b.activation_instant())
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[async_trait::async_trait]
impl IReminderRepo for InMemoryReminderRepo {
    async fn insert(&self, reminder: &Reminder) -> Result<ID, StoreError> {
        reminder.validate()?;
        insert(reminder, &self.reminders);
        Ok(reminder.id.clone())
    }

    async fn find(&self, reminder_id: &ID) -> Result<Option<Reminder>, StoreError> {
        Ok(find(reminder_id, &self.reminders))
    }

    async fn save(&self, reminder: &Reminder, expected: &Reminder) -> Result<(), StoreError> {
        reminder.validate()?;
        let mut saved = false;
        update(&reminder.id, &self.reminders, |stored| {
            if is_version(stored, expected) && stored.kind() == reminder.kind() {
                *stored = reminder.clone();
                saved = true;
            }
        });
        if !saved {
            return Err(StoreError::Conflict(reminder.id.clone()));
        }
        Ok(())
    }

    async fn due_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reminder>, StoreError> {
        let mut due = find_by(&self.reminders, |r| r.activation_instant() < cutoff);
        sort_by_activation(&mut due);
        due.truncate(limit);
        Ok(due)
    }

    async fn mark_delivered_one_shot(
        &self,
        reminder_id: &ID,
        occurrence: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let deleted = delete_if(reminder_id, &self.reminders, |r| {
            matches!(r.schedule, ReminderSchedule::OneShot { occurrence: stored } if stored == occurrence)
        });
        Ok(deleted.is_some())
    }

    async fn advance_repeat(
        &self,
        reminder_id: &ID,
        prior: DateTime<Utc>,
        next_occurrence: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut advanced = false;
        update(reminder_id, &self.reminders, |reminder| {
            if let ReminderSchedule::Repeat {
                next_occurrence: stored,
                ..
            } = &mut reminder.schedule
            {
                if *stored == prior {
                    *stored = next_occurrence;
                    advanced = true;
                }
            }
        });
        if !advanced {
            return Err(StoreError::Conflict(reminder_id.clone()));
        }
        Ok(())
    }

    async fn retire_repeat(
        &self,
        reminder_id: &ID,
        prior: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let deleted = delete_if(reminder_id, &self.reminders, |r| {
            matches!(r.schedule, ReminderSchedule::Repeat { next_occurrence, .. } if next_occurrence == prior)
        });
        Ok(deleted.is_some())
    }

    async fn cancel(&self, reminder_id: &ID) -> Result<bool, StoreError> {
        Ok(delete(reminder_id, &self.reminders).is_some())
    }

    async fn list(&self, filter: &ReminderFilter) -> Result<Vec<Reminder>, StoreError> {
        let mut reminders = find_by(&self.reminders, |r| filter.matches(r));
        sort_by_activation(&mut reminders);
        Ok(reminders
            .into_iter()
            .skip(filter.skip)
            .take(filter.limit)
            .collect())
    }
}
