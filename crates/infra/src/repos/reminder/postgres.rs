use super::IReminderRepo;
use crate::repos::shared::{query_structs::ReminderFilter, repo::StoreError};
use chrono::{DateTime, Utc};
use reminder_scheduler_domain::{Message, Reminder, ReminderKind, ReminderSchedule, ID};
use sqlx::{types::Uuid, FromRow, PgPool};

pub struct PostgresReminderRepo {
    pool: PgPool,
}

impl PostgresReminderRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct OneShotReminderRaw {
    reminder_uid: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    channel_id: String,
    ping_user_ids: Vec<String>,
    from_user_id: String,
    name: String,
    description: String,
    occurrence: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct RepeatReminderRaw {
    reminder_uid: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    channel_id: String,
    ping_user_ids: Vec<String>,
    from_user_id: String,
    name: String,
    description: String,
    cron_expression: String,
    next_occurrence: DateTime<Utc>,
}

impl From<OneShotReminderRaw> for Reminder {
    fn from(e: OneShotReminderRaw) -> Self {
        Self {
            id: e.reminder_uid.into(),
            created_at: e.created_at,
            updated_at: e.updated_at,
            message: Message {
                channel_id: e.channel_id,
                ping_user_ids: e.ping_user_ids,
                from_user_id: e.from_user_id,
                name: e.name,
                description: e.description,
            },
            schedule: ReminderSchedule::OneShot {
                occurrence: e.occurrence,
            },
        }
    }
}

impl From<RepeatReminderRaw> for Reminder {
    fn from(e: RepeatReminderRaw) -> Self {
        Self {
            id: e.reminder_uid.into(),
            created_at: e.created_at,
            updated_at: e.updated_at,
            message: Message {
                channel_id: e.channel_id,
                ping_user_ids: e.ping_user_ids,
                from_user_id: e.from_user_id,
                name: e.name,
                description: e.description,
            },
            schedule: ReminderSchedule::Repeat {
                cron_expression: e.cron_expression,
                next_occurrence: e.next_occurrence,
            },
        }
    }
}

/// Merges rows of both tables into one sequence ordered by activation instant and id
fn merge(
    one_shots: Vec<OneShotReminderRaw>,
    repeats: Vec<RepeatReminderRaw>,
    skip: usize,
    limit: usize,
) -> Vec<Reminder> {
    let mut reminders = one_shots
        .into_iter()
        .map(Reminder::from)
        .chain(repeats.into_iter().map(Reminder::from))
        .collect::<Vec<_>>();
    reminders.sort_by(|a, b| {
        a.activation_instant()
            .cmp(&b.activation_instant())
            .then_with(|| a.id.cmp(&b.id))
    });
    reminders.into_iter().skip(skip).take(limit).collect()
}

fn as_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait::async_trait]
impl IReminderRepo for PostgresReminderRepo {
    async fn insert(&self, reminder: &Reminder) -> Result<ID, StoreError> {
        reminder.validate()?;
        let message = &reminder.message;
        let query = match &reminder.schedule {
            ReminderSchedule::OneShot { occurrence } => sqlx::query(
                r#"
                INSERT INTO one_shot_reminders
                (reminder_uid, created_at, updated_at, channel_id, ping_user_ids, from_user_id, name, description, occurrence)
                VALUES($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(reminder.id.inner_ref())
            .bind(reminder.created_at)
            .bind(reminder.updated_at)
            .bind(&message.channel_id)
            .bind(&message.ping_user_ids)
            .bind(&message.from_user_id)
            .bind(&message.name)
            .bind(&message.description)
            .bind(occurrence),
            ReminderSchedule::Repeat {
                cron_expression,
                next_occurrence,
            } => sqlx::query(
                r#"
                INSERT INTO repeat_reminders
                (reminder_uid, created_at, updated_at, channel_id, ping_user_ids, from_user_id, name, description, cron_expression, next_occurrence)
                VALUES($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(reminder.id.inner_ref())
            .bind(reminder.created_at)
            .bind(reminder.updated_at)
            .bind(&message.channel_id)
            .bind(&message.ping_user_ids)
            .bind(&message.from_user_id)
            .bind(&message.name)
            .bind(&message.description)
            .bind(cron_expression)
            .bind(next_occurrence),
        };
        query
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::unavailable(&format!("insert reminder: {}", reminder.id), e))?;
        Ok(reminder.id.clone())
    }

    async fn find(&self, reminder_id: &ID) -> Result<Option<Reminder>, StoreError> {
        let one_shot: Option<OneShotReminderRaw> = sqlx::query_as(
            r#"
            SELECT * FROM one_shot_reminders
            WHERE reminder_uid = $1
            "#,
        )
        .bind(reminder_id.inner_ref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::unavailable(&format!("find reminder: {}", reminder_id), e))?;
        if let Some(one_shot) = one_shot {
            return Ok(Some(one_shot.into()));
        }

        let repeat: Option<RepeatReminderRaw> = sqlx::query_as(
            r#"
            SELECT * FROM repeat_reminders
            WHERE reminder_uid = $1
            "#,
        )
        .bind(reminder_id.inner_ref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::unavailable(&format!("find reminder: {}", reminder_id), e))?;
        Ok(repeat.map(Reminder::from))
    }

    async fn save(&self, reminder: &Reminder, expected: &Reminder) -> Result<(), StoreError> {
        reminder.validate()?;
        if reminder.kind() != expected.kind() {
            return Err(StoreError::Conflict(reminder.id.clone()));
        }
        let message = &reminder.message;
        let query = match &reminder.schedule {
            ReminderSchedule::OneShot { occurrence } => sqlx::query(
                r#"
                UPDATE one_shot_reminders
                SET updated_at = $2,
                channel_id = $3,
                ping_user_ids = $4,
                from_user_id = $5,
                name = $6,
                description = $7,
                occurrence = $8
                WHERE reminder_uid = $1
                AND updated_at = $9
                AND occurrence = $10
                "#,
            )
            .bind(reminder.id.inner_ref())
            .bind(reminder.updated_at)
            .bind(&message.channel_id)
            .bind(&message.ping_user_ids)
            .bind(&message.from_user_id)
            .bind(&message.name)
            .bind(&message.description)
            .bind(occurrence)
            .bind(expected.updated_at)
            .bind(expected.activation_instant()),
            ReminderSchedule::Repeat {
                cron_expression,
                next_occurrence,
            } => sqlx::query(
                r#"
                UPDATE repeat_reminders
                SET updated_at = $2,
                channel_id = $3,
                ping_user_ids = $4,
                from_user_id = $5,
                name = $6,
                description = $7,
                cron_expression = $8,
                next_occurrence = $9
                WHERE reminder_uid = $1
                AND updated_at = $10
                AND next_occurrence = $11
                "#,
            )
            .bind(reminder.id.inner_ref())
            .bind(reminder.updated_at)
            .bind(&message.channel_id)
            .bind(&message.ping_user_ids)
            .bind(&message.from_user_id)
            .bind(&message.name)
            .bind(&message.description)
            .bind(cron_expression)
            .bind(next_occurrence)
            .bind(expected.updated_at)
            .bind(expected.activation_instant()),
        };
        let res = query
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::unavailable(&format!("save reminder: {}", reminder.id), e))?;
        if res.rows_affected() == 0 {
            return Err(StoreError::Conflict(reminder.id.clone()));
        }
        Ok(())
    }

    async fn due_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reminder>, StoreError> {
        let action = "fetch due reminders";
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::unavailable(action, e))?;
        // Both tables are read from the same snapshot
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::unavailable(action, e))?;

        let one_shots: Vec<OneShotReminderRaw> = sqlx::query_as(
            r#"
            SELECT * FROM one_shot_reminders
            WHERE occurrence < $1
            ORDER BY occurrence, reminder_uid
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(as_limit(limit))
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| StoreError::unavailable(action, e))?;

        let repeats: Vec<RepeatReminderRaw> = sqlx::query_as(
            r#"
            SELECT * FROM repeat_reminders
            WHERE next_occurrence < $1
            ORDER BY next_occurrence, reminder_uid
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(as_limit(limit))
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| StoreError::unavailable(action, e))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::unavailable(action, e))?;

        Ok(merge(one_shots, repeats, 0, limit))
    }

    async fn mark_delivered_one_shot(
        &self,
        reminder_id: &ID,
        occurrence: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            DELETE FROM one_shot_reminders
            WHERE reminder_uid = $1
            AND occurrence = $2
            "#,
        )
        .bind(reminder_id.inner_ref())
        .bind(occurrence)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            StoreError::unavailable(&format!("mark reminder: {} delivered", reminder_id), e)
        })?;
        Ok(res.rows_affected() > 0)
    }

    async fn advance_repeat(
        &self,
        reminder_id: &ID,
        prior: DateTime<Utc>,
        next_occurrence: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE repeat_reminders
            SET next_occurrence = $3
            WHERE reminder_uid = $1
            AND next_occurrence = $2
            "#,
        )
        .bind(reminder_id.inner_ref())
        .bind(prior)
        .bind(next_occurrence)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::unavailable(&format!("advance reminder: {}", reminder_id), e))?;
        if res.rows_affected() == 0 {
            return Err(StoreError::Conflict(reminder_id.clone()));
        }
        Ok(())
    }

    async fn retire_repeat(
        &self,
        reminder_id: &ID,
        prior: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            DELETE FROM repeat_reminders
            WHERE reminder_uid = $1
            AND next_occurrence = $2
            "#,
        )
        .bind(reminder_id.inner_ref())
        .bind(prior)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::unavailable(&format!("retire reminder: {}", reminder_id), e))?;
        Ok(res.rows_affected() > 0)
    }

    async fn cancel(&self, reminder_id: &ID) -> Result<bool, StoreError> {
        let mut deleted = 0;
        for table in ["one_shot_reminders", "repeat_reminders"] {
            let res = sqlx::query(&format!("DELETE FROM {} WHERE reminder_uid = $1", table))
                .bind(reminder_id.inner_ref())
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    StoreError::unavailable(&format!("cancel reminder: {}", reminder_id), e)
                })?;
            deleted += res.rows_affected();
        }
        Ok(deleted > 0)
    }

    async fn list(&self, filter: &ReminderFilter) -> Result<Vec<Reminder>, StoreError> {
        let action = "list reminders";
        // Every page of the merged sequence lies within the first `skip + limit`
        // rows of each table
        let fetch_limit = as_limit(filter.skip.saturating_add(filter.limit));

        let one_shots: Vec<OneShotReminderRaw> = match filter.kind {
            Some(ReminderKind::Repeat) => Vec::new(),
            _ => sqlx::query_as(
                r#"
                SELECT * FROM one_shot_reminders
                WHERE ($1::text IS NULL OR channel_id = $1)
                AND ($2::text IS NULL OR from_user_id = $2)
                ORDER BY occurrence, reminder_uid
                LIMIT $3
                "#,
            )
            .bind(&filter.channel_id)
            .bind(&filter.from_user_id)
            .bind(fetch_limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::unavailable(action, e))?,
        };

        let repeats: Vec<RepeatReminderRaw> = match filter.kind {
            Some(ReminderKind::OneShot) => Vec::new(),
            _ => sqlx::query_as(
                r#"
                SELECT * FROM repeat_reminders
                WHERE ($1::text IS NULL OR channel_id = $1)
                AND ($2::text IS NULL OR from_user_id = $2)
                ORDER BY next_occurrence, reminder_uid
                LIMIT $3
                "#,
            )
            .bind(&filter.channel_id)
            .bind(&filter.from_user_id)
            .bind(fetch_limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::unavailable(action, e))?,
        };

        Ok(merge(one_shots, repeats, filter.skip, filter.limit))
    }
}
