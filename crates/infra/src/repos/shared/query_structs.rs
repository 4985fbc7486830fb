use reminder_scheduler_domain::ReminderKind;

/// Query used to list `Reminder`s. Every filter left as `None` matches all reminders.
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderFilter {
    pub channel_id: Option<String>,
    pub from_user_id: Option<String>,
    pub kind: Option<ReminderKind>,
    pub skip: usize,
    pub limit: usize,
}

impl ReminderFilter {
    pub fn matches(&self, reminder: &reminder_scheduler_domain::Reminder) -> bool {
        self.channel_id
            .as_ref()
            .map(|channel_id| reminder.message.channel_id == *channel_id)
            .unwrap_or(true)
            && self
                .from_user_id
                .as_ref()
                .map(|from_user_id| reminder.message.from_user_id == *from_user_id)
                .unwrap_or(true)
            && self.kind.map(|kind| reminder.kind() == kind).unwrap_or(true)
    }
}

impl Default for ReminderFilter {
    fn default() -> Self {
        Self {
            channel_id: None,
            from_user_id: None,
            kind: None,
            skip: 0,
            limit: 100,
        }
    }
}
