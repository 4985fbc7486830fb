use chrono::{DateTime, Utc};
use reminder_scheduler_domain::{Message, Reminder, ID};
use reminder_scheduler_infra::{
    DispatchError, IMessageDispatcher, IReminderRepo, ISys, ReminderFilter, StoreError, VirtualSys,
};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

/// Dispatcher recording every call together with the virtual time it was made at
pub struct RecordingDispatcher {
    sys: Arc<VirtualSys>,
    calls: Mutex<Vec<(DateTime<Utc>, Message)>>,
    failures: Mutex<VecDeque<DispatchError>>,
    hold: Option<Duration>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl RecordingDispatcher {
    pub fn new(sys: Arc<VirtualSys>) -> Arc<Self> {
        Self::build(sys, vec![], None)
    }

    /// Fails the first calls with the given errors
    pub fn failing_with(sys: Arc<VirtualSys>, failures: Vec<DispatchError>) -> Arc<Self> {
        Self::build(sys, failures, None)
    }

    /// Every call takes `hold` of virtual time
    pub fn holding(sys: Arc<VirtualSys>, hold: Duration) -> Arc<Self> {
        Self::build(sys, vec![], Some(hold))
    }

    fn build(sys: Arc<VirtualSys>, failures: Vec<DispatchError>, hold: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            sys,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(failures.into()),
            hold,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> Vec<(DateTime<Utc>, Message)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_times(&self) -> Vec<DateTime<Utc>> {
        self.calls().into_iter().map(|(at, _)| at).collect()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IMessageDispatcher for RecordingDispatcher {
    async fn dispatch(&self, message: &Message) -> Result<(), DispatchError> {
        self.calls
            .lock()
            .unwrap()
            .push((self.sys.now(), message.clone()));
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        if let Some(hold) = self.hold {
            self.sys.after(hold).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        match self.failures.lock().unwrap().pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Store wrapper injecting faults into an otherwise working store
pub struct FaultyStore {
    inner: Arc<dyn IReminderRepo>,
    /// The next call to `mark_delivered_one_shot` panics, simulating a crash
    /// between dispatch and acknowledgement
    pub panic_on_mark_delivered: AtomicBool,
    /// Number of upcoming `due_before` calls failing as unavailable
    pub failing_polls: AtomicU32,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn IReminderRepo>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            panic_on_mark_delivered: AtomicBool::new(false),
            failing_polls: AtomicU32::new(0),
        })
    }
}

#[async_trait::async_trait]
impl IReminderRepo for FaultyStore {
    async fn insert(&self, reminder: &Reminder) -> Result<ID, StoreError> {
        self.inner.insert(reminder).await
    }

    async fn find(&self, reminder_id: &ID) -> Result<Option<Reminder>, StoreError> {
        self.inner.find(reminder_id).await
    }

    async fn save(&self, reminder: &Reminder, expected: &Reminder) -> Result<(), StoreError> {
        self.inner.save(reminder, expected).await
    }

    async fn due_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reminder>, StoreError> {
        let failing = self
            .failing_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable(anyhow::anyhow!("connection refused")));
        }
        self.inner.due_before(cutoff, limit).await
    }

    async fn mark_delivered_one_shot(
        &self,
        reminder_id: &ID,
        occurrence: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if self.panic_on_mark_delivered.swap(false, Ordering::SeqCst) {
            panic!("crash before acknowledging reminder: {}", reminder_id);
        }
        self.inner.mark_delivered_one_shot(reminder_id, occurrence).await
    }

    async fn advance_repeat(
        &self,
        reminder_id: &ID,
        prior: DateTime<Utc>,
        next_occurrence: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.advance_repeat(reminder_id, prior, next_occurrence).await
    }

    async fn retire_repeat(
        &self,
        reminder_id: &ID,
        prior: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner.retire_repeat(reminder_id, prior).await
    }

    async fn cancel(&self, reminder_id: &ID) -> Result<bool, StoreError> {
        self.inner.cancel(reminder_id).await
    }

    async fn list(&self, filter: &ReminderFilter) -> Result<Vec<Reminder>, StoreError> {
        self.inner.list(filter).await
    }
}
