use crate::{
    reminder::{
        complete_reminder::{Completion, CompleteReminderUseCase},
        deliver_reminder::{DeliverReminderUseCase, DeliveryOutcome},
        get_due_reminders::GetDueRemindersUseCase,
    },
    shared::usecase::execute,
};
use reminder_scheduler_domain::{FailureCause, Reminder, ID};
use reminder_scheduler_infra::{IMessageDispatcher, ReminderContext};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};
use thiserror::Error;
use tokio::{
    sync::{oneshot, Semaphore},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("The scheduler was cancelled")]
    Cancelled,
}

/// Counters describing what the scheduler has done since it started
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    poll_cycles: AtomicU64,
    store_errors: AtomicU64,
    delivered: AtomicU64,
    transient_failures: AtomicU64,
    permanent_failures: AtomicU64,
    retries_exhausted: AtomicU64,
    recurrences_exhausted: AtomicU64,
    duplicates_skipped: AtomicU64,
    superseded: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub poll_cycles: u64,
    pub store_errors: u64,
    pub delivered: u64,
    pub transient_failures: u64,
    pub permanent_failures: u64,
    pub retries_exhausted: u64,
    pub recurrences_exhausted: u64,
    pub duplicates_skipped: u64,
    /// Deliveries skipped or left unacknowledged because the reminder was
    /// edited or cancelled after it was fetched
    pub superseded: u64,
}

impl SchedulerMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            poll_cycles: self.poll_cycles.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            transient_failures: self.transient_failures.load(Ordering::Relaxed),
            permanent_failures: self.permanent_failures.load(Ordering::Relaxed),
            retries_exhausted: self.retries_exhausted.load(Ordering::Relaxed),
            recurrences_exhausted: self.recurrences_exhausted.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
        }
    }

    fn incr(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn record_outcome(&self, outcome: &DeliveryOutcome) {
        Self::incr(&self.transient_failures, outcome.transient_failures() as u64);
        match outcome {
            DeliveryOutcome::Delivered { .. } => Self::incr(&self.delivered, 1),
            DeliveryOutcome::Failed {
                cause: FailureCause::Permanent,
                ..
            } => Self::incr(&self.permanent_failures, 1),
            DeliveryOutcome::Failed {
                cause: FailureCause::RetriesExhausted,
                ..
            } => Self::incr(&self.retries_exhausted, 1),
        }
    }
}

type InFlight = Arc<Mutex<HashSet<ID>>>;

/// Removes the reminder from the in-flight set when its dispatch task ends,
/// however it ends
struct InFlightGuard {
    reminder_id: ID,
    in_flight: InFlight,
}

impl InFlightGuard {
    /// Returns `None` when the reminder already is in flight
    fn acquire(reminder_id: &ID, in_flight: &InFlight) -> Option<Self> {
        let mut ids = in_flight.lock().unwrap();
        if !ids.insert(reminder_id.clone()) {
            return None;
        }
        Some(Self {
            reminder_id: reminder_id.clone(),
            in_flight: in_flight.clone(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut ids) = self.in_flight.lock() {
            ids.remove(&self.reminder_id);
        }
    }
}

/// Polls the store for due reminders and delivers each of them at its
/// activation instant
#[derive(Clone)]
pub struct ReminderScheduler {
    ctx: ReminderContext,
    dispatcher: Arc<dyn IMessageDispatcher>,
    metrics: Arc<SchedulerMetrics>,
    in_flight: InFlight,
    permits: Arc<Semaphore>,
}

impl ReminderScheduler {
    pub fn new(ctx: ReminderContext, dispatcher: Arc<dyn IMessageDispatcher>) -> Self {
        let permits = Arc::new(Semaphore::new(ctx.config.dispatch_concurrency));
        Self {
            ctx,
            dispatcher,
            metrics: Default::default(),
            in_flight: Default::default(),
            permits,
        }
    }

    pub fn metrics(&self) -> Arc<SchedulerMetrics> {
        self.metrics.clone()
    }

    /// Runs poll cycles until `cancel` fires, which is the only way it returns.
    /// A panic inside a dispatch task is raised again here.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), SchedulerError> {
        let mut tasks = JoinSet::new();
        info!(
            poll_every = ?self.ctx.config.poll_every,
            dispatch_concurrency = self.ctx.config.dispatch_concurrency,
            "Reminder scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.poll_cycle(&mut tasks, &cancel) => {}
            }

            let tick = self.ctx.sys.after(self.ctx.config.poll_every);
            tokio::pin!(tick);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(self.shutdown(tasks).await),
                    Some(res) = tasks.join_next(), if !tasks.is_empty() => {
                        if let Err(e) = res {
                            if e.is_panic() {
                                error!("Dispatch task panicked, stopping the scheduler");
                                std::panic::resume_unwind(e.into_panic());
                            }
                        }
                    }
                    _ = &mut tick => break,
                }
            }
        }

        Err(self.shutdown(tasks).await)
    }

    async fn poll_cycle(&self, tasks: &mut JoinSet<()>, cancel: &CancellationToken) {
        SchedulerMetrics::incr(&self.metrics.poll_cycles, 1);

        // Rows of reminders in flight when the cycle starts may be stale
        let busy = self.in_flight.lock().unwrap().clone();
        let due = match execute(GetDueRemindersUseCase {}, &self.ctx).await {
            Ok(due) => due,
            Err(_) => {
                SchedulerMetrics::incr(&self.metrics.store_errors, 1);
                return;
            }
        };
        debug!(cutoff = %due.cutoff, count = due.reminders.len(), "Poll cycle fetched due reminders");

        let mut previous: Option<(Reminder, oneshot::Receiver<()>)> = None;
        for reminder in due.reminders {
            let guard = if busy.contains(&reminder.id) {
                None
            } else {
                InFlightGuard::acquire(&reminder.id, &self.in_flight)
            };
            let guard = match guard {
                Some(guard) => guard,
                None => {
                    debug!(reminder_id = %reminder.id, "Reminder is already in flight");
                    SchedulerMetrics::incr(&self.metrics.duplicates_skipped, 1);
                    continue;
                }
            };

            // Reminders sharing an activation instant take their permits in id order
            let predecessor = match previous.take() {
                Some((prev, rx)) if prev.activation_instant() == reminder.activation_instant() => {
                    Some(rx)
                }
                _ => None,
            };
            let (successor, handoff) = oneshot::channel();
            previous = Some((reminder.clone(), handoff));

            let task = DispatchTask {
                scheduler: self.clone(),
                reminder,
                predecessor,
                successor,
                cancel: cancel.child_token(),
                _guard: guard,
            };
            tasks.spawn(task.run());
        }
    }

    async fn shutdown(&self, mut tasks: JoinSet<()>) -> SchedulerError {
        info!(
            in_flight = tasks.len(),
            "Reminder scheduler cancelled, waiting for in-flight deliveries"
        );
        let drain = async {
            while let Some(res) = tasks.join_next().await {
                if let Err(e) = res {
                    error!("Dispatch task failed during shutdown: {:?}", e);
                }
            }
        };
        if tokio::time::timeout(self.ctx.config.shutdown_grace, drain)
            .await
            .is_err()
        {
            warn!(
                abandoned = tasks.len(),
                "Grace period elapsed, abandoning in-flight deliveries"
            );
            tasks.abort_all();
        }
        SchedulerError::Cancelled
    }
}

/// Delivers one occurrence of a reminder
struct DispatchTask {
    scheduler: ReminderScheduler,
    reminder: Reminder,
    /// Resolves once the previous reminder with the same activation instant holds its permit
    predecessor: Option<oneshot::Receiver<()>>,
    successor: oneshot::Sender<()>,
    cancel: CancellationToken,
    _guard: InFlightGuard,
}

impl DispatchTask {
    async fn run(self) {
        let Self {
            scheduler,
            reminder,
            predecessor,
            successor,
            cancel,
            _guard,
        } = self;
        let ctx = &scheduler.ctx;
        let activation_instant = reminder.activation_instant();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = ctx.sys.until(activation_instant) => {}
        }

        if let Some(predecessor) = predecessor {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                // A predecessor which gave up drops its sender which also resolves this
                _ = predecessor => {}
            }
        }

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            permit = scheduler.permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };
        let _ = successor.send(());

        // The fetched copy is stale when the reminder was edited or cancelled while waiting
        let reminder = match ctx.repos.reminders.find(&reminder.id).await {
            Ok(Some(current)) if current.activation_instant() == activation_instant => current,
            Ok(_) => {
                debug!(reminder_id = %reminder.id, activation_instant = %activation_instant, "Reminder changed before delivery, skipping it");
                SchedulerMetrics::incr(&scheduler.metrics.superseded, 1);
                return;
            }
            Err(e) => {
                warn!(
                    reminder_id = %reminder.id,
                    activation_instant = %activation_instant,
                    "Unable to read reminder before delivery: {:?}",
                    e
                );
                SchedulerMetrics::incr(&scheduler.metrics.store_errors, 1);
                return;
            }
        };

        let usecase = DeliverReminderUseCase {
            reminder: reminder.clone(),
            dispatcher: scheduler.dispatcher.clone(),
            cancel: cancel.clone(),
        };
        let outcome = match execute(usecase, ctx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                info!(reminder_id = %reminder.id, "Delivery abandoned: {:?}", e);
                return;
            }
        };
        scheduler.metrics.record_outcome(&outcome);

        let reminder_id = reminder.id.clone();
        let usecase = CompleteReminderUseCase { reminder, outcome };
        match execute(usecase, ctx).await {
            Ok(Completion::RecurrenceExhausted) => {
                SchedulerMetrics::incr(&scheduler.metrics.recurrences_exhausted, 1)
            }
            Ok(Completion::Superseded) => {
                SchedulerMetrics::incr(&scheduler.metrics.superseded, 1)
            }
            Ok(completion) => {
                debug!(reminder_id = %reminder_id, activation_instant = %activation_instant, ?completion, "Reminder completed")
            }
            Err(e) => {
                // The reminder is picked up again by a later poll cycle
                error!(
                    reminder_id = %reminder_id,
                    activation_instant = %activation_instant,
                    "Unable to complete delivered reminder: {:?}",
                    e
                );
                SchedulerMetrics::incr(&scheduler.metrics.store_errors, 1);
            }
        }
    }
}
