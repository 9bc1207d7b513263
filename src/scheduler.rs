//! Reminder scheduler background loop.
//!
//! Each tick reads the task list, fires one notification for every pending
//! task whose due time has passed, and remembers the task id so later ticks
//! stay quiet. The loop sleeps until the next task becomes due or the poll
//! interval elapses, whichever is sooner, and can be woken early after a
//! mutation.
//!
//! The notified-set lives only as long as the scheduler: a restarted process
//! fires again for tasks that are still pending and overdue.

use chrono::{Local, NaiveDateTime};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::database::TaskStore;
use crate::models::{Task, TaskId};
use crate::notifier::Notifier;

/// Shortest sleep between ticks, so a due time a few ms away cannot spin the loop.
const MIN_WAIT: Duration = Duration::from_millis(250);

/// Outcome of a single tick.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    /// Tasks notified during this tick, delivered or not.
    pub fired: Vec<TaskId>,
    /// Tasks whose notification failed to deliver.
    pub failed: Vec<TaskId>,
    /// Earliest due time among pending tasks that have not fired yet.
    pub next_due: Option<NaiveDateTime>,
    /// The store could not be read; nothing was checked.
    pub store_error: bool,
}

pub struct ReminderScheduler {
    store: Arc<dyn TaskStore>,
    notifier: Arc<dyn Notifier>,
    notified: HashSet<TaskId>,
    poll_interval: Duration,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        notifier: Arc<dyn Notifier>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            notified: HashSet::new(),
            poll_interval: config.poll_interval,
        }
    }

    #[cfg(test)]
    pub fn has_notified(&self, id: TaskId) -> bool {
        self.notified.contains(&id)
    }

    /// Run one due-check against the local wall clock.
    pub fn tick(&mut self) -> TickReport {
        self.tick_at(Local::now().naive_local())
    }

    /// Run one due-check as if the current time were `now`.
    pub fn tick_at(&mut self, now: NaiveDateTime) -> TickReport {
        let mut report = TickReport::default();

        let tasks = match self.store.list() {
            Ok(tasks) => tasks,
            Err(e) => {
                log::warn!("reminder tick skipped, cannot read tasks: {}", e);
                report.store_error = true;
                return report;
            }
        };

        for task in &tasks {
            if self.notified.contains(&task.id) {
                continue;
            }
            if task.is_due(now) {
                self.fire(task, &mut report);
            } else if task.is_pending() {
                report.next_due = Some(match report.next_due {
                    Some(next) => next.min(task.due_at),
                    None => task.due_at,
                });
            }
        }

        log::debug!(
            "reminder tick at {}: {} task(s), {} fired, {} failed, next due {:?}",
            now,
            tasks.len(),
            report.fired.len(),
            report.failed.len(),
            report.next_due
        );
        report
    }

    fn fire(&mut self, task: &Task, report: &mut TickReport) {
        // Recorded before delivery: a failed notification is not retried.
        self.notified.insert(task.id);
        report.fired.push(task.id);

        match self.notifier.notify(&task.title, task.due_at) {
            Ok(()) => log::info!("reminder fired for '{}' (due {})", task.title, task.due_label()),
            Err(e) => {
                log::warn!("reminder for '{}' was not delivered: {}", task.title, e);
                report.failed.push(task.id);
            }
        }
    }

    /// How long to sleep after a tick that ran at `now`.
    fn wait_after(&self, report: &TickReport, now: NaiveDateTime) -> Duration {
        let until_due = report
            .next_due
            .and_then(|due| (due - now).to_std().ok())
            .unwrap_or(self.poll_interval);
        until_due.min(self.poll_interval).max(MIN_WAIT)
    }

    /// Spawn the loop on the current tokio runtime.
    ///
    /// The first tick runs immediately. Must be called from within a runtime.
    pub fn start(mut self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let wake = Arc::new(Notify::new());

        let loop_cancel = cancel.clone();
        let loop_wake = Arc::clone(&wake);
        let join = tokio::spawn(async move {
            log::info!(
                "reminder scheduler started, polling every {}s",
                self.poll_interval.as_secs()
            );
            loop {
                let report = self.tick();
                let wait = self.wait_after(&report, Local::now().naive_local());

                tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                    _ = loop_wake.notified() => {
                        log::debug!("reminder scheduler woken early");
                    }
                }
            }
            log::info!("reminder scheduler stopped");
        });

        SchedulerHandle { cancel, wake, join }
    }
}

/// Owned handle to a running scheduler loop.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    wake: Arc<Notify>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn waker(&self) -> SchedulerWaker {
        SchedulerWaker(Arc::clone(&self.wake))
    }

    /// Signal the loop to stop and wait for it. An in-flight tick may be dropped.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            if !e.is_cancelled() {
                log::warn!("reminder scheduler ended abnormally: {}", e);
            }
        }
    }
}

/// Asks the scheduler to re-check right away, e.g. after a task was added.
#[derive(Clone)]
pub struct SchedulerWaker(Arc<Notify>);

impl SchedulerWaker {
    pub fn wake(&self) {
        // notify_one keeps a permit if the loop is mid-tick.
        self.0.notify_one();
    }
}
