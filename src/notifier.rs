use chrono::NaiveDateTime;
use std::io::{self, Write};
use std::sync::mpsc::Sender;
use std::sync::Mutex;

use crate::error::{Result, TaskError};
use crate::models::{Reminder, DUE_FORMAT};

/// Sink for reminders fired by the scheduler.
///
/// Delivery is fire-and-forget: an `Err` is logged by the caller and never
/// retried.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, due_at: NaiveDateTime) -> Result<()>;
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, due_at: NaiveDateTime) -> Result<()> {
        log::info!("⏰ reminder: '{}' was due at {}", title, due_at.format(DUE_FORMAT));
        Ok(())
    }
}

/// Prints reminders to stdout with a terminal bell.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, title: &str, due_at: NaiveDateTime) -> Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(
            stdout,
            "\x07⏰ Reminder: {} (due {})",
            title,
            due_at.format(DUE_FORMAT)
        )
        .and_then(|_| stdout.flush())
        .map_err(|e| TaskError::NotifierDelivery(e.to_string()))
    }
}

/// Hands reminders to the TUI event loop.
pub struct ChannelNotifier {
    // Sender<T> is only Sync from Rust 1.72.
    tx: Mutex<Sender<Reminder>>,
}

impl ChannelNotifier {
    pub fn new(tx: Sender<Reminder>) -> Self {
        ChannelNotifier { tx: Mutex::new(tx) }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, title: &str, due_at: NaiveDateTime) -> Result<()> {
        let tx = self
            .tx
            .lock()
            .map_err(|e| TaskError::NotifierDelivery(e.to_string()))?;
        tx.send(Reminder {
            title: title.to_string(),
            due_at,
        })
        .map_err(|_| TaskError::NotifierDelivery("reminder channel closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::parse_due;
    use std::sync::mpsc;

    #[test]
    fn channel_notifier_forwards_reminders() {
        let (tx, rx) = mpsc::channel();
        let notifier = ChannelNotifier::new(tx);
        let due = parse_due("2030-01-01 09:00").unwrap();

        notifier.notify("Pay bills", due).unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            Reminder {
                title: "Pay bills".to_string(),
                due_at: due
            }
        );
    }

    #[test]
    fn closed_channel_is_a_delivery_error() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let notifier = ChannelNotifier::new(tx);
        let due = parse_due("2030-01-01 09:00").unwrap();

        assert!(matches!(
            notifier.notify("Pay bills", due),
            Err(TaskError::NotifierDelivery(_))
        ));
    }

    #[test]
    fn log_notifier_never_fails() {
        let due = parse_due("2030-01-01 09:00").unwrap();
        assert!(LogNotifier.notify("Pay bills", due).is_ok());
    }
}
