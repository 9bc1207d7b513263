use chrono::NaiveDateTime;

use crate::error::{Result, TaskError};
use crate::models::{Priority, DUE_FORMAT};

/// Fields of an add/edit request after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskInput {
    pub title: String,
    pub due_at: NaiveDateTime,
    pub priority: Priority,
}

pub fn parse_title(raw: &str) -> Result<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(TaskError::Validation("title must not be empty".to_string()));
    }
    Ok(title.to_string())
}

pub fn parse_due(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(TaskError::Validation("due time must not be empty".to_string()));
    }
    NaiveDateTime::parse_from_str(raw, DUE_FORMAT).map_err(|_| {
        TaskError::Validation(format!(
            "invalid due time '{}', expected YYYY-MM-DD HH:MM",
            raw
        ))
    })
}

pub fn parse_task_input(title: &str, due: &str, priority: &str) -> Result<TaskInput> {
    Ok(TaskInput {
        title: parse_title(title)?,
        due_at: parse_due(due)?,
        priority: Priority::parse(priority)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn rejects_blank_title() {
        assert!(matches!(parse_title("   "), Err(TaskError::Validation(_))));
        assert_eq!(parse_title("  Pay bills ").unwrap(), "Pay bills");
    }

    #[test]
    fn parses_minute_precision_due_time() {
        let due = parse_due("2030-01-01 09:00").unwrap();
        assert_eq!(due.hour(), 9);
        assert_eq!(due.second(), 0);
    }

    #[test]
    fn rejects_impossible_dates() {
        assert!(parse_due("2030-02-30 09:00").is_err());
        assert!(parse_due("tomorrow").is_err());
        assert!(parse_due("2030-01-01").is_err());
        assert!(parse_due("").is_err());
    }

    #[test]
    fn full_input_validation() {
        let input = parse_task_input("Pay bills", "2030-01-01 09:00", "High").unwrap();
        assert_eq!(input.priority, Priority::High);
        assert!(parse_task_input("", "2030-01-01 09:00", "High").is_err());
        assert!(parse_task_input("Pay bills", "2030-01-01 09:00", "Urgent").is_err());
    }
}
