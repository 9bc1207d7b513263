use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

use crate::error::TaskError;

/// Wall-clock format used for input, display and storage of due times.
pub const DUE_FORMAT: &str = "%Y-%m-%d %H:%M";

pub type TaskId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }

    pub fn parse(input: &str) -> Result<Self, TaskError> {
        match input.trim().to_lowercase().as_str() {
            "high" | "h" | "1" => Ok(Priority::High),
            "medium" | "med" | "m" | "2" => Ok(Priority::Medium),
            "low" | "l" | "3" => Ok(Priority::Low),
            other => Err(TaskError::Validation(format!(
                "unknown priority '{}', expected High, Medium or Low",
                other
            ))),
        }
    }

    pub fn next(&self) -> Self {
        match self {
            Priority::High => Priority::Medium,
            Priority::Medium => Priority::Low,
            Priority::Low => Priority::High,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    Pending,
    Done,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "Pending",
            Status::Done => "Done",
        }
    }

    pub fn parse(input: &str) -> Result<Self, TaskError> {
        match input {
            "Pending" => Ok(Status::Pending),
            "Done" => Ok(Status::Done),
            other => Err(TaskError::TransientStore(format!(
                "unexpected status '{}' in store",
                other
            ))),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(serialize_with = "serialize_due")]
    pub due_at: NaiveDateTime,
    pub priority: Priority,
    pub status: Status,
    pub created_at: String,
}

impl Task {
    pub fn is_pending(&self) -> bool {
        self.status == Status::Pending
    }

    /// Pending and due at or before `now`.
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        self.is_pending() && self.due_at <= now
    }

    pub fn due_label(&self) -> String {
        self.due_at.format(DUE_FORMAT).to_string()
    }
}

fn serialize_due<S: serde::Serializer>(due: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&due.format(DUE_FORMAT).to_string())
}

#[derive(Debug, Clone)]
pub struct ConfigItem {
    pub key_name: String,
    pub value: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// List filter offered by the interactive surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    All,
    Pending,
    Done,
    HighPriority,
}

impl Filter {
    pub fn label(&self) -> &'static str {
        match self {
            Filter::All => "All",
            Filter::Pending => "Pending",
            Filter::Done => "Done",
            Filter::HighPriority => "High Priority",
        }
    }

    pub fn next(&self) -> Self {
        match self {
            Filter::All => Filter::Pending,
            Filter::Pending => Filter::Done,
            Filter::Done => Filter::HighPriority,
            Filter::HighPriority => Filter::All,
        }
    }

    pub fn accepts(&self, task: &Task) -> bool {
        match self {
            Filter::All => true,
            Filter::Pending => task.status == Status::Pending,
            Filter::Done => task.status == Status::Done,
            Filter::HighPriority => task.priority == Priority::High,
        }
    }
}

/// Applies the filter and a case-insensitive title substring search.
pub fn visible_tasks(tasks: &[Task], filter: Filter, search: &str) -> Vec<Task> {
    let needle = search.trim().to_lowercase();
    tasks
        .iter()
        .filter(|task| filter.accepts(task))
        .filter(|task| needle.is_empty() || task.title.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggle(&self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PopupMode {
    None,
    AddTask,
    EditTask(String),
    ConfirmDelete(String),
    TaskPriority(String),
    Search,
}

/// A fired reminder as seen by the interactive surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Reminder {
    pub title: String,
    pub due_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn task(title: &str, priority: Priority, status: Status) -> Task {
        Task {
            id: 1,
            title: title.to_string(),
            due_at: NaiveDate::from_ymd_opt(2030, 1, 1)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            priority,
            status,
            created_at: String::new(),
        }
    }

    #[test]
    fn priority_parse_accepts_names_and_shortcuts() {
        assert_eq!(Priority::parse("High").unwrap(), Priority::High);
        assert_eq!(Priority::parse(" low ").unwrap(), Priority::Low);
        assert_eq!(Priority::parse("2").unwrap(), Priority::Medium);
        assert!(matches!(
            Priority::parse("urgent"),
            Err(TaskError::Validation(_))
        ));
    }

    #[test]
    fn due_requires_pending_status() {
        let now = NaiveDate::from_ymd_opt(2030, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        assert!(task("a", Priority::Low, Status::Pending).is_due(now));
        assert!(!task("a", Priority::Low, Status::Done).is_due(now));
        let before = now - chrono::Duration::minutes(1);
        assert!(!task("a", Priority::Low, Status::Pending).is_due(before));
    }

    #[test]
    fn filter_and_search_combine() {
        let tasks = vec![
            task("Pay bills", Priority::High, Status::Pending),
            task("Pay rent", Priority::Low, Status::Done),
            task("Call mom", Priority::High, Status::Done),
        ];

        let titles = |v: Vec<Task>| v.into_iter().map(|t| t.title).collect::<Vec<_>>();

        assert_eq!(titles(visible_tasks(&tasks, Filter::All, "")).len(), 3);
        assert_eq!(
            titles(visible_tasks(&tasks, Filter::Pending, "")),
            vec!["Pay bills"]
        );
        assert_eq!(
            titles(visible_tasks(&tasks, Filter::Done, "pay")),
            vec!["Pay rent"]
        );
        assert_eq!(
            titles(visible_tasks(&tasks, Filter::HighPriority, "MOM")),
            vec!["Call mom"]
        );
    }

    #[test]
    fn filter_cycles_back_to_all() {
        let mut filter = Filter::All;
        for _ in 0..4 {
            filter = filter.next();
        }
        assert_eq!(filter, Filter::All);
    }
}
