use chrono::NaiveDateTime;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{Result, TaskError};
use crate::models::{ConfigItem, Priority, Status, Task, DUE_FORMAT};

const DB_FILENAME: &str = ".tasktick.db";

/// Durable record of tasks, shared by the interactive surface and the scheduler.
///
/// Tasks are addressed by title. Every operation is applied atomically, so a
/// concurrent `list` never sees half of a write.
pub trait TaskStore: Send + Sync {
    fn add(&self, title: &str, due_at: NaiveDateTime, priority: Priority) -> Result<Task>;
    fn list(&self) -> Result<Vec<Task>>;
    fn update(&self, old_title: &str, new_title: &str, new_due_at: NaiveDateTime) -> Result<()>;
    /// `update` plus a priority change, applied as one write.
    fn edit(
        &self,
        old_title: &str,
        new_title: &str,
        new_due_at: NaiveDateTime,
        priority: Priority,
    ) -> Result<()>;
    /// Idempotent for tasks that are already done.
    fn mark_done(&self, title: &str) -> Result<()>;
    fn delete(&self, title: &str) -> Result<()>;
    fn set_priority(&self, title: &str, priority: Priority) -> Result<()>;
}

pub fn default_db_path() -> PathBuf {
    let home_dir = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home_dir).join(DB_FILENAME)
}

/// SQLite-backed [`TaskStore`], also holding the `config` table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(2))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(&tasks_table_sql("tasks"), [])?;
        migrate_task_ids(&conn)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS config (
                id INTEGER PRIMARY KEY,
                key_name TEXT UNIQUE NOT NULL,
                value TEXT NOT NULL,
                description TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| TaskError::TransientStore(format!("store lock poisoned: {}", e)))
    }

    /// Closest existing title for a "did you mean" hint.
    fn suggest_title(conn: &Connection, input: &str) -> Option<String> {
        let mut stmt = conn.prepare("SELECT title FROM tasks").ok()?;
        let titles = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .ok()?
            .filter_map(|row| row.ok());

        let matcher = SkimMatcherV2::default();
        let mut best_match: Option<(i64, String)> = None;
        for title in titles {
            if let Some(score) = matcher.fuzzy_match(&title, input) {
                if best_match.as_ref().map_or(true, |(best, _)| score > *best) {
                    best_match = Some((score, title));
                }
            }
        }
        best_match.map(|(_, title)| title)
    }

    fn not_found(conn: &Connection, title: &str) -> TaskError {
        TaskError::not_found(title, Self::suggest_title(conn, title))
    }

    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM config WHERE key_name = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_config(&self, key: &str, value: &str, description: Option<&str>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO config (key_name, value, description) VALUES (?1, ?2, ?3)
             ON CONFLICT(key_name) DO UPDATE SET
                value = excluded.value,
                description = COALESCE(excluded.description, config.description),
                updated_at = CURRENT_TIMESTAMP",
            params![key, value, description],
        )?;
        Ok(())
    }

    pub fn list_configs(&self) -> Result<Vec<ConfigItem>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT key_name, value, description, created_at, updated_at
             FROM config ORDER BY key_name",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(ConfigItem {
                key_name: row.get(0)?,
                value: row.get(1)?,
                description: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        })?;

        let mut configs = Vec::new();
        for row in rows {
            configs.push(row?);
        }
        Ok(configs)
    }

    /// Returns `false` when the key was not set.
    pub fn delete_config(&self, key: &str) -> Result<bool> {
        let conn = self.lock()?;
        let rows_affected = conn.execute("DELETE FROM config WHERE key_name = ?1", [key])?;
        Ok(rows_affected > 0)
    }
}

/// Task ids are never reused, so an id seen by the scheduler always means the same task.
fn tasks_table_sql(name: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT UNIQUE NOT NULL,
            due_at TEXT NOT NULL,
            priority TEXT NOT NULL DEFAULT 'Medium',
            status TEXT NOT NULL DEFAULT 'Pending',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        name
    )
}

/// Rebuilds a `tasks` table created without AUTOINCREMENT, keeping existing ids.
fn migrate_task_ids(conn: &Connection) -> Result<()> {
    let sql: String = conn.query_row(
        "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = 'tasks'",
        [],
        |row| row.get(0),
    )?;
    if sql.to_uppercase().contains("AUTOINCREMENT") {
        return Ok(());
    }

    log::info!("migrating tasks table to non-reusable ids");
    let tx = conn.unchecked_transaction()?;
    tx.execute("DROP TABLE IF EXISTS tasks_migrated", [])?;
    tx.execute(&tasks_table_sql("tasks_migrated"), [])?;
    tx.execute(
        "INSERT INTO tasks_migrated (id, title, due_at, priority, status, created_at)
         SELECT id, title, due_at, priority, status, created_at FROM tasks",
        [],
    )?;
    tx.execute("DROP TABLE tasks", [])?;
    tx.execute("ALTER TABLE tasks_migrated RENAME TO tasks", [])?;
    tx.commit()?;
    Ok(())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn task_from_row(
    (id, title, due_at, priority, status, created_at): (i64, String, String, String, String, String),
) -> Result<Task> {
    let due_at = NaiveDateTime::parse_from_str(&due_at, DUE_FORMAT).map_err(|e| {
        TaskError::TransientStore(format!("bad due time '{}' for '{}': {}", due_at, title, e))
    })?;
    let priority = Priority::parse(&priority)
        .map_err(|_| TaskError::TransientStore(format!("bad priority '{}' for '{}'", priority, title)))?;

    Ok(Task {
        id,
        title,
        due_at,
        priority,
        status: Status::parse(&status)?,
        created_at,
    })
}

impl TaskStore for SqliteStore {
    fn add(&self, title: &str, due_at: NaiveDateTime, priority: Priority) -> Result<Task> {
        let conn = self.lock()?;
        match conn.execute(
            "INSERT INTO tasks (title, due_at, priority, status) VALUES (?1, ?2, ?3, 'Pending')",
            params![title, due_at.format(DUE_FORMAT).to_string(), priority.as_str()],
        ) {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(TaskError::Validation(format!(
                    "task '{}' already exists",
                    title
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let id = conn.last_insert_rowid();
        let created_at: String = conn.query_row(
            "SELECT created_at FROM tasks WHERE id = ?1",
            [id],
            |row| row.get(0),
        )?;

        Ok(Task {
            id,
            title: title.to_string(),
            due_at,
            priority,
            status: Status::Pending,
            created_at,
        })
    }

    fn list(&self) -> Result<Vec<Task>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, due_at, priority, status, created_at
             FROM tasks ORDER BY due_at, id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut tasks = Vec::new();
        for row in rows {
            match task_from_row(row?) {
                Ok(task) => tasks.push(task),
                // One unreadable row must not hide the rest of the list.
                Err(e) => log::warn!("skipping unreadable task row: {}", e),
            }
        }
        Ok(tasks)
    }

    fn update(&self, old_title: &str, new_title: &str, new_due_at: NaiveDateTime) -> Result<()> {
        let conn = self.lock()?;
        let rows_affected = match conn.execute(
            "UPDATE tasks SET title = ?1, due_at = ?2 WHERE title = ?3",
            params![new_title, new_due_at.format(DUE_FORMAT).to_string(), old_title],
        ) {
            Ok(rows) => rows,
            Err(e) if is_unique_violation(&e) => {
                return Err(TaskError::Validation(format!(
                    "another task is already titled '{}'",
                    new_title
                )));
            }
            Err(e) => return Err(e.into()),
        };

        if rows_affected == 0 {
            return Err(Self::not_found(&conn, old_title));
        }
        Ok(())
    }

    fn edit(
        &self,
        old_title: &str,
        new_title: &str,
        new_due_at: NaiveDateTime,
        priority: Priority,
    ) -> Result<()> {
        let conn = self.lock()?;
        let rows_affected = match conn.execute(
            "UPDATE tasks SET title = ?1, due_at = ?2, priority = ?3 WHERE title = ?4",
            params![
                new_title,
                new_due_at.format(DUE_FORMAT).to_string(),
                priority.as_str(),
                old_title
            ],
        ) {
            Ok(rows) => rows,
            Err(e) if is_unique_violation(&e) => {
                return Err(TaskError::Validation(format!(
                    "another task is already titled '{}'",
                    new_title
                )));
            }
            Err(e) => return Err(e.into()),
        };

        if rows_affected == 0 {
            return Err(Self::not_found(&conn, old_title));
        }
        Ok(())
    }

    fn mark_done(&self, title: &str) -> Result<()> {
        let conn = self.lock()?;
        let rows_affected = conn.execute(
            "UPDATE tasks SET status = 'Done' WHERE title = ?1",
            [title],
        )?;

        if rows_affected == 0 {
            return Err(Self::not_found(&conn, title));
        }
        Ok(())
    }

    fn delete(&self, title: &str) -> Result<()> {
        let conn = self.lock()?;
        let rows_affected = conn.execute("DELETE FROM tasks WHERE title = ?1", [title])?;

        if rows_affected == 0 {
            return Err(Self::not_found(&conn, title));
        }
        Ok(())
    }

    fn set_priority(&self, title: &str, priority: Priority) -> Result<()> {
        let conn = self.lock()?;
        let rows_affected = conn.execute(
            "UPDATE tasks SET priority = ?1 WHERE title = ?2",
            params![priority.as_str(), title],
        )?;

        if rows_affected == 0 {
            return Err(Self::not_found(&conn, title));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::parse_due;
    use std::sync::Arc;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("in-memory store")
    }

    fn at(raw: &str) -> NaiveDateTime {
        parse_due(raw).expect("valid due time")
    }

    #[test]
    fn add_creates_pending_task() {
        let store = store();
        let task = store
            .add("Pay bills", at("2030-01-01 09:00"), Priority::High)
            .unwrap();
        assert_eq!(task.status, Status::Pending);

        let tasks = store.list().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, task.id);
        assert_eq!(tasks[0].title, "Pay bills");
        assert_eq!(tasks[0].due_at, at("2030-01-01 09:00"));
        assert_eq!(tasks[0].priority, Priority::High);
    }

    #[test]
    fn duplicate_title_is_rejected() {
        let store = store();
        store.add("Pay bills", at("2030-01-01 09:00"), Priority::High).unwrap();
        let err = store
            .add("Pay bills", at("2030-02-01 09:00"), Priority::Low)
            .unwrap_err();
        assert!(matches!(err, TaskError::Validation(_)));
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn update_renames_and_reschedules_keeping_id() {
        let store = store();
        let task = store.add("Pay bills", at("2030-01-01 09:00"), Priority::High).unwrap();
        store.mark_done("Pay bills").unwrap();

        store
            .update("Pay bills", "Pay all bills", at("2030-01-02 10:30"))
            .unwrap();

        let tasks = store.list().unwrap();
        assert_eq!(tasks[0].id, task.id);
        assert_eq!(tasks[0].title, "Pay all bills");
        assert_eq!(tasks[0].due_at, at("2030-01-02 10:30"));
        assert_eq!(tasks[0].status, Status::Done);
        assert_eq!(tasks[0].priority, Priority::High);
    }

    #[test]
    fn update_onto_existing_title_is_rejected() {
        let store = store();
        store.add("A", at("2030-01-01 09:00"), Priority::Low).unwrap();
        store.add("B", at("2030-01-01 09:00"), Priority::Low).unwrap();
        let err = store.update("A", "B", at("2030-01-01 10:00")).unwrap_err();
        assert!(matches!(err, TaskError::Validation(_)));
    }

    #[test]
    fn edit_applies_title_due_and_priority_together() {
        let store = store();
        let task = store.add("Pay bills", at("2030-01-01 09:00"), Priority::High).unwrap();
        store
            .edit("Pay bills", "Pay rent", at("2030-01-02 10:00"), Priority::Low)
            .unwrap();

        let tasks = store.list().unwrap();
        assert_eq!(tasks[0].id, task.id);
        assert_eq!(tasks[0].title, "Pay rent");
        assert_eq!(tasks[0].due_at, at("2030-01-02 10:00"));
        assert_eq!(tasks[0].priority, Priority::Low);
    }

    #[test]
    fn rejected_edit_changes_nothing() {
        let store = store();
        store.add("A", at("2030-01-01 09:00"), Priority::High).unwrap();
        store.add("B", at("2030-01-01 09:00"), Priority::Low).unwrap();

        let err = store
            .edit("A", "B", at("2030-01-05 09:00"), Priority::Low)
            .unwrap_err();
        assert!(matches!(err, TaskError::Validation(_)));

        let a = store.list().unwrap().into_iter().find(|t| t.title == "A").unwrap();
        assert_eq!(a.priority, Priority::High);
        assert_eq!(a.due_at, at("2030-01-01 09:00"));
    }

    #[test]
    fn deleted_ids_are_never_handed_out_again() {
        let store = store();
        store.add("A", at("2030-01-01 09:00"), Priority::Low).unwrap();
        let last = store.add("B", at("2030-01-01 09:00"), Priority::Low).unwrap();
        store.delete("B").unwrap();

        let next = store.add("C", at("2030-01-01 09:00"), Priority::Low).unwrap();
        assert!(next.id > last.id);
    }

    #[test]
    fn old_schema_is_migrated_keeping_ids() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("tasks.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE tasks (
                    id INTEGER PRIMARY KEY,
                    title TEXT UNIQUE NOT NULL,
                    due_at TEXT NOT NULL,
                    priority TEXT NOT NULL DEFAULT 'Medium',
                    status TEXT NOT NULL DEFAULT 'Pending',
                    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
                );
                INSERT INTO tasks (id, title, due_at) VALUES (1, 'A', '2030-01-01 09:00');
                INSERT INTO tasks (id, title, due_at) VALUES (2, 'B', '2030-01-01 09:00');",
            )
            .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let ids: Vec<i64> = store.list().unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);

        store.delete("B").unwrap();
        let next = store.add("C", at("2030-01-01 09:00"), Priority::Low).unwrap();
        assert!(next.id > 2);

        // Reopening an already migrated database leaves it alone.
        drop(store);
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn unreadable_rows_are_skipped() {
        let store = store();
        store.add("Pay bills", at("2030-01-01 09:00"), Priority::High).unwrap();
        store
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO tasks (title, due_at, priority) VALUES ('Broken', 'tomorrow', 'High')",
                [],
            )
            .unwrap();

        let titles: Vec<String> = store.list().unwrap().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["Pay bills"]);
    }

    #[test]
    fn missing_titles_report_not_found_with_suggestion() {
        let store = store();
        store.add("Pay bills", at("2030-01-01 09:00"), Priority::High).unwrap();

        match store.mark_done("pay bils") {
            Err(TaskError::NotFound { title, suggestion }) => {
                assert_eq!(title, "pay bils");
                assert_eq!(suggestion.as_deref(), Some("Pay bills"));
            }
            other => panic!("expected NotFound, got {:?}", other),
        }

        assert!(matches!(
            store.delete("zzz"),
            Err(TaskError::NotFound { suggestion: None, .. })
        ));
        assert!(matches!(
            store.update("zzz", "y", at("2030-01-01 09:00")),
            Err(TaskError::NotFound { .. })
        ));
        assert!(matches!(
            store.set_priority("zzz", Priority::Low),
            Err(TaskError::NotFound { .. })
        ));
    }

    #[test]
    fn mark_done_is_idempotent() {
        let store = store();
        store.add("Pay bills", at("2030-01-01 09:00"), Priority::High).unwrap();
        store.mark_done("Pay bills").unwrap();
        store.mark_done("Pay bills").unwrap();
        assert_eq!(store.list().unwrap()[0].status, Status::Done);
    }

    #[test]
    fn delete_removes_task() {
        let store = store();
        store.add("Pay bills", at("2030-01-01 09:00"), Priority::High).unwrap();
        store.delete("Pay bills").unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn list_orders_by_due_time() {
        let store = store();
        store.add("late", at("2030-01-03 09:00"), Priority::Low).unwrap();
        store.add("early", at("2030-01-01 09:00"), Priority::Low).unwrap();
        let titles: Vec<String> = store.list().unwrap().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["early", "late"]);
    }

    #[test]
    fn config_round_trip() {
        let store = store();
        assert_eq!(store.get_config("poll_interval_seconds").unwrap(), None);

        store
            .set_config("poll_interval_seconds", "45", Some("scheduler wakeup"))
            .unwrap();
        store.set_config("poll_interval_seconds", "60", None).unwrap();

        assert_eq!(
            store.get_config("poll_interval_seconds").unwrap().as_deref(),
            Some("60")
        );
        let configs = store.list_configs().unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].description.as_deref(), Some("scheduler wakeup"));

        assert!(store.delete_config("poll_interval_seconds").unwrap());
        assert!(!store.delete_config("poll_interval_seconds").unwrap());
    }

    #[test]
    fn file_backed_store_survives_reopen() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("tasks.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.add("Pay bills", at("2030-01-01 09:00"), Priority::High).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.list().unwrap()[0].title, "Pay bills");
    }

    #[test]
    fn concurrent_reads_see_whole_writes() {
        let store = Arc::new(store());
        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..50 {
                    let title = format!("task {}", i);
                    store.add(&title, at("2030-01-01 09:00"), Priority::Low).unwrap();
                    store.update(&title, &format!("{} renamed", title), at("2030-01-02 09:00")).unwrap();
                }
            })
        };

        let mut last_len = 0;
        for _ in 0..200 {
            let tasks = store.list().unwrap();
            assert!(tasks.len() >= last_len);
            last_len = tasks.len();
            for task in tasks {
                let renamed = task.title.ends_with("renamed");
                assert_eq!(renamed, task.due_at == at("2030-01-02 09:00"));
            }
        }
        writer.join().unwrap();
        assert_eq!(store.list().unwrap().len(), 50);
    }
}
