use chrono::NaiveDateTime;

use crate::error::Result;
use crate::models::{Priority, Task, DUE_FORMAT};
use crate::validation::{parse_task_input, TaskInput};

/// Single-line text input with a cursor counted in characters.
#[derive(Debug, Clone, Default)]
pub struct LineEditor {
    pub text: String,
    pub cursor: usize,
}

impl LineEditor {
    pub fn new(text: &str) -> Self {
        LineEditor {
            text: text.to_string(),
            cursor: text.chars().count(),
        }
    }

    fn byte_index(&self, char_idx: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_idx)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len())
    }

    pub fn insert_char(&mut self, c: char) {
        let at = self.byte_index(self.cursor);
        self.text.insert(at, c);
        self.cursor += 1;
    }

    pub fn delete_char(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let at = self.byte_index(self.cursor - 1);
        self.text.remove(at);
        self.cursor -= 1;
    }

    pub fn move_cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_cursor_right(&mut self) {
        if self.cursor < self.text.chars().count() {
            self.cursor += 1;
        }
    }

    pub fn move_to_start(&mut self) {
        self.cursor = 0;
    }

    pub fn move_to_end(&mut self) {
        self.cursor = self.text.chars().count();
    }

    /// Text split around the cursor: (before, under cursor, after).
    pub fn split_at_cursor(&self) -> (String, String, String) {
        let before: String = self.text.chars().take(self.cursor).collect();
        let under: String = self
            .text
            .chars()
            .nth(self.cursor)
            .map(|c| c.to_string())
            .unwrap_or_else(|| " ".to_string());
        let after: String = self.text.chars().skip(self.cursor + 1).collect();
        (before, under, after)
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Title,
    Due,
    Priority,
}

/// Add/edit form state for the TUI.
#[derive(Debug, Clone)]
pub struct TaskForm {
    pub title: LineEditor,
    pub due: LineEditor,
    pub priority: Priority,
    pub focus: FormField,
}

impl TaskForm {
    pub fn blank(default_due: NaiveDateTime) -> Self {
        TaskForm {
            title: LineEditor::default(),
            due: LineEditor::new(&default_due.format(DUE_FORMAT).to_string()),
            priority: Priority::default(),
            focus: FormField::Title,
        }
    }

    pub fn for_task(task: &Task) -> Self {
        TaskForm {
            title: LineEditor::new(&task.title),
            due: LineEditor::new(&task.due_label()),
            priority: task.priority,
            focus: FormField::Title,
        }
    }

    pub fn next_field(&mut self) {
        self.focus = match self.focus {
            FormField::Title => FormField::Due,
            FormField::Due => FormField::Priority,
            FormField::Priority => FormField::Title,
        };
    }

    pub fn previous_field(&mut self) {
        self.focus = match self.focus {
            FormField::Title => FormField::Priority,
            FormField::Due => FormField::Title,
            FormField::Priority => FormField::Due,
        };
    }

    fn focused_line(&mut self) -> Option<&mut LineEditor> {
        match self.focus {
            FormField::Title => Some(&mut self.title),
            FormField::Due => Some(&mut self.due),
            FormField::Priority => None,
        }
    }

    pub fn insert_char(&mut self, c: char) {
        if self.focus == FormField::Priority {
            if c == ' ' {
                self.priority = self.priority.next();
            } else if let Ok(priority) = Priority::parse(&c.to_string()) {
                self.priority = priority;
            }
            return;
        }
        if let Some(line) = self.focused_line() {
            line.insert_char(c);
        }
    }

    pub fn delete_char(&mut self) {
        if let Some(line) = self.focused_line() {
            line.delete_char();
        }
    }

    pub fn move_cursor_left(&mut self) {
        match self.focused_line() {
            Some(line) => line.move_cursor_left(),
            None => self.priority = self.priority.next().next(),
        }
    }

    pub fn move_cursor_right(&mut self) {
        match self.focused_line() {
            Some(line) => line.move_cursor_right(),
            None => self.priority = self.priority.next(),
        }
    }

    pub fn move_to_start(&mut self) {
        if let Some(line) = self.focused_line() {
            line.move_to_start();
        }
    }

    pub fn move_to_end(&mut self) {
        if let Some(line) = self.focused_line() {
            line.move_to_end();
        }
    }

    pub fn input(&self) -> Result<TaskInput> {
        parse_task_input(&self.title.text, &self.due.text, self.priority.as_str())
    }
}
