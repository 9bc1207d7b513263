use anyhow::Result;
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, Timelike};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use crate::database::TaskStore;
use crate::editor::{FormField, LineEditor, TaskForm};
use crate::error::TaskError;
use crate::models::{visible_tasks, Filter, PopupMode, Priority, Reminder, Task, Theme, DUE_FORMAT};
use crate::scheduler::SchedulerWaker;

const EVENT_POLL: Duration = Duration::from_millis(250);

pub struct App {
    store: Arc<dyn TaskStore>,
    waker: Option<SchedulerWaker>,
    all_tasks: Vec<Task>,
    pub tasks: Vec<Task>,
    pub task_list_state: ListState,
    pub filter: Filter,
    pub search: LineEditor,
    pub theme: Theme,
    pub popup_mode: PopupMode,
    pub form: Option<TaskForm>,
    pub alerts: VecDeque<Reminder>,
    pub status_message: Option<(String, bool)>,
    pub now: NaiveDateTime,
    pub should_quit: bool,
}

impl App {
    pub fn new(store: Arc<dyn TaskStore>, waker: Option<SchedulerWaker>) -> Result<Self> {
        let mut app = App {
            store,
            waker,
            all_tasks: Vec::new(),
            tasks: Vec::new(),
            task_list_state: ListState::default(),
            filter: Filter::default(),
            search: LineEditor::default(),
            theme: Theme::default(),
            popup_mode: PopupMode::None,
            form: None,
            alerts: VecDeque::new(),
            status_message: None,
            now: Local::now().naive_local(),
            should_quit: false,
        };
        app.refresh_data()?;
        Ok(app)
    }

    pub fn refresh_data(&mut self) -> Result<(), TaskError> {
        self.all_tasks = self.store.list()?;
        self.apply_view();
        Ok(())
    }

    /// Recompute the visible list from filter and search, keeping the selection in range.
    pub fn apply_view(&mut self) {
        self.tasks = visible_tasks(&self.all_tasks, self.filter, &self.search.text);
        let selected = match self.task_list_state.selected() {
            _ if self.tasks.is_empty() => None,
            Some(i) => Some(i.min(self.tasks.len() - 1)),
            None => Some(0),
        };
        self.task_list_state.select(selected);
    }

    pub fn selected_task(&self) -> Option<&Task> {
        self.task_list_state.selected().and_then(|i| self.tasks.get(i))
    }

    pub fn next_item(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        let i = match self.task_list_state.selected() {
            Some(i) if i + 1 < self.tasks.len() => i + 1,
            _ => 0,
        };
        self.task_list_state.select(Some(i));
    }

    pub fn previous_item(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        let i = match self.task_list_state.selected() {
            Some(0) | None => self.tasks.len() - 1,
            Some(i) => i - 1,
        };
        self.task_list_state.select(Some(i));
    }

    fn info(&mut self, message: String) {
        self.status_message = Some((message, false));
    }

    fn error(&mut self, err: &TaskError) {
        self.status_message = Some((err.to_string(), true));
    }

    /// Refresh the list and let the scheduler re-check right away.
    fn after_mutation(&mut self, message: String) {
        if let Some(waker) = &self.waker {
            waker.wake();
        }
        match self.refresh_data() {
            Ok(()) => self.info(message),
            Err(e) => self.error(&e),
        }
    }

    pub fn push_alert(&mut self, reminder: Reminder) {
        self.alerts.push_back(reminder);
        // The fired task may have been edited elsewhere; keep the list current.
        if let Err(e) = self.refresh_data() {
            self.error(&e);
        }
    }

    pub fn dismiss_alert(&mut self) {
        self.alerts.pop_front();
    }

    pub fn open_add_form(&mut self) {
        let next_hour = (self.now + ChronoDuration::hours(1))
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .unwrap_or(self.now);
        self.form = Some(TaskForm::blank(next_hour));
        self.popup_mode = PopupMode::AddTask;
    }

    pub fn open_edit_form(&mut self) {
        if let Some(task) = self.selected_task().cloned() {
            self.form = Some(TaskForm::for_task(&task));
            self.popup_mode = PopupMode::EditTask(task.title);
        } else {
            self.info("Select a task to edit.".to_string());
        }
    }

    pub fn close_popup(&mut self) {
        self.popup_mode = PopupMode::None;
        self.form = None;
    }

    pub fn submit_form(&mut self) {
        let Some(form) = &self.form else {
            return;
        };
        let input = match form.input() {
            Ok(input) => input,
            Err(e) => {
                self.error(&e);
                return;
            }
        };

        let result = match self.popup_mode.clone() {
            PopupMode::AddTask => self
                .store
                .add(&input.title, input.due_at, input.priority)
                .map(|task| format!("Added '{}'", task.title)),
            PopupMode::EditTask(old_title) => self
                .store
                .edit(&old_title, &input.title, input.due_at, input.priority)
                .map(|_| format!("Updated '{}'", input.title)),
            _ => return,
        };

        match result {
            Ok(message) => {
                self.close_popup();
                self.after_mutation(message);
            }
            // Keep the form open so the input can be corrected.
            Err(e) => self.error(&e),
        }
    }

    pub fn mark_selected_done(&mut self) {
        let Some(title) = self.selected_task().map(|t| t.title.clone()) else {
            self.info("Select a task to mark done.".to_string());
            return;
        };
        match self.store.mark_done(&title) {
            Ok(()) => self.after_mutation(format!("Marked '{}' done", title)),
            Err(e) => self.error(&e),
        }
    }

    pub fn request_delete(&mut self) {
        match self.selected_task().map(|t| t.title.clone()) {
            Some(title) => self.popup_mode = PopupMode::ConfirmDelete(title),
            None => self.info("Select a task to delete.".to_string()),
        }
    }

    fn confirm_delete(&mut self, title: &str) {
        self.close_popup();
        match self.store.delete(title) {
            Ok(()) => self.after_mutation(format!("Deleted '{}'", title)),
            Err(e) => self.error(&e),
        }
    }

    pub fn show_priority_popup(&mut self) {
        if let Some(title) = self.selected_task().map(|t| t.title.clone()) {
            self.popup_mode = PopupMode::TaskPriority(title);
        }
    }

    fn apply_priority(&mut self, title: &str, c: char) {
        let Ok(priority) = Priority::parse(&c.to_string()) else {
            return;
        };
        self.close_popup();
        match self.store.set_priority(title, priority) {
            Ok(()) => self.after_mutation(format!("'{}' is now {} priority", title, priority)),
            Err(e) => self.error(&e),
        }
    }

    pub fn cycle_filter(&mut self) {
        self.filter = self.filter.next();
        self.apply_view();
    }

    pub fn toggle_theme(&mut self) {
        self.theme = self.theme.toggle();
    }

    pub fn handle_key(&mut self, key: KeyCode, modifiers: KeyModifiers) {
        if modifiers.contains(KeyModifiers::CONTROL) && key == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }

        // Reminder alerts are modal until dismissed.
        if !self.alerts.is_empty() {
            if matches!(key, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
                self.dismiss_alert();
            }
            return;
        }

        match self.popup_mode.clone() {
            PopupMode::AddTask | PopupMode::EditTask(_) => self.handle_form_key(key),
            PopupMode::ConfirmDelete(title) => match key {
                KeyCode::Char('y') | KeyCode::Enter => self.confirm_delete(&title),
                KeyCode::Char('n') | KeyCode::Esc => self.close_popup(),
                _ => {}
            },
            PopupMode::TaskPriority(title) => match key {
                KeyCode::Char(c) => self.apply_priority(&title, c),
                KeyCode::Esc => self.close_popup(),
                _ => {}
            },
            PopupMode::Search => self.handle_search_key(key),
            PopupMode::None => self.handle_list_key(key),
        }
    }

    fn handle_form_key(&mut self, key: KeyCode) {
        if key == KeyCode::Enter {
            self.submit_form();
            return;
        }
        if key == KeyCode::Esc {
            self.close_popup();
            return;
        }
        let Some(form) = &mut self.form else {
            return;
        };
        match key {
            KeyCode::Tab | KeyCode::Down => form.next_field(),
            KeyCode::BackTab | KeyCode::Up => form.previous_field(),
            KeyCode::Backspace => form.delete_char(),
            KeyCode::Left => form.move_cursor_left(),
            KeyCode::Right => form.move_cursor_right(),
            KeyCode::Home => form.move_to_start(),
            KeyCode::End => form.move_to_end(),
            KeyCode::Char(c) => form.insert_char(c),
            _ => {}
        }
    }

    fn handle_search_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Enter => self.popup_mode = PopupMode::None,
            KeyCode::Esc => {
                self.search.clear();
                self.popup_mode = PopupMode::None;
            }
            KeyCode::Backspace => self.search.delete_char(),
            KeyCode::Left => self.search.move_cursor_left(),
            KeyCode::Right => self.search.move_cursor_right(),
            KeyCode::Char(c) => self.search.insert_char(c),
            _ => return,
        }
        self.apply_view();
    }

    fn handle_list_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Down | KeyCode::Char('j') => self.next_item(),
            KeyCode::Up | KeyCode::Char('k') => self.previous_item(),
            KeyCode::Char('a') => self.open_add_form(),
            KeyCode::Char('e') | KeyCode::Enter => self.open_edit_form(),
            KeyCode::Char('d') => self.mark_selected_done(),
            KeyCode::Char('x') | KeyCode::Delete => self.request_delete(),
            KeyCode::Char('p') => self.show_priority_popup(),
            KeyCode::Char('f') => self.cycle_filter(),
            KeyCode::Char('/') => self.popup_mode = PopupMode::Search,
            KeyCode::Char('c') => {
                self.search.clear();
                self.apply_view();
            }
            KeyCode::Char('t') => self.toggle_theme(),
            KeyCode::Char('r') => match self.refresh_data() {
                Ok(()) => self.info("Refreshed".to_string()),
                Err(e) => self.error(&e),
            },
            _ => {}
        }
    }
}

pub fn run_tui(
    store: Arc<dyn TaskStore>,
    waker: SchedulerWaker,
    reminders: Receiver<Reminder>,
) -> Result<()> {
    let mut app = App::new(store, Some(waker))?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app, &reminders);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res?;
    Ok(())
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    reminders: &Receiver<Reminder>,
) -> io::Result<()> {
    loop {
        while let Ok(reminder) = reminders.try_recv() {
            app.push_alert(reminder);
        }
        app.now = Local::now().naive_local();
        terminal.draw(|f| ui(f, app))?;

        if event::poll(EVENT_POLL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key.code, key.modifiers);
                }
            }
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

struct Palette {
    bg: Color,
    fg: Color,
    accent: Color,
    popup_bg: Color,
    highlight_bg: Color,
}

fn palette(theme: Theme) -> Palette {
    match theme {
        Theme::Light => Palette {
            bg: Color::White,
            fg: Color::Black,
            accent: Color::Blue,
            popup_bg: Color::Gray,
            highlight_bg: Color::LightBlue,
        },
        Theme::Dark => Palette {
            bg: Color::Black,
            fg: Color::White,
            accent: Color::Cyan,
            popup_bg: Color::DarkGray,
            highlight_bg: Color::Blue,
        },
    }
}

fn priority_color(priority: Priority) -> Color {
    match priority {
        Priority::High => Color::Red,
        Priority::Medium => Color::Yellow,
        Priority::Low => Color::Green,
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let colors = palette(app.theme);
    f.render_widget(
        Block::default().style(Style::default().bg(colors.bg).fg(colors.fg)),
        f.area(),
    );

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(3)].as_ref())
        .split(f.area());

    render_header(f, app, &colors, chunks[0]);
    render_tasks(f, app, &colors, chunks[1]);
    render_status(f, app, &colors, chunks[2]);

    match app.popup_mode.clone() {
        PopupMode::AddTask => render_form(f, app, &colors, "Add Task"),
        PopupMode::EditTask(title) => render_form(f, app, &colors, &format!("Edit Task: {}", title)),
        PopupMode::ConfirmDelete(title) => {
            let text = format!("Delete '{}'?\n\ny: delete   n/ESC: cancel", title);
            render_popup(f, &colors, "Delete Task", text, 50, 20);
        }
        PopupMode::TaskPriority(title) => {
            let mut text = format!("New priority for '{}':\n\n", title);
            for (i, priority) in Priority::ALL.iter().enumerate() {
                text.push_str(&format!("{} = {}\n", i + 1, priority));
            }
            text.push_str("\nPress ESC to cancel");
            render_popup(f, &colors, "Change Task Priority", text, 50, 30);
        }
        PopupMode::Search | PopupMode::None => {}
    }

    if let Some(reminder) = app.alerts.front() {
        let more = if app.alerts.len() > 1 {
            format!("\n\n(+{} more)", app.alerts.len() - 1)
        } else {
            String::new()
        };
        let text = format!(
            "{}\n\nwas due at {}{}\n\nPress ENTER to dismiss",
            reminder.title,
            reminder.due_at.format(DUE_FORMAT),
            more
        );
        let area = centered_rect(50, 30, f.area());
        f.render_widget(Clear, area);
        let popup = Paragraph::new(text)
            .block(
                Block::default()
                    .title("⏰ Reminder")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Red)),
            )
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: false })
            .style(Style::default().bg(colors.popup_bg).fg(colors.fg).add_modifier(Modifier::BOLD));
        f.render_widget(popup, area);
    }
}

fn render_header(f: &mut Frame, app: &App, colors: &Palette, area: Rect) {
    let mut spans = vec![
        Span::styled("📋 Tasks  ", Style::default().fg(colors.accent).add_modifier(Modifier::BOLD)),
        Span::raw(format!("Filter: {}  ", app.filter.label())),
        Span::raw("Search: "),
    ];

    if app.popup_mode == PopupMode::Search {
        let (before, under, after) = app.search.split_at_cursor();
        spans.push(Span::raw(before));
        spans.push(Span::styled(under, Style::default().bg(colors.accent).fg(colors.bg)));
        spans.push(Span::raw(after));
    } else if app.search.text.is_empty() {
        spans.push(Span::styled("(none)", Style::default().add_modifier(Modifier::DIM)));
    } else {
        spans.push(Span::raw(app.search.text.clone()));
    }

    let header = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title("tasktick"))
        .style(Style::default().fg(colors.fg).bg(colors.bg));
    f.render_widget(header, area);
}

fn render_tasks(f: &mut Frame, app: &mut App, colors: &Palette, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)].as_ref())
        .split(area);

    let now = app.now;
    let items: Vec<ListItem> = app
        .tasks
        .iter()
        .map(|task| {
            let overdue = task.is_due(now);
            let mut spans = vec![
                Span::styled(
                    format!("{} ", task.title),
                    Style::default().fg(colors.fg).add_modifier(if task.is_pending() {
                        Modifier::empty()
                    } else {
                        Modifier::CROSSED_OUT
                    }),
                ),
                Span::styled(format!("[{}] ", task.due_label()), Style::default().fg(colors.accent)),
                Span::styled(
                    format!("[{}] ", task.priority),
                    Style::default().fg(priority_color(task.priority)),
                ),
                Span::raw(format!("[{}]", task.status)),
            ];
            if overdue {
                spans.push(Span::styled(
                    " overdue",
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                ));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let title = format!("Tasks ({}/{})", app.tasks.len(), app.all_tasks.len());
    let tasks_list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(
            Style::default()
                .bg(colors.highlight_bg)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol(">> ");

    f.render_stateful_widget(tasks_list, chunks[0], &mut app.task_list_state);

    let controls = "Controls:\n• ↑/↓: Navigate\n• a: Add  e: Edit\n• d: Mark done  x: Delete\n• p: Priority\n• f: Filter  /: Search  c: Clear search\n• t: Theme  r: Refresh  q: Quit";
    let info_text = match app.selected_task() {
        Some(task) => format!(
            "Task: {}\nDue: {}\nPriority: {}\nStatus: {}\nCreated: {}\n\n{}",
            task.title,
            task.due_label(),
            task.priority,
            task.status,
            task.created_at,
            controls
        ),
        None => format!("No task selected\n\n{}", controls),
    };

    let info_paragraph = Paragraph::new(info_text)
        .block(Block::default().borders(Borders::ALL).title("Task Info"))
        .wrap(Wrap { trim: false })
        .style(Style::default().fg(colors.fg));

    f.render_widget(info_paragraph, chunks[1]);
}

fn render_status(f: &mut Frame, app: &App, colors: &Palette, area: Rect) {
    let (text, style) = match &app.status_message {
        Some((message, true)) => (message.clone(), Style::default().fg(Color::Red)),
        Some((message, false)) => (message.clone(), Style::default().fg(colors.fg)),
        None => (String::new(), Style::default().fg(colors.fg)),
    };
    let status = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .style(style);
    f.render_widget(status, area);
}

fn render_form(f: &mut Frame, app: &App, colors: &Palette, title: &str) {
    let Some(form) = &app.form else {
        return;
    };

    let label = |field: FormField, name: &str| {
        let style = if form.focus == field {
            Style::default().fg(colors.accent).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(colors.fg)
        };
        Span::styled(format!("{:<10}", name), style)
    };
    let line_field = |field: FormField, name: &str, line: &LineEditor| {
        let mut spans = vec![label(field, name)];
        if form.focus == field {
            let (before, under, after) = line.split_at_cursor();
            spans.push(Span::raw(before));
            spans.push(Span::styled(under, Style::default().bg(colors.accent).fg(colors.bg)));
            spans.push(Span::raw(after));
        } else {
            spans.push(Span::raw(line.text.clone()));
        }
        Line::from(spans)
    };

    let lines = vec![
        line_field(FormField::Title, "Title:", &form.title),
        line_field(FormField::Due, "Due:", &form.due),
        Line::from(vec![
            label(FormField::Priority, "Priority:"),
            Span::styled(
                format!("< {} >", form.priority),
                Style::default().fg(priority_color(form.priority)),
            ),
        ]),
        Line::from(""),
        Line::from("Due format: YYYY-MM-DD HH:MM"),
        Line::from("Tab: next field  ←/→ or 1-3: priority"),
        Line::from("ENTER: save  ESC: cancel"),
    ];

    let area = centered_rect(60, 40, f.area());
    f.render_widget(Clear, area);
    let popup = Paragraph::new(lines)
        .block(Block::default().title(title.to_string()).borders(Borders::ALL))
        .style(Style::default().bg(colors.popup_bg).fg(colors.fg));
    f.render_widget(popup, area);
}

fn render_popup(f: &mut Frame, colors: &Palette, title: &str, text: String, percent_x: u16, percent_y: u16) {
    let area = centered_rect(percent_x, percent_y, f.area());
    f.render_widget(Clear, area);
    let content = Paragraph::new(text)
        .block(Block::default().title(title.to_string()).borders(Borders::ALL))
        .alignment(Alignment::Center)
        .style(Style::default().bg(colors.popup_bg).fg(colors.fg));
    f.render_widget(content, area);
}

// Helper function to create centered rectangles for popups
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
