use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::models::Filter;

#[derive(Parser)]
#[command(author, version, about = "Personal task tracker with due-time reminders", long_about = None)]
pub struct Cli {
    /// Path to the task database (defaults to ~/.tasktick.db)
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Override the reminder poll interval in seconds
    #[arg(long, global = true, value_name = "SECONDS")]
    pub poll_interval: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a new task
    Add {
        #[arg(value_name = "TITLE")]
        title: String,
        /// Due time as "YYYY-MM-DD HH:MM"
        #[arg(value_name = "DUE")]
        due: String,
        #[arg(short, long, default_value = "Medium")]
        priority: String,
    },
    /// List tasks
    List {
        #[arg(short, long, value_enum, default_value_t = FilterArg::All)]
        filter: FilterArg,
        /// Only show tasks whose title contains this text
        #[arg(short, long)]
        search: Option<String>,
        /// Print tasks as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rename and reschedule a task
    Edit {
        #[arg(value_name = "TITLE")]
        title: String,
        #[arg(value_name = "NEW_TITLE")]
        new_title: String,
        #[arg(value_name = "NEW_DUE")]
        new_due: String,
    },
    /// Mark a task as done
    Done {
        #[arg(value_name = "TITLE")]
        title: String,
    },
    /// Delete a task
    Delete {
        #[arg(value_name = "TITLE")]
        title: String,
    },
    /// Change task priority
    Priority {
        #[arg(value_name = "TITLE")]
        title: String,
        #[arg(value_name = "PRIORITY")]
        priority: String,
    },
    /// Manage stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run the reminder scheduler in the foreground until Ctrl-C
    Watch {
        /// Send reminders to the log instead of printing them
        #[arg(long)]
        log_only: bool,
    },
    /// Launch TUI interface
    Tui,
    /// Print shell completions
    Completions {
        #[arg(value_name = "SHELL")]
        shell: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Set a config value
    Set { key: String, value: String },
    /// Show a config value
    Get { key: String },
    /// List all config values
    List,
    /// Remove a config value
    Delete { key: String },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FilterArg {
    All,
    Pending,
    Done,
    High,
}

impl From<FilterArg> for Filter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::All => Filter::All,
            FilterArg::Pending => Filter::Pending,
            FilterArg::Done => Filter::Done,
            FilterArg::High => Filter::HighPriority,
        }
    }
}
