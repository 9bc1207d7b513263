mod cli;
mod commands;
mod config;
mod database;
mod editor;
mod error;
mod models;
mod notifier;
mod scheduler;
mod ui;
mod validation;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use config::SchedulerConfig;
use database::{default_db_path, SqliteStore};
use notifier::{ChannelNotifier, ConsoleNotifier, LogNotifier, Notifier};
use scheduler::ReminderScheduler;
use std::sync::{mpsc, Arc};
use ui::run_tui;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let tui_mode = matches!(cli.command, None | Some(Commands::Tui));
    if tui_mode {
        config::init_file_logging(&config::default_log_path())?;
    } else {
        config::init_stderr_logging();
    }

    let db_path = cli.db.clone().unwrap_or_else(default_db_path);
    let store = Arc::new(SqliteStore::open(&db_path)?);
    log::debug!("using task database {}", db_path.display());

    match cli.command {
        Some(Commands::Add { title, due, priority }) => {
            commands::add_task(&store, &title, &due, &priority)?;
        }
        Some(Commands::List { filter, search, json }) => {
            commands::list_tasks(&store, filter.into(), search.as_deref(), json)?;
        }
        Some(Commands::Edit { title, new_title, new_due }) => {
            commands::edit_task(&store, &title, &new_title, &new_due)?;
        }
        Some(Commands::Done { title }) => {
            commands::mark_done(&store, &title)?;
        }
        Some(Commands::Delete { title }) => {
            commands::delete_task(&store, &title)?;
        }
        Some(Commands::Priority { title, priority }) => {
            commands::set_priority(&store, &title, &priority)?;
        }
        Some(Commands::Config { action }) => {
            commands::config(&store, action)?;
        }
        Some(Commands::Watch { log_only }) => {
            let config = SchedulerConfig::resolve(&store, cli.poll_interval)?;
            let notifier: Arc<dyn Notifier> = if log_only {
                Arc::new(LogNotifier)
            } else {
                Arc::new(ConsoleNotifier)
            };
            watch(store, notifier, config)?;
        }
        Some(Commands::Completions { shell }) => {
            use clap_complete::{generate, Shell};
            let shell = shell.to_lowercase();
            let shell_enum = match shell.as_str() {
                "bash" => Shell::Bash,
                "zsh" => Shell::Zsh,
                "fish" => Shell::Fish,
                "elvish" => Shell::Elvish,
                "powershell" => Shell::PowerShell,
                _ => {
                    anyhow::bail!("unsupported shell: {}", shell);
                }
            };
            let mut cmd = Cli::command();
            generate(shell_enum, &mut cmd, "tasktick", &mut std::io::stdout());
        }
        Some(Commands::Tui) | None => {
            let config = SchedulerConfig::resolve(&store, cli.poll_interval)?;
            tui_with_reminders(store, config)?;
        }
    }

    Ok(())
}

/// Headless mode: run the scheduler until Ctrl-C.
fn watch(store: Arc<SqliteStore>, notifier: Arc<dyn Notifier>, config: SchedulerConfig) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let handle = ReminderScheduler::new(store, notifier, config).start();
        println!("Watching for due tasks, press Ctrl-C to stop.");
        let signal = tokio::signal::ctrl_c().await;
        handle.stop().await;
        signal?;
        Ok::<(), anyhow::Error>(())
    })
}

/// TUI on the main thread, scheduler on a background runtime.
fn tui_with_reminders(store: Arc<SqliteStore>, config: SchedulerConfig) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let (tx, rx) = mpsc::channel();

    let handle = {
        let _guard = runtime.enter();
        ReminderScheduler::new(store.clone(), Arc::new(ChannelNotifier::new(tx)), config).start()
    };

    let result = run_tui(store, handle.waker(), rx);
    runtime.block_on(handle.stop());
    result
}
