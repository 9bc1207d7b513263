//! One-shot CLI commands. Each forwards to the store and prints the outcome.

use anyhow::Result;

use crate::cli::ConfigAction;
use crate::config::validate_setting;
use crate::database::{SqliteStore, TaskStore};
use crate::models::{visible_tasks, Filter, Priority};
use crate::validation::{parse_due, parse_task_input, parse_title};

pub fn add_task(store: &SqliteStore, title: &str, due: &str, priority: &str) -> Result<()> {
    let input = parse_task_input(title, due, priority)?;
    let task = store.add(&input.title, input.due_at, input.priority)?;
    println!(
        "Task '{}' added (due {}, {} priority)",
        task.title,
        task.due_label(),
        task.priority
    );
    Ok(())
}

pub fn list_tasks(store: &SqliteStore, filter: Filter, search: Option<&str>, json: bool) -> Result<()> {
    let tasks = visible_tasks(&store.list()?, filter, search.unwrap_or(""));

    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }

    println!("Tasks ({}):", filter.label());
    println!("------");
    if tasks.is_empty() {
        println!("(none)");
    }
    for task in tasks {
        println!(
            "{} | Due: {} | Status: {} | Priority: {}",
            task.title,
            task.due_label(),
            task.status,
            task.priority
        );
    }
    Ok(())
}

pub fn edit_task(store: &SqliteStore, title: &str, new_title: &str, new_due: &str) -> Result<()> {
    let new_title = parse_title(new_title)?;
    let new_due = parse_due(new_due)?;
    store.update(title, &new_title, new_due)?;
    println!("Task '{}' updated", new_title);
    Ok(())
}

pub fn mark_done(store: &SqliteStore, title: &str) -> Result<()> {
    store.mark_done(title)?;
    println!("Task '{}' marked done", title);
    Ok(())
}

pub fn delete_task(store: &SqliteStore, title: &str) -> Result<()> {
    store.delete(title)?;
    println!("Task '{}' deleted", title);
    Ok(())
}

pub fn set_priority(store: &SqliteStore, title: &str, priority: &str) -> Result<()> {
    let priority = Priority::parse(priority)?;
    store.set_priority(title, priority)?;
    println!("Task '{}' priority updated to {}", title, priority);
    Ok(())
}

pub fn config(store: &SqliteStore, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Set { key, value } => {
            let description = validate_setting(&key, &value)?;
            store.set_config(&key, value.trim(), Some(description))?;
            println!("{} = {}", key, value.trim());
        }
        ConfigAction::Get { key } => match store.get_config(&key)? {
            Some(value) => println!("{} = {}", key, value),
            None => println!("{} is not set", key),
        },
        ConfigAction::List => {
            println!("Configs:");
            println!("------");
            for item in store.list_configs()? {
                println!(
                    "{} = {} | {} | Updated: {}",
                    item.key_name,
                    item.value,
                    item.description.as_deref().unwrap_or("-"),
                    item.updated_at
                );
            }
        }
        ConfigAction::Delete { key } => {
            if store.delete_config(&key)? {
                println!("{} removed", key);
            } else {
                println!("{} is not set", key);
            }
        }
    }
    Ok(())
}
