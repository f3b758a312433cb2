//! Output formatting for `vigil` commands.
//!
//! Supports two modes: human-readable tables (default) and JSON (--json).

use serde::Serialize;
use tabled::{Table, Tabled};

/// Output mode for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Table,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Table
        }
    }
}

/// Print a vec of Tabled + Serialize items in the chosen mode.
pub fn print_items<T: Tabled + Serialize>(
    title: &str,
    items: &[T],
    mode: OutputMode,
) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => {
            println!("\n{title}");
            if items.is_empty() {
                println!("(no results)");
            } else {
                println!("{}", Table::new(items));
            }
        }
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(items)?);
        }
    }
    Ok(())
}

/// Print a single Serialize item as a key/value listing or JSON.
pub fn print_item<T: Serialize>(item: &T, mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => {
            if let serde_json::Value::Object(fields) = serde_json::to_value(item)? {
                for (key, value) in fields {
                    print_kv(&key, &value.to_string());
                }
            }
        }
        OutputMode::Json => println!("{}", serde_json::to_string_pretty(item)?),
    }
    Ok(())
}

/// Print a simple key-value pair.
pub fn print_kv(key: &str, value: &str) {
    println!("{key}: {value}");
}

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("\x1b[32m{msg}\x1b[0m");
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("\x1b[31m{msg}\x1b[0m");
}

/// Format a 0-1 fraction as a percentage.
pub fn percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

/// Shorten a UUID for display.
pub fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}
