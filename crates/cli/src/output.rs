//! Output formatting utilities

use attestor_lib::{ContainerRecord, SelectorSet};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Row for selector tables
#[derive(Debug, Tabled, Serialize, PartialEq)]
pub struct SelectorRow {
    #[tabled(rename = "Selector")]
    pub kind: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

impl SelectorRow {
    /// Split `kind:value` at the first colon; the value may contain more
    pub fn parse(selector: &str) -> Self {
        match selector.split_once(':') {
            Some((kind, value)) => Self {
                kind: kind.to_string(),
                value: value.to_string(),
            },
            None => Self {
                kind: selector.to_string(),
                value: String::new(),
            },
        }
    }
}

pub fn selector_rows<'a>(selectors: impl IntoIterator<Item = &'a str>) -> Vec<SelectorRow> {
    selectors
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(SelectorRow::parse)
        .collect()
}

/// Row for container tables
#[derive(Debug, Tabled)]
pub struct ContainerRow {
    #[tabled(rename = "Container")]
    pub container_id: String,
    #[tabled(rename = "Pod Sandbox")]
    pub workload_group_id: String,
    #[tabled(rename = "PID")]
    pub pid: u32,
}

impl From<&ContainerRecord> for ContainerRow {
    fn from(record: &ContainerRecord) -> Self {
        Self {
            container_id: record.container_id.clone(),
            workload_group_id: record.workload_group_id.clone(),
            pid: record.reported_process_id,
        }
    }
}

/// Print a table from a list of rows
pub fn print_table<T: Tabled>(rows: &[T]) {
    if rows.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

pub fn print_selectors(selectors: &SelectorSet) {
    print_table(&selector_rows(selectors.iter()));
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}
