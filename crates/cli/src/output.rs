//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Plain text format
    Plain,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;

    /// Cell colours for table output, one per column; `None` keeps the default
    fn colors(&self) -> Vec<Option<Color>> {
        Vec::new()
    }
}

fn new_table<T: TableDisplay>() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(T::headers());
    table
}

fn table_row<T: TableDisplay>(item: &T) -> Vec<Cell> {
    let colors = item.colors();
    item.row()
        .into_iter()
        .enumerate()
        .map(|(i, value)| match colors.get(i).copied().flatten() {
            Some(color) => Cell::new(value).fg(color),
            None => Cell::new(value),
        })
        .collect()
}

fn print_plain<T: TableDisplay>(item: &T) {
    for (header, value) in T::headers().iter().zip(item.row().iter()) {
        println!("{}: {}", header, value);
    }
}

/// Print a single item
pub fn print_item<T: Serialize + TableDisplay>(item: &T, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            let mut table = new_table::<T>();
            table.add_row(table_row(item));
            println!("{table}");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(item).unwrap_or_default());
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(item).unwrap_or_default());
        }
        OutputFormat::Plain => print_plain(item),
    }
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if items.is_empty() {
        println!("No scenarios found.");
        return;
    }

    match format {
        OutputFormat::Table => {
            let mut table = new_table::<T>();
            for item in items {
                table.add_row(table_row(item));
            }
            println!("{table}");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(items).unwrap_or_default());
        }
        OutputFormat::Plain => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    println!("---");
                }
                print_plain(item);
            }
        }
    }
}

/// Whether human-oriented lines (banners, failure details) should be printed
pub fn is_human(format: OutputFormat) -> bool {
    matches!(format, OutputFormat::Table | OutputFormat::Plain)
}

/// Print success message
pub fn print_success(message: &str) {
    println!("{} {}", "✅".green(), message.green());
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "❌".red(), message.red());
}

/// Print warning message
pub fn print_warning(message: &str) {
    eprintln!("⚠️  {}", message.yellow());
}

/// Print info message
pub fn print_info(message: &str) {
    println!("ℹ️  {}", message);
}
