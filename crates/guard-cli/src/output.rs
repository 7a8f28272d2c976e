//! Shared output formatting helpers for CLI commands, grounded on
//! `dashflow-cli`'s `output.rs` (colored status lines, `comfy_table` tables).

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};

/// Create a formatted table with the house preset.
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "ERROR:".bright_red().bold(), msg);
}

/// Print a warning message.
pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "WARNING:".bright_yellow().bold(), msg);
}

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("{} {}", "\u{2713}".bright_green().bold(), msg);
}

/// Print an informational message.
pub fn print_info(msg: &str) {
    println!("{} {}", "\u{2139}".bright_blue().bold(), msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_table_starts_empty() {
        let table = create_table();
        assert_eq!(table.row_count(), 0);
    }
}
