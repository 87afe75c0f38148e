//! Utility functions for the ICN CLI

use std::time::Duration;

/// Format a duration as a human-readable string
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();

    if total_secs < 60 {
        format!("{}.{:03}s", total_secs, duration.subsec_millis())
    } else {
        format!("{}m {}s", total_secs / 60, total_secs % 60)
    }
}

/// Print a section header in the CLI output
pub fn print_header(title: &str) {
    let separator = "=".repeat(title.len());
    println!("\n{}", title);
    println!("{}", separator);
}
