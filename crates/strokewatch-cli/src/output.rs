//! Output formatting utilities

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

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => print_json(&items),
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    if let Ok(json) = serde_json::to_string_pretty(value) {
        println!("{}", json);
    }
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Risk band used for coloring: below 10% low, below 30% moderate, else high
pub fn risk_band(risk_percentage: f32) -> &'static str {
    if risk_percentage < 10.0 {
        "low"
    } else if risk_percentage < 30.0 {
        "moderate"
    } else {
        "high"
    }
}

pub fn color_risk(risk_percentage: f32) -> String {
    let formatted = format!("{:.1}%", risk_percentage);
    match risk_band(risk_percentage) {
        "low" => formatted.green().to_string(),
        "moderate" => formatted.yellow().to_string(),
        _ => formatted.red().to_string(),
    }
}

pub fn format_confidence(confidence: f32) -> String {
    format!("{:.0}%", confidence * 100.0)
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "ready" => status.green().to_string(),
        "degraded" => status.yellow().to_string(),
        "unhealthy" | "not ready" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Turn stored post markup back into plain text for the terminal
pub fn display_content(content: &str) -> String {
    content
        .replace("<br>", "\n")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Shorten text to `max` characters for table cells
pub fn truncate(text: &str, max: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max {
        single_line
    } else {
        let cut: String = single_line.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_band() {
        assert_eq!(risk_band(2.0), "low");
        assert_eq!(risk_band(15.0), "moderate");
        assert_eq!(risk_band(30.0), "high");
    }

    #[test]
    fn test_display_content() {
        assert_eq!(
            display_content("a &lt;b&gt; &amp;amp;<br>c"),
            "a <b> &amp;\nc"
        );
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("line\nbreak", 20), "line break");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }
}
