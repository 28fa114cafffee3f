//! Styled output helpers for CLI commands.

use std::path::Path;

use console::style;

/// Print an info message to stderr.
pub fn info(message: &str) {
    eprintln!("{} {}", style("→").cyan(), message);
}

/// Print a success message to stderr.
pub fn success(message: &str) {
    eprintln!("{} {}", style("✓").green().bold(), message);
}

/// Print an error message to stderr.
pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

/// Print a warning message to stderr.
pub fn warning(message: &str) {
    eprintln!("{} {}", style("!").yellow().bold(), message);
}

/// Print a section title to stdout.
pub fn header(title: &str) {
    println!("{}", style(title).bold());
}

/// Print an indented line to stdout.
pub fn item(message: &str) {
    println!("  {message}");
}

/// Print a `key: value` line to stdout with the key dimmed.
pub fn field(key: &str, value: &str) {
    println!("{} {}", style(format!("{key}:")).dim(), value);
}

/// Print a path output (like "-> /path/to/file").
pub fn path_output(path: &Path) {
    eprintln!("  {} {}", style("→").dim(), style(path.display()).dim());
}
