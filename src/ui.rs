//! Terminal output shared by the commands

use cfnkit::ChangeKind;
use colored::{ColoredString, Colorize};
use std::path::PathBuf;

pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// `Stack <name>`, underlined to its width
pub fn stack_header(stack_name: &str) {
    let title = format!("Stack {stack_name}");
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print labelled values with the values lined up.
pub fn report(rows: &[(&str, String)]) {
    for line in report_lines(rows) {
        println!("{line}");
    }
}

fn report_lines(rows: &[(&str, String)]) -> Vec<String> {
    let width = rows.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    rows.iter()
        .map(|(key, value)| format!("  {} {value}", format!("{key:<width$}").dimmed()))
        .collect()
}

/// Files written to the assembly directory
pub fn written_files(paths: &[PathBuf]) {
    for path in paths {
        println!("    {}", path.display().to_string().dimmed());
    }
}

/// Marker shown in front of a resource or output in a diff
pub fn change_marker(kind: &ChangeKind) -> ColoredString {
    match kind {
        ChangeKind::Addition => "[+]".green(),
        ChangeKind::Removal => "[-]".red(),
        ChangeKind::Modification => "[~]".yellow(),
        ChangeKind::Replacement { .. } => "[!]".red().bold(),
    }
}
