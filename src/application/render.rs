use colored::{ColoredString, Colorize};
use supports_color::Stream;

use crate::merge::{MergeReport, Progress};
use crate::selection::{NodeId, TreeModel};
use crate::sync::{ApplySummary, DiffEntry};

/// Enables colours only when stdout can display them.
pub fn configure_colors() {
    colored::control::set_override(supports_color::on(Stream::Stdout).is_some());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Selected,
    Plain,
    Failed,
}

/// Renders `node` and `depth` levels of loaded descendants, one entry per line.
pub fn tree_lines(tree: &TreeModel, node: NodeId, depth: usize) -> Vec<(String, LineStyle)> {
    let mut lines = Vec::new();
    let mut stack = vec![(node, 0)];

    while let Some((id, level)) = stack.pop() {
        let Some(node) = tree.get(id) else {
            continue;
        };
        let mut line = format!(
            "{}[{}] {}",
            "  ".repeat(level),
            if node.selected() { 'x' } else { ' ' },
            node.name()
        );
        if node.is_directory() && !node.name().ends_with(std::path::MAIN_SEPARATOR) {
            line.push(std::path::MAIN_SEPARATOR);
        }
        if node.recursive() == Some(true) {
            line.push_str(" (r)");
        }
        let style = match node.load_error() {
            Some(error) => {
                line.push_str(" ! ");
                line.push_str(error);
                LineStyle::Failed
            }
            None if node.selected() => LineStyle::Selected,
            None => LineStyle::Plain,
        };
        lines.push((line, style));

        if level < depth {
            stack.extend(node.children().iter().rev().map(|child| (*child, level + 1)));
        }
    }
    lines
}

pub fn print_tree(tree: &TreeModel, node: NodeId, depth: usize) {
    for (line, style) in tree_lines(tree, node, depth) {
        let line = match style {
            LineStyle::Selected => line.green(),
            LineStyle::Plain => line.normal(),
            LineStyle::Failed => line.red(),
        };
        println!("{line}");
    }
}

fn style_diff_line(line: &str) -> ColoredString {
    if line.starts_with("---") || line.starts_with("+++") {
        line.bold()
    } else if line.starts_with("@@") {
        line.cyan()
    } else if line.starts_with('+') {
        line.green()
    } else if line.starts_with('-') {
        line.red()
    } else {
        line.normal()
    }
}

pub fn print_diff(entry: &DiffEntry) {
    for line in entry.line_diff.unified(&entry.path).lines() {
        println!("{}", style_diff_line(line));
    }
    println!(
        "{} {}, {} {}",
        entry.line_diff.added,
        "added".green(),
        entry.line_diff.removed,
        "removed".red()
    );
}

pub fn print_progress(progress: Progress) {
    eprintln!(
        "Merging {}/{} ({}%)",
        progress.done,
        progress.total,
        progress.percent()
    );
}

pub fn print_merge_report(report: &MergeReport) {
    println!("{} {}", "Merged into".bold(), report.output_path.display());
    println!(
        "Succeeded: {}, failed: {}",
        report.summary.succeeded.to_string().green(),
        report.summary.failed.to_string().red()
    );
    if report.unreadable > 0 {
        println!("Skipped {} unreadable entries", report.unreadable);
    }
}

pub fn print_apply_summary(summary: ApplySummary) {
    println!(
        "Applied: {}, failed: {}",
        summary.succeeded.to_string().green(),
        summary.failed.to_string().red()
    );
}
