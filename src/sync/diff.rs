use std::fmt::{self, Write as _};
use std::path::Path;

use derive_more::Display;
use similar::{ChangeTag, DiffOp, TextDiff};

/// Unchanged lines shown around every change.
const CONTEXT_RADIUS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum LineKind {
    #[display(" ")]
    Context,
    #[display("+")]
    Added,
    #[display("-")]
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: LineKind,
    /// Line text without its line break.
    pub text: String,
    pub missing_newline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffHunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<DiffLine>,
}

impl fmt::Display for DiffHunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@@ -{} +{} @@",
            format_hunk_range(self.old_start, self.old_count),
            format_hunk_range(self.new_start, self.new_count)
        )
    }
}

fn format_hunk_range(start: usize, count: usize) -> String {
    match count {
        0 => format!("{start},0"),
        1 => (start + 1).to_string(),
        _ => format!("{},{}", start + 1, count),
    }
}

/// Line-level difference between the on-disk text and a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LineDiff {
    pub hunks: Vec<DiffHunk>,
    pub added: usize,
    pub removed: usize,
}

impl LineDiff {
    pub fn compute(original: &str, candidate: &str) -> Self {
        let diff = TextDiff::from_lines(original, candidate);
        let mut line_diff = LineDiff::default();

        for group in diff.grouped_ops(CONTEXT_RADIUS) {
            let Some(mut hunk) = Self::empty_hunk(&group) else {
                continue;
            };
            for op in &group {
                for change in diff.iter_changes(op) {
                    let kind = match change.tag() {
                        ChangeTag::Equal => LineKind::Context,
                        ChangeTag::Insert => {
                            line_diff.added += 1;
                            LineKind::Added
                        }
                        ChangeTag::Delete => {
                            line_diff.removed += 1;
                            LineKind::Removed
                        }
                    };
                    let value = change.value();
                    let text = value.strip_suffix('\n').unwrap_or(value);
                    hunk.lines.push(DiffLine {
                        kind,
                        text: text.strip_suffix('\r').unwrap_or(text).to_string(),
                        missing_newline: change.missing_newline(),
                    });
                }
            }
            line_diff.hunks.push(hunk);
        }
        line_diff
    }

    fn empty_hunk(group: &[DiffOp]) -> Option<DiffHunk> {
        let old_start = group.iter().map(|op| op.old_range().start).min()?;
        let old_end = group.iter().map(|op| op.old_range().end).max()?;
        let new_start = group.iter().map(|op| op.new_range().start).min()?;
        let new_end = group.iter().map(|op| op.new_range().end).max()?;
        Some(DiffHunk {
            old_start,
            old_count: old_end.saturating_sub(old_start),
            new_start,
            new_count: new_end.saturating_sub(new_start),
            lines: Vec::new(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    /// Renders the diff in unified format for `path`.
    pub fn unified(&self, path: &Path) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "--- {}", path.display());
        let _ = writeln!(out, "+++ {} (merged)", path.display());
        for hunk in &self.hunks {
            let _ = writeln!(out, "{hunk}");
            for line in &hunk.lines {
                let _ = writeln!(out, "{}{}", line.kind, line.text);
                if line.missing_newline {
                    out.push_str("\\ No newline at end of file\n");
                }
            }
        }
        out
    }
}
