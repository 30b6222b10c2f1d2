use std::path::PathBuf;

use snafu::{Snafu, ensure};
use tracing::debug;

use super::serializer::{HEADER_PREFIX, SEPARATOR};

/// One block recovered from a container document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRecord {
    pub source_path: PathBuf,
    pub content: String,
}

#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    start: usize,
    end: usize,
    text: &'a str,
    crlf: bool,
}

fn split_lines(document: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut start = 0;
    for segment in document.split('\n') {
        let end = start + segment.len();
        let text = segment.strip_suffix('\r');
        lines.push(Line {
            start,
            end,
            text: text.unwrap_or(segment),
            crlf: text.is_some(),
        });
        start = end + 1;
    }
    lines
}

/// Returns the header path when a block header starts at `lines[index]`.
fn header_at<'a>(lines: &[Line<'a>], index: usize) -> Option<&'a str> {
    let [separator, file, closing, blank] = lines.get(index..index + 4)? else {
        return None;
    };
    let path = file.text.strip_prefix(HEADER_PREFIX)?;
    (separator.text == SEPARATOR && closing.text == SEPARATOR && blank.text.is_empty())
        .then_some(path)
}

/// Removes up to `count` trailing line breaks.
///
/// A `\r` before the `\n` only belongs to the line break when the block
/// header itself uses CRLF; otherwise it is part of the content.
fn strip_line_breaks(mut content: &str, count: usize, crlf: bool) -> &str {
    let line_break = if crlf { "\r\n" } else { "\n" };
    for _ in 0..count {
        match content.strip_suffix(line_break) {
            Some(rest) => content = rest,
            None => break,
        }
    }
    content
}

/// Splits a container document back into its records, in document order.
///
/// Text before the first header is ignored. Duplicate paths are kept.
pub fn parse(document: &str) -> Result<Vec<MergeRecord>, FormatError> {
    let lines = split_lines(document);
    let headers = (0..lines.len())
        .filter_map(|index| header_at(&lines, index).map(|path| (index, path)))
        .collect::<Vec<_>>();

    if let Some(&(first, _)) = headers.first() {
        if !document[..lines[first].start].trim().is_empty() {
            debug!("Ignoring text before the first block header");
        }
    }

    let mut records = Vec::with_capacity(headers.len());
    for (position, &(index, path)) in headers.iter().enumerate() {
        ensure!(
            !path.trim().is_empty(),
            EmptyPathSnafu { line: index + 2 }
        );

        let crlf = lines[index].crlf;
        let content_start = (lines[index + 3].end + 1).min(document.len());
        let content = match headers.get(position + 1) {
            Some(&(next, _)) => {
                let content_end = lines[next].start.max(content_start);
                strip_line_breaks(&document[content_start..content_end], 2, crlf)
            }
            None => strip_line_breaks(&document[content_start..], 1, crlf),
        };

        records.push(MergeRecord {
            source_path: PathBuf::from(path),
            content: content.to_string(),
        });
    }
    debug!("Parsed {} records", records.len());
    Ok(records)
}

#[derive(Debug, Snafu)]
pub enum FormatError {
    #[snafu(display("Block header on line {line} has an empty path"))]
    EmptyPath { line: usize },
}
