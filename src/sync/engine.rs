use std::path::{Path, PathBuf};
use std::sync::Arc;

use snafu::{ResultExt, Snafu};
use tracing::{debug, info, warn};

use super::diff::LineDiff;
use crate::executor::CancelToken;
use crate::ext::ErrorExt;
use crate::filesystem::{EntryKind, FileSystem, FsError};
use crate::merge::{FormatError, MergeRecord, parse};

/// A recovered block whose content differs from the file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub path: PathBuf,
    pub original_content: String,
    pub candidate_content: String,
    pub line_diff: LineDiff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplySummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Reconciles parsed records against the files they came from.
pub struct DiffSyncEngine<F: FileSystem + ?Sized> {
    fs: Arc<F>,
}

impl<F: FileSystem + ?Sized> DiffSyncEngine<F> {
    pub fn new(fs: Arc<F>) -> Self {
        Self { fs }
    }

    /// Reads and parses a container document from disk.
    pub fn load_document(&self, document: &Path) -> Result<Vec<MergeRecord>, SyncError> {
        let text = self
            .fs
            .read_text(document)
            .context(ReadDocumentSnafu)?;
        parse(&text).context(FormatSnafu)
    }

    /// Builds one entry per record whose trimmed content differs from disk.
    ///
    /// Missing paths, directories and unreadable files are skipped.
    pub fn compute_diffs(&self, records: &[MergeRecord], cancel: &CancelToken) -> Vec<DiffEntry> {
        let mut entries = Vec::new();
        for record in records {
            if cancel.is_canceled() {
                debug!("Diff computation canceled");
                break;
            }
            let path = &record.source_path;
            match self.fs.kind(path) {
                EntryKind::File => {}
                EntryKind::Directory => {
                    info!("Skipping {}: it is a directory", path.display());
                    continue;
                }
                EntryKind::Missing => {
                    info!("Skipping {}: it no longer exists", path.display());
                    continue;
                }
            }

            let original = match self.fs.read_text(path) {
                Ok(original) => original,
                Err(error) => {
                    warn!("Skipping unreadable file: {}", error.describe());
                    continue;
                }
            };
            if original.trim() == record.content.trim() {
                debug!("{} is unchanged", path.display());
                continue;
            }

            entries.push(DiffEntry {
                path: path.clone(),
                line_diff: LineDiff::compute(&original, &record.content),
                original_content: original,
                candidate_content: record.content.clone(),
            });
        }
        entries
    }

    /// Overwrites the entry's file with the candidate content.
    pub fn apply_selected(&self, entry: &DiffEntry) -> Result<(), FsError> {
        self.fs
            .write_file(&entry.path, entry.candidate_content.as_bytes())?;
        info!("Wrote merged content to {}", entry.path.display());
        Ok(())
    }

    /// Applies every entry; failures are counted and do not stop the batch.
    pub fn apply_all<'a>(&self, entries: impl IntoIterator<Item = &'a DiffEntry>) -> ApplySummary {
        let mut summary = ApplySummary::default();
        for entry in entries {
            match self.apply_selected(entry) {
                Ok(()) => summary.succeeded += 1,
                Err(error) => {
                    warn!("Failed to apply: {}", error.describe());
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}

#[derive(Debug, Snafu)]
pub enum SyncError {
    #[snafu(display("Cannot read merged document"))]
    ReadDocumentError { source: FsError },
    #[snafu(display("Merged document is malformed"))]
    FormatError { source: FormatError },
}
