use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use snafu::{Snafu, ensure};
use tracing::{debug, warn};

use crate::config::ExtensionFilter;
use crate::executor::CancelToken;
use crate::ext::ErrorExt;
use crate::filesystem::{EntryKind, FileSystem};
use crate::selection::Selection;

/// Files and directories to collect from, with directories mapped to their recursion flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectRequest {
    pub files: BTreeSet<PathBuf>,
    pub directories: BTreeMap<PathBuf, bool>,
}

impl CollectRequest {
    /// Builds a request from a tree selection, asking the filesystem what
    /// unmaterialized index entries point at.
    pub fn resolve(selection: &Selection, fs: &dyn FileSystem) -> Self {
        let mut request = CollectRequest {
            files: selection.files.clone(),
            directories: selection.directories.clone(),
        };
        for (path, recursive) in &selection.unresolved {
            match fs.kind(path) {
                EntryKind::File => {
                    request.files.insert(path.clone());
                }
                EntryKind::Directory => {
                    request.directories.insert(path.clone(), *recursive);
                }
                EntryKind::Missing => debug!("Skipping missing selection {}", path.display()),
            }
        }
        request
    }
}

/// Deduplicated, lexicographically ordered files ready for serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collection {
    pub files: BTreeSet<PathBuf>,
    /// Directories or subtrees that could not be read.
    pub unreadable: usize,
}

pub fn collect(
    request: &CollectRequest,
    filter: &ExtensionFilter,
    fs: &dyn FileSystem,
    cancel: &CancelToken,
) -> Result<Collection, CollectError> {
    let mut collection = Collection::default();

    for path in request.files.iter().filter(|path| filter.matches(path)) {
        if fs.kind(path) == EntryKind::Directory {
            debug!("Skipping {}: it links to a directory", path.display());
            continue;
        }
        collection.files.insert(path.clone());
    }

    for (directory, recursive) in &request.directories {
        ensure!(!cancel.is_canceled(), CanceledSnafu);

        if *recursive {
            for item in fs.walk_files(directory) {
                match item {
                    Ok(path) if filter.matches(&path) => {
                        collection.files.insert(path);
                    }
                    Ok(_) => {}
                    Err(error) => {
                        warn!("Skipping unreadable entry: {}", error.describe());
                        collection.unreadable += 1;
                    }
                }
            }
            continue;
        }

        match fs.list_dir(directory) {
            Ok(entries) => collection.files.extend(
                entries
                    .into_iter()
                    .filter(|entry| !entry.is_dir)
                    .map(|entry| directory.join(entry.name))
                    .filter(|path| filter.matches(path))
                    .filter(|path| fs.kind(path) == EntryKind::File),
            ),
            Err(error) => {
                warn!("Skipping unreadable directory: {}", error.describe());
                collection.unreadable += 1;
            }
        }
    }

    ensure!(!collection.files.is_empty(), NothingMatchedSnafu);
    debug!(
        "Collected {} files ({} unreadable entries)",
        collection.files.len(),
        collection.unreadable
    );
    Ok(collection)
}

#[derive(Debug, Snafu)]
pub enum CollectError {
    #[snafu(display("No files match the current selection and file types"))]
    NothingMatched,
    #[snafu(display("Collection was canceled"))]
    Canceled,
}
