use std::fs::{self, File};
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

use snafu::{IntoError, ResultExt};
use tracing::debug;
use walkdir::WalkDir;

use super::file_system::{
    DirEntry, EntryKind, FileSystem, FsError, IoSnafu, IsADirectorySnafu, NotADirectorySnafu,
    NotFoundSnafu,
};

/// [`FileSystem`] backed by `std::fs` and `walkdir`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeFs;

impl NativeFs {
    fn classify(path: &Path, error: std::io::Error) -> FsError {
        match error.kind() {
            ErrorKind::NotFound => NotFoundSnafu { path }.build(),
            _ => IoSnafu { path }.into_error(error),
        }
    }
}

impl FileSystem for NativeFs {
    fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>, FsError> {
        if self.kind(path) == EntryKind::File {
            return NotADirectorySnafu { path }.fail();
        }

        let read_dir = fs::read_dir(path).map_err(|e| Self::classify(path, e))?;
        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry in {}: {}", path.display(), e);
                    continue;
                }
            };
            // file_type() does not follow symlinks, so linked directories stay leaves
            let is_dir = match entry.file_type() {
                Ok(file_type) => file_type.is_dir(),
                Err(e) => {
                    debug!(
                        "Skipping entry {} without a file type: {}",
                        entry.path().display(),
                        e
                    );
                    continue;
                }
            };
            entries.push(DirEntry::new(
                entry.file_name().to_string_lossy().into_owned(),
                is_dir,
            ));
        }
        Ok(entries)
    }

    fn open_read<'a>(&'a self, path: &Path) -> Result<Box<dyn Read + Send + 'a>, FsError> {
        if self.kind(path) == EntryKind::Directory {
            return IsADirectorySnafu { path }.fail();
        }
        let file = File::open(path).map_err(|e| Self::classify(path, e))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<(), FsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context(IoSnafu { path: parent })?;
        }
        fs::write(path, contents).context(IoSnafu { path })
    }

    fn walk_files<'a>(
        &'a self,
        root: &Path,
    ) -> Box<dyn Iterator<Item = Result<PathBuf, FsError>> + 'a> {
        let root = root.to_path_buf();
        let walker = WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) => {
                    let file_type = entry.file_type();
                    let is_file = file_type.is_file()
                        || (file_type.is_symlink() && entry.path().is_file());
                    is_file.then(|| Ok(entry.into_path()))
                }
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    let source = e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
                    Some(Err(IoSnafu { path }.into_error(source)))
                }
            });
        Box::new(walker)
    }

    fn kind(&self, path: &Path) -> EntryKind {
        match fs::metadata(path) {
            Ok(metadata) if metadata.is_dir() => EntryKind::Directory,
            Ok(_) => EntryKind::File,
            Err(_) => EntryKind::Missing,
        }
    }
}

/// Top-level mount points shown as tree roots.
#[cfg(windows)]
pub fn default_roots() -> Vec<PathBuf> {
    ('A'..='Z')
        .map(|letter| PathBuf::from(format!("{letter}:\\")))
        .filter(|drive| drive.exists())
        .collect()
}

/// Top-level mount points shown as tree roots.
#[cfg(not(windows))]
pub fn default_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("/")]
}
