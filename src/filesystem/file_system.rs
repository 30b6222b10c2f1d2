use std::io::Read;
use std::path::{Path, PathBuf};

use snafu::{ResultExt, Snafu};

/// What a path currently points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Missing,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, is_dir: bool) -> Self {
        Self {
            name: name.into(),
            is_dir,
        }
    }
}

/// Filesystem primitives the core relies on.
///
/// Implementations must be shareable across the background worker threads.
/// Symbolic links are never reported as directories by `list_dir`, which keeps
/// the materialized tree free of cycles. `kind` follows links.
pub trait FileSystem: Send + Sync {
    /// Lists the immediate entries of a directory.
    fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>, FsError>;

    /// Opens a file for streaming reads.
    fn open_read<'a>(&'a self, path: &Path) -> Result<Box<dyn Read + Send + 'a>, FsError>;

    /// Overwrites a file with the given bytes, creating missing parent directories.
    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<(), FsError>;

    /// Enumerates every file below `root`.
    ///
    /// Unreadable subtrees show up as `Err` items and the walk carries on with
    /// the remaining siblings.
    fn walk_files<'a>(
        &'a self,
        root: &Path,
    ) -> Box<dyn Iterator<Item = Result<PathBuf, FsError>> + 'a>;

    fn kind(&self, path: &Path) -> EntryKind;

    fn read_file(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        let mut reader = self.open_read(path)?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).context(IoSnafu { path })?;
        Ok(bytes)
    }

    /// Reads a file as text, replacing undecodable byte sequences.
    fn read_text(&self, path: &Path) -> Result<String, FsError> {
        let bytes = self.read_file(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FsError {
    #[snafu(display("Cannot access {}", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("{} does not exist", path.display()))]
    NotFound { path: PathBuf },
    #[snafu(display("{} is not a directory", path.display()))]
    NotADirectory { path: PathBuf },
    #[snafu(display("{} is a directory", path.display()))]
    IsADirectory { path: PathBuf },
}

impl FsError {
    pub fn path(&self) -> &Path {
        match self {
            FsError::Io { path, .. }
            | FsError::NotFound { path }
            | FsError::NotADirectory { path }
            | FsError::IsADirectory { path } => path,
        }
    }
}
