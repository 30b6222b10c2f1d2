use std::collections::BTreeMap;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use snafu::{IntoError, Snafu};

use super::file_system::{
    DirEntry, EntryKind, FileSystem, FsError, IoSnafu, IsADirectorySnafu, NotADirectorySnafu,
    NotFoundSnafu,
};

/// One node of an in-memory filesystem tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilesystemNode {
    File {
        contents: Vec<u8>,
    },
    Directory {
        children: BTreeMap<String, FilesystemNode>,
    },
    /// A directory whose listing and contents are denied.
    Unreadable,
    /// A file that yields `contents` and then fails with an I/O error.
    Failing {
        contents: Vec<u8>,
    },
}

impl FilesystemNode {
    pub fn root() -> Self {
        FilesystemNode::Directory {
            children: BTreeMap::new(),
        }
    }

    /// Inserts `node` at `path`, creating intermediate directories.
    pub fn try_insert_path(
        &mut self,
        path: &Path,
        node: FilesystemNode,
    ) -> Result<(), CannotInsertIntoFileError> {
        let names = Self::names(path);
        let Some((last, intermediate)) = names.split_last() else {
            *self = node;
            return Ok(());
        };

        let mut current = self;
        for name in intermediate {
            match current {
                FilesystemNode::Directory { children } => {
                    current = children
                        .entry(name.clone())
                        .or_insert_with(FilesystemNode::root);
                }
                _ => {
                    return Err(CannotInsertIntoFileError {
                        path: path.to_path_buf(),
                    });
                }
            }
        }

        match current {
            FilesystemNode::Directory { children } => {
                children.insert(last.clone(), node);
                Ok(())
            }
            _ => Err(CannotInsertIntoFileError {
                path: path.to_path_buf(),
            }),
        }
    }

    fn lookup(&self, path: &Path) -> Option<&FilesystemNode> {
        Self::names(path)
            .iter()
            .try_fold(self, |current, name| match current {
                FilesystemNode::Directory { children } => children.get(name),
                _ => None,
            })
    }

    fn names(path: &Path) -> Vec<String> {
        path.components()
            .filter_map(|component| match component {
                Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect()
    }

    fn collect_files(&self, path: &Path, out: &mut Vec<Result<PathBuf, FsError>>) {
        match self {
            FilesystemNode::File { .. } | FilesystemNode::Failing { .. } => {
                out.push(Ok(path.to_path_buf()))
            }
            FilesystemNode::Directory { children } => {
                for (name, child) in children {
                    child.collect_files(&path.join(name), out);
                }
            }
            FilesystemNode::Unreadable => out.push(Err(denied(path))),
        }
    }
}

fn denied(path: &Path) -> FsError {
    IoSnafu { path }.into_error(io::Error::from(io::ErrorKind::PermissionDenied))
}

/// Reader that errors once its contents are exhausted instead of reporting end of file.
struct FailingReader {
    inner: Cursor<Vec<u8>>,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf)? {
            0 => Err(io::Error::other("device went away")),
            read => Ok(read),
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(display("Cannot insert a node below the file {}", path.display()))]
pub struct CannotInsertIntoFileError {
    path: PathBuf,
}

/// Thread-safe in-memory [`FileSystem`] for tests.
#[derive(Debug)]
pub struct MemoryFs {
    root: RwLock<FilesystemNode>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(FilesystemNode::root()),
        }
    }

    pub fn with_file(self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Self {
        self.insert(
            path.as_ref(),
            FilesystemNode::File {
                contents: contents.as_ref().to_vec(),
            },
        );
        self
    }

    pub fn with_dir(self, path: impl AsRef<Path>) -> Self {
        self.insert(path.as_ref(), FilesystemNode::root());
        self
    }

    pub fn with_unreadable_dir(self, path: impl AsRef<Path>) -> Self {
        self.insert(path.as_ref(), FilesystemNode::Unreadable);
        self
    }

    /// A file whose reads fail after `readable` has been delivered.
    pub fn with_failing_file(self, path: impl AsRef<Path>, readable: impl AsRef<[u8]>) -> Self {
        self.insert(
            path.as_ref(),
            FilesystemNode::Failing {
                contents: readable.as_ref().to_vec(),
            },
        );
        self
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        let root = self.root.read().ok()?;
        match root.lookup(path.as_ref())? {
            FilesystemNode::File { contents } => Some(String::from_utf8_lossy(contents).into()),
            _ => None,
        }
    }

    fn insert(&self, path: &Path, node: FilesystemNode) {
        let mut root = self.root.write().expect("memory fs lock poisoned");
        root.try_insert_path(path, node)
            .expect("test fixture inserts below a file");
    }
}

impl FileSystem for MemoryFs {
    fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>, FsError> {
        let root = self.root.read().map_err(|_| denied(path))?;
        match root.lookup(path) {
            Some(FilesystemNode::Directory { children }) => Ok(children
                .iter()
                .map(|(name, child)| {
                    let is_file = matches!(
                        child,
                        FilesystemNode::File { .. } | FilesystemNode::Failing { .. }
                    );
                    DirEntry::new(name.clone(), !is_file)
                })
                .collect()),
            Some(FilesystemNode::File { .. } | FilesystemNode::Failing { .. }) => {
                NotADirectorySnafu { path }.fail()
            }
            Some(FilesystemNode::Unreadable) => Err(denied(path)),
            None => NotFoundSnafu { path }.fail(),
        }
    }

    fn open_read<'a>(&'a self, path: &Path) -> Result<Box<dyn Read + Send + 'a>, FsError> {
        let root = self.root.read().map_err(|_| denied(path))?;
        match root.lookup(path) {
            Some(FilesystemNode::File { contents }) => Ok(Box::new(Cursor::new(contents.clone()))),
            Some(FilesystemNode::Failing { contents }) => Ok(Box::new(FailingReader {
                inner: Cursor::new(contents.clone()),
            })),
            Some(FilesystemNode::Directory { .. }) => IsADirectorySnafu { path }.fail(),
            Some(FilesystemNode::Unreadable) => Err(denied(path)),
            None => NotFoundSnafu { path }.fail(),
        }
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<(), FsError> {
        let mut root = self.root.write().map_err(|_| denied(path))?;
        let blocked = path
            .ancestors()
            .skip(1)
            .any(|ancestor| matches!(root.lookup(ancestor), Some(FilesystemNode::Unreadable)));
        if blocked || matches!(root.lookup(path), Some(FilesystemNode::Directory { .. })) {
            return Err(denied(path));
        }
        root.try_insert_path(
            path,
            FilesystemNode::File {
                contents: contents.to_vec(),
            },
        )
        .map_err(|_| NotADirectorySnafu { path }.build())
    }

    fn walk_files<'a>(
        &'a self,
        root: &Path,
    ) -> Box<dyn Iterator<Item = Result<PathBuf, FsError>> + 'a> {
        let mut out = Vec::new();
        match self.root.read() {
            Ok(tree) => match tree.lookup(root) {
                Some(node) => node.collect_files(root, &mut out),
                None => out.push(NotFoundSnafu { path: root }.fail()),
            },
            Err(_) => out.push(Err(denied(root))),
        }
        Box::new(out.into_iter())
    }

    fn kind(&self, path: &Path) -> EntryKind {
        let Ok(root) = self.root.read() else {
            return EntryKind::Missing;
        };
        match root.lookup(path) {
            Some(FilesystemNode::File { .. } | FilesystemNode::Failing { .. }) => EntryKind::File,
            Some(_) => EntryKind::Directory,
            None => EntryKind::Missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_insert_path_creates_intermediate_directories() {
        let mut root = FilesystemNode::root();
        root.try_insert_path(
            Path::new("/path/to/file1.txt"),
            FilesystemNode::File { contents: vec![] },
        )
        .expect("Insert failed");

        assert!(matches!(
            root.lookup(Path::new("/path/to")),
            Some(FilesystemNode::Directory { .. })
        ));
    }

    #[test]
    fn try_insert_path_below_file_fails() {
        let mut root = FilesystemNode::root();
        root.try_insert_path(Path::new("/a"), FilesystemNode::File { contents: vec![] })
            .expect("Insert failed");

        let result = root.try_insert_path(Path::new("/a/b"), FilesystemNode::root());
        assert!(result.is_err());
    }

    #[test]
    fn unreadable_directories_fail_listing_and_walks() {
        let fs = MemoryFs::new()
            .with_file("/a/ok.txt", "ok")
            .with_unreadable_dir("/a/locked");

        assert!(matches!(
            fs.list_dir(Path::new("/a/locked")),
            Err(FsError::Io { .. })
        ));
        let walked = fs.walk_files(Path::new("/a")).collect::<Vec<_>>();
        assert_eq!(walked.len(), 2);
        assert!(walked.iter().filter(|item| item.is_err()).count() == 1);
    }

    #[test]
    fn failing_files_deliver_their_prefix_then_error() {
        let fs = MemoryFs::new().with_failing_file("/a/broken.txt", "part");
        let mut reader = fs
            .open_read(Path::new("/a/broken.txt"))
            .expect("open failed");
        let mut buffer = [0; 16];

        assert_eq!(reader.read(&mut buffer).expect("first read failed"), 4);
        assert!(reader.read(&mut buffer).is_err());
        assert_eq!(fs.kind(Path::new("/a/broken.txt")), EntryKind::File);
        assert!(matches!(fs.read_file(Path::new("/a/broken.txt")), Err(FsError::Io { .. })));
    }
}
