//! Filesystem collaborator.
//!
//! Everything that touches the disk goes through the [`FileSystem`] trait so the
//! tree, the collector, the serializer and the diff-sync engine can be driven by
//! the native filesystem in the binary and by an in-memory tree in tests.

mod file_system;
mod native_fs;
#[cfg(test)]
mod tree;

pub use file_system::{DirEntry, EntryKind, FileSystem, FsError};
pub(crate) use file_system::IoSnafu;
pub use native_fs::{NativeFs, default_roots};
#[cfg(test)]
pub use tree::MemoryFs;
