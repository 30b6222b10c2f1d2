use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Persisted selection override for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeState {
    pub selected: bool,
    pub recursive: bool,
}

impl NodeState {
    pub fn selected(recursive: bool) -> Self {
        Self {
            selected: true,
            recursive,
        }
    }
}

/// Path-keyed overlay of explicit selections.
///
/// Only selected paths are stored; a missing entry means the path was never
/// explicitly selected. The index knows nothing about the filesystem or about
/// which nodes are currently materialized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathIndex {
    entries: BTreeMap<PathBuf, NodeState>,
}

impl PathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<NodeState> {
        self.entries.get(path).copied()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Records `state` for `path`; an unselected state removes the entry.
    pub fn set(&mut self, path: impl Into<PathBuf>, state: NodeState) {
        let path = path.into();
        if state.selected {
            self.entries.insert(path, state);
        } else {
            self.remove(&path);
        }
    }

    pub fn remove(&mut self, path: &Path) -> Option<NodeState> {
        self.entries.remove(path)
    }

    /// Entries in lexicographic path order.
    pub fn snapshot(&self) -> BTreeMap<PathBuf, NodeState> {
        self.entries.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, NodeState)> {
        self.entries
            .iter()
            .map(|(path, state)| (path.as_path(), *state))
    }

    /// Replaces the contents with `mapping`, dropping unselected entries.
    pub fn load(&mut self, mapping: impl IntoIterator<Item = (PathBuf, NodeState)>) {
        self.entries.clear();
        for (path, state) in mapping {
            if state.selected {
                self.entries.insert(path, state);
            } else {
                debug!("Dropping unselected index entry {}", path.display());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(PathBuf, NodeState)> for PathIndex {
    fn from_iter<T: IntoIterator<Item = (PathBuf, NodeState)>>(iter: T) -> Self {
        let mut index = PathIndex::new();
        index.load(iter);
        index
    }
}
