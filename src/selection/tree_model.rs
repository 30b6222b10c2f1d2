use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use derive_more::Display;
use snafu::{OptionExt, Snafu, ensure};
use tracing::{debug, warn};

use super::path_index::{NodeState, PathIndex};
use crate::ext::{ErrorExt, PathExt};
use crate::filesystem::{DirEntry, FileSystem, FsError};

/// Handle of a materialized node inside a [`TreeModel`].
///
/// Slots of refreshed-away nodes are reused; the generation tells a stale
/// handle apart from the node that took its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("#{slot}")]
pub struct NodeId {
    slot: usize,
    generation: u32,
}

/// One materialized filesystem entry.
#[derive(Debug, Clone)]
pub struct Node {
    path: PathBuf,
    is_dir: bool,
    selected: bool,
    recursive: bool,
    /// Selected through an ancestor whose selection reaches subdirectories.
    inherits_recursion: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    children_loaded: bool,
    load_error: Option<String>,
}

impl Node {
    fn new(path: PathBuf, is_dir: bool, parent: Option<NodeId>) -> Self {
        Self {
            path,
            is_dir,
            selected: false,
            recursive: false,
            inherits_recursion: false,
            parent,
            children: Vec::new(),
            children_loaded: !is_dir,
            load_error: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> String {
        self.path.display_name()
    }

    pub fn is_directory(&self) -> bool {
        self.is_dir
    }

    pub fn selected(&self) -> bool {
        self.selected
    }

    /// Recursion flag; always `None` for files.
    pub fn recursive(&self) -> Option<bool> {
        self.is_dir.then_some(self.recursive)
    }

    pub fn children_loaded(&self) -> bool {
        self.children_loaded
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Whether this node's selection reaches its subdirectories.
    fn propagates_recursion(&self) -> bool {
        self.is_dir && self.selected && (self.recursive || self.inherits_recursion)
    }
}

/// Result of resolving a path against the materialized part of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Found(NodeId),
    /// The deepest materialized ancestor, which has to be expanded first.
    NeedsExpansion(NodeId),
}

/// Selected paths as handed to the collector.
///
/// Paths whose selection is already implied by a selected ancestor are left
/// out. `unresolved` holds index entries whose nodes are not materialized, so
/// their kind is still unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub files: BTreeSet<PathBuf>,
    pub directories: BTreeMap<PathBuf, bool>,
    pub unresolved: BTreeMap<PathBuf, bool>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty() && self.unresolved.is_empty()
    }
}

/// Lazily materialized view of the filesystem with selection state.
///
/// Owns every node and the [`PathIndex`] of explicit selections. Nodes are
/// stored in an arena; refreshing a directory frees the slots of its old
/// descendants for the next expansion.
#[derive(Debug, Clone)]
pub struct TreeModel {
    nodes: Vec<Node>,
    generations: Vec<u32>,
    free: Vec<usize>,
    roots: Vec<NodeId>,
    by_path: HashMap<PathBuf, NodeId>,
    index: PathIndex,
}

impl TreeModel {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>, index: PathIndex) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            generations: Vec::new(),
            free: Vec::new(),
            roots: Vec::new(),
            by_path: HashMap::new(),
            index,
        };
        for path in roots {
            if tree.by_path.contains_key(&path) {
                continue;
            }
            let id = tree.push_node(path, true, None);
            if let Some(state) = tree.index.get(&tree.nodes[id.slot].path) {
                let root = &mut tree.nodes[id.slot];
                root.selected = state.selected;
                root.recursive = state.recursive;
            }
            tree.roots.push(id);
        }
        tree
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn index(&self) -> &PathIndex {
        &self.index
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.is_live(id).then(|| &self.nodes[id.slot])
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.get(id).context(UnknownNodeSnafu { id })
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, TreeError> {
        ensure!(self.is_live(id), UnknownNodeSnafu { id });
        Ok(&mut self.nodes[id.slot])
    }

    fn is_live(&self, id: NodeId) -> bool {
        self.generations.get(id.slot) == Some(&id.generation)
    }

    fn live_nodes(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn find(&self, path: &Path) -> Option<NodeId> {
        self.by_path.get(path).copied()
    }

    /// Returns the path to list when `id` is a directory whose children are not loaded yet.
    pub fn begin_expand(&self, id: NodeId) -> Result<Option<PathBuf>, TreeError> {
        let node = self.node(id)?;
        Ok((node.is_dir && !node.children_loaded).then(|| node.path.clone()))
    }

    /// Materializes the children of `id` from a directory listing.
    ///
    /// A failed listing marks the node with an error and leaves it without
    /// children. Listings for nodes that are already loaded are ignored.
    pub fn finish_expand(
        &mut self,
        id: NodeId,
        listing: Result<Vec<DirEntry>, FsError>,
    ) -> Result<usize, TreeError> {
        let node = self.node(id)?;
        if node.children_loaded {
            debug!("Ignoring listing for already loaded {}", node.path.display());
            return Ok(0);
        }
        let parent_path = node.path.clone();

        let mut entries = match listing {
            Ok(entries) => entries,
            Err(error) => {
                warn!("Cannot list {}: {}", parent_path.display(), error.describe());
                let node = self.node_mut(id)?;
                node.children_loaded = true;
                node.load_error = Some(error.describe());
                return Ok(0);
            }
        };

        entries.sort_by(|a, b| {
            b.is_dir
                .cmp(&a.is_dir)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
                .then_with(|| a.name.cmp(&b.name))
        });

        let mut children = Vec::with_capacity(entries.len());
        for entry in entries {
            let child = self.push_node(parent_path.join(&entry.name), entry.is_dir, Some(id));
            self.derive_from_parent(child);
            children.push(child);
        }

        let count = children.len();
        let node = self.node_mut(id)?;
        node.children = children;
        node.children_loaded = true;
        node.load_error = None;
        debug!("Materialized {} children of {}", count, parent_path.display());
        Ok(count)
    }

    /// Expands `id` in place, listing through `fs` on the calling thread.
    pub fn expand(&mut self, id: NodeId, fs: &dyn FileSystem) -> Result<usize, TreeError> {
        match self.begin_expand(id)? {
            Some(path) => {
                let listing = fs.list_dir(&path);
                self.finish_expand(id, listing)
            }
            None => Ok(0),
        }
    }

    /// Drops the materialized children of `id` so the next expansion lists again.
    pub fn refresh(&mut self, id: NodeId) -> Result<(), TreeError> {
        let node = self.node(id)?;
        if !node.is_dir {
            return Ok(());
        }
        let descendants = self.descendants(id);
        for descendant in &descendants {
            self.release_node(*descendant);
        }
        debug!(
            "Released {} nodes, {} remain",
            descendants.len(),
            self.live_nodes()
        );
        let node = self.node_mut(id)?;
        node.children.clear();
        node.children_loaded = false;
        node.load_error = None;
        Ok(())
    }

    pub fn locate(&self, path: &Path) -> Result<Location, TreeError> {
        if let Some(id) = self.find(path) {
            return Ok(Location::Found(id));
        }

        let root = self
            .roots
            .iter()
            .copied()
            .filter(|root| path.starts_with(&self.nodes[root.slot].path))
            .max_by_key(|root| self.nodes[root.slot].path.components().count())
            .context(OutsideRootsSnafu { path })?;
        let relative = path
            .strip_prefix(&self.nodes[root.slot].path)
            .ok()
            .context(OutsideRootsSnafu { path })?;

        let mut current = root;
        for component in relative.components() {
            let node = &self.nodes[current.slot];
            if !node.is_dir {
                return NotFoundSnafu { path }.fail();
            }
            if !node.children_loaded {
                return Ok(Location::NeedsExpansion(current));
            }
            current = node
                .children
                .iter()
                .copied()
                .find(|child| self.nodes[child.slot].path.file_name() == Some(component.as_os_str()))
                .context(NotFoundSnafu { path })?;
        }
        Ok(Location::Found(current))
    }

    /// Expands every ancestor of `path` and returns its node.
    pub fn reveal(&mut self, path: &Path, fs: &dyn FileSystem) -> Result<NodeId, TreeError> {
        loop {
            match self.locate(path)? {
                Location::Found(id) => return Ok(id),
                Location::NeedsExpansion(id) => {
                    self.expand(id, fs)?;
                }
            }
        }
    }

    /// Flips the selection of `id`, records it in the index and cascades it
    /// to the materialized descendants.
    pub fn toggle_selected(&mut self, id: NodeId) -> Result<bool, TreeError> {
        let node = self.node_mut(id)?;
        node.selected = !node.selected;
        let (path, selected, recursive, is_dir) = (
            node.path.clone(),
            node.selected,
            node.recursive,
            node.is_dir,
        );

        if selected {
            self.index.set(path.clone(), NodeState::selected(recursive));
        } else {
            self.index.remove(&path);
        }
        if is_dir {
            let touched = self.cascade_selection(id);
            debug!("Cascaded selection of {} to {} nodes", path.display(), touched);
        }
        Ok(selected)
    }

    /// Flips the recursion flag of directory `id`.
    pub fn toggle_recursive(&mut self, id: NodeId) -> Result<bool, TreeError> {
        let node = self.node_mut(id)?;
        if !node.is_dir {
            return NotADirectorySnafu {
                path: node.path.clone(),
            }
            .fail();
        }
        node.recursive = !node.recursive;
        let (path, selected, recursive) = (node.path.clone(), node.selected, node.recursive);

        if selected {
            self.index.set(path, NodeState::selected(recursive));
            self.cascade_selection(id);
        }
        Ok(recursive)
    }

    /// Selected paths, with index entries for unmaterialized nodes.
    pub fn selection(&self) -> Selection {
        let mut selection = Selection::default();
        let mut stack = self.roots.iter().rev().copied().collect::<Vec<_>>();

        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.slot];
            let parent_selected = node
                .parent
                .is_some_and(|parent| self.nodes[parent.slot].selected);
            if node.selected {
                if node.is_dir && !node.inherits_recursion {
                    selection
                        .directories
                        .insert(node.path.clone(), node.recursive);
                } else if !node.is_dir && !parent_selected {
                    selection.files.insert(node.path.clone());
                }
            }
            stack.extend(node.children.iter().rev().copied());
        }

        for (path, state) in self.index.iter() {
            if !self.by_path.contains_key(path) {
                selection
                    .unresolved
                    .insert(path.to_path_buf(), state.recursive);
            }
        }
        selection
    }

    fn push_node(&mut self, path: PathBuf, is_dir: bool, parent: Option<NodeId>) -> NodeId {
        let node = Node::new(path.clone(), is_dir, parent);
        let id = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                NodeId {
                    slot,
                    generation: self.generations[slot],
                }
            }
            None => {
                self.nodes.push(node);
                self.generations.push(0);
                NodeId {
                    slot: self.nodes.len() - 1,
                    generation: 0,
                }
            }
        };
        self.by_path.insert(path, id);
        id
    }

    /// Invalidates every handle to `id` and makes its slot reusable.
    fn release_node(&mut self, id: NodeId) {
        let node = std::mem::replace(
            &mut self.nodes[id.slot],
            Node::new(PathBuf::new(), false, None),
        );
        if self.by_path.get(&node.path) == Some(&id) {
            self.by_path.remove(&node.path);
        }
        self.generations[id.slot] = self.generations[id.slot].wrapping_add(1);
        self.free.push(id.slot);
    }

    /// Applies the inheritance rule to `id`; explicit index entries win.
    fn derive_from_parent(&mut self, id: NodeId) {
        let Some(parent) = self.nodes[id.slot].parent else {
            return;
        };
        let parent_selected = self.nodes[parent.slot].selected;
        let parent_propagates = self.nodes[parent.slot].propagates_recursion();
        let explicit = self.index.get(&self.nodes[id.slot].path);

        let node = &mut self.nodes[id.slot];
        match explicit {
            Some(state) => {
                node.selected = state.selected;
                if node.is_dir {
                    node.recursive = state.recursive;
                }
            }
            None if node.is_dir => node.selected = parent_propagates,
            None => node.selected = parent_selected,
        }
        node.inherits_recursion = node.is_dir && parent_propagates;
    }

    /// Re-derives the state of every materialized descendant of `start`.
    ///
    /// Worklist traversal in display order. Descendants with an explicit index
    /// entry keep their own selection; their subtrees are re-derived from them.
    fn cascade_selection(&mut self, start: NodeId) -> usize {
        let mut touched = 0;
        let mut stack = vec![start];

        while let Some(current) = stack.pop() {
            let children = self.nodes[current.slot].children.clone();
            for &child in &children {
                self.derive_from_parent(child);
                touched += 1;
            }
            stack.extend(
                children
                    .iter()
                    .rev()
                    .copied()
                    .filter(|child| !self.nodes[child.slot].children.is_empty()),
            );
        }
        touched
    }

    fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack = self.nodes[id.slot].children.clone();
        while let Some(current) = stack.pop() {
            found.push(current);
            stack.extend(self.nodes[current.slot].children.iter().copied());
        }
        found
    }
}

#[derive(Debug, Snafu)]
pub enum TreeError {
    #[snafu(display("Unknown tree node {id}"))]
    UnknownNode { id: NodeId },
    #[snafu(display("{} is a file; only directories carry a recursion flag", path.display()))]
    NotADirectory { path: PathBuf },
    #[snafu(display("{} is not below any tree root", path.display()))]
    OutsideRoots { path: PathBuf },
    #[snafu(display("{} does not exist in the tree", path.display()))]
    NotFound { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::MemoryFs;
    use rstest::rstest;

    fn sample_fs() -> MemoryFs {
        MemoryFs::new()
            .with_file("/a/x.py", "print('x')")
            .with_file("/a/Notes.txt", "notes")
            .with_file("/a/b/y.txt", "y")
            .with_file("/a/b/c/z.txt", "z")
            .with_file("/a/B2/w.txt", "w")
    }

    fn tree_with(index: PathIndex) -> TreeModel {
        TreeModel::new([PathBuf::from("/")], index)
    }

    fn states(tree: &TreeModel, paths: &[&str]) -> Vec<bool> {
        paths
            .iter()
            .map(|p| {
                let id = tree.find(Path::new(p)).expect("node not materialized");
                tree.node(id).expect("unknown node").selected()
            })
            .collect()
    }

    fn expand_all(tree: &mut TreeModel, fs: &MemoryFs, paths: &[&str]) {
        for path in paths {
            let id = tree.reveal(Path::new(path), fs).expect("reveal failed");
            tree.expand(id, fs).expect("expand failed");
        }
    }

    #[test]
    fn roots_are_seeded_from_index() {
        let index = [(PathBuf::from("/"), NodeState::selected(true))]
            .into_iter()
            .collect();
        let tree = tree_with(index);

        let root = tree.node(tree.roots()[0]).expect("missing root");
        assert!(root.selected());
        assert_eq!(root.recursive(), Some(true));
        assert!(!root.children_loaded());
    }

    #[test]
    fn expansion_orders_directories_first_case_insensitively() {
        let fs = sample_fs();
        let mut tree = tree_with(PathIndex::new());
        let a = tree.reveal(Path::new("/a"), &fs).expect("reveal failed");
        tree.expand(a, &fs).expect("expand failed");

        let names = tree
            .node(a)
            .expect("missing node")
            .children()
            .iter()
            .map(|id| tree.node(*id).expect("missing child").name())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["b", "B2", "Notes.txt", "x.py"]);
    }

    #[test]
    fn selected_recursive_parent_selects_new_child_directories() {
        let fs = sample_fs();
        let mut tree = tree_with(PathIndex::new());
        let a = tree.reveal(Path::new("/a"), &fs).expect("reveal failed");
        tree.toggle_selected(a).expect("toggle failed");
        tree.toggle_recursive(a).expect("toggle failed");
        tree.expand(a, &fs).expect("expand failed");

        assert_eq!(states(&tree, &["/a/b", "/a/x.py"]), vec![true, true]);
        let b = tree.find(Path::new("/a/b")).expect("missing /a/b");
        assert_eq!(tree.node(b).expect("missing").recursive(), Some(false));
    }

    #[test]
    fn recursion_keeps_propagating_through_inherited_directories() {
        let fs = sample_fs();
        let mut tree = tree_with(PathIndex::new());
        let a = tree.reveal(Path::new("/a"), &fs).expect("reveal failed");
        tree.toggle_recursive(a).expect("toggle failed");
        tree.toggle_selected(a).expect("toggle failed");
        expand_all(&mut tree, &fs, &["/a", "/a/b", "/a/b/c"]);

        assert_eq!(
            states(&tree, &["/a/b/c", "/a/b/c/z.txt", "/a/b/y.txt"]),
            vec![true, true, true]
        );
    }

    #[test]
    fn selected_non_recursive_parent_selects_files_only() {
        let fs = sample_fs();
        let mut tree = tree_with(PathIndex::new());
        let a = tree.reveal(Path::new("/a"), &fs).expect("reveal failed");
        tree.toggle_selected(a).expect("toggle failed");
        tree.expand(a, &fs).expect("expand failed");

        assert_eq!(
            states(&tree, &["/a/x.py", "/a/Notes.txt", "/a/b", "/a/B2"]),
            vec![true, true, false, false]
        );
    }

    #[test]
    fn persisted_non_recursive_selection_applies_after_reload() {
        let fs = sample_fs();
        let index = [(PathBuf::from("/a"), NodeState::selected(false))]
            .into_iter()
            .collect();
        let mut tree = tree_with(index);
        expand_all(&mut tree, &fs, &["/a"]);

        assert_eq!(
            states(&tree, &["/a", "/a/x.py", "/a/Notes.txt", "/a/b", "/a/B2"]),
            vec![true, true, true, false, false]
        );
    }

    #[test]
    fn explicit_entry_wins_over_inheritance() {
        let fs = sample_fs();
        let index = [(PathBuf::from("/a/b"), NodeState::selected(true))]
            .into_iter()
            .collect();
        let mut tree = tree_with(index);
        expand_all(&mut tree, &fs, &["/a", "/a/b"]);

        assert_eq!(states(&tree, &["/a", "/a/b", "/a/b/c"]), vec![false, true, true]);
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn toggling_twice_restores_every_descendant(#[case] recursive: bool) {
        let fs = sample_fs();
        let index = [(PathBuf::from("/a/b/y.txt"), NodeState::selected(false))]
            .into_iter()
            .collect();
        let mut tree = tree_with(index);
        expand_all(&mut tree, &fs, &["/a", "/a/b", "/a/b/c", "/a/B2"]);
        let a = tree.find(Path::new("/a")).expect("missing /a");
        if recursive {
            tree.toggle_recursive(a).expect("toggle failed");
        }

        let all = [
            "/a/x.py",
            "/a/Notes.txt",
            "/a/b",
            "/a/b/y.txt",
            "/a/b/c",
            "/a/b/c/z.txt",
            "/a/B2",
            "/a/B2/w.txt",
        ];
        let before = states(&tree, &all);
        tree.toggle_selected(a).expect("toggle failed");
        assert_ne!(states(&tree, &all), before);
        tree.toggle_selected(a).expect("toggle failed");

        assert_eq!(states(&tree, &all), before);
        assert_eq!(tree.index().len(), 1);
    }

    #[test]
    fn deselecting_clears_inherited_but_keeps_explicit_descendants() {
        let fs = sample_fs();
        let mut tree = tree_with(PathIndex::new());
        expand_all(&mut tree, &fs, &["/a", "/a/b"]);
        let a = tree.find(Path::new("/a")).expect("missing /a");
        let x = tree.find(Path::new("/a/x.py")).expect("missing x");
        tree.toggle_selected(x).expect("toggle failed");
        tree.toggle_recursive(a).expect("toggle failed");
        tree.toggle_selected(a).expect("toggle failed");
        assert_eq!(states(&tree, &["/a/b", "/a/b/y.txt"]), vec![true, true]);
        assert!(tree.index().contains(Path::new("/a/x.py")));

        tree.toggle_selected(a).expect("toggle failed");

        assert_eq!(
            states(&tree, &["/a/b", "/a/b/y.txt", "/a/Notes.txt", "/a/x.py"]),
            vec![false, false, false, true]
        );
        assert!(!tree.index().contains(Path::new("/a")));
    }

    #[test]
    fn turning_recursion_off_clears_inherited_subdirectories() {
        let fs = sample_fs();
        let mut tree = tree_with(PathIndex::new());
        expand_all(&mut tree, &fs, &["/a", "/a/b"]);
        let a = tree.find(Path::new("/a")).expect("missing /a");
        tree.toggle_selected(a).expect("toggle failed");
        tree.toggle_recursive(a).expect("toggle failed");
        assert_eq!(states(&tree, &["/a/b", "/a/b/y.txt"]), vec![true, true]);

        tree.toggle_recursive(a).expect("toggle failed");

        assert_eq!(
            states(&tree, &["/a/x.py", "/a/b", "/a/b/y.txt"]),
            vec![true, false, false]
        );
        assert_eq!(
            tree.index().get(Path::new("/a")),
            Some(NodeState::selected(false))
        );
    }

    #[test]
    fn files_have_no_recursion_flag() {
        let fs = sample_fs();
        let mut tree = tree_with(PathIndex::new());
        let file = tree.reveal(Path::new("/a/x.py"), &fs).expect("reveal failed");

        assert_eq!(tree.node(file).expect("missing").recursive(), None);
        assert!(matches!(
            tree.toggle_recursive(file),
            Err(TreeError::NotADirectory { .. })
        ));
    }

    #[test]
    fn failed_listing_marks_node_without_aborting() {
        let fs = sample_fs().with_unreadable_dir("/a/locked");
        let mut tree = tree_with(PathIndex::new());
        let locked = tree.reveal(Path::new("/a/locked"), &fs).expect("reveal failed");

        let count = tree.expand(locked, &fs).expect("expand must not fail");

        let node = tree.node(locked).expect("missing");
        assert_eq!(count, 0);
        assert!(node.children_loaded());
        assert!(node.load_error().is_some_and(|e| e.contains("/a/locked")));
        assert!(matches!(
            tree.reveal(Path::new("/a/locked/inner"), &fs),
            Err(TreeError::NotFound { .. })
        ));
    }

    #[test]
    fn refresh_drops_children_and_rederives_on_next_expand() {
        let fs = sample_fs();
        let mut tree = tree_with(PathIndex::new());
        let a = tree.reveal(Path::new("/a"), &fs).expect("reveal failed");
        tree.expand(a, &fs).expect("expand failed");
        tree.refresh(a).expect("refresh failed");

        assert!(tree.find(Path::new("/a/x.py")).is_none());
        assert_eq!(tree.begin_expand(a).expect("unknown"), Some(PathBuf::from("/a")));

        tree.toggle_selected(a).expect("toggle failed");
        tree.expand(a, &fs).expect("expand failed");
        assert_eq!(states(&tree, &["/a/x.py"]), vec![true]);
    }

    #[test]
    fn repeated_refreshes_reuse_arena_slots() {
        let fs = sample_fs();
        let mut tree = tree_with(PathIndex::new());
        let a = tree.reveal(Path::new("/a"), &fs).expect("reveal failed");
        tree.expand(a, &fs).expect("expand failed");
        let allocated = tree.nodes.len();

        for _ in 0..10 {
            tree.refresh(a).expect("refresh failed");
            tree.expand(a, &fs).expect("expand failed");
        }

        assert_eq!(tree.nodes.len(), allocated);
        assert_eq!(tree.live_nodes(), allocated);
        assert!(tree.find(Path::new("/a/x.py")).is_some());
    }

    #[test]
    fn handles_of_refreshed_nodes_go_stale() {
        let fs = sample_fs();
        let mut tree = tree_with(PathIndex::new());
        let a = tree.reveal(Path::new("/a"), &fs).expect("reveal failed");
        tree.expand(a, &fs).expect("expand failed");
        let old = tree.find(Path::new("/a/x.py")).expect("missing node");

        tree.refresh(a).expect("refresh failed");
        tree.expand(a, &fs).expect("expand failed");
        let new = tree.find(Path::new("/a/x.py")).expect("missing node");

        assert_ne!(old, new);
        assert!(tree.get(old).is_none());
        assert!(matches!(
            tree.finish_expand(old, Ok(Vec::new())),
            Err(TreeError::UnknownNode { .. })
        ));
        assert_eq!(tree.node(new).expect("unknown").path(), Path::new("/a/x.py"));
    }

    #[test]
    fn stale_listing_for_loaded_node_is_ignored() {
        let fs = sample_fs();
        let mut tree = tree_with(PathIndex::new());
        let a = tree.reveal(Path::new("/a"), &fs).expect("reveal failed");
        tree.expand(a, &fs).expect("expand failed");

        let count = tree
            .finish_expand(a, Ok(vec![DirEntry::new("ghost", false)]))
            .expect("finish failed");

        assert_eq!(count, 0);
        assert!(tree.find(Path::new("/a/ghost")).is_none());
    }

    #[test]
    fn paths_outside_roots_are_rejected() {
        let tree = TreeModel::new([PathBuf::from("/a")], PathIndex::new());
        assert!(matches!(
            tree.locate(Path::new("/elsewhere")),
            Err(TreeError::OutsideRoots { .. })
        ));
    }

    #[test]
    fn selection_skips_paths_covered_by_selected_ancestors() {
        let fs = sample_fs();
        let index = [(PathBuf::from("/unlisted/file.txt"), NodeState::selected(false))]
            .into_iter()
            .collect();
        let mut tree = tree_with(index);
        expand_all(&mut tree, &fs, &["/a", "/a/b"]);
        let a = tree.find(Path::new("/a")).expect("missing /a");
        let z = tree.reveal(Path::new("/a/b/c/z.txt"), &fs).expect("reveal failed");
        tree.toggle_selected(a).expect("toggle failed");
        tree.toggle_selected(z).expect("toggle failed");

        let selection = tree.selection();

        assert_eq!(
            selection.directories,
            BTreeMap::from([(PathBuf::from("/a"), false)])
        );
        assert_eq!(
            selection.files,
            BTreeSet::from([PathBuf::from("/a/b/c/z.txt")])
        );
        assert_eq!(
            selection.unresolved,
            BTreeMap::from([(PathBuf::from("/unlisted/file.txt"), false)])
        );
    }
}
