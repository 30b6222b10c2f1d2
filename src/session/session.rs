use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use snafu::{ResultExt, Snafu};
use tracing::{debug, info, warn};

use crate::config::{ExtensionFilter, FileTypes, StateDocument, StateFileError};
use crate::executor::{
    BackgroundExecutor, ExecutionError, ExecutorCreationError, Outcome, TaskError, TaskKey, Ticket,
};
use crate::ext::{ErrorExt, PathExt};
use crate::filesystem::{DirEntry, FileSystem, FsError};
use crate::merge::{CollectRequest, MergeError, MergeReport, Progress, merge_selection};
use crate::selection::{Location, NodeId, TreeError, TreeModel};
use crate::sync::{ApplySummary, DiffEntry, DiffSyncEngine, SyncError};

/// What a background job hands back to the session.
#[derive(Debug)]
pub enum JobOutput {
    Listing {
        node: NodeId,
        listing: Result<Vec<DirEntry>, FsError>,
    },
    Merge(Result<MergeReport, MergeError>),
    Sync(Result<Vec<DiffEntry>, SyncError>),
    Search(Vec<PathBuf>),
}

/// Notifications for the presentation layer, produced after the session
/// applied a background result to its own state.
#[derive(Debug)]
pub enum SessionEvent {
    Expanded { node: NodeId, children: usize },
    Progress { key: TaskKey, progress: Progress },
    Merged(Result<MergeReport, MergeError>),
    DiffsReady(Result<Vec<DiffEntry>, SyncError>),
    Found(Vec<PathBuf>),
    Failed { key: TaskKey, error: TaskError },
}

/// Single owner of the tree, the selection index and the persisted state.
///
/// All mutations go through `&mut self`. Slow work is submitted to the
/// background executor and its results are applied in [`Session::next_event`].
pub struct Session<F: FileSystem + 'static> {
    fs: Arc<F>,
    tree: TreeModel,
    state: StateDocument,
    state_path: PathBuf,
    executor: BackgroundExecutor<JobOutput>,
    pending: VecDeque<SessionEvent>,
}

impl<F: FileSystem + 'static> Session<F> {
    pub async fn open(
        fs: Arc<F>,
        roots: Vec<PathBuf>,
        state_path: PathBuf,
    ) -> Result<Self, SessionError> {
        let state = StateDocument::read(&state_path).await;
        let tree = TreeModel::new(roots, state.path_index());
        let executor = BackgroundExecutor::new().context(ExecutorCreationSnafu)?;
        debug!(
            "Opened session with {} roots and {} selection entries",
            tree.roots().len(),
            tree.index().len()
        );

        Ok(Self {
            fs,
            tree,
            state,
            state_path,
            executor,
            pending: VecDeque::new(),
        })
    }

    pub fn tree(&self) -> &TreeModel {
        &self.tree
    }

    pub fn state(&self) -> &StateDocument {
        &self.state
    }

    pub fn file_types(&self) -> &FileTypes {
        &self.state.file_types
    }

    /// Starts listing `node` in the background; `None` when it is already loaded.
    pub fn request_expand(&mut self, node: NodeId) -> Result<Option<Ticket>, SessionError> {
        let Some(path) = self.tree.begin_expand(node).context(TreeSnafu)? else {
            return Ok(None);
        };
        let fs = self.fs.clone();
        let ticket = self
            .executor
            .submit(TaskKey::Expand(node), move |_| JobOutput::Listing {
                node,
                listing: fs.list_dir(&path),
            })
            .context(DispatchSnafu)?;
        Ok(Some(ticket))
    }

    /// Expands `node` and waits for its listing. Other events are queued.
    pub async fn expand(&mut self, node: NodeId) -> Result<usize, SessionError> {
        if self.request_expand(node)?.is_none() {
            return Ok(0);
        }
        loop {
            match self.receive().await {
                Some(SessionEvent::Expanded {
                    node: expanded,
                    children,
                }) if expanded == node => return Ok(children),
                Some(event) => self.pending.push_back(event),
                None => return Ok(0),
            }
        }
    }

    /// Expands every unloaded directory up to `depth` levels below `node`.
    pub async fn expand_levels(&mut self, node: NodeId, depth: usize) -> Result<(), SessionError> {
        let mut level = vec![node];
        for _ in 0..depth {
            for &id in &level {
                self.request_expand(id)?;
            }
            while let Some(event) = self.receive().await {
                if !matches!(event, SessionEvent::Expanded { .. }) {
                    self.pending.push_back(event);
                }
            }
            level = level
                .iter()
                .filter_map(|id| self.tree.get(*id))
                .flat_map(|parent| parent.children().iter().copied())
                .filter(|child| self.tree.get(*child).is_some_and(|c| c.is_directory()))
                .collect();
        }
        Ok(())
    }

    /// Materializes the ancestors of `path` and returns its node.
    pub async fn reveal(&mut self, path: &Path) -> Result<NodeId, SessionError> {
        loop {
            match self.tree.locate(path).context(TreeSnafu)? {
                Location::Found(node) => return Ok(node),
                Location::NeedsExpansion(node) => {
                    self.expand(node).await?;
                }
            }
        }
    }

    pub async fn toggle_selected(&mut self, path: &Path) -> Result<bool, SessionError> {
        let node = self.reveal(path).await?;
        let selected = self.tree.toggle_selected(node).context(TreeSnafu)?;
        info!(
            "{} {}",
            if selected { "Selected" } else { "Deselected" },
            path.display()
        );
        self.persist().await;
        Ok(selected)
    }

    pub async fn toggle_recursive(&mut self, path: &Path) -> Result<bool, SessionError> {
        let node = self.reveal(path).await?;
        let recursive = self.tree.toggle_recursive(node).context(TreeSnafu)?;
        info!("Recursion of {} is now {}", path.display(), recursive);
        self.persist().await;
        Ok(recursive)
    }

    /// Forgets the children of `node`; the next expansion lists it again.
    pub fn refresh(&mut self, node: NodeId) -> Result<(), SessionError> {
        self.executor.cancel(TaskKey::Expand(node));
        self.tree.refresh(node).context(TreeSnafu)
    }

    /// Collects the current selection and serializes it into `output_dir`.
    pub fn request_merge(
        &mut self,
        filter: ExtensionFilter,
        output_dir: PathBuf,
    ) -> Result<Ticket, SessionError> {
        let selection = self.tree.selection();
        let fs = self.fs.clone();
        self.executor
            .submit(TaskKey::Merge, move |context| {
                let request = CollectRequest::resolve(&selection, fs.as_ref());
                let mut progress = |progress: Progress| context.report(progress);
                JobOutput::Merge(merge_selection(
                    &request,
                    &filter,
                    &output_dir,
                    fs.as_ref(),
                    &mut progress,
                    context.cancel(),
                ))
            })
            .context(DispatchSnafu)
    }

    /// Parses `document` and diffs its records against the filesystem.
    pub fn request_sync(&mut self, document: PathBuf) -> Result<Ticket, SessionError> {
        let engine = DiffSyncEngine::new(self.fs.clone());
        self.executor
            .submit(TaskKey::Sync, move |context| {
                let result = engine
                    .load_document(&document)
                    .map(|records| engine.compute_diffs(&records, context.cancel()));
                JobOutput::Sync(result)
            })
            .context(DispatchSnafu)
    }

    /// Searches file names below `directory`, case-insensitively.
    pub async fn request_find(
        &mut self,
        directory: PathBuf,
        query: &str,
    ) -> Result<Ticket, SessionError> {
        self.state.last_search_query = query.to_string();
        self.persist().await;

        let needle = query.to_lowercase();
        let fs = self.fs.clone();
        self.executor
            .submit(TaskKey::Search, move |context| {
                let mut found = Vec::new();
                for item in fs.walk_files(&directory) {
                    if context.cancel().is_canceled() {
                        break;
                    }
                    match item {
                        Ok(path) if path.display_name().to_lowercase().contains(&needle) => {
                            found.push(path)
                        }
                        Ok(_) => {}
                        Err(error) => debug!("Search skipped {}", error.describe()),
                    }
                }
                found.sort();
                JobOutput::Search(found)
            })
            .context(DispatchSnafu)
    }

    pub fn apply(&self, entry: &DiffEntry) -> Result<(), FsError> {
        DiffSyncEngine::new(self.fs.clone()).apply_selected(entry)
    }

    pub fn apply_all(&self, entries: &[DiffEntry]) -> ApplySummary {
        DiffSyncEngine::new(self.fs.clone()).apply_all(entries)
    }

    pub async fn set_last_jump_path(&mut self, path: &Path) {
        self.state.last_jump_path = path.to_string_lossy().into_owned();
        self.persist().await;
    }

    pub async fn update_file_types(&mut self, update: impl FnOnce(&mut FileTypes)) {
        update(&mut self.state.file_types);
        self.persist().await;
    }

    /// Next event for the presentation layer; `None` once the session is idle.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        match self.pending.pop_front() {
            Some(event) => Some(event),
            None => self.receive().await,
        }
    }

    async fn receive(&mut self) -> Option<SessionEvent> {
        let outcome = self.executor.next_outcome().await?;
        Some(match outcome {
            Outcome::Progress { ticket, progress } => SessionEvent::Progress {
                key: ticket.key,
                progress,
            },
            Outcome::Finished { ticket, result } => match result {
                Ok(output) => self.apply_output(output),
                Err(error) => {
                    warn!("Background task '{}' failed: {}", ticket.key, error);
                    SessionEvent::Failed {
                        key: ticket.key,
                        error,
                    }
                }
            },
        })
    }

    fn apply_output(&mut self, output: JobOutput) -> SessionEvent {
        match output {
            JobOutput::Listing { node, listing } => {
                let children = match self.tree.finish_expand(node, listing) {
                    Ok(children) => children,
                    Err(error) => {
                        warn!("Dropping listing: {}", error);
                        0
                    }
                };
                SessionEvent::Expanded { node, children }
            }
            JobOutput::Merge(result) => SessionEvent::Merged(result),
            JobOutput::Sync(result) => SessionEvent::DiffsReady(result),
            JobOutput::Search(found) => SessionEvent::Found(found),
        }
    }

    /// Writes the state document; failures are logged and leave the session usable.
    pub async fn persist(&mut self) {
        if let Err(error) = self.save().await {
            warn!("{}", error.describe());
        }
    }

    pub async fn save(&mut self) -> Result<(), StateFileError> {
        self.state.store_index(self.tree.index());
        self.state.write(&self.state_path).await
    }
}

#[derive(Debug, Snafu)]
pub enum SessionError {
    #[snafu(display("Failed to start background workers"))]
    ExecutorCreationError { source: ExecutorCreationError },
    #[snafu(display("Failed to submit background work"))]
    DispatchError { source: ExecutionError },
    #[snafu(display("Tree operation failed"))]
    TreeError { source: TreeError },
}
