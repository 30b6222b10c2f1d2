use std::path::{Path, PathBuf};
use std::sync::Arc;

use snafu::Snafu;
use snafu::prelude::*;
use tracing::{debug, info, warn};

use crate::application::RuntimeConfig;
use crate::application::render;
use crate::cli::{Command, TypesAction};
use crate::config::{ExtensionFilter, UnknownCategoryError};
use crate::executor::{TaskError, TaskKey};
use crate::filesystem::{FileSystem, NativeFs};
use crate::merge::{MergeError, default_output_dir};
use crate::session::{Session, SessionError, SessionEvent};
use crate::sync::{ApplySummary, DiffEntry, SyncError};

pub struct Application;

impl Application {
    pub async fn run(app_config: impl Into<RuntimeConfig>) -> Result<(), ApplicationError> {
        let app_config: RuntimeConfig = app_config.into();
        debug!("Runtime config: {:?}", app_config);
        render::configure_colors();

        let mut session = Session::open(
            Arc::new(NativeFs),
            app_config.roots.clone(),
            app_config.state_path.clone(),
        )
        .await
        .context(SessionSnafu)?;

        Self::execute(&mut session, app_config.command).await
    }

    pub async fn execute<F: FileSystem + 'static>(
        session: &mut Session<F>,
        command: Command,
    ) -> Result<(), ApplicationError> {
        match command {
            Command::Show { path, depth } => Self::show(session, path, depth).await,
            Command::Select { paths } => {
                for path in paths {
                    let path = absolute(&path)?;
                    let selected = session.toggle_selected(&path).await.context(SessionSnafu)?;
                    println!("[{}] {}", if selected { 'x' } else { ' ' }, path.display());
                }
                Ok(())
            }
            Command::Recursive { paths } => {
                for path in paths {
                    let path = absolute(&path)?;
                    let recursive = session
                        .toggle_recursive(&path)
                        .await
                        .context(SessionSnafu)?;
                    println!(
                        "{} {}",
                        if recursive { "(r)" } else { "( )" },
                        path.display()
                    );
                }
                Ok(())
            }
            Command::Find { query, directory } => Self::find(session, query, directory).await,
            Command::Types { action } => {
                Self::types(session, action).await;
                Ok(())
            }
            Command::Merge {
                output_dir,
                types,
                extensions,
            } => Self::merge(session, output_dir, types, extensions).await,
            Command::Sync {
                document,
                apply,
                dry_run,
            } => Self::sync(session, document, apply, dry_run).await,
        }
    }

    /// Explicit path, else the last shown path, else the first root.
    fn starting_point<F: FileSystem + 'static>(
        session: &Session<F>,
        path: Option<PathBuf>,
    ) -> Result<PathBuf, ApplicationError> {
        if let Some(path) = path {
            return absolute(&path);
        }
        let last = &session.state().last_jump_path;
        if !last.is_empty() {
            return Ok(PathBuf::from(last));
        }
        session
            .tree()
            .roots()
            .first()
            .and_then(|root| session.tree().get(*root))
            .map(|root| root.path().to_path_buf())
            .context(NoRootsSnafu)
    }

    async fn show<F: FileSystem + 'static>(
        session: &mut Session<F>,
        path: Option<PathBuf>,
        depth: usize,
    ) -> Result<(), ApplicationError> {
        let path = Self::starting_point(session, path)?;
        let node = session.reveal(&path).await.context(SessionSnafu)?;
        session
            .expand_levels(node, depth)
            .await
            .context(SessionSnafu)?;
        session.set_last_jump_path(&path).await;

        render::print_tree(session.tree(), node, depth);
        Ok(())
    }

    async fn find<F: FileSystem + 'static>(
        session: &mut Session<F>,
        query: String,
        directory: Option<PathBuf>,
    ) -> Result<(), ApplicationError> {
        let directory = Self::starting_point(session, directory)?;
        session
            .request_find(directory, &query)
            .await
            .context(SessionSnafu)?;

        while let Some(event) = session.next_event().await {
            match event {
                SessionEvent::Found(paths) => {
                    info!("Found {} matches for '{}'", paths.len(), query);
                    for path in paths {
                        let selected = session
                            .tree()
                            .find(&path)
                            .and_then(|id| session.tree().get(id))
                            .is_some_and(|node| node.selected())
                            || session.tree().index().contains(&path);
                        println!("[{}] {}", if selected { 'x' } else { ' ' }, path.display());
                    }
                }
                other => Self::unexpected(other)?,
            }
        }
        Ok(())
    }

    async fn types<F: FileSystem + 'static>(session: &mut Session<F>, action: Option<TypesAction>) {
        match action {
            None => {
                for (category, extensions) in session.file_types().categories() {
                    let extensions = extensions
                        .iter()
                        .map(String::as_str)
                        .collect::<Vec<_>>()
                        .join(" ");
                    println!("{category}: {extensions}");
                }
            }
            Some(TypesAction::Add {
                category,
                extensions,
            }) => {
                session
                    .update_file_types(|types| types.add(category, extensions))
                    .await;
            }
            Some(TypesAction::Remove { category }) => {
                if session.file_types().get(&category).is_none() {
                    warn!("There is no file type category '{}'", category);
                    return;
                }
                session
                    .update_file_types(|types| {
                        types.remove(&category);
                    })
                    .await;
            }
        }
    }

    async fn merge<F: FileSystem + 'static>(
        session: &mut Session<F>,
        output_dir: Option<PathBuf>,
        types: Vec<String>,
        extensions: Vec<String>,
    ) -> Result<(), ApplicationError> {
        let filter = ExtensionFilter::from_categories(session.file_types(), &types, &extensions)
            .context(FileTypesSnafu)?;
        let output_dir = match output_dir {
            Some(dir) => absolute(&dir)?,
            None => default_output_dir(),
        };
        session
            .request_merge(filter, output_dir)
            .context(SessionSnafu)?;

        while let Some(event) = session.next_event().await {
            match event {
                SessionEvent::Progress { progress, .. } => render::print_progress(progress),
                SessionEvent::Merged(result) => {
                    render::print_merge_report(&result.context(MergeSnafu)?);
                }
                other => Self::unexpected(other)?,
            }
        }
        Ok(())
    }

    async fn sync<F: FileSystem + 'static>(
        session: &mut Session<F>,
        document: PathBuf,
        apply: Vec<String>,
        dry_run: bool,
    ) -> Result<(), ApplicationError> {
        let document = absolute(&document)?;
        session.request_sync(document).context(SessionSnafu)?;

        let mut entries = Vec::new();
        while let Some(event) = session.next_event().await {
            match event {
                SessionEvent::DiffsReady(result) => entries = result.context(SyncSnafu)?,
                other => Self::unexpected(other)?,
            }
        }

        if entries.is_empty() {
            println!("Nothing to apply, every file matches the document");
            return Ok(());
        }
        for entry in &entries {
            render::print_diff(entry);
        }
        if dry_run || apply.is_empty() {
            return Ok(());
        }

        let summary = if apply.iter().any(|target| target == "all") {
            session.apply_all(&entries)
        } else {
            Self::apply_listed(session, &entries, &apply)?
        };
        render::print_apply_summary(summary);
        Ok(())
    }

    fn apply_listed<F: FileSystem + 'static>(
        session: &Session<F>,
        entries: &[DiffEntry],
        targets: &[String],
    ) -> Result<ApplySummary, ApplicationError> {
        let mut chosen = Vec::new();
        for target in targets {
            let target = absolute(Path::new(target))?;
            match entries.iter().find(|entry| entry.path == target) {
                Some(entry) => chosen.push(entry.clone()),
                None => warn!("{} has no pending changes", target.display()),
            }
        }
        Ok(session.apply_all(&chosen))
    }

    fn unexpected(event: SessionEvent) -> Result<(), ApplicationError> {
        match event {
            SessionEvent::Failed { key, error } => Err(error).context(TaskSnafu { key }),
            other => {
                debug!("Ignoring event {:?}", other);
                Ok(())
            }
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf, ApplicationError> {
    std::path::absolute(path).context(InvalidPathSnafu { path })
}

#[derive(Debug, Snafu)]
pub enum ApplicationError {
    #[snafu(display("Critical failure encountered while running the session"))]
    SessionError { source: SessionError },
    #[snafu(display("Cannot resolve path {}", path.display()))]
    InvalidPathError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("There are no tree roots to start from"))]
    NoRootsError,
    #[snafu(display("Invalid file type selection"))]
    FileTypesError { source: UnknownCategoryError },
    #[snafu(display("Merge failed"))]
    MergeError { source: MergeError },
    #[snafu(display("Sync failed"))]
    SyncError { source: SyncError },
    #[snafu(display("Background task '{key}' failed"))]
    TaskError { key: TaskKey, source: TaskError },
}
