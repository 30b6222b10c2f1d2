use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use compio::fs;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use tracing::{debug, info, warn};

use super::file_types::FileTypes;
use crate::ext::ErrorExt;
use crate::selection::{NodeState, PathIndex};

pub const DEFAULT_STATE_FILE_PATH: &str = ".mergeback/state.json";

pub fn default_state_file_path() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_FILE_PATH)
}

/// Everything that survives a restart.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateDocument {
    pub file_types: FileTypes,
    pub selected_states: BTreeMap<String, NodeState>,
    pub last_jump_path: String,
    pub last_search_query: String,
}

impl StateDocument {
    /// Reads the state document, falling back to defaults when it is missing or corrupt.
    pub async fn read(path: &Path) -> Self {
        debug!("Reading state file from {}", path.display());
        match Self::try_read(path).await {
            Ok(document) => {
                debug!(
                    "Loaded {} selection entries",
                    document.selected_states.len()
                );
                document
            }
            Err(error) if error.is_missing_file() => {
                info!("No existing state file found, starting fresh");
                Self::default()
            }
            Err(error) => {
                warn!("{}; using defaults", error.describe());
                Self::default()
            }
        }
    }

    pub async fn try_read(path: &Path) -> Result<Self, StateFileError> {
        let bytes = fs::read(path).await.context(ReadSnafu { path })?;
        serde_json::from_slice(&bytes).context(ParseSnafu { path })
    }

    /// Saves the document as pretty-printed JSON, creating parent directories.
    pub async fn write(&self, path: &Path) -> Result<(), StateFileError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .context(WriteSnafu { path })?;
        }

        let bytes = serde_json::to_vec_pretty(self).context(SerializeSnafu)?;
        fs::write(path, bytes).await.0.context(WriteSnafu { path })?;
        debug!("Saved state file to {}", path.display());
        Ok(())
    }

    pub fn path_index(&self) -> PathIndex {
        self.selected_states
            .iter()
            .map(|(path, state)| (PathBuf::from(path), *state))
            .collect()
    }

    pub fn store_index(&mut self, index: &PathIndex) {
        self.selected_states = index
            .iter()
            .map(|(path, state)| (path.to_string_lossy().into_owned(), state))
            .collect();
    }
}

impl StateFileError {
    pub fn is_missing_file(&self) -> bool {
        matches!(self, StateFileError::ReadError { source, .. } if source.kind() == ErrorKind::NotFound)
    }
}

#[derive(Debug, Snafu)]
pub enum StateFileError {
    #[snafu(display("Cannot read state file {}", path.display()))]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("State file {} is corrupt", path.display()))]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[snafu(display("Cannot serialize state"))]
    SerializeError { source: serde_json::Error },
    #[snafu(display("Cannot write state file {}", path.display()))]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> StateDocument {
        let mut document = StateDocument {
            last_jump_path: "/home/user/project".into(),
            last_search_query: "main".into(),
            ..Default::default()
        };
        document
            .selected_states
            .insert("/home/user/project".into(), NodeState::selected(true));
        document.file_types.add("Data", ["csv"]);
        document
    }

    #[compio::test]
    async fn write_then_read_round_trips() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("nested/state.json");

        sample().write(&path).await.expect("write failed");
        let loaded = StateDocument::try_read(&path).await.expect("read failed");

        assert_eq!(loaded, sample());
    }

    #[compio::test]
    async fn missing_file_yields_defaults() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("absent.json");

        let error = StateDocument::try_read(&path).await.expect_err("absent file read");
        assert!(error.is_missing_file());
        assert_eq!(StateDocument::read(&path).await, StateDocument::default());
    }

    #[compio::test]
    async fn corrupt_file_yields_defaults() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").expect("fixture write failed");

        let error = StateDocument::try_read(&path).await.expect_err("corrupt file parsed");
        assert!(matches!(error, StateFileError::ParseError { .. }));
        assert!(!error.is_missing_file());
        assert_eq!(StateDocument::read(&path).await, StateDocument::default());
    }

    #[compio::test]
    async fn missing_fields_default_individually() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"selected_states": {"/a": {"selected": true, "recursive": false}}}"#,
        )
        .expect("fixture write failed");

        let loaded = StateDocument::read(&path).await;

        assert_eq!(loaded.file_types, FileTypes::default());
        assert_eq!(loaded.last_jump_path, "");
        assert_eq!(
            loaded.path_index().get(Path::new("/a")),
            Some(NodeState::selected(false))
        );
    }

    #[test]
    fn store_index_replaces_selected_states() {
        let mut document = sample();
        let index: PathIndex = [(PathBuf::from("/b"), NodeState::selected(false))]
            .into_iter()
            .collect();

        document.store_index(&index);

        assert_eq!(
            document.selected_states.keys().collect::<Vec<_>>(),
            vec!["/b"]
        );
    }
}
