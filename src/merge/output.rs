use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use snafu::ResultExt;
use tracing::{debug, info};

use super::collector::{CollectRequest, collect};
use super::serializer::{
    CollectSnafu, CreateOutputDirSnafu, CreateOutputSnafu, MergeError, MergeSummary, Progress,
    WriteSnafu, serialize,
};
use crate::config::ExtensionFilter;
use crate::executor::CancelToken;
use crate::filesystem::FileSystem;

const OUTPUT_FILE_PREFIX: &str = "merged_files_";

/// `~/Downloads`, or the current directory when there is no home directory.
pub fn default_output_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn output_file_name(timestamp: DateTime<Local>) -> String {
    format!(
        "{OUTPUT_FILE_PREFIX}{}.txt",
        timestamp.format("%Y%m%d_%H%M%S")
    )
}

/// Creates `dir` when absent and opens a fresh timestamped document inside it.
pub fn create_output(dir: &Path) -> Result<(PathBuf, BufWriter<File>), MergeError> {
    fs::create_dir_all(dir).context(CreateOutputDirSnafu { path: dir })?;
    let path = dir.join(output_file_name(Local::now()));
    let file = File::create(&path).context(CreateOutputSnafu { path: &path })?;
    Ok((path, BufWriter::new(file)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub output_path: PathBuf,
    pub summary: MergeSummary,
    /// Entries skipped while collecting.
    pub unreadable: usize,
}

/// Collects the requested files and serializes them into a new document in `output_dir`.
pub fn merge_selection(
    request: &CollectRequest,
    filter: &ExtensionFilter,
    output_dir: &Path,
    fs: &dyn FileSystem,
    progress: &mut dyn FnMut(Progress),
    cancel: &CancelToken,
) -> Result<MergeReport, MergeError> {
    let collection = collect(request, filter, fs, cancel).context(CollectSnafu)?;
    info!("Merging {} files", collection.files.len());

    let (output_path, mut writer) = create_output(output_dir)?;
    let summary = match serialize(&collection.files, &mut writer, fs, progress, cancel) {
        Ok(summary) => summary,
        Err(error) => {
            drop(writer);
            if let Err(remove_error) = fs::remove_file(&output_path) {
                debug!(
                    "Cannot remove partial output {}: {}",
                    output_path.display(),
                    remove_error
                );
            }
            return Err(error);
        }
    };

    writer
        .into_inner()
        .map_err(|error| error.into_error())
        .and_then(|file| file.sync_all())
        .context(WriteSnafu)?;

    Ok(MergeReport {
        output_path,
        summary,
        unreadable: collection.unreadable,
    })
}
