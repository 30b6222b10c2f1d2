use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, warn};

use super::collector::CollectError;
use super::decoder::LossyDecoder;
use crate::executor::CancelToken;
use crate::ext::ErrorExt;
use crate::filesystem::{FileSystem, FsError, IoSnafu};

/// Line framing every block header.
pub const SEPARATOR: &str = "==================================================";
pub const HEADER_PREFIX: &str = "FILE: ";

const CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
}

impl Progress {
    pub fn percent(&self) -> usize {
        if self.total == 0 {
            return 100;
        }
        self.done * 100 / self.total
    }
}

/// Destination of a container document that can drop a block it already wrote.
pub trait DocumentSink: Write + Seek {
    /// Discards everything from `offset` on and continues writing there.
    fn discard_from(&mut self, offset: u64) -> io::Result<()>;
}

impl DocumentSink for BufWriter<File> {
    fn discard_from(&mut self, offset: u64) -> io::Result<()> {
        self.flush()?;
        self.get_ref().set_len(offset)?;
        self.seek(SeekFrom::Start(offset))?;
        Ok(())
    }
}

impl DocumentSink for Cursor<Vec<u8>> {
    fn discard_from(&mut self, offset: u64) -> io::Result<()> {
        let len = usize::try_from(offset).map_err(io::Error::other)?;
        self.get_mut().truncate(len);
        self.set_position(offset);
        Ok(())
    }
}

/// Writes every file of `paths` as one block of the container document.
///
/// Files that cannot be opened are skipped before their header is written.
/// A read error in the middle of a file discards its partial block. Both
/// count as failures. Errors of `writer` abort the whole operation.
pub fn serialize<W: DocumentSink>(
    paths: &BTreeSet<PathBuf>,
    writer: &mut W,
    fs: &dyn FileSystem,
    progress: &mut dyn FnMut(Progress),
    cancel: &CancelToken,
) -> Result<MergeSummary, MergeError> {
    let mut ordered = paths.iter().collect::<Vec<_>>();
    ordered.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));

    let mut summary = MergeSummary {
        total: ordered.len(),
        ..Default::default()
    };
    let mut buffer = vec![0; CHUNK_SIZE];

    for (done, path) in ordered.into_iter().enumerate() {
        ensure!(!cancel.is_canceled(), CanceledSnafu);

        match write_block(path, writer, fs, &mut buffer)? {
            Ok(()) => summary.succeeded += 1,
            Err(error) => {
                warn!("Failed to merge file: {}", error.describe());
                summary.failed += 1;
            }
        }
        progress(Progress {
            done: done + 1,
            total: summary.total,
        });
    }

    writer.flush().context(WriteSnafu)?;
    debug!(
        "Serialized {} files ({} failed)",
        summary.succeeded, summary.failed
    );
    Ok(summary)
}

/// Outer error is fatal, inner error only concerns this file.
fn write_block<W: DocumentSink>(
    path: &Path,
    writer: &mut W,
    fs: &dyn FileSystem,
    buffer: &mut [u8],
) -> Result<Result<(), FsError>, MergeError> {
    let mut reader = match fs.open_read(path) {
        Ok(reader) => reader,
        Err(error) => return Ok(Err(error)),
    };

    let block_start = writer.stream_position().context(WriteSnafu)?;
    write!(
        writer,
        "\n{SEPARATOR}\n{HEADER_PREFIX}{}\n{SEPARATOR}\n\n",
        path.display()
    )
    .context(WriteSnafu)?;

    let mut decoder = LossyDecoder::new();
    let mut text = String::new();
    loop {
        let read = match reader.read(buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => {
                writer.discard_from(block_start).context(WriteSnafu)?;
                debug!("Dropped the partial block of {}", path.display());
                return Ok(Err::<(), _>(error).context(IoSnafu { path }));
            }
        };
        text.clear();
        decoder.decode(&buffer[..read], &mut text);
        writer.write_all(text.as_bytes()).context(WriteSnafu)?;
    }

    text.clear();
    decoder.finish(&mut text);
    text.push('\n');
    writer.write_all(text.as_bytes()).context(WriteSnafu)?;
    Ok(Ok(()))
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)))]
pub enum MergeError {
    #[snafu(display("Cannot collect files to merge"))]
    CollectError { source: CollectError },
    #[snafu(display("Cannot create output directory {}", path.display()))]
    CreateOutputDirError { path: PathBuf, source: io::Error },
    #[snafu(display("Cannot create output file {}", path.display()))]
    CreateOutputError { path: PathBuf, source: io::Error },
    #[snafu(display("Failed to write the merged document"))]
    WriteError { source: io::Error },
    #[snafu(display("Merge was canceled"))]
    Canceled,
}
