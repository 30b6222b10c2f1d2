//! Container document handling: collecting the selected files, serializing
//! them into one document and parsing such a document back into records.

mod collector;
mod decoder;
mod output;
mod parser;
mod serializer;

pub use collector::{CollectError, CollectRequest, Collection, collect};
pub use decoder::LossyDecoder;
pub use output::{MergeReport, create_output, default_output_dir, merge_selection, output_file_name};
pub use parser::{FormatError, MergeRecord, parse};
pub use serializer::{HEADER_PREFIX, MergeError, MergeSummary, Progress, SEPARATOR, serialize};
