mod file_types;
mod state_file;

pub use file_types::{ExtensionFilter, FileTypes, UnknownCategoryError, normalize_extension};
pub use state_file::{DEFAULT_STATE_FILE_PATH, StateDocument, StateFileError, default_state_file_path};
