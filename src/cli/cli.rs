use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::application::data::LogLevel;
use crate::config::DEFAULT_STATE_FILE_PATH;

/// Select files from a directory tree, merge them into one document and sync
/// edits of that document back to the original files.
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Cli {
    #[clap(long, short, default_value = "warn", value_enum, global = true)]
    pub log_level: LogLevel,

    /// Where the selection state and file types are stored
    #[clap(long, global = true, default_value = DEFAULT_STATE_FILE_PATH)]
    pub state: PathBuf,

    /// Tree roots; defaults to the filesystem roots
    #[clap(long = "root", global = true)]
    pub roots: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the tree below a path with its selection state
    Show {
        /// Defaults to the last shown path
        path: Option<PathBuf>,
        /// Number of levels to expand
        #[clap(long, short, default_value_t = 1)]
        depth: usize,
    },
    /// Toggle the selection of files or directories
    Select {
        #[clap(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Toggle whether selected directories include their subdirectories
    Recursive {
        #[clap(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Search file names below a directory
    Find {
        query: String,
        /// Directory to search; defaults to the last shown path
        #[clap(long = "in")]
        directory: Option<PathBuf>,
    },
    /// List or edit the file type categories
    Types {
        #[command(subcommand)]
        action: Option<TypesAction>,
    },
    /// Merge the selected files into one document
    Merge {
        /// Defaults to the downloads directory
        #[clap(long)]
        output_dir: Option<PathBuf>,
        /// Only include files of these categories
        #[clap(long = "type")]
        types: Vec<String>,
        /// Only include files with these extensions
        #[clap(long = "ext")]
        extensions: Vec<String>,
    },
    /// Compare a merged document with the files on disk
    Sync {
        document: PathBuf,
        /// Write back `all` changed files or only the listed ones
        #[clap(long, num_args = 1..)]
        apply: Vec<String>,
        /// Only show the differences
        #[clap(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum TypesAction {
    /// Add extensions to a category, creating it if needed
    Add {
        category: String,
        #[clap(required = true)]
        extensions: Vec<String>,
    },
    /// Remove a category
    Remove { category: String },
}
