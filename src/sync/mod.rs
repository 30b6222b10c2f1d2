mod diff;
mod engine;

pub use diff::{DiffHunk, DiffLine, LineDiff, LineKind};
pub use engine::{ApplySummary, DiffEntry, DiffSyncEngine, SyncError};
