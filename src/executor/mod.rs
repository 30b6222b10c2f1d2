mod executor;

pub use executor::{
    BackgroundExecutor, CancelToken, ExecutionError, ExecutorCreationError, JobContext, Outcome,
    TaskError, TaskKey, Ticket,
};
