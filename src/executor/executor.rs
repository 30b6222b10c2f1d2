use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::available_parallelism;

use compio::dispatcher::{Dispatcher, DispatcherBuilder};
use compio::runtime::spawn;
use derive_more::Display;
use futures::StreamExt;
use futures_channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use snafu::{ResultExt, Snafu};
use tracing::{debug, info};

use crate::merge::Progress;
use crate::selection::NodeId;

/// Default number of worker threads when unable to determine system parallelism
const DEFAULT_WORKER_THREADS: usize = 1;

/// Identifies which kind of work a submission belongs to.
///
/// A newer submission with the same key supersedes the older one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum TaskKey {
    #[display("expand {_0}")]
    Expand(NodeId),
    #[display("merge")]
    Merge,
    #[display("sync")]
    Sync,
    #[display("search")]
    Search,
}

/// Cooperative cancellation flag shared with a running job.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct Ticket {
    pub key: TaskKey,
    pub generation: u64,
    pub cancel: CancelToken,
}

/// Handed to every job on its worker thread.
pub struct JobContext<T> {
    ticket: Ticket,
    sender: UnboundedSender<Outcome<T>>,
}

impl<T> JobContext<T> {
    pub fn cancel(&self) -> &CancelToken {
        &self.ticket.cancel
    }

    pub fn report(&self, progress: Progress) {
        let message = Outcome::Progress {
            ticket: self.ticket.clone(),
            progress,
        };
        if self.sender.unbounded_send(message).is_err() {
            debug!("Progress for '{}' dropped, receiver is gone", self.ticket.key);
        }
    }
}

/// Message travelling from the workers back to the owner of the executor.
#[derive(Debug)]
pub enum Outcome<T> {
    Progress { ticket: Ticket, progress: Progress },
    Finished {
        ticket: Ticket,
        result: Result<T, TaskError>,
    },
}

impl<T> Outcome<T> {
    pub fn ticket(&self) -> &Ticket {
        match self {
            Outcome::Progress { ticket, .. } | Outcome::Finished { ticket, .. } => ticket,
        }
    }
}

/// Runs jobs on a worker pool and reports their results over a channel.
///
/// Every submission gets a generation number. Only the latest submission for
/// a [`TaskKey`] is current; results of superseded submissions are discarded
/// by [`BackgroundExecutor::next_outcome`].
pub struct BackgroundExecutor<T> {
    dispatcher: Dispatcher,
    sender: UnboundedSender<Outcome<T>>,
    receiver: UnboundedReceiver<Outcome<T>>,
    latest: HashMap<TaskKey, Ticket>,
    next_generation: u64,
    in_flight: usize,
}

impl<T: Send + 'static> BackgroundExecutor<T> {
    pub fn new() -> Result<Self, ExecutorCreationError> {
        let workers_num = Self::determine_worker_count();
        debug!("Using {} worker threads for background work", workers_num);

        let dispatcher = DispatcherBuilder::new()
            .worker_threads(workers_num)
            .build()
            .context(DispatcherSnafu)?;
        let (sender, receiver) = mpsc::unbounded();

        Ok(Self {
            dispatcher,
            sender,
            receiver,
            latest: HashMap::new(),
            next_generation: 0,
            in_flight: 0,
        })
    }

    /// Determines the optimal number of worker threads for background work
    fn determine_worker_count() -> NonZeroUsize {
        available_parallelism()
            .ok()
            .unwrap_or_else(|| {
                NonZeroUsize::new(DEFAULT_WORKER_THREADS).unwrap_or(NonZeroUsize::MIN)
            })
    }

    /// Dispatches `job` and supersedes any earlier submission for the same key.
    pub fn submit<F>(&mut self, key: TaskKey, job: F) -> Result<Ticket, ExecutionError>
    where
        F: FnOnce(&JobContext<T>) -> T + Send + 'static,
    {
        self.next_generation += 1;
        let ticket = Ticket {
            key,
            generation: self.next_generation,
            cancel: CancelToken::new(),
        };
        let context = JobContext {
            ticket: ticket.clone(),
            sender: self.sender.clone(),
        };

        let receiver = self
            .dispatcher
            .dispatch(move || async move { job(&context) })
            .map_err(|e| ExecutionError::TaskDispatchError {
                key,
                error: e.to_string(),
            })?;

        if let Some(previous) = self.latest.insert(key, ticket.clone()) {
            debug!(
                "Superseding '{}' generation {}",
                previous.key, previous.generation
            );
            previous.cancel.cancel();
        }
        self.in_flight += 1;
        info!("Dispatched '{}' generation {}", key, ticket.generation);

        // Forward the result to the outcome channel
        let sender = self.sender.clone();
        let forwarded = ticket.clone();
        spawn(async move {
            let result = match receiver.await {
                Ok(value) => Ok(value),
                Err(e) => {
                    debug!("Task '{}' was canceled: {}", forwarded.key, e);
                    Err(TaskError::CanceledError { source: e })
                }
            };

            let message = Outcome::Finished {
                ticket: forwarded,
                result,
            };
            if let Err(send_err) = sender.unbounded_send(message) {
                debug!("Failed to send task result: {}", send_err);
            }
        })
        .detach();

        Ok(ticket)
    }

    /// Cancels the current submission for `key`, making its result stale.
    pub fn cancel(&mut self, key: TaskKey) {
        if let Some(ticket) = self.latest.remove(&key) {
            ticket.cancel.cancel();
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.latest
            .get(&ticket.key)
            .is_some_and(|latest| latest.generation == ticket.generation)
    }

    /// Waits for the next outcome of a current submission.
    ///
    /// Stale outcomes are logged and dropped. Returns `None` once nothing is
    /// in flight.
    pub async fn next_outcome(&mut self) -> Option<Outcome<T>> {
        while self.in_flight > 0 {
            let outcome = self.receiver.next().await?;
            let current = self.is_current(outcome.ticket());

            if let Outcome::Finished { ticket, .. } = &outcome {
                self.in_flight -= 1;
                if current {
                    self.latest.remove(&ticket.key);
                }
            }
            if current {
                return Some(outcome);
            }
            debug!(
                "Discarding stale outcome of '{}' generation {}",
                outcome.ticket().key,
                outcome.ticket().generation
            );
        }
        None
    }
}

#[derive(Debug, Snafu)]
pub enum ExecutorCreationError {
    #[snafu(display("Failed to create task dispatcher"))]
    DispatcherError { source: std::io::Error },
}

#[derive(Debug, Snafu)]
pub enum ExecutionError {
    #[snafu(display("Failed to dispatch task '{}': {}", key, error))]
    TaskDispatchError { key: TaskKey, error: String },
}

#[derive(Debug, Snafu)]
pub enum TaskError {
    #[snafu(display("Task got cancelled"))]
    CanceledError {
        source: futures_channel::oneshot::Canceled,
    },
}
