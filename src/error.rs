use thiserror::Error;

/// Errors that can end an `each_of_limit` run.
///
/// `E` is the executor's own error type. It is carried unchanged in
/// [`EachError::Executor`].
#[derive(Error, Debug, PartialEq)]
pub enum EachError<E> {
  #[error("Concurrency must be at least 1, got {0}")]
  InvalidConcurrency(usize),

  #[error("Executor failed: {0}")]
  Executor(E),

  #[error("Executor panicked on worker {worker_id} while processing item {index}")]
  ExecutorPanicked { worker_id: usize, index: usize },

  #[error("Worker {worker_id} could not be joined: {reason}")]
  WorkerJoin { worker_id: usize, reason: String },

  #[error("No Tokio runtime available to spawn workers onto: {0}")]
  NoRuntime(String),
}

impl<E> EachError<E> {
  /// Returns a reference to the executor's error, if this failure came from the executor.
  pub fn executor_error(&self) -> Option<&E> {
    match self {
      EachError::Executor(e) => Some(e),
      _ => None,
    }
  }

  /// Consumes `self` and returns the executor's error, if any.
  pub fn into_executor_error(self) -> Option<E> {
    match self {
      EachError::Executor(e) => Some(e),
      _ => None,
    }
  }
}
