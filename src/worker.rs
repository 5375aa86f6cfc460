use crate::cursor::{Pulled, SharedCursor};
use crate::error::EachError;
use crate::observer::{self, PullEvent, PullObserver};
use crate::pool::FailurePolicy;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// State shared by every worker of a single run.
pub(crate) struct RunShared<I: Iterator, F> {
  pub(crate) pool_name: Arc<String>,
  pub(crate) cursor: SharedCursor<I>,
  pub(crate) executor: F,
  pub(crate) observer: Option<PullObserver<I::Item>>,
  pub(crate) failure_policy: FailurePolicy,
  /// Cancelled by the first worker whose executor fails or panics.
  pub(crate) failure_signal: CancellationToken,
}

/// What a worker reports after it has observed exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WorkerSummary {
  pub(crate) worker_id: usize,
  pub(crate) processed: usize,
}

/// Pull, execute, pull again; strictly sequential within one worker.
///
/// Returns once the cursor is exhausted, or with the error of this worker's own
/// failed executor call. Under `FailurePolicy::StopPulling` it also returns early
/// when a sibling has failed, but never in the middle of an executor call.
pub(crate) async fn run_worker<I, F, Fut, R, E>(
  worker_id: usize,
  shared: Arc<RunShared<I, F>>,
) -> Result<WorkerSummary, EachError<E>>
where
  I: Iterator,
  F: Fn(I::Item) -> Fut,
  Fut: Future<Output = Result<R, E>>,
{
  let mut processed = 0usize;

  loop {
    if shared.failure_policy == FailurePolicy::StopPulling && shared.failure_signal.is_cancelled() {
      debug!(worker_id, processed, "Sibling worker failed. Stopping before the next pull.");
      break;
    }

    let pulled = shared.cursor.pull_with(|index, item| {
      trace!(worker_id, index, "Worker processed item.");
      if let Some(observer) = &shared.observer {
        observer::notify(
          observer,
          PullEvent {
            pool_name: &shared.pool_name,
            worker_id,
            index,
            item,
          },
        );
      }
    });

    let Some(Pulled { index, item }) = pulled else {
      trace!(worker_id, processed, "Cursor exhausted. Worker exiting.");
      break;
    };

    let executor = &shared.executor;
    let outcome = AssertUnwindSafe(async move { executor(item).await })
      .catch_unwind()
      .await;

    match outcome {
      Ok(Ok(_discarded)) => processed += 1,
      Ok(Err(executor_error)) => {
        shared.failure_signal.cancel();
        debug!(worker_id, index, processed, "Executor failed. Worker stops pulling.");
        return Err(EachError::Executor(executor_error));
      }
      Err(_panic_payload) => {
        shared.failure_signal.cancel();
        error!(worker_id, index, processed, "Executor panicked. Worker stops pulling.");
        return Err(EachError::ExecutorPanicked { worker_id, index });
      }
    }
  }

  Ok(WorkerSummary { worker_id, processed })
}
