use crate::cursor::SharedCursor;
use crate::error::EachError;
use crate::observer::{PullEvent, PullObserver};
use crate::worker::{run_worker, RunShared};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::runtime::Handle as TokioHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

lazy_static::lazy_static! {
  static ref NEXT_RUN_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

const DEFAULT_POOL_NAME: &str = "each_of_limit";

/// What the remaining workers do after one worker's executor fails.
///
/// In every mode the run itself fails with the first surfaced error, and executor
/// calls already in flight are never interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
  /// Only the failing worker stops. Siblings keep draining the sequence in the
  /// background after the error has been returned.
  #[default]
  Continue,
  /// Siblings finish their current item and then stop pulling.
  StopPulling,
}

/// A bounded worker pool that drains one sequence with a fixed number of workers.
///
/// The configuration is reusable: each call to [`EachOfLimit::run`] builds a fresh
/// cursor and fresh workers, and nothing survives between runs.
pub struct EachOfLimit<T> {
  concurrency: usize,
  pool_name: Arc<String>,
  tokio_handle: Option<TokioHandle>,
  failure_policy: FailurePolicy,
  observer: Option<PullObserver<T>>,
}

impl<T> Clone for EachOfLimit<T> {
  fn clone(&self) -> Self {
    Self {
      concurrency: self.concurrency,
      pool_name: self.pool_name.clone(),
      tokio_handle: self.tokio_handle.clone(),
      failure_policy: self.failure_policy,
      observer: self.observer.clone(),
    }
  }
}

impl<T> fmt::Debug for EachOfLimit<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EachOfLimit")
      .field("concurrency", &self.concurrency)
      .field("pool_name", &self.pool_name)
      .field("has_tokio_handle", &self.tokio_handle.is_some())
      .field("failure_policy", &self.failure_policy)
      .field("has_observer", &self.observer.is_some())
      .finish()
  }
}

impl<T: Send + 'static> EachOfLimit<T> {
  /// Creates a pool that runs at most `concurrency` executor calls at once.
  ///
  /// `concurrency` is validated when the pool runs; zero fails with
  /// [`EachError::InvalidConcurrency`].
  pub fn new(concurrency: usize) -> Self {
    Self {
      concurrency,
      pool_name: Arc::new(DEFAULT_POOL_NAME.to_string()),
      tokio_handle: None,
      failure_policy: FailurePolicy::default(),
      observer: None,
    }
  }

  /// Sets the name used in logs and in [`PullEvent::pool_name`].
  pub fn name(mut self, pool_name: &str) -> Self {
    self.pool_name = Arc::new(pool_name.to_string());
    self
  }

  /// Spawns workers onto `tokio_handle` instead of the runtime current at `run` time.
  pub fn handle(mut self, tokio_handle: TokioHandle) -> Self {
    self.tokio_handle = Some(tokio_handle);
    self
  }

  pub fn failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
    self.failure_policy = failure_policy;
    self
  }

  /// Registers an observer called on every successful pull, replacing any previous one.
  ///
  /// The observer runs while the cursor is locked, so calls arrive in pull order
  /// (which is sequence order). Keep it short and non-blocking. A panicking
  /// observer is logged and otherwise ignored.
  pub fn on_pull(mut self, observer: impl Fn(PullEvent<'_, T>) + Send + Sync + 'static) -> Self {
    self.observer = Some(Arc::new(observer));
    self
  }

  pub fn concurrency(&self) -> usize {
    self.concurrency
  }

  pub fn pool_name(&self) -> &str {
    &self.pool_name
  }

  /// Applies `executor` to every item of `items` using `concurrency` workers.
  ///
  /// Items are handed out in sequence order, one per pull, and each worker awaits
  /// its executor call before pulling again. Resolves with `Ok(())` once every
  /// worker has observed exhaustion; executor results are discarded.
  ///
  /// # Errors
  /// Returns `EachError::InvalidConcurrency` if `concurrency` is zero.
  /// Returns `EachError::NoRuntime` if no handle was set and there is no current runtime.
  /// Returns `EachError::Executor` with the first executor error to surface.
  /// Returns `EachError::ExecutorPanicked` if an executor call panicked first.
  /// Returns `EachError::WorkerJoin` if a worker task could not be joined.
  ///
  /// After an error is returned, workers that are still running are detached.
  /// They complete on their own and their outcomes are dropped.
  ///
  /// Dropping the returned future (for example when it loses a
  /// `tokio::time::timeout`) detaches the workers the same way. They are not
  /// cancelled and keep draining the whole sequence in the background. To stop
  /// early, make the executor itself give up.
  pub async fn run<I, F, Fut, R, E>(&self, items: I, executor: F) -> Result<(), EachError<E>>
  where
    I: IntoIterator<Item = T>,
    I::IntoIter: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
  {
    if self.concurrency == 0 {
      return Err(EachError::InvalidConcurrency(self.concurrency));
    }

    let tokio_handle = match &self.tokio_handle {
      Some(handle) => handle.clone(),
      None => TokioHandle::try_current().map_err(|e| EachError::NoRuntime(e.to_string()))?,
    };

    let run_id = NEXT_RUN_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    let shared = Arc::new(RunShared {
      pool_name: self.pool_name.clone(),
      cursor: SharedCursor::new(items),
      executor,
      observer: self.observer.clone(),
      failure_policy: self.failure_policy,
      failure_signal: CancellationToken::new(),
    });

    self
      .drive(tokio_handle, run_id, shared)
      .instrument(info_span!("each_of_limit_run", pool_name = %*self.pool_name, %run_id))
      .await
  }

  async fn drive<I, F, Fut, R, E>(
    &self,
    tokio_handle: TokioHandle,
    run_id: u64,
    shared: Arc<RunShared<I, F>>,
  ) -> Result<(), EachError<E>>
  where
    I: Iterator<Item = T> + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
  {
    info!(
      concurrency = self.concurrency,
      failure_policy = ?self.failure_policy,
      "Run started. Spawning workers."
    );

    let mut pending = FuturesUnordered::new();
    for worker_id in 0..self.concurrency {
      let join_handle = tokio_handle.spawn(run_worker(worker_id, shared.clone()).instrument(info_span!(
        "each_of_limit_worker",
        pool_name = %*self.pool_name,
        %run_id,
        worker_id
      )));
      pending.push(join_handle.map(move |joined| (worker_id, joined)));
    }

    let mut processed = 0usize;
    while let Some((worker_id, joined)) = pending.next().await {
      match joined {
        Ok(Ok(summary)) => {
          debug!(
            worker_id = summary.worker_id,
            processed = summary.processed,
            "Worker observed exhaustion and exited."
          );
          processed += summary.processed;
        }
        Ok(Err(worker_error)) => {
          debug!(
            worker_id,
            detached_workers = pending.len(),
            "Surfacing first worker failure. Remaining workers continue detached."
          );
          return Err(worker_error);
        }
        Err(join_error) => {
          error!(worker_id, "Error joining worker: {:?}", join_error);
          return Err(EachError::WorkerJoin {
            worker_id,
            reason: join_error.to_string(),
          });
        }
      }
    }

    info!(processed, pulled = shared.cursor.pulled_count(), "Run finished. All workers exhausted.");
    Ok(())
  }
}

/// Applies `executor` to every item of `items`, with at most `concurrency` calls in flight.
///
/// Shorthand for `EachOfLimit::new(concurrency).run(items, executor)` on the
/// current Tokio runtime with the default [`FailurePolicy::Continue`].
pub async fn concurrent_each_of_limit<I, F, Fut, R, E>(
  items: I,
  concurrency: usize,
  executor: F,
) -> Result<(), EachError<E>>
where
  I: IntoIterator,
  I::IntoIter: Send + 'static,
  I::Item: Send + 'static,
  F: Fn(I::Item) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<R, E>> + Send + 'static,
  R: Send + 'static,
  E: Send + 'static,
{
  EachOfLimit::new(concurrency).run(items, executor).await
}
