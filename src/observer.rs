use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tracing::error;

/// Describes a single successful pull from the shared cursor.
#[derive(Debug)]
pub struct PullEvent<'a, T> {
  /// Name of the pool the worker belongs to.
  pub pool_name: &'a str,
  /// Id of the pulling worker, in `0..concurrency`.
  pub worker_id: usize,
  /// Zero-based position of the item in the sequence.
  pub index: usize,
  /// The item about to be handed to the executor.
  pub item: &'a T,
}

/// Callback invoked on every successful pull, in pull order.
pub type PullObserver<T> = Arc<dyn Fn(PullEvent<'_, T>) + Send + Sync + 'static>;

/// Runs the observer, containing any panic it raises.
pub(crate) fn notify<T>(observer: &PullObserver<T>, event: PullEvent<'_, T>) {
  let pool_name = event.pool_name;
  let worker_id = event.worker_id;
  let index = event.index;

  let result = std::panic::catch_unwind(AssertUnwindSafe(|| observer(event)));
  if result.is_err() {
    error!(
      pool_name = %pool_name,
      worker_id,
      index,
      "A pull observer panicked. The item is still handed to the executor."
    );
  }
}
