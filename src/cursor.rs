use std::fmt;
use std::iter::Fuse;

use parking_lot::Mutex;

/// An item handed out by the cursor, tagged with its position in the sequence.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Pulled<T> {
  pub(crate) index: usize,
  pub(crate) item: T,
}

struct CursorState<I: Iterator> {
  iter: Fuse<I>,
  next_index: usize,
}

/// The single point of arbitration between workers.
///
/// Every `pull` takes the lock, advances the underlying iterator exactly once and
/// assigns the next index, so no two workers can observe the same position and
/// items leave the cursor in sequence order. The iterator is fused: once it has
/// reported exhaustion it is never polled again.
pub(crate) struct SharedCursor<I: Iterator> {
  state: Mutex<CursorState<I>>,
}

impl<I: Iterator> fmt::Debug for SharedCursor<I> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let pulled = self.state.try_lock().map(|guard| guard.next_index);
    f.debug_struct("SharedCursor")
      .field("pulled", &pulled)
      .finish_non_exhaustive()
  }
}

impl<I: Iterator> SharedCursor<I> {
  pub(crate) fn new<S>(sequence: S) -> Self
  where
    S: IntoIterator<IntoIter = I>,
  {
    Self {
      state: Mutex::new(CursorState {
        iter: sequence.into_iter().fuse(),
        next_index: 0,
      }),
    }
  }

  /// Pulls the next item, or `None` once the sequence is exhausted.
  #[cfg(test)]
  pub(crate) fn pull(&self) -> Option<Pulled<I::Item>> {
    self.pull_with(|_, _| {})
  }

  /// Pulls the next item and runs `on_pull` while still holding the lock.
  ///
  /// `on_pull` therefore observes pulls in exactly the order they happen. It must
  /// not block and must not pull from this cursor again.
  pub(crate) fn pull_with<F>(&self, on_pull: F) -> Option<Pulled<I::Item>>
  where
    F: FnOnce(usize, &I::Item),
  {
    let mut state = self.state.lock();
    let item = state.iter.next()?;
    let index = state.next_index;
    state.next_index += 1;
    on_pull(index, &item);
    Some(Pulled { index, item })
  }

  /// Number of items handed out so far.
  pub(crate) fn pulled_count(&self) -> usize {
    self.state.lock().next_index
  }
}
