//! A Tokio-based bounded worker pool that drains a shared sequence with a fixed
//! number of concurrent workers, applying an async executor to each item.

mod cursor;
mod error;
mod observer;
mod pool;
mod worker;

pub use error::EachError;
pub use observer::{PullEvent, PullObserver};
pub use pool::{concurrent_each_of_limit, EachOfLimit, FailurePolicy};
