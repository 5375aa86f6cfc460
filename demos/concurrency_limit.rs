use futures_each_limit::{EachOfLimit, FailurePolicy};
use std::time::Duration;
use tracing::info;

async fn long_task_fn(id: usize) -> Result<String, String> {
  info!("Item {} starting (concurrency demo - should take 1s)", id);
  tokio::time::sleep(Duration::from_secs(1)).await;
  let result = format!("Item {} finished", id);
  info!("{}", result);
  Ok(result)
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Concurrency Limit Demo (Limit: 2) ---");

  let concurrency_limit = 2;
  let num_items = 5;

  info!(
    "Draining {} items, each takes 1 sec. With concurrency {}, this should take ~{} secs.",
    num_items,
    concurrency_limit,
    (num_items as f32 / concurrency_limit as f32).ceil()
  );

  let pool = EachOfLimit::<usize>::new(concurrency_limit)
    .name("concurrency_pool")
    .failure_policy(FailurePolicy::Continue)
    .on_pull(|event| {
      info!("worker: {} processed item: {}", event.worker_id, event.item);
    });

  match pool.run(0..num_items, long_task_fn).await {
    Ok(()) => info!("All items processed."),
    Err(e) => tracing::error!("Run failed: {}", e),
  }

  info!("--- Concurrency Limit Demo End ---");
}
