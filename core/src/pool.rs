//! Bounded fan-out shared by the per-host and per-switch collectors.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

/// Runs `work` once per item with at most `limit` futures in flight and waits for
/// all of them.
///
/// Dropping the returned future aborts every worker still running.
pub async fn for_each_bounded<I, T, F, Fut>(items: I, limit: usize, work: F)
where
    I: IntoIterator<Item = T>,
    F: Fn(T) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let semaphore: Arc<Semaphore> = Arc::new(Semaphore::new(limit.max(1)));
    let mut workers: JoinSet<()> = JoinSet::new();

    for item in items {
        let semaphore: Arc<Semaphore> = Arc::clone(&semaphore);
        let job: Fut = work(item);
        workers.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            job.await;
        });
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined
            && e.is_panic()
        {
            error!("collector worker panicked: {e}");
        }
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
