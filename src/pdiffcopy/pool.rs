//! Bounded worker pool used for parallel hashing and block copies.
//!
//! Workers pull tasks from a shared queue and push `(task, result)` pairs
//! onto a bounded output channel in completion order. Consumers that need
//! input order must re-sort. The output channel provides backpressure: a
//! worker blocks on `send` until the consumer catches up. Dropping the
//! receiver or cancelling the token winds the pool down; no new tasks are
//! dispatched and the workers exit at the next boundary.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::pdiffcopy::errors::Result;

/// Run `worker` over `tasks` with up to `concurrency` invocations in
/// flight. Results arrive in completion order.
pub fn run<T, R, F, Fut>(
    tasks: Vec<T>,
    concurrency: usize,
    worker: F,
    cancel: CancellationToken,
) -> mpsc::Receiver<(T, Result<R>)>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    let concurrency = concurrency.max(1);
    let (out_tx, out_rx) = mpsc::channel(concurrency);
    let queue = Arc::new(Mutex::new(tasks.into_iter()));
    let worker = Arc::new(worker);

    let mut handles = Vec::with_capacity(concurrency);
    for _ in 0..concurrency {
        let queue = Arc::clone(&queue);
        let worker = Arc::clone(&worker);
        let out = out_tx.clone();
        let cancel = cancel.clone();

        handles.push(tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                // The lock is only held to pop the next task, never across
                // an await point.
                let task = match queue.lock() {
                    Ok(mut iter) => iter.next(),
                    Err(_) => break,
                };
                let Some(task) = task else { break };

                let result = tokio::select! {
                    () = cancel.cancelled() => break,
                    result = worker(task.clone()) => result,
                };
                if out.send((task, result)).await.is_err() {
                    break;
                }
            }
        }));
    }
    drop(out_tx);

    // Join the workers so the channel only closes once every in-flight
    // task has completed or been abandoned.
    tokio::spawn(async move {
        for handle in handles {
            let _ = handle.await;
        }
    });

    out_rx
}
