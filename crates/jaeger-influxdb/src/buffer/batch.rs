//! Size- and time-bounded batching of line protocol writes.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::WriterConfig;
use crate::error::{StoreError, StoreResult};
use crate::transport::WriteTransport;

/// Queues lines and flushes them to a [`WriteTransport`] in batches.
///
/// A batch is flushed when it reaches `max_batch_size` lines or when
/// `flush_interval` has passed since its first line, whichever comes first.
/// Failed flushes are logged and the batch is dropped.
pub struct BatchWriter {
    sender: Mutex<Option<mpsc::Sender<String>>>,
    flush_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl BatchWriter {
    /// Spawn the flush task. Must be called within a tokio runtime.
    pub fn start(transport: Arc<dyn WriteTransport>, config: &WriterConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let max_batch_size = config.max_batch_size.max(1);
        let interval = config.flush_interval();

        let join_handle = tokio::spawn(async move {
            tracing::info!(
                max_batch_size,
                interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
                "Starting batch flush task"
            );
            run_flush_loop(receiver, transport.as_ref(), max_batch_size, interval).await;
            tracing::info!("Batch flush task stopped");
        });

        Self {
            sender: Mutex::new(Some(sender)),
            flush_task: tokio::sync::Mutex::new(Some(join_handle)),
        }
    }

    /// Queue one line, waiting for space when the queue is full.
    pub async fn enqueue(&self, line: String) -> StoreResult<()> {
        let sender = self.sender.lock().clone().ok_or(StoreError::WriterClosed)?;
        sender
            .send(line)
            .await
            .map_err(|_| StoreError::WriterClosed)
    }

    /// Stop accepting lines, flush what is queued and wait for the flush task
    /// to exit. Later calls return immediately.
    pub async fn close(&self) {
        drop(self.sender.lock().take());

        let mut flush_task = self.flush_task.lock().await;
        if let Some(handle) = flush_task.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Batch flush task failed");
            }
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

async fn run_flush_loop(
    mut receiver: mpsc::Receiver<String>,
    transport: &dyn WriteTransport,
    max_batch_size: usize,
    interval: Duration,
) {
    let mut batch: Vec<String> = Vec::with_capacity(max_batch_size);
    // armed only while the batch is non-empty
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            received = receiver.recv() => match received {
                Some(line) => {
                    if batch.is_empty() {
                        deadline = Some(Instant::now() + interval);
                    }
                    batch.push(line);
                    if batch.len() >= max_batch_size {
                        flush(transport, &mut batch).await;
                        deadline = None;
                    }
                }
                None => {
                    flush(transport, &mut batch).await;
                    break;
                }
            },
            () = wait_for(deadline) => {
                flush(transport, &mut batch).await;
                deadline = None;
            }
        }
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn flush(transport: &dyn WriteTransport, batch: &mut Vec<String>) {
    if batch.is_empty() {
        return;
    }
    let lines = batch.len();
    let body = batch.join("\n");
    batch.clear();

    match transport.write(&body).await {
        Ok(()) => tracing::debug!(lines, "Flushed batch"),
        Err(e) => tracing::error!(lines, error = %e, "Failed to flush batch, dropping it"),
    }
}
