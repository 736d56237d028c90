//! Bounded FIFO queue connecting feed processing to the download worker.
//!
//! Single producer, single consumer. The producer blocks on [`JobProducer::enqueue`]
//! when the queue is full (backpressure) and calls [`JobProducer::close`] once
//! every feed has been processed; the consumer observes "closed and empty" as
//! [`JobConsumer::dequeue`] returning `None`. Jobs come out in exactly the
//! order they went in, across all feeds.

use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

/// Maximum number of pending downloads.
pub const QUEUE_CAPACITY: usize = 15;

/// One pending transfer: where to fetch from and where to write.
///
/// Jobs have no identity beyond their fields; duplicates are legal and both
/// execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub url: Url,
    pub dest: PathBuf,
}

/// The queue is closed (or the consumer is gone); the job was not accepted.
#[derive(Debug, Error)]
#[error("download queue is closed")]
pub struct QueueClosed;

/// Producer half. Owned by the feed-processing task.
pub struct JobProducer {
    tx: Option<mpsc::Sender<DownloadJob>>,
}

/// Consumer half. Owned by the download worker.
pub struct JobConsumer {
    rx: mpsc::Receiver<DownloadJob>,
}

/// Creates a bounded job queue of the given capacity.
pub fn bounded(capacity: usize) -> (JobProducer, JobConsumer) {
    let (tx, rx) = mpsc::channel(capacity);
    (JobProducer { tx: Some(tx) }, JobConsumer { rx })
}

impl JobProducer {
    /// Adds a job to the queue, waiting for a free slot when the queue is
    /// full. Once accepted, the job will be dequeued exactly once.
    pub async fn enqueue(&self, job: DownloadJob) -> Result<(), QueueClosed> {
        match &self.tx {
            Some(tx) => tx.send(job).await.map_err(|_| QueueClosed),
            None => Err(QueueClosed),
        }
    }

    /// Closes the queue. Idempotent. Already-accepted jobs remain queued and
    /// will still be drained by the consumer.
    pub fn close(&mut self) {
        self.tx.take();
    }
}

impl JobConsumer {
    /// Removes the oldest pending job, waiting if the queue is currently
    /// empty. Returns `None` once the queue is closed *and* drained — the
    /// consumer's termination condition.
    pub async fn dequeue(&mut self) -> Option<DownloadJob> {
        self.rx.recv().await
    }
}
