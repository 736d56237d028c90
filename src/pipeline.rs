//! Orchestration of one run: a feed-processing task producing download jobs
//! and a worker task consuming them, joined through the bounded queue.
//!
//! Feeds are processed sequentially in the order given; the worker runs
//! concurrently and executes jobs in enqueue order. The run completes when
//! every feed has been processed and the queue has been drained.

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::feed::fetch_feed;
use crate::feed::model::Channel;
use crate::queue::{self, JobProducer, QUEUE_CAPACITY};
use crate::resolver::{channel_dir, Resolver};
use crate::worker::Worker;

/// Processes every feed URL and downloads whatever the resolver schedules.
///
/// Per-feed and per-item failures are logged and contained; only a panic in
/// the worker task surfaces as an error here.
pub async fn run(config: Arc<Config>, feed_urls: &[String]) -> Result<()> {
    let client = reqwest::Client::new();
    let (mut producer, consumer) = queue::bounded(QUEUE_CAPACITY);
    let worker_task = tokio::spawn(Worker::new(client.clone()).run(consumer));

    let resolver = Resolver::new(Arc::clone(&config));
    for url in feed_urls {
        tracing::info!(feed = %url, "Fetching feed");
        match fetch_feed(&client, url).await {
            Ok(feed) => process_channel(&resolver, &producer, &feed.channel).await,
            Err(e) => {
                tracing::error!(feed = %url, error = %e, "Cannot process feed");
            }
        }
    }

    producer.close();
    worker_task.await?;
    Ok(())
}

async fn process_channel(resolver: &Resolver, producer: &JobProducer, channel: &Channel) {
    let dir = channel_dir(&channel.title);
    tracing::info!(channel = %channel.title, dir = %dir, "Processing channel");

    for item in &channel.items {
        tracing::info!(
            published = %item
                .pub_date
                .map(|ts| ts.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            duration = %item.duration.map(|d| d.to_string()).unwrap_or_default(),
            title = %item.title,
            "Episode"
        );
        match resolver.resolve(&dir, item) {
            Ok(Some(job)) => {
                if let Err(e) = producer.enqueue(job).await {
                    // Only happens if the worker died; nothing more can be
                    // downloaded this run
                    tracing::error!(channel = %channel.title, error = %e, "Download queue gone");
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(channel = %channel.title, title = %item.title, error = %e, "Skipping episode");
            }
        }
    }
}
