//! Demo driver for the localq broker.
//!
//! Registers a logging consumer on every configured queue, pushes synthetic
//! traffic through them and prints per-queue counters once the backlog has
//! drained (or the deadline passes). Useful for eyeballing batching and
//! redelivery behaviour with `RUST_LOG=localq=debug`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use localq::config::{Config, QueueConfig};
use localq::{load_config, logging::init_logging, Broker, Consumer, MessageBatch};

/// Command-line interface for the demo driver.
#[derive(Debug, Parser)]
#[command(
    name = "localq",
    version,
    about = "Push synthetic traffic through an in-process localq broker"
)]
pub struct Cli {
    /// Path to a TOML config (defaults apply when omitted)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Messages sent to each queue
    #[arg(short, long, default_value_t = 20)]
    pub messages: usize,

    /// Send in groups of this size via send_batch (1 = single sends)
    #[arg(long, default_value_t = 1)]
    pub group: usize,

    /// Fail every Nth dispatch per queue (0 = never)
    #[arg(long, default_value_t = 0)]
    pub fail_every: u64,

    /// Ask for a retry of every Nth delivered message (0 = never)
    #[arg(long, default_value_t = 0)]
    pub retry_every: u64,

    /// Give up waiting for queues to drain after this many milliseconds
    #[arg(long, default_value_t = 10_000)]
    pub deadline_ms: u64,
}

fn echo_consumer(queue: &QueueConfig, config: &Config, cli: &Cli) -> Consumer {
    let dispatches = Arc::new(AtomicU64::new(0));
    let seen = Arc::new(AtomicU64::new(0));
    let fail_every = cli.fail_every;
    let retry_every = cli.retry_every;

    Consumer::new(queue.name.clone(), move |batch: MessageBatch| {
        let dispatches = Arc::clone(&dispatches);
        let seen = Arc::clone(&seen);
        async move {
            let n = dispatches.fetch_add(1, Ordering::Relaxed) + 1;
            info!(
                target: "localq::demo",
                queue = %batch.queue(),
                dispatch = n,
                size = batch.len(),
                "batch received"
            );
            for message in &batch {
                let k = seen.fetch_add(1, Ordering::Relaxed) + 1;
                if retry_every > 0 && k % retry_every == 0 {
                    message.retry()?;
                }
            }
            if fail_every > 0 && n % fail_every == 0 {
                anyhow::bail!("simulated failure on dispatch {n}");
            }
            Ok(())
        }
    })
    .max_batch_size(queue.batch_size(&config.consumer))
    .max_wait(queue.max_wait(&config.consumer))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();
    let mut config: Config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    if config.queues.is_empty() {
        config.queues.push(QueueConfig {
            name: "demo".to_string(),
            max_batch_size: None,
            max_wait_ms: None,
        });
    }

    let broker = Broker::new(config.broker)?;
    info!(
        target: "localq::demo",
        queues = config.queues.len(),
        max_attempts = broker.max_attempts(),
        "broker ready"
    );

    for queue_cfg in &config.queues {
        let queue = broker.get_or_create_queue(&queue_cfg.name);
        queue.set_consumer(echo_consumer(queue_cfg, &config, &cli))?;

        let group = cli.group.max(1);
        let bodies: Vec<String> = (0..cli.messages)
            .map(|i| format!("{}-payload-{i}", queue_cfg.name))
            .collect();
        for chunk in bodies.chunks(group) {
            if group == 1 {
                queue.send(chunk[0].clone());
            } else {
                queue.send_batch(chunk.iter().cloned());
            }
        }
    }

    let deadline = tokio::time::Instant::now() + Duration::from_millis(cli.deadline_ms);
    loop {
        let drained = broker.queue_names().iter().all(|name| {
            broker.get_queue(name).map_or(true, |q| {
                let s = q.stats();
                q.pending_len() == 0 && s.acked + s.dropped >= s.sent
            })
        });
        if drained || tokio::time::Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    for name in broker.queue_names() {
        if let Some(queue) = broker.get_queue(&name) {
            let s = queue.stats();
            println!(
                "{name}: sent={} flushes={} failed={} delivered={} acked={} requeued={} dropped={} pending={}",
                s.sent,
                s.flushes,
                s.failed_flushes,
                s.delivered,
                s.acked,
                s.requeued,
                s.dropped,
                queue.pending_len()
            );
        }
    }
    Ok(())
}
