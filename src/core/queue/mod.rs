//! Named queue: pending buffer, flush scheduling and retry reconciliation.
//!
//! Each queue owns an ordered `pending` list and at most one registered
//! [`Consumer`]. Sends append to `pending` and ask for a flush. The
//! scheduler runs at most one flush per queue at a time:
//!
//! - pending reached the consumer's `max_batch_size`: flush on the next
//!   runtime turn, so further synchronous sends join the same batch;
//! - otherwise: arm a single `max_wait` timer.
//!
//! A flush takes the whole pending list, hands it to the dispatcher with
//! the queue lock released, then puts retried (or, on failure, all)
//! messages back at the tail of whatever pending holds by then. Messages
//! that hit the attempt limit are dropped.

pub mod stats;

pub use stats::{FlushOutcome, FlushReport, QueueStats, QueueStatsSnapshot};

use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::core::batch::MessageBatch;
use crate::core::consumer::Consumer;
use crate::core::error::QueueError;
use crate::core::message::{Message, MessageBody};

type FlushCallback = Box<dyn FnOnce(&FlushReport) + Send>;

#[derive(Debug)]
enum FlushState {
    Idle,
    /// Waiting on the `max_wait` timer.
    Timer { ticket: u64, handle: JoinHandle<()> },
    /// Threshold reached; runs on the next runtime turn.
    Immediate { ticket: u64 },
    InFlight,
}

struct QueueState {
    pending: Vec<Message>,
    next_id: u64,
    consumer: Option<Consumer>,
    flush: FlushState,
    /// Bumped for every scheduled flush; a woken task whose ticket no
    /// longer matches has been superseded and does nothing.
    tickets: u64,
    on_flush: Vec<FlushCallback>,
}

pub struct Queue {
    name: String,
    max_attempts: u32,
    runtime: Handle,
    state: Mutex<QueueState>,
    stats: QueueStats,
    this: Weak<Queue>,
}

impl Queue {
    pub(crate) fn new(name: impl Into<String>, max_attempts: u32, runtime: Handle) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|this| Self {
            name,
            max_attempts,
            runtime,
            state: Mutex::new(QueueState {
                pending: Vec::new(),
                next_id: 0,
                consumer: None,
                flush: FlushState::Idle,
                tickets: 0,
                on_flush: Vec::new(),
            }),
            stats: QueueStats::default(),
            this: this.clone(),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn has_consumer(&self) -> bool {
        self.state.lock().consumer.is_some()
    }

    pub fn stats(&self) -> QueueStatsSnapshot {
        self.stats.snapshot()
    }

    /// Enqueues one message. Fire-and-forget: never waits on dispatch.
    ///
    /// On a current-thread runtime, every send issued before the scheduled
    /// flush gets to run joins that flush's batch. On a multi-thread runtime
    /// a worker may start the flush concurrently, so this coalescing is
    /// best-effort.
    pub fn send(&self, body: impl Into<MessageBody>) {
        let mut st = self.state.lock();
        let seq = st.next_id;
        st.next_id += 1;
        st.pending.push(Message::new(&self.name, seq, body.into()));
        trace!(target: "localq::queue", queue = %self.name, seq, "message enqueued");
        self.stats.inc_sent(1);
        self.schedule_locked(&mut st);
    }

    /// Enqueues several messages contiguously, in input order, with one
    /// flush request.
    pub fn send_batch<I, B>(&self, items: I)
    where
        I: IntoIterator<Item = B>,
        B: Into<MessageBody>,
    {
        let mut st = self.state.lock();
        let before = st.pending.len();
        for body in items {
            let seq = st.next_id;
            st.next_id += 1;
            st.pending.push(Message::new(&self.name, seq, body.into()));
        }
        let added = st.pending.len() - before;
        trace!(target: "localq::queue", queue = %self.name, added, "batch enqueued");
        self.stats.inc_sent(added as u64);
        self.schedule_locked(&mut st);
    }

    /// Replaces the registered consumer. Takes effect from the next flush.
    pub fn set_consumer(&self, consumer: Consumer) -> Result<(), QueueError> {
        if consumer.queue_name() != self.name {
            warn!(
                target: "localq::queue",
                queue = %self.name,
                consumer = %consumer.queue_name(),
                "rejecting consumer registered on the wrong queue"
            );
            return Err(QueueError::ConsumerQueueMismatch {
                queue: self.name.clone(),
                consumer: consumer.queue_name().to_owned(),
            });
        }
        consumer.validate()?;

        info!(
            target: "localq::queue",
            queue = %self.name,
            max_batch_size = consumer.batch_size(),
            max_wait_ms = consumer.wait().as_millis() as u64,
            "consumer registered"
        );
        let mut st = self.state.lock();
        st.consumer = Some(consumer);
        self.schedule_locked(&mut st);
        Ok(())
    }

    /// Drops the registration; pending then buffers without flushing.
    /// A dispatch already in flight still completes.
    pub fn clear_consumer(&self) {
        let mut st = self.state.lock();
        st.consumer = None;
        match std::mem::replace(&mut st.flush, FlushState::Idle) {
            FlushState::Timer { handle, .. } => handle.abort(),
            FlushState::InFlight => st.flush = FlushState::InFlight,
            FlushState::Idle | FlushState::Immediate { .. } => {}
        }
        debug!(target: "localq::queue", queue = %self.name, "consumer cleared");
    }

    /// Schedules a flush if one is warranted and none is pending or running.
    pub fn request_flush(&self) {
        let mut st = self.state.lock();
        self.schedule_locked(&mut st);
    }

    /// Calls `callback` once, after the next flush cycle completes,
    /// whatever its outcome. A panicking callback is logged and does not
    /// stop the queue from flushing again.
    pub fn on_next_flush(&self, callback: impl FnOnce(&FlushReport) + Send + 'static) {
        self.state.lock().on_flush.push(Box::new(callback));
    }

    /// Future resolving with the report of the next completed flush.
    ///
    /// The observer is registered when this is called, not when the future
    /// is first polled, so it can be set up before the sends it waits for.
    pub fn next_flush(&self) -> impl Future<Output = Option<FlushReport>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        self.on_next_flush(move |report| {
            let _ = tx.send(report.clone());
        });
        async move { rx.await.ok() }
    }

    fn schedule_locked(&self, st: &mut QueueState) {
        let Some(consumer) = st.consumer.as_ref() else {
            return;
        };
        if st.pending.is_empty() {
            return;
        }
        let full = st.pending.len() >= consumer.batch_size();
        let wait = consumer.wait();

        let supersede_timer = match st.flush {
            FlushState::InFlight | FlushState::Immediate { .. } => return,
            FlushState::Timer { .. } if !full => return,
            FlushState::Timer { .. } => true,
            FlushState::Idle => false,
        };
        if supersede_timer {
            // Threshold reached before the timer fired.
            if let FlushState::Timer { handle, .. } =
                std::mem::replace(&mut st.flush, FlushState::Idle)
            {
                handle.abort();
            }
        }

        let Some(queue) = self.this.upgrade() else {
            return;
        };
        st.tickets += 1;
        let ticket = st.tickets;

        if full {
            debug!(
                target: "localq::queue",
                queue = %self.name,
                pending = st.pending.len(),
                "batch threshold reached; flushing next turn"
            );
            st.flush = FlushState::Immediate { ticket };
            self.runtime.spawn(async move {
                tokio::task::yield_now().await;
                queue.flush(ticket).await;
            });
        } else {
            debug!(
                target: "localq::queue",
                queue = %self.name,
                pending = st.pending.len(),
                wait_ms = wait.as_millis() as u64,
                "arming flush timer"
            );
            let handle = self.runtime.spawn(async move {
                tokio::time::sleep(wait).await;
                queue.flush(ticket).await;
            });
            st.flush = FlushState::Timer { ticket, handle };
        }
    }

    /// One flush cycle for the scheduled flush identified by `ticket`.
    async fn flush(self: Arc<Self>, ticket: u64) {
        let (messages, dispatcher) = {
            let mut st = self.state.lock();
            let current = match &st.flush {
                FlushState::Timer { ticket: t, .. } | FlushState::Immediate { ticket: t } => *t,
                FlushState::Idle | FlushState::InFlight => return,
            };
            if current != ticket {
                return;
            }
            let Some(dispatcher) = st.consumer.as_ref().map(Consumer::dispatcher) else {
                st.flush = FlushState::Idle;
                return;
            };
            st.flush = FlushState::InFlight;
            (std::mem::take(&mut st.pending), dispatcher)
        };

        let (batch, dispatch) = MessageBatch::open(&self.name, &messages);
        debug!(target: "localq::queue", queue = %self.name, batch = messages.len(), "dispatching");

        // Own task, so a panicking dispatcher counts as a failed dispatch.
        let outcome = match self
            .runtime
            .spawn(async move { dispatcher.dispatch(batch).await })
            .await
        {
            Ok(Ok(())) => FlushOutcome::Success,
            Ok(Err(e)) => FlushOutcome::Failed(format!("{e:#}")),
            Err(e) => FlushOutcome::Failed(format!("dispatcher task aborted: {e}")),
        };
        let retry_flags = dispatch.close();

        let mut report = FlushReport::new(&self.name, messages.len(), outcome);
        let failed = !report.outcome.is_success();
        if let FlushOutcome::Failed(reason) = &report.outcome {
            warn!(
                target: "localq::queue",
                queue = %self.name,
                batch = report.delivered,
                error = %reason,
                "dispatch failed; retrying whole batch"
            );
        }

        let callbacks = {
            let mut st = self.state.lock();
            for (mut message, retry) in messages.into_iter().zip(retry_flags) {
                if !(failed || retry) {
                    report.acked += 1;
                    continue;
                }
                if message.record_attempt(self.max_attempts) {
                    st.pending.push(message);
                    report.requeued += 1;
                } else {
                    warn!(
                        target: "localq::queue",
                        queue = %self.name,
                        id = %message.id(),
                        attempts = message.attempts(),
                        "attempt limit reached; dropping message"
                    );
                    report.dropped += 1;
                }
            }
            st.flush = FlushState::Idle;
            std::mem::take(&mut st.on_flush)
        };

        self.stats.record_flush(&report);
        debug!(
            target: "localq::queue",
            queue = %self.name,
            acked = report.acked,
            requeued = report.requeued,
            dropped = report.dropped,
            "flush complete"
        );
        for callback in callbacks {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(&report))).is_err() {
                warn!(target: "localq::queue", queue = %self.name, "flush observer panicked");
            }
        }

        self.request_flush();
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.lock();
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("max_attempts", &self.max_attempts)
            .field("pending", &st.pending.len())
            .field("next_id", &st.next_id)
            .field("consumer", &st.consumer)
            .field("flush", &st.flush)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn queue(name: &str) -> Arc<Queue> {
        Queue::new(name, 3, Handle::current())
    }

    #[tokio::test]
    async fn ids_increase_from_zero_without_consumer() {
        let q = queue("ids");
        q.send("a");
        q.send_batch(["b", "c"]);
        q.send("d");

        let st = q.state.lock();
        let ids: Vec<&str> = st.pending.iter().map(Message::id).collect();
        assert_eq!(ids, vec!["ids-0", "ids-1", "ids-2", "ids-3"]);
        assert!(matches!(st.flush, FlushState::Idle));
    }

    #[tokio::test]
    async fn mismatched_consumer_is_rejected() {
        let q = queue("left");
        let c = Consumer::new("right", |_b: MessageBatch| async { anyhow::Ok(()) });
        let err = q.set_consumer(c).unwrap_err();
        assert_eq!(
            err,
            QueueError::ConsumerQueueMismatch {
                queue: "left".into(),
                consumer: "right".into(),
            }
        );
        assert!(!q.has_consumer());
    }

    #[tokio::test]
    async fn partial_batch_arms_single_timer() {
        let q = queue("timer");
        let c = Consumer::new("timer", |_b: MessageBatch| async { anyhow::Ok(()) })
            .max_batch_size(5)
            .max_wait(Duration::from_secs(60));
        q.set_consumer(c).unwrap();

        q.send("a");
        let first = match &q.state.lock().flush {
            FlushState::Timer { ticket, .. } => *ticket,
            other => panic!("expected timer, got {other:?}"),
        };
        q.send("b");
        match &q.state.lock().flush {
            FlushState::Timer { ticket, .. } => assert_eq!(*ticket, first),
            other => panic!("expected timer, got {other:?}"),
        };
    }

    #[tokio::test]
    async fn reaching_threshold_supersedes_timer() {
        let q = queue("upgrade");
        let c = Consumer::new("upgrade", |_b: MessageBatch| async { anyhow::Ok(()) })
            .max_batch_size(2)
            .max_wait(Duration::from_secs(60));
        q.set_consumer(c).unwrap();

        q.send("a");
        assert!(matches!(q.state.lock().flush, FlushState::Timer { .. }));
        q.send("b");
        assert!(matches!(q.state.lock().flush, FlushState::Immediate { .. }));

        let report = q.next_flush().await.unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(report.acked, 2);
        assert_eq!(q.pending_len(), 0);
    }

    #[tokio::test]
    async fn clear_consumer_cancels_timer_and_keeps_pending() {
        let q = queue("clear");
        let c = Consumer::new("clear", |_b: MessageBatch| async { anyhow::Ok(()) })
            .max_wait(Duration::from_secs(60));
        q.set_consumer(c).unwrap();
        q.send("a");
        q.clear_consumer();

        assert!(matches!(q.state.lock().flush, FlushState::Idle));
        assert_eq!(q.pending_len(), 1);
        assert!(!q.has_consumer());
    }
}
