//! Per-flush view handed to a consumer's dispatcher.
//!
//! A [`MessageBatch`] is built once per flush and is only meaningful while
//! the dispatcher call is outstanding. Each [`BatchMessage`] carries a
//! short-lived retry handle: once the dispatch returns the queue closes the
//! batch's [`DispatchWindow`] and further `retry()` calls are refused.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::error::QueueError;
use crate::core::message::{Message, MessageBody};

/// Open/closed state shared by every handle of one batch.
#[derive(Debug)]
pub struct DispatchWindow {
    open: AtomicBool,
}

impl DispatchWindow {
    fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
        }
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}

/// Read access to one delivered message plus its retry capability.
#[derive(Debug, Clone)]
pub struct BatchMessage {
    id: String,
    body: MessageBody,
    attempts: u32,
    retry_requested: Arc<AtomicBool>,
    window: Arc<DispatchWindow>,
}

impl BatchMessage {
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    /// Redeliveries so far; 0 on first delivery.
    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Asks for this message to be redelivered after the current dispatch.
    ///
    /// Idempotent while the dispatch is in progress. Once the dispatcher has
    /// returned the call changes nothing and reports
    /// [`QueueError::DispatchWindowClosed`].
    pub fn retry(&self) -> Result<(), QueueError> {
        if !self.window.is_open() {
            tracing::warn!(
                target: "localq::batch",
                id = %self.id,
                "retry() called outside the dispatch window; ignored"
            );
            return Err(QueueError::DispatchWindowClosed {
                id: self.id.clone(),
            });
        }
        self.retry_requested.store(true, Ordering::Release);
        Ok(())
    }

    /// Whether `retry()` has been recorded for the current dispatch.
    #[inline]
    pub fn retry_requested(&self) -> bool {
        self.retry_requested.load(Ordering::Acquire)
    }
}

/// Snapshot of one flush: the queue name and its messages in enqueue order.
#[derive(Debug, Clone)]
pub struct MessageBatch {
    queue: String,
    messages: Vec<BatchMessage>,
}

impl MessageBatch {
    #[inline]
    pub fn queue(&self) -> &str {
        &self.queue
    }

    #[inline]
    pub fn messages(&self) -> &[BatchMessage] {
        &self.messages
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BatchMessage> {
        self.messages.iter()
    }

    /// Calls `retry()` on every message of the batch.
    pub fn retry_all(&self) -> Result<(), QueueError> {
        self.messages.iter().try_for_each(BatchMessage::retry)
    }

    /// Builds the batch for `messages` and the ticket the queue keeps to
    /// close the window and read back the retry flags.
    pub(crate) fn open(queue: &str, messages: &[Message]) -> (Self, DispatchTicket) {
        let window = Arc::new(DispatchWindow::new());
        let flags: Vec<Arc<AtomicBool>> = messages
            .iter()
            .map(|_| Arc::new(AtomicBool::new(false)))
            .collect();

        let handles = messages
            .iter()
            .zip(&flags)
            .map(|(m, flag)| BatchMessage {
                id: m.id().to_owned(),
                body: m.body().clone(),
                attempts: m.attempts(),
                retry_requested: Arc::clone(flag),
                window: Arc::clone(&window),
            })
            .collect();

        let batch = Self {
            queue: queue.to_owned(),
            messages: handles,
        };
        (batch, DispatchTicket { window, flags })
    }
}

impl<'a> IntoIterator for &'a MessageBatch {
    type Item = &'a BatchMessage;
    type IntoIter = std::slice::Iter<'a, BatchMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

/// Queue-side half of an open batch.
#[derive(Debug)]
pub(crate) struct DispatchTicket {
    window: Arc<DispatchWindow>,
    flags: Vec<Arc<AtomicBool>>,
}

impl DispatchTicket {
    /// Closes the dispatch window and returns the retry flag of every
    /// message, in batch order.
    pub(crate) fn close(self) -> Vec<bool> {
        self.window.close();
        self.flags
            .iter()
            .map(|f| f.load(Ordering::Acquire))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn messages(n: u64) -> Vec<Message> {
        (0..n)
            .map(|i| Message::new("q", i, Bytes::from(format!("m{i}"))))
            .collect()
    }

    #[test]
    fn retry_is_recorded_while_open() {
        let msgs = messages(3);
        let (batch, ticket) = MessageBatch::open("q", &msgs);
        assert_eq!(batch.queue(), "q");
        assert_eq!(batch.len(), 3);

        batch.messages()[1].retry().unwrap();
        batch.messages()[1].retry().unwrap();

        assert_eq!(ticket.close(), vec![false, true, false]);
    }

    #[test]
    fn retry_after_close_is_rejected() {
        let msgs = messages(1);
        let (batch, ticket) = MessageBatch::open("q", &msgs);
        let held = batch.messages()[0].clone();
        assert_eq!(ticket.close(), vec![false]);

        let err = held.retry().unwrap_err();
        assert_eq!(
            err,
            QueueError::DispatchWindowClosed {
                id: "q-0".to_string()
            }
        );
        assert!(!held.retry_requested());
    }

    #[test]
    fn retry_all_marks_every_message() {
        let msgs = messages(4);
        let (batch, ticket) = MessageBatch::open("q", &msgs);
        batch.retry_all().unwrap();
        assert!(ticket.close().into_iter().all(|f| f));
    }

    #[test]
    fn handles_expose_id_body_and_attempts() {
        let msgs = messages(2);
        let (batch, _ticket) = MessageBatch::open("q", &msgs);
        let ids: Vec<&str> = batch.iter().map(BatchMessage::id).collect();
        assert_eq!(ids, vec!["q-0", "q-1"]);
        assert_eq!(batch.messages()[1].body().as_ref(), b"m1");
        assert_eq!(batch.messages()[1].attempts(), 0);
    }
}
