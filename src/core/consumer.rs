use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::core::batch::MessageBatch;
use crate::core::error::QueueError;

pub const DEFAULT_MAX_BATCH_SIZE: usize = 5;
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(1000);

/// Outcome reported by a dispatcher. `Err` triggers whole-batch redelivery.
pub type DispatchResult = anyhow::Result<()>;

/// Consumer-supplied batch handler.
///
/// Any `Fn(MessageBatch) -> impl Future<Output = DispatchResult>` closure
/// implements this trait, so most consumers are plain async closures.
pub trait Dispatcher: Send + Sync + 'static {
    fn dispatch(&self, batch: MessageBatch) -> BoxFuture<'static, DispatchResult>;
}

impl<F, Fut> Dispatcher for F
where
    F: Fn(MessageBatch) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DispatchResult> + Send + 'static,
{
    fn dispatch(&self, batch: MessageBatch) -> BoxFuture<'static, DispatchResult> {
        Box::pin(self(batch))
    }
}

/// Registration descriptor for the single consumer of a queue.
///
/// `max_batch_size` is a scheduling threshold rather than a cap: a burst of
/// synchronous sends may produce a larger batch.
#[derive(Clone)]
pub struct Consumer {
    queue_name: String,
    max_batch_size: usize,
    max_wait: Duration,
    dispatcher: Arc<dyn Dispatcher>,
}

impl Consumer {
    pub fn new(queue_name: impl Into<String>, dispatcher: impl Dispatcher) -> Self {
        Self {
            queue_name: queue_name.into(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_wait: DEFAULT_MAX_WAIT,
            dispatcher: Arc::new(dispatcher),
        }
    }

    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    pub fn max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = wait;
        self
    }

    pub fn max_wait_ms(self, ms: u64) -> Self {
        self.max_wait(Duration::from_millis(ms))
    }

    /// Same registration with a different dispatcher.
    pub fn with_dispatcher(&self, dispatcher: impl Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            ..self.clone()
        }
    }

    #[inline]
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.max_batch_size
    }

    #[inline]
    pub fn wait(&self) -> Duration {
        self.max_wait
    }

    pub(crate) fn dispatcher(&self) -> Arc<dyn Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub(crate) fn validate(&self) -> Result<(), QueueError> {
        if self.max_batch_size == 0 {
            return Err(QueueError::InvalidConsumer(format!(
                "max_batch_size for '{}' must be at least 1",
                self.queue_name
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("queue_name", &self.queue_name)
            .field("max_batch_size", &self.max_batch_size)
            .field("max_wait", &self.max_wait)
            .finish_non_exhaustive()
    }
}
