//! Process-wide queue registry.
//!
//! Uses DashMap so that concurrent `get_or_create_queue` calls for the same
//! name always converge on a single [`Queue`] instance.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::runtime::Handle;
use tracing::debug;

use crate::config::BrokerConfig;
use crate::core::error::QueueError;
use crate::core::queue::Queue;

/// Name → [`Queue`] registry. Queues are created on first reference and
/// never removed.
#[derive(Debug)]
pub struct Broker {
    queues: DashMap<String, Arc<Queue>>,
    max_attempts: u32,
    runtime: Handle,
}

impl Broker {
    /// Creates a broker bound to the tokio runtime it is called from.
    pub fn new(config: BrokerConfig) -> Result<Self, QueueError> {
        let runtime = Handle::try_current().map_err(|_| QueueError::NoRuntime)?;
        Self::with_runtime(config, runtime)
    }

    /// Creates a broker whose flushes run on `runtime`.
    pub fn with_runtime(config: BrokerConfig, runtime: Handle) -> Result<Self, QueueError> {
        config.validate()?;
        Ok(Self {
            queues: DashMap::new(),
            max_attempts: config.max_attempts,
            runtime,
        })
    }

    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the queue called `name`, creating it if absent.
    pub fn get_or_create_queue(&self, name: &str) -> Arc<Queue> {
        if let Some(existing) = self.queues.get(name) {
            return Arc::clone(&*existing);
        }

        self.queues
            .entry(name.to_owned())
            .or_insert_with(|| {
                debug!(target: "localq::broker", queue = %name, "creating queue");
                Queue::new(name, self.max_attempts, self.runtime.clone())
            })
            .clone()
    }

    pub fn get_queue(&self, name: &str) -> Option<Arc<Queue>> {
        self.queues.get(name).map(|entry| Arc::clone(&*entry))
    }

    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
