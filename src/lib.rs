//! localq – an in-process message-queue broker for exercising queue
//! consumers locally.
//!
//! This crate exports
//!  * `core`    – messages, batches, consumers, queues and the broker registry
//!  * `config`  – TOML-driven broker and consumer configuration
//!  * `logging` – tracing subscriber setup
//!
//! Producers fetch a [`Queue`] from the [`Broker`] and `send` into it; the
//! queue batches pending messages for its registered [`Consumer`] and
//! redelivers retried or failed messages up to the broker's attempt limit.

// ───────────────────────────────────────────────────────────
// Public modules
// ───────────────────────────────────────────────────────────
pub mod config;
pub mod core;
pub mod logging;

// ───────────────────────────────────────────────────────────
// Re-exports
// ───────────────────────────────────────────────────────────
pub use config::{load_config, BrokerConfig, Config, DEFAULT_MAX_ATTEMPTS};
pub use crate::core::batch::{BatchMessage, MessageBatch};
pub use crate::core::broker::Broker;
pub use crate::core::consumer::{Consumer, DispatchResult, Dispatcher};
pub use crate::core::error::QueueError;
pub use crate::core::message::{Message, MessageBody};
pub use crate::core::queue::{FlushOutcome, FlushReport, Queue, QueueStatsSnapshot};
