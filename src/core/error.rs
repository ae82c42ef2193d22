use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("consumer for queue '{consumer}' cannot be registered on queue '{queue}'")]
    ConsumerQueueMismatch { queue: String, consumer: String },

    #[error("invalid consumer: {0}")]
    InvalidConsumer(String),

    #[error("retry() on message '{id}' after its dispatch returned")]
    DispatchWindowClosed { id: String },

    #[error("broker must be created inside a tokio runtime")]
    NoRuntime,

    #[error("config error: {0}")]
    Config(String),
}
