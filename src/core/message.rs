use bytes::Bytes;

/// Opaque producer-supplied payload. The broker never inspects it.
pub type MessageBody = Bytes;

/// One unit of data queued on a [`Queue`](crate::core::queue::Queue).
///
/// The id is assigned at enqueue time and survives redeliveries unchanged.
/// `attempts` counts redeliveries: it starts at 0 and is bumped once each
/// time the message goes back to pending after a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: String,
    body: MessageBody,
    attempts: u32,
}

impl Message {
    pub(crate) fn new(queue: &str, seq: u64, body: MessageBody) -> Self {
        Self {
            id: format_id(queue, seq),
            body,
            attempts: 0,
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Bumps the attempt counter and reports whether the message may be
    /// delivered again under `max_attempts`.
    pub(crate) fn record_attempt(&mut self, max_attempts: u32) -> bool {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts < max_attempts
    }
}

/// Builds the `"<queue>-<seq>"` identifier used for every message.
#[inline]
pub(crate) fn format_id(queue: &str, seq: u64) -> String {
    format!("{queue}-{seq}")
}
