#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;

use localq::{Broker, BrokerConfig, MessageBatch};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(2);

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = localq::logging::try_init_logging();
    });
}

pub fn broker() -> Broker {
    init_logging();
    Broker::new(BrokerConfig::default()).expect("broker inside runtime")
}

/// `(id, body, attempts)` of every message in a batch, in order.
pub type Seen = Vec<(String, String, u32)>;

pub fn snapshot(batch: &MessageBatch) -> Seen {
    batch
        .iter()
        .map(|m| {
            (
                m.id().to_string(),
                String::from_utf8_lossy(m.body()).into_owned(),
                m.attempts(),
            )
        })
        .collect()
}

pub fn entry(id: &str, body: &str, attempts: u32) -> (String, String, u32) {
    (id.to_string(), body.to_string(), attempts)
}

pub fn bodies(seen: &Seen) -> Vec<&str> {
    seen.iter().map(|(_, b, _)| b.as_str()).collect()
}

/// Dispatcher that acknowledges everything and reports each batch on `tx`.
pub fn recording(
    tx: UnboundedSender<Seen>,
) -> impl Fn(MessageBatch) -> futures::future::Ready<localq::DispatchResult> + Send + Sync + 'static
{
    move |batch: MessageBatch| {
        let _ = tx.send(snapshot(&batch));
        futures::future::ready(Ok(()))
    }
}

pub async fn next_batch(rx: &mut UnboundedReceiver<Seen>) -> Seen {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a batch")
        .expect("dispatcher channel closed")
}
