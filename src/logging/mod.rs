use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

fn build_subscriber() -> impl tracing::Subscriber + Send + Sync {
    let filter: EnvFilter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let formatting_layer = fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(true)
        .compact();

    Registry::default().with(filter).with(formatting_layer)
}

/// Installs the global subscriber; fails if one is already set.
pub fn try_init_logging() -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    tracing::subscriber::set_global_default(build_subscriber())
}

pub fn init_logging() {
    if let Err(e) = try_init_logging() {
        eprintln!("[WARN] logging already initialised: {e}");
    }
}
