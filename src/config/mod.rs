use std::time::Duration;
use std::{fs, path::Path};

use serde::Deserialize;

use crate::core::consumer::{DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_WAIT};
use crate::core::error::QueueError;

/// Redeliveries allowed per message before it is dropped.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct BrokerConfig {
    pub max_attempts: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl BrokerConfig {
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.max_attempts == 0 {
            return Err(QueueError::Config(
                "broker.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Thresholds applied to consumers that don't override them.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct ConsumerDefaults {
    pub max_batch_size: usize,
    pub max_wait_ms: u64,
}

impl Default for ConsumerDefaults {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_wait_ms: DEFAULT_MAX_WAIT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub name: String,
    pub max_batch_size: Option<usize>,
    pub max_wait_ms: Option<u64>,
}

impl QueueConfig {
    pub fn batch_size(&self, defaults: &ConsumerDefaults) -> usize {
        self.max_batch_size.unwrap_or(defaults.max_batch_size)
    }

    pub fn max_wait(&self, defaults: &ConsumerDefaults) -> Duration {
        Duration::from_millis(self.max_wait_ms.unwrap_or(defaults.max_wait_ms))
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub broker: BrokerConfig,
    pub consumer: ConsumerDefaults,
    pub queues: Vec<QueueConfig>,
}

impl std::str::FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(raw)?;
        config.broker.validate()?;
        if config.consumer.max_batch_size == 0 {
            anyhow::bail!("consumer.max_batch_size must be at least 1");
        }
        Ok(config)
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, anyhow::Error> {
    let raw: String = fs::read_to_string(path)?;
    raw.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg: Config = "".parse().unwrap();
        assert_eq!(cfg.broker.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(cfg.consumer, ConsumerDefaults::default());
        assert!(cfg.queues.is_empty());
    }

    #[test]
    fn queue_overrides_fall_back_to_defaults() {
        let cfg: Config = r#"
            [broker]
            max_attempts = 5

            [consumer]
            max_batch_size = 10
            max_wait_ms = 250

            [[queues]]
            name = "orders"
            max_batch_size = 2

            [[queues]]
            name = "mail"
            max_wait_ms = 5
        "#
        .parse()
        .unwrap();

        assert_eq!(cfg.broker.max_attempts, 5);
        let orders = &cfg.queues[0];
        assert_eq!(orders.batch_size(&cfg.consumer), 2);
        assert_eq!(orders.max_wait(&cfg.consumer), Duration::from_millis(250));
        let mail = &cfg.queues[1];
        assert_eq!(mail.batch_size(&cfg.consumer), 10);
        assert_eq!(mail.max_wait(&cfg.consumer), Duration::from_millis(5));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let err = "[broker]\nmax_attempts = 0\n".parse::<Config>().unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_config("does/not/exist.toml").is_err());
    }
}
