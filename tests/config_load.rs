use std::time::Duration;

use localq::config::load_config;
use localq::Config;

#[test]
fn load_config_matches_toml() {
    let cfg: Config = load_config("localq.toml").expect("failed to load config");

    assert_eq!(cfg.broker.max_attempts, 3);
    assert_eq!(cfg.consumer.max_batch_size, 5);
    assert_eq!(cfg.consumer.max_wait_ms, 1000);
    assert_eq!(cfg.queues.len(), 2);

    let orders = &cfg.queues[0];
    assert_eq!(orders.name, "orders");
    assert_eq!(orders.batch_size(&cfg.consumer), 10);
    assert_eq!(orders.max_wait(&cfg.consumer), Duration::from_millis(50));

    let emails = &cfg.queues[1];
    assert_eq!(emails.batch_size(&cfg.consumer), 5);
    assert_eq!(emails.max_wait(&cfg.consumer), Duration::from_millis(1000));
}
