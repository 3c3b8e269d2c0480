// tests/config_load.rs
use std::path::PathBuf;

use contest_alerts::config::{
    AppConfig, ENV_CONFIG_PATH, ENV_DISCORD_CHANNEL_ID, ENV_DISCORD_TOKEN, ENV_LEDGER_PATH,
    ENV_POLL_INTERVAL_SECS,
};
use serial_test::serial;

const VARS: &[&str] = &[
    ENV_CONFIG_PATH,
    ENV_LEDGER_PATH,
    ENV_POLL_INTERVAL_SECS,
    ENV_DISCORD_TOKEN,
    ENV_DISCORD_CHANNEL_ID,
];

fn clear_env() {
    for k in VARS {
        std::env::remove_var(k);
    }
}

#[test]
#[serial]
fn env_overrides_file_values() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alerts.toml");
    std::fs::write(
        &path,
        r#"
ledger_path = "from_file.json"
poll_interval_secs = 900

[[feeds]]
name = "kaggle"
url = "https://example.test/kaggle.rss"
"#,
    )
    .unwrap();

    std::env::set_var(ENV_CONFIG_PATH, &path);
    std::env::set_var(ENV_POLL_INTERVAL_SECS, "120");
    std::env::set_var(ENV_DISCORD_TOKEN, "bot-token");
    std::env::set_var(ENV_DISCORD_CHANNEL_ID, "123456789");

    let cfg = AppConfig::load().unwrap();
    assert_eq!(cfg.ledger_path, PathBuf::from("from_file.json"));
    assert_eq!(cfg.poll_interval_secs, 120);
    assert_eq!(cfg.discord.token.as_deref(), Some("bot-token"));
    assert_eq!(cfg.discord.channel_id, Some(123_456_789));
    assert_eq!(cfg.feeds.len(), 1);
    assert_eq!(cfg.feeds[0].name, "kaggle");
    assert!(cfg.feeds[0].policy.is_none());

    clear_env();
}

#[test]
#[serial]
fn missing_config_path_is_an_error() {
    clear_env();
    std::env::set_var(ENV_CONFIG_PATH, "/definitely/not/here.toml");
    let err = AppConfig::load().unwrap_err();
    assert!(err.to_string().contains(ENV_CONFIG_PATH));
    clear_env();
}

#[test]
#[serial]
fn bad_numeric_env_is_an_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.toml");
    std::fs::write(&path, "").unwrap();
    std::env::set_var(ENV_CONFIG_PATH, &path);
    std::env::set_var(ENV_POLL_INTERVAL_SECS, "hourly");
    assert!(AppConfig::load().is_err());
    clear_env();
}

#[test]
#[serial]
fn zero_interval_fails_validation() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("zero.toml");
    std::fs::write(&path, "poll_interval_secs = 0\n").unwrap();
    std::env::set_var(ENV_CONFIG_PATH, &path);
    assert!(AppConfig::load().is_err());
    clear_env();
}

#[test]
fn shipped_config_parses() {
    let cfg = AppConfig::from_path(std::path::Path::new("config/contest_alerts.toml")).unwrap();
    cfg.validate().unwrap();
    assert_eq!(cfg.web_pages[0].name, "mlcontests");
    assert_eq!(cfg.feeds[0].name, "aicrowd");
}
