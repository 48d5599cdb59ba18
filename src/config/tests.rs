use super::load_config;
use super::settings::Settings;
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.transport.url, "ws://127.0.0.1:8080/ws");
    assert_eq!(settings.transport.token_param, "token");
    assert_eq!(settings.reconnect.base_delay_ms, 1000);
    assert_eq!(settings.reconnect.max_delay_ms, 30000);
    assert_eq!(settings.reconnect.max_attempts, 8);
    assert_eq!(settings.queue.key, "chatwire:offline-queue");
    assert_eq!(settings.log.level, "info");
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    // load_config reads config/default.* relative to the working directory
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    let toml = r#"
        [transport]
        url = "wss://chat.example.org/socket"

        [reconnect]
        max_attempts = 3
    "#;
    fs::write("config/default.toml", toml).expect("write config file");

    let cfg = load_config();
    env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.transport.url, "wss://chat.example.org/socket");
    assert_eq!(cfg.transport.token_param, "token");
    assert_eq!(cfg.reconnect.max_attempts, 3);
    assert_eq!(cfg.reconnect.base_delay_ms, 1000);
}

#[test]
#[serial]
fn load_config_reads_prefixed_environment() {
    temp_env::with_vars(
        [
            ("CHATWIRE__QUEUE__KEY", Some("school:queue")),
            ("CHATWIRE__LOG__LEVEL", Some("debug")),
        ],
        || {
            let cfg = load_config().expect("load_config failed");
            assert_eq!(cfg.queue.key, "school:queue");
            assert_eq!(cfg.log.level, "debug");
            assert_eq!(cfg.queue.path, "chatwire_db");
        },
    );
}
