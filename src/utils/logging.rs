/// Install the global `tracing` subscriber at `level` (`error`, `warn`,
/// `info`, `debug` or `trace`; anything else means `info`).
///
/// Only the first call in a process takes effect.
pub fn init(level: &str) {
    let installed = tracing_subscriber::fmt()
        .with_max_level(parse_level(level))
        .with_target(false)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!("Logging initialised at {}", level);
    }
}

pub(crate) fn parse_level(level: &str) -> tracing::Level {
    match level.trim().to_ascii_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warn" | "warning" => tracing::Level::WARN,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    }
}
