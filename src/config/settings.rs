use serde::Deserialize;

/// Top-level configuration settings for the messaging client.
///
/// Groups the transport endpoint, the reconnect policy, the offline queue
/// location and the log level.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub transport: TransportSettings,
    pub reconnect: ReconnectSettings,
    pub queue: QueueSettings,
    pub log: LogSettings,
}

/// Where the live connection goes and how the session token is attached.
#[derive(Debug, Deserialize, Clone)]
pub struct TransportSettings {
    pub url: String,
    pub token_param: String,
}

/// Backoff policy for reconnect attempts.
#[derive(Debug, Deserialize, Clone)]
pub struct ReconnectSettings {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

/// Location of the durable offline queue.
#[derive(Debug, Deserialize, Clone)]
pub struct QueueSettings {
    pub path: String,
    pub key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values are filled from
/// `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub transport: Option<PartialTransportSettings>,
    pub reconnect: Option<PartialReconnectSettings>,
    pub queue: Option<PartialQueueSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialTransportSettings {
    pub url: Option<String>,
    pub token_param: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialReconnectSettings {
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialQueueSettings {
    pub path: Option<String>,
    pub key: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            transport: TransportSettings::default(),
            reconnect: ReconnectSettings::default(),
            queue: QueueSettings::default(),
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/ws".to_string(),
            token_param: "token".to_string(),
        }
    }
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: 8,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            path: "chatwire_db".to_string(),
            key: "chatwire:offline-queue".to_string(),
        }
    }
}

impl PartialSettings {
    /// Fill every missing value from `defaults`.
    pub fn merge(self, defaults: Settings) -> Settings {
        let transport = self.transport.unwrap_or_default();
        let reconnect = self.reconnect.unwrap_or_default();
        let queue = self.queue.unwrap_or_default();
        let log = self.log.unwrap_or_default();

        Settings {
            transport: TransportSettings {
                url: transport.url.unwrap_or(defaults.transport.url),
                token_param: transport
                    .token_param
                    .unwrap_or(defaults.transport.token_param),
            },
            reconnect: ReconnectSettings {
                base_delay_ms: reconnect
                    .base_delay_ms
                    .unwrap_or(defaults.reconnect.base_delay_ms),
                max_delay_ms: reconnect
                    .max_delay_ms
                    .unwrap_or(defaults.reconnect.max_delay_ms),
                max_attempts: reconnect
                    .max_attempts
                    .unwrap_or(defaults.reconnect.max_attempts),
            },
            queue: QueueSettings {
                path: queue.path.unwrap_or(defaults.queue.path),
                key: queue.key.unwrap_or(defaults.queue.key),
            },
            log: LogSettings {
                level: log.level.unwrap_or(defaults.log.level),
            },
        }
    }
}
