use std::time::Duration;
use tracing::warn;

use crate::message::TimestampFormat;

/// Default deadline for join, room-info and send acknowledgements
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default buffer per bus topic
pub const DEFAULT_TOPIC_CAPACITY: usize = 100;

/// Runtime configuration for the room engine
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Deadline for the join acknowledgement
    pub join_timeout: Duration,
    /// Deadline for the room metadata reply
    pub room_info_timeout: Duration,
    /// Deadline for the echoed send-message record
    pub send_timeout: Duration,
    /// Timestamp format used by live realtime messages
    pub live_timestamp_format: TimestampFormat,
    /// Resolve sender entities for backfilled history as well as live traffic
    pub resolve_historical_senders: bool,
    /// How many payloads a topic buffers before slow listeners lag
    pub topic_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            join_timeout: DEFAULT_REQUEST_TIMEOUT,
            room_info_timeout: DEFAULT_REQUEST_TIMEOUT,
            send_timeout: DEFAULT_REQUEST_TIMEOUT,
            live_timestamp_format: TimestampFormat::UnixMillis,
            resolve_historical_senders: false,
            topic_capacity: DEFAULT_TOPIC_CAPACITY,
        }
    }
}

impl ChatConfig {
    /// Builds a config from `CHAT_*` environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            join_timeout: env_millis("CHAT_JOIN_TIMEOUT_MS").unwrap_or(defaults.join_timeout),
            room_info_timeout: env_millis("CHAT_ROOM_INFO_TIMEOUT_MS")
                .unwrap_or(defaults.room_info_timeout),
            send_timeout: env_millis("CHAT_SEND_TIMEOUT_MS").unwrap_or(defaults.send_timeout),
            live_timestamp_format: defaults.live_timestamp_format,
            resolve_historical_senders: env_parse("CHAT_RESOLVE_HISTORY_SENDERS")
                .unwrap_or(defaults.resolve_historical_senders),
            topic_capacity: env_parse("CHAT_BUS_CAPACITY").unwrap_or(defaults.topic_capacity),
        }
    }

    /// Use one deadline for every correlated request
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self.room_info_timeout = timeout;
        self.send_timeout = timeout;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn with_room_info_timeout(mut self, timeout: Duration) -> Self {
        self.room_info_timeout = timeout;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_live_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.live_timestamp_format = format;
        self
    }

    pub fn with_resolve_historical_senders(mut self, resolve: bool) -> Self {
        self.resolve_historical_senders = resolve;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key = key, value = %raw, "Ignoring unparsable config value");
            None
        }
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}
