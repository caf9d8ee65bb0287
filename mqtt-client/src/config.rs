//! `ClientConfig` and the tunable constants governing it: keep-alive and
//! request-timeout clamping bounds, in-flight table capacities, and reconnect
//! backoff bounds.

use std::time::Duration;

/// Lower bound for the clamped keep-alive interval, in seconds.
pub const KEEP_ALIVE_INTERVAL_DEFAULT_MIN: u16 = 30;
/// Upper bound for the clamped keep-alive interval, in seconds.
pub const KEEP_ALIVE_INTERVAL_DEFAULT_MAX: u16 = 1200;

/// Lower bound for the clamped request timeout, in milliseconds.
pub const REQUEST_TIMEOUT_MIN_MS: u64 = 500;
/// Upper bound for the clamped request timeout, in milliseconds.
pub const REQUEST_TIMEOUT_MAX_MS: u64 = 5000;
/// Request timeout used when the caller-supplied value is out of bounds.
pub const REQUEST_TIMEOUT_DEFAULT_MS: u64 = 2000;

/// Capacity of the subscription table (`TopicBinding` slots).
pub const SUB_NUM_MAX: usize = 10;
/// Capacity of the sub/unsub in-flight table.
pub const SUB_INFLIGHT_MAX: usize = 10;
/// Default capacity of the publish in-flight table.
pub const REPUB_NUM_MAX: usize = 4;

/// Starting reconnect backoff, in milliseconds.
pub const RECONNECT_INTERVAL_MIN_MS: u64 = 1_000;
/// Reconnect backoff cap, in milliseconds.
pub const RECONNECT_INTERVAL_MAX_MS: u64 = 60_000;

/// Optional TLS trust material supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct TlsTrust {
    /// PEM-encoded trust anchor(s).
    pub root_ca: Vec<u8>,
}

/// Every field needed to construct a [`crate::Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Broker host name or address.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Optional TLS trust anchor; `None` connects in the clear.
    pub pub_key: Option<TlsTrust>,
    /// MQTT client identifier.
    pub client_id: String,
    /// Username for CONNECT, if any.
    pub user_name: Option<String>,
    /// Password for CONNECT, if any.
    pub password: Option<Vec<u8>>,
    /// Requested keep-alive interval; clamped to
    /// `[KEEP_ALIVE_INTERVAL_DEFAULT_MIN, KEEP_ALIVE_INTERVAL_DEFAULT_MAX]` seconds.
    pub keepalive_interval: Duration,
    /// Ack-wait timeout for publish/subscribe/unsubscribe; clamped to
    /// `[REQUEST_TIMEOUT_MIN_MS, REQUEST_TIMEOUT_MAX_MS]`, defaulting to
    /// `REQUEST_TIMEOUT_DEFAULT_MS` when out of range.
    pub request_timeout: Duration,
    /// Capacity of the publish in-flight table.
    pub pub_inflight_max: usize,
    /// Whether the broker should discard prior session state on connect.
    pub clean_session: bool,
    /// Capacity of the send/read byte slabs.
    pub buffer_capacity: usize,
}

impl ClientConfig {
    /// Builds a config with the given identity, clamping keep-alive and
    /// request-timeout to their valid ranges immediately.
    pub fn new(host: impl Into<String>, port: u16, client_id: impl Into<String>) -> Self {
        ClientConfig {
            host: host.into(),
            port,
            pub_key: None,
            client_id: client_id.into(),
            user_name: None,
            password: None,
            keepalive_interval: Duration::from_secs(u64::from(clamp_keepalive_secs(60))),
            request_timeout: Duration::from_millis(clamp_request_timeout_ms(
                REQUEST_TIMEOUT_DEFAULT_MS,
            )),
            pub_inflight_max: REPUB_NUM_MAX,
            clean_session: true,
            buffer_capacity: crate::io::DEFAULT_BUFFER_SIZE,
        }
    }

    /// Sets the keep-alive interval, clamping it to the valid range.
    pub fn keepalive(mut self, interval: Duration) -> Self {
        self.keepalive_interval =
            Duration::from_secs(u64::from(clamp_keepalive_secs(interval.as_secs() as u16)));
        self
    }

    /// Sets the request timeout, clamping it to the valid range.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout =
            Duration::from_millis(clamp_request_timeout_ms(timeout.as_millis() as u64));
        self
    }

    /// Sets the username/password used in CONNECT.
    pub fn credentials(mut self, user_name: impl Into<String>, password: impl Into<Vec<u8>>) -> Self {
        self.user_name = Some(user_name.into());
        self.password = Some(password.into());
        self
    }
}

fn clamp_keepalive_secs(secs: u16) -> u16 {
    secs.clamp(KEEP_ALIVE_INTERVAL_DEFAULT_MIN, KEEP_ALIVE_INTERVAL_DEFAULT_MAX)
}

fn clamp_request_timeout_ms(ms: u64) -> u64 {
    if ms < REQUEST_TIMEOUT_MIN_MS || ms > REQUEST_TIMEOUT_MAX_MS {
        REQUEST_TIMEOUT_DEFAULT_MS
    } else {
        ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keepalive_clamps_to_valid_range() {
        let cfg = ClientConfig::new("broker", 1883, "dev-1").keepalive(Duration::from_secs(5));
        assert_eq!(cfg.keepalive_interval, Duration::from_secs(KEEP_ALIVE_INTERVAL_DEFAULT_MIN as u64));

        let cfg = ClientConfig::new("broker", 1883, "dev-1").keepalive(Duration::from_secs(99_999));
        assert_eq!(cfg.keepalive_interval, Duration::from_secs(KEEP_ALIVE_INTERVAL_DEFAULT_MAX as u64));
    }

    #[test]
    fn request_timeout_out_of_range_falls_back_to_default() {
        let cfg = ClientConfig::new("broker", 1883, "dev-1").request_timeout(Duration::from_millis(1));
        assert_eq!(cfg.request_timeout, Duration::from_millis(REQUEST_TIMEOUT_DEFAULT_MS));

        let cfg = ClientConfig::new("broker", 1883, "dev-1").request_timeout(Duration::from_millis(50_000));
        assert_eq!(cfg.request_timeout, Duration::from_millis(REQUEST_TIMEOUT_DEFAULT_MS));
    }

    #[test]
    fn request_timeout_within_range_is_kept() {
        let cfg = ClientConfig::new("broker", 1883, "dev-1").request_timeout(Duration::from_millis(3000));
        assert_eq!(cfg.request_timeout, Duration::from_millis(3000));
    }
}
