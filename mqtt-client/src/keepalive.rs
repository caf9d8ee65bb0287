//! Keep-alive and reconnect bookkeeping, redesigned away
//! from the original's background-thread PING scheduler
//! (`mqtt-sync-client/src/keepalive.rs`'s `timer::Timer`): every decision
//! here is a pure state transition, driven entirely by the owner's calls to
//! `yield_now` (`client.rs`) — there is no thread of our own.

use std::time::{Duration, Instant};

use crate::config::{RECONNECT_INTERVAL_MAX_MS, RECONNECT_INTERVAL_MIN_MS};

/// PING scheduling state: when CONNECTED, tracks the next PINGREQ deadline
/// and whether one is outstanding.
#[derive(Debug, Clone)]
pub struct KeepAliveState {
    next_ping_deadline: Instant,
    ping_outstanding: bool,
}

impl KeepAliveState {
    /// Arms the first deadline `interval` from `now`.
    pub fn new(now: Instant, interval: Duration) -> Self {
        KeepAliveState {
            next_ping_deadline: now + interval,
            ping_outstanding: false,
        }
    }

    /// True once the next-ping deadline has passed; the caller sends
    /// PINGREQ and calls `on_ping_sent`.
    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_ping_deadline
    }

    /// Re-arms the deadline and marks a PING outstanding.
    pub fn on_ping_sent(&mut self, now: Instant, interval: Duration) {
        self.next_ping_deadline = now + interval;
        self.ping_outstanding = true;
    }

    /// Any inbound packet is evidence of connection health: clears the
    /// outstanding flag and re-arms the deadline.
    pub fn on_inbound_packet(&mut self, now: Instant, interval: Duration) {
        self.ping_outstanding = false;
        self.next_ping_deadline = now + interval;
    }

    pub fn ping_outstanding(&self) -> bool {
        self.ping_outstanding
    }
}

/// Reconnect backoff state: the next attempt deadline
/// and the current backoff interval, doubling on every failure up to
/// `RECONNECT_INTERVAL_MAX_MS`.
#[derive(Debug, Clone)]
pub struct ReconnectState {
    next_attempt: Instant,
    backoff: Duration,
}

impl ReconnectState {
    /// Arms the first reconnect attempt `RECONNECT_INTERVAL_MIN_MS` from
    /// `now`, entered when the keep-alive scheduler observes DISCONNECTED.
    pub fn new(now: Instant) -> Self {
        let backoff = Duration::from_millis(RECONNECT_INTERVAL_MIN_MS);
        ReconnectState {
            next_attempt: now + backoff,
            backoff,
        }
    }

    /// True once the reconnect deadline has passed.
    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_attempt
    }

    /// A failed reconnect attempt: doubles the backoff (capped) and re-arms
    /// the deadline from `now`.
    pub fn on_failure(&mut self, now: Instant) {
        let doubled = self.backoff.as_millis().saturating_mul(2) as u64;
        self.backoff = Duration::from_millis(doubled.min(RECONNECT_INTERVAL_MAX_MS));
        self.next_attempt = now + self.backoff;
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_fires_once_the_deadline_elapses() {
        let start = Instant::now();
        let interval = Duration::from_secs(30);
        let mut state = KeepAliveState::new(start, interval);

        assert!(!state.is_due(start));
        let later = start + interval;
        assert!(state.is_due(later));

        state.on_ping_sent(later, interval);
        assert!(state.ping_outstanding());
        assert!(!state.is_due(later));
    }

    #[test]
    fn inbound_packet_clears_outstanding_ping_and_rearms() {
        let start = Instant::now();
        let interval = Duration::from_secs(30);
        let mut state = KeepAliveState::new(start, interval);
        state.on_ping_sent(start + interval, interval);
        assert!(state.ping_outstanding());

        state.on_inbound_packet(start + interval, interval);
        assert!(!state.ping_outstanding());
        assert!(!state.is_due(start + interval));
    }

    #[test]
    fn reconnect_backoff_doubles_up_to_the_cap() {
        let start = Instant::now();
        let mut state = ReconnectState::new(start);
        assert_eq!(state.backoff(), Duration::from_millis(1_000));

        let expected = [2_000, 4_000, 8_000, 16_000, 32_000, 60_000, 60_000];
        for ms in expected {
            state.on_failure(start);
            assert_eq!(state.backoff(), Duration::from_millis(ms));
        }
    }

    #[test]
    fn reconnect_is_due_only_after_its_deadline() {
        let start = Instant::now();
        let state = ReconnectState::new(start);

        assert!(!state.is_due(start));
        assert!(state.is_due(start + Duration::from_millis(1_000)));
    }
}
