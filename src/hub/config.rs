//! Hub configuration

use std::time::Duration;

/// Default capacity of each subscriber's outbound queue
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 50;

/// Default capacity of the hub's input event queue
pub const DEFAULT_INPUT_CAPACITY: usize = 50;

/// Shortest keepalive interval accepted
pub const MIN_PING_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for the broadcast hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of the hub's input queue
    pub input_capacity: usize,

    /// Capacity of each subscriber's outbound queue
    pub subscriber_capacity: usize,

    /// Interval between keepalive frames on an idle connection
    pub ping_interval: Duration,

    /// Deadline for a single frame write to a subscriber connection
    pub write_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            input_capacity: DEFAULT_INPUT_CAPACITY,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            ping_interval: Duration::from_secs(15),
            write_timeout: Duration::from_secs(5),
        }
    }
}

impl HubConfig {
    /// Set the input queue capacity
    pub fn input_capacity(mut self, capacity: usize) -> Self {
        self.input_capacity = capacity.max(1);
        self
    }

    /// Set the per-subscriber queue capacity
    pub fn subscriber_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_capacity = capacity.max(1);
        self
    }

    /// Set the keepalive interval
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval.max(MIN_PING_INTERVAL);
        self
    }

    /// Set the per-write deadline
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();

        assert_eq!(config.input_capacity, 50);
        assert_eq!(config.subscriber_capacity, 50);
        assert_eq!(config.ping_interval, Duration::from_secs(15));
        assert_eq!(config.write_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_capacities_never_zero() {
        let config = HubConfig::default().input_capacity(0).subscriber_capacity(0);

        assert_eq!(config.input_capacity, 1);
        assert_eq!(config.subscriber_capacity, 1);
    }

    #[test]
    fn test_ping_interval_never_zero() {
        let config = HubConfig::default().ping_interval(Duration::ZERO);
        assert_eq!(config.ping_interval, MIN_PING_INTERVAL);
    }
}
