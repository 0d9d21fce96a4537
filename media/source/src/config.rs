/*!
    Session configuration.
*/

use std::time::Duration;

/**
    Options applied to the RTSP session before open.
*/
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Connection timeout. Also drives the socket timeout option.
    pub connect_timeout: Duration,
    /// Maximum demuxer-side delay in microseconds.
    pub max_delay_us: u32,
    /// Number of bytes to read while probing the stream layout.
    pub probe_size_bytes: u32,
    /// How long to analyze streams after open, in microseconds.
    pub analyze_duration_us: u32,
}

impl SourceConfig {
    /**
        Create a config with the given connection timeout and default
        probing options.
    */
    pub fn with_timeout(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            ..Self::default()
        }
    }

    /// Socket timeout in microseconds, derived from the connect timeout.
    pub(crate) fn socket_timeout_us(&self) -> u64 {
        self.connect_timeout.as_millis() as u64 * 1000
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            max_delay_us: 500,
            probe_size_bytes: 1_000_000,
            analyze_duration_us: 1_000_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SourceConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.max_delay_us, 500);
        assert_eq!(config.probe_size_bytes, 1_000_000);
        assert_eq!(config.analyze_duration_us, 1_000_000);
    }

    #[test]
    fn socket_timeout_derivation() {
        let config = SourceConfig::with_timeout(Duration::from_secs(3));
        assert_eq!(config.socket_timeout_us(), 3_000_000);
    }
}
