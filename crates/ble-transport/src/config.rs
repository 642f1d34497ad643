use std::time::Duration;

pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(15);
/// Long enough for a user to read and confirm on the device screen.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_MTU: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub scan_duration: Duration,
    pub command_timeout: Duration,
    pub connect_timeout: Duration,
    /// Upper clamp applied to whatever MTU the platform reports.
    pub max_mtu: usize,
    pub request_buffer: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            scan_duration: DEFAULT_SCAN_DURATION,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_mtu: DEFAULT_MAX_MTU,
            request_buffer: 32,
        }
    }
}

impl TransportConfig {
    pub fn with_scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration = duration;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_mtu(mut self, max_mtu: usize) -> Self {
        self.max_mtu = max_mtu;
        self
    }
}
