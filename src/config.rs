/// Runtime node configuration.
///
/// Defaults cover timing only. Collector endpoint, API key and fallback
/// network are injected by the firmware at build time.

/// Timing and identity settings shared by every component.
#[derive(Debug, Clone, Copy)]
pub struct NodeConfig {
    /// A button level must be stable this long before it is accepted.
    pub debounce_ms: u32,
    /// Maximum gap between presses of one tap sequence.
    pub tap_window_ms: u32,
    /// Tap count that fires immediately without waiting for the window.
    pub max_taps: u8,
    /// Association poll interval.
    pub connect_poll_ms: u32,
    /// Association polls per candidate network.
    pub connect_attempts: u32,
    /// Direct WAN POST timeout.
    pub post_timeout_ms: u32,
    /// Cellular network registration wait.
    pub registration_timeout_ms: u32,
    /// Interval between scheduled readings; 0 disables them.
    pub scheduled_interval_ms: u64,
    pub endpoint_url: &'static str,
    pub api_key: &'static str,
    pub device_id: &'static str,
    /// Network of last resort when nothing saved or open is visible.
    pub fallback_ssid: &'static str,
    pub fallback_secret: &'static str,
    /// Access point name for the cellular data bearer.
    pub apn: &'static str,
}

impl NodeConfig {
    pub const fn new() -> Self {
        Self {
            debounce_ms: 50,
            tap_window_ms: 400,
            max_taps: 4,
            connect_poll_ms: 500,
            connect_attempts: 15,
            post_timeout_ms: 10_000,
            registration_timeout_ms: 60_000,
            scheduled_interval_ms: 15 * 60 * 1000,
            endpoint_url: "http://localhost/readings",
            api_key: "",
            device_id: "tapnode-0",
            fallback_ssid: "",
            fallback_secret: "",
            apn: "internet",
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::new()
    }
}
