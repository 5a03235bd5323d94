//! Booking service configuration.

/// Tunables for the booking service.
#[derive(Debug, Clone)]
pub struct BookingConfig {
    /// Credits charged per hour of teaching.
    pub credits_per_hour: u32,
    /// Duration applied when a request does not specify one.
    pub default_duration_hours: u32,
    /// Base URL of the meeting-link provider.
    pub meet_endpoint: String,
    /// Request timeout for provider calls, in seconds.
    pub provisioning_timeout_secs: u64,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            credits_per_hour: 1,
            default_duration_hours: 1,
            meet_endpoint: "http://localhost:9090".to_string(),
            provisioning_timeout_secs: 10,
        }
    }
}

impl BookingConfig {
    /// Build a config from `SKILLSWAP_*` environment variables, falling
    /// back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            credits_per_hour: env_u32("SKILLSWAP_CREDITS_PER_HOUR", defaults.credits_per_hour),
            default_duration_hours: env_u32(
                "SKILLSWAP_DEFAULT_DURATION_HOURS",
                defaults.default_duration_hours,
            ),
            meet_endpoint: std::env::var("SKILLSWAP_MEET_ENDPOINT")
                .unwrap_or(defaults.meet_endpoint),
            provisioning_timeout_secs: std::env::var("SKILLSWAP_PROVISIONING_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.provisioning_timeout_secs),
        }
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
