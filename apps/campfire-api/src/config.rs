/// Campfire API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Participants required before a session can start.
    pub room_capacity: usize,
    /// Total length of the Active phase, in milliseconds.
    pub session_duration_ms: u64,
    /// How long before dissolution the ending warning fires, in milliseconds.
    pub ending_warning_ms: u64,
    /// Optional flat kick quorum. When unset, a simple majority of capacity.
    pub kick_threshold: Option<usize>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable has a default, so the service starts unconfigured.
    pub fn from_env() -> Self {
        Self {
            port: parsed_var("PORT", 4010),
            room_capacity: parsed_var("ROOM_CAPACITY", 8),
            session_duration_ms: parsed_var("SESSION_DURATION_MS", 15 * 60 * 1000),
            ending_warning_ms: parsed_var("ENDING_WARNING_MS", 2 * 60 * 1000),
            kick_threshold: std::env::var("KICK_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    /// Distinct accusers required to remove a participant from a session.
    ///
    /// `KICK_THRESHOLD` overrides with a flat constant; otherwise a simple
    /// majority of capacity, never less than 2.
    pub fn resolved_kick_threshold(&self) -> usize {
        self.kick_threshold
            .unwrap_or_else(|| (self.room_capacity / 2 + 1).max(2))
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
