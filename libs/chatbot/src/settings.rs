use time::Duration;

const AUTO_START_ENV: &str = "CHATBOT_AUTO_START";
const IDLE_TIMEOUT_ENV: &str = "CHATBOT_IDLE_TIMEOUT_S";
const RETENTION_ENV: &str = "CHATBOT_RETENTION_S";

/// Immutable coordinator configuration, constructed once and passed in.
#[derive(Debug, Clone, Copy)]
pub struct ChatbotSettings {
    /// Whether an inbound message with no open session starts a new one.
    pub auto_start: bool,
    /// Inactivity window after which an open session is closed by the sweep.
    pub idle_timeout: Duration,
    /// How long closed records are kept before garbage collection.
    pub retention: Duration,
}

impl Default for ChatbotSettings {
    fn default() -> Self {
        Self {
            auto_start: true,
            idle_timeout: Duration::minutes(30),
            retention: Duration::hours(24),
        }
    }
}

impl ChatbotSettings {
    /// Reads settings from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let auto_start = std::env::var(AUTO_START_ENV)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(defaults.auto_start);
        let idle_timeout = read_seconds(IDLE_TIMEOUT_ENV).unwrap_or(defaults.idle_timeout);
        let retention = read_seconds(RETENTION_ENV).unwrap_or(defaults.retention);
        Self {
            auto_start,
            idle_timeout,
            retention,
        }
    }
}

fn read_seconds(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.parse::<i64>().ok())
        .map(Duration::seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let settings = ChatbotSettings::default();
        assert!(settings.auto_start);
        assert_eq!(settings.idle_timeout, Duration::minutes(30));
        assert_eq!(settings.retention, Duration::hours(24));
    }
}
