use crate::error::{AduanaError, Result};
use std::time::Duration;

/// Engine configuration. Every value the filing flow treats as tunable lives
/// here rather than as a literal at the call site: backoff schedule, TRACK
/// freshness window, credential retention, per-call timeout, alert threshold.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_url: String,
    /// Delays applied to retry N (0-based index into the list; the last entry
    /// repeats when retries outnumber entries).
    pub retry_backoff: Vec<Duration>,
    pub default_max_retries: u32,
    /// Hard bound on a single remote SOAP call.
    pub call_timeout: Duration,
    /// A TRACK not consumed within this window is implicitly expired.
    pub track_freshness: Duration,
    /// Expired credentials are kept this long for audit before purge.
    pub expired_credential_retention: Duration,
    /// Revoked/errored credentials are purged sooner.
    pub revoked_credential_retention: Duration,
    /// Catalog entry frequency at which an alert event is emitted.
    pub alert_frequency_threshold: i64,
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost/aduana_development".to_string(),
            retry_backoff: vec![
                Duration::from_secs(60),
                Duration::from_secs(5 * 60),
                Duration::from_secs(15 * 60),
            ],
            default_max_retries: 3,
            call_timeout: Duration::from_secs(60),
            track_freshness: Duration::from_secs(24 * 3600),
            expired_credential_retention: Duration::from_secs(7 * 24 * 3600),
            revoked_credential_retention: Duration::from_secs(24 * 3600),
            alert_frequency_threshold: 10,
            event_channel_capacity: 1000,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            config.database_url = db_url;
        }

        if let Ok(max_retries) = std::env::var("ADUANA_MAX_RETRIES") {
            config.default_max_retries = max_retries.parse().map_err(|e| {
                AduanaError::Configuration(format!("Invalid ADUANA_MAX_RETRIES: {e}"))
            })?;
        }

        if let Ok(timeout_secs) = std::env::var("ADUANA_CALL_TIMEOUT_SECS") {
            let secs: u64 = timeout_secs.parse().map_err(|e| {
                AduanaError::Configuration(format!("Invalid ADUANA_CALL_TIMEOUT_SECS: {e}"))
            })?;
            config.call_timeout = Duration::from_secs(secs);
        }

        if let Ok(freshness_hours) = std::env::var("ADUANA_TRACK_FRESHNESS_HOURS") {
            let hours: u64 = freshness_hours.parse().map_err(|e| {
                AduanaError::Configuration(format!("Invalid ADUANA_TRACK_FRESHNESS_HOURS: {e}"))
            })?;
            config.track_freshness = Duration::from_secs(hours * 3600);
        }

        if let Ok(schedule) = std::env::var("ADUANA_RETRY_BACKOFF_SECS") {
            let parsed: std::result::Result<Vec<u64>, _> =
                schedule.split(',').map(|s| s.trim().parse()).collect();
            let secs = parsed.map_err(|e| {
                AduanaError::Configuration(format!("Invalid ADUANA_RETRY_BACKOFF_SECS: {e}"))
            })?;
            if secs.is_empty() {
                return Err(AduanaError::Configuration(
                    "ADUANA_RETRY_BACKOFF_SECS must list at least one delay".to_string(),
                ));
            }
            config.retry_backoff = secs.into_iter().map(Duration::from_secs).collect();
        }

        if let Ok(threshold) = std::env::var("ADUANA_ALERT_FREQUENCY_THRESHOLD") {
            config.alert_frequency_threshold = threshold.parse().map_err(|e| {
                AduanaError::Configuration(format!("Invalid ADUANA_ALERT_FREQUENCY_THRESHOLD: {e}"))
            })?;
        }

        Ok(config)
    }

    /// Backoff delay for a given retry attempt (0-based). Attempts past the
    /// end of the schedule reuse the last entry; an empty schedule falls back
    /// to one minute.
    pub fn backoff_for_attempt(&self, retry_count: u32) -> Duration {
        self.retry_backoff
            .get(retry_count as usize)
            .or_else(|| self.retry_backoff.last())
            .copied()
            .unwrap_or(Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backoff_schedule() {
        let config = EngineConfig::default();
        assert_eq!(config.backoff_for_attempt(0), Duration::from_secs(60));
        assert_eq!(config.backoff_for_attempt(1), Duration::from_secs(300));
        assert_eq!(config.backoff_for_attempt(2), Duration::from_secs(900));
        // Past the end of the schedule the last delay repeats.
        assert_eq!(config.backoff_for_attempt(7), Duration::from_secs(900));
    }

    #[test]
    fn test_empty_backoff_schedule_falls_back_to_one_minute() {
        let config = EngineConfig {
            retry_backoff: vec![],
            ..EngineConfig::default()
        };
        assert_eq!(config.backoff_for_attempt(0), Duration::from_secs(60));
        assert_eq!(config.backoff_for_attempt(5), Duration::from_secs(60));
    }

    #[test]
    fn test_default_freshness_window_is_24h() {
        let config = EngineConfig::default();
        assert_eq!(config.track_freshness, Duration::from_secs(86_400));
    }
}
