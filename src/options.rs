use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

/// Attempts used when neither the request nor the client sets a limit.
pub const DEFAULT_MAX_ATTEMPTS: usize = 10;

/// Client-wide execution defaults, applied to requests that leave a value unset.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Whole-operation timeout per `execute` call in milliseconds; `None` is unbounded.
    pub request_timeout_ms: Option<u64>,
    /// Backoff before the first application-level retry, doubled per attempt.
    pub min_backoff_ms: u64,
    /// Upper bound for the application-level retry backoff.
    pub max_backoff_ms: u64,
    /// Attempt limit; `None` falls back to [`DEFAULT_MAX_ATTEMPTS`].
    pub max_attempts: Option<usize>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout_ms: None,
            min_backoff_ms: 250,
            max_backoff_ms: 8_000,
            max_attempts: None,
        }
    }
}

impl ClientOptions {
    /// Parses options from JSON; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)
            .map_err(|err| Error::InvalidConfig(format!("invalid client options JSON: {err}")))?;
        options.validate()?;
        Ok(options)
    }

    /// Reads options from the environment.
    ///
    /// Reads (all optional):
    /// - `LEDGER_REQUEST_TIMEOUT_MS`
    /// - `LEDGER_MIN_BACKOFF_MS`
    /// - `LEDGER_MAX_BACKOFF_MS`
    /// - `LEDGER_MAX_ATTEMPTS`
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let options = Self {
            request_timeout_ms: env_number("LEDGER_REQUEST_TIMEOUT_MS")?
                .or(defaults.request_timeout_ms),
            min_backoff_ms: env_number("LEDGER_MIN_BACKOFF_MS")?.unwrap_or(defaults.min_backoff_ms),
            max_backoff_ms: env_number("LEDGER_MAX_BACKOFF_MS")?.unwrap_or(defaults.max_backoff_ms),
            max_attempts: env_number("LEDGER_MAX_ATTEMPTS")?.or(defaults.max_attempts),
        };
        options.validate()?;
        Ok(options)
    }

    /// Rejects zero attempts and inverted backoff bounds.
    pub fn validate(&self) -> Result<()> {
        if self.min_backoff_ms > self.max_backoff_ms {
            return Err(Error::InvalidConfig(format!(
                "min backoff ({} ms) cannot be larger than max backoff ({} ms)",
                self.min_backoff_ms, self.max_backoff_ms
            )));
        }
        if self.max_attempts == Some(0) {
            return Err(Error::InvalidConfig(
                "max attempts must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    /// Whole-operation timeout, if configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Lower bound of the retry delay.
    pub fn min_backoff(&self) -> Duration {
        Duration::from_millis(self.min_backoff_ms)
    }

    /// Upper bound of the retry delay.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidConfig(format!("{name} is not a valid number: '{value}'"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::ClientOptions;
    use crate::Error;
    use std::time::Duration;

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let options =
            ClientOptions::from_json(r#"{"max_attempts": 4, "request_timeout_ms": 30000}"#)
                .expect("must parse");
        assert_eq!(options.max_attempts, Some(4));
        assert_eq!(options.request_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(options.min_backoff(), Duration::from_millis(250));
        assert_eq!(options.max_backoff(), Duration::from_secs(8));
    }

    #[test]
    fn json_rejects_inverted_backoff() {
        let err = ClientOptions::from_json(r#"{"min_backoff_ms": 900, "max_backoff_ms": 100}"#)
            .expect_err("must fail");
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn zero_attempts_are_rejected() {
        let options = ClientOptions {
            max_attempts: Some(0),
            ..ClientOptions::default()
        };
        assert!(matches!(options.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = ClientOptions::from_json("{not json").expect_err("must fail");
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
