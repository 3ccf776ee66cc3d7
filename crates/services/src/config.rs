use std::env;
use std::time::Duration;

use url::Url;
use zenith_core::quiz::QUIZ_COOLDOWN_SECS;

use crate::error::ConfigError;

const DEFAULT_BASE: &str = "http://127.0.0.1:5000";
const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 800;

/// Ordered list of backend base URLs; requests fail over front to back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendConfig {
    bases: Vec<Url>,
}

impl BackendConfig {
    /// Reads `ZENITH_API_BASES` (comma-separated), then `ZENITH_API_BASE`,
    /// then falls back to the local development server.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidBaseUrl` if any entry is not a URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = env::var("ZENITH_API_BASES")
            .or_else(|_| env::var("ZENITH_API_BASE"))
            .unwrap_or_else(|_| DEFAULT_BASE.into());
        Self::parse(&raw)
    }

    /// Parses a comma-separated base list, trimming whitespace and trailing
    /// slashes and dropping empty entries.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidBaseUrl` if any entry is not a URL.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let bases = raw
            .split(',')
            .map(|s| s.trim().trim_end_matches('/'))
            .filter(|s| !s.is_empty())
            .map(|s| {
                Url::parse(s).map_err(|source| ConfigError::InvalidBaseUrl {
                    raw: s.to_owned(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { bases })
    }

    #[must_use]
    pub fn bases(&self) -> &[Url] {
        &self.bases
    }

    /// Absolute URL of `path` on the given base.
    #[must_use]
    pub fn endpoint(base: &Url, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{path}", base.as_str().trim_end_matches('/'))
    }
}

/// Timing knobs of the progression engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Idle window collapsing background progress saves into one write.
    pub save_debounce: Duration,
    /// Minimum gap between quiz generation requests.
    pub quiz_cooldown: chrono::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            save_debounce: Duration::from_millis(DEFAULT_SAVE_DEBOUNCE_MS),
            quiz_cooldown: chrono::Duration::seconds(QUIZ_COOLDOWN_SECS),
        }
    }
}

impl EngineConfig {
    /// Defaults, overridden by `ZENITH_SAVE_DEBOUNCE_MS` and
    /// `ZENITH_QUIZ_COOLDOWN_SECS` when set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidNumber` for non-numeric overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(ms) = read_u64("ZENITH_SAVE_DEBOUNCE_MS")? {
            config.save_debounce = Duration::from_millis(ms);
        }
        if let Some(secs) = read_u64("ZENITH_QUIZ_COOLDOWN_SECS")? {
            let secs = i64::try_from(secs).map_err(|_| ConfigError::InvalidNumber {
                var: "ZENITH_QUIZ_COOLDOWN_SECS",
                raw: secs.to_string(),
            })?;
            config.quiz_cooldown = chrono::Duration::seconds(secs);
        }
        Ok(config)
    }
}

fn read_u64(var: &'static str) -> Result<Option<u64>, ConfigError> {
    match env::var(var) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, raw }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ordered_base_list() {
        let config =
            BackendConfig::parse(" https://a.example/ ,, https://b.example:8443 ").unwrap();
        let bases: Vec<&str> = config.bases().iter().map(Url::as_str).collect();
        assert_eq!(bases, vec!["https://a.example/", "https://b.example:8443/"]);
    }

    #[test]
    fn rejects_garbage_base() {
        let err = BackendConfig::parse("not a url").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let base = Url::parse("https://a.example/api/").unwrap();
        assert_eq!(
            BackendConfig::endpoint(&base, "/course/progress/get"),
            "https://a.example/api/course/progress/get"
        );
    }

    #[test]
    fn engine_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.save_debounce, Duration::from_millis(800));
        assert_eq!(config.quiz_cooldown, chrono::Duration::seconds(15));
    }
}
