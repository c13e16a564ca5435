use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Crawl target
    pub forum_url: String,
    pub base_url: String,

    // Rate limit: at most `max_calls` requests per `period`
    pub max_calls: usize,
    pub period: Duration,

    // Fetch retry policy
    pub max_retries: u32,
    pub http_timeout: Duration,
    pub net_backoff: Duration,
    pub server_backoff: Duration,
    pub rate_limit_fallback: Duration,
    pub user_agent: String,

    // Traversal bounds (None = unbounded, next-pointer absence terminates)
    pub max_forum_pages: Option<u32>,
    pub max_thread_pages: Option<u32>,
    pub thread_limit: Option<usize>,

    // Output
    pub output_dir: PathBuf,

    // Markup layout
    pub selectors: Selectors,
}

/// CSS selectors describing the forum's markup layout.
///
/// These are configuration, not logic: the defaults match a XenForo-style
/// forum and can be swapped wholesale for a different site.
#[derive(Debug, Clone)]
pub struct Selectors {
    pub thread_card: String,
    pub thread_link: String,
    pub post: String,
    pub post_username: String,
    pub post_body: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            thread_card: "div.structItem--thread".to_string(),
            thread_link: "h3.structItem-title a".to_string(),
            post: "article.js-post".to_string(),
            post_username: ".MessageCard__user-info__name".to_string(),
            post_body: ".message-body .bbWrapper".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let forum_url = required_env("FORUM_URL")?;
        let base_url = match optional_env("BASE_URL") {
            Some(base) => base,
            None => origin_of(&forum_url)?,
        };

        Ok(Self {
            forum_url,
            base_url,
            max_calls: parse_env_usize("MAX_CALLS", 1)?,
            period: period_from_secs(parse_env_f64("PERIOD_SECS", 2.0)?)?,
            max_retries: parse_env_u32("MAX_RETRIES", 3)?,
            http_timeout: Duration::from_secs(parse_env_u64("HTTP_TIMEOUT_SECS", 15)?),
            net_backoff: Duration::from_secs(5),
            server_backoff: Duration::from_secs(10),
            rate_limit_fallback: Duration::from_secs(60),
            user_agent: env_or_default(
                "USER_AGENT",
                "forum-graph-scraper/0.1 (research crawler; contact via repository)",
            ),
            max_forum_pages: parse_env_opt_u32("MAX_FORUM_PAGES")?,
            max_thread_pages: parse_env_opt_u32("MAX_THREAD_PAGES")?,
            thread_limit: parse_env_opt_usize("THREAD_LIMIT")?,
            output_dir: PathBuf::from(env_or_default("OUTPUT_DIR", "./data")),
            selectors: Selectors::default(),
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_calls == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAX_CALLS".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.period.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "PERIOD_SECS".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAX_RETRIES".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Configuration suitable for tests: permissive rate limit, near-zero
    /// backoff so retry paths don't sleep for real.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            forum_url: "https://forum.example.com/forums/test.1/".to_string(),
            base_url: "https://forum.example.com".to_string(),
            max_calls: 100,
            period: Duration::from_secs(1),
            max_retries: 3,
            http_timeout: Duration::from_secs(5),
            net_backoff: Duration::from_millis(1),
            server_backoff: Duration::from_millis(1),
            rate_limit_fallback: Duration::from_millis(5),
            user_agent: "forum-graph-scraper-test/0.1".to_string(),
            max_forum_pages: None,
            max_thread_pages: None,
            thread_limit: None,
            output_dir: PathBuf::from("./data"),
            selectors: Selectors::default(),
        }
    }
}

/// `Duration::from_secs_f64` panics on negative or non-finite input, so the
/// value is checked here and rejected as configuration.
fn period_from_secs(secs: f64) -> Result<Duration, ConfigError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::InvalidValue {
            name: "PERIOD_SECS".to_string(),
            message: "must be a finite number greater than 0".to_string(),
        });
    }
    Ok(Duration::from_secs_f64(secs))
}

fn origin_of(url: &str) -> Result<String, ConfigError> {
    let parsed = url::Url::parse(url).map_err(|e| ConfigError::InvalidValue {
        name: "FORUM_URL".to_string(),
        message: e.to_string(),
    })?;
    Ok(parsed.origin().ascii_serialization())
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    optional_env(name).unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match optional_env(name) {
        Some(v) => v.parse().map_err(|source| ConfigError::ParseInt {
            name: name.to_string(),
            source,
        }),
        None => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match optional_env(name) {
        Some(v) => v.parse().map_err(|source| ConfigError::ParseInt {
            name: name.to_string(),
            source,
        }),
        None => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match optional_env(name) {
        Some(v) => v.parse().map_err(|source| ConfigError::ParseInt {
            name: name.to_string(),
            source,
        }),
        None => Ok(default),
    }
}

fn parse_env_f64(name: &str, default: f64) -> Result<f64, ConfigError> {
    match optional_env(name) {
        Some(v) => v
            .parse()
            .map_err(|e: std::num::ParseFloatError| ConfigError::InvalidValue {
                name: name.to_string(),
                message: e.to_string(),
            }),
        None => Ok(default),
    }
}

fn parse_env_opt_u32(name: &str) -> Result<Option<u32>, ConfigError> {
    optional_env(name)
        .map(|v| {
            v.parse().map_err(|source| ConfigError::ParseInt {
                name: name.to_string(),
                source,
            })
        })
        .transpose()
}

fn parse_env_opt_usize(name: &str) -> Result<Option<usize>, ConfigError> {
    optional_env(name)
        .map(|v| {
            v.parse().map_err(|source| ConfigError::ParseInt {
                name: name.to_string(),
                source,
            })
        })
        .transpose()
}
