//! Environment driven configuration, read once at startup.

use crate::delivery::SendPolicy;
use crate::render::DEFAULT_FOOTER;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{var} must be set")]
    Missing { var: &'static str },

    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Typed access to a variable source, the process environment in production.
struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, var: &'static str) -> Option<String> {
        (self.0)(var).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, var: &'static str, default: &str) -> String {
        self.get(var).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, var: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(var)
            .map(|value| {
                value.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                    var,
                    reason: e.to_string(),
                    value,
                })
            })
            .transpose()
    }

    fn flag(&self, var: &'static str) -> Result<Option<bool>, ConfigError> {
        self.get(var)
            .map(|value| match value.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(ConfigError::Invalid {
                    var,
                    value,
                    reason: "expected true or false".to_string(),
                }),
            })
            .transpose()
    }

    fn millis(&self, var: &'static str, default: u64) -> Result<Duration, ConfigError> {
        Ok(Duration::from_millis(self.parse(var)?.unwrap_or(default)))
    }
}

pub(crate) fn process_env(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

/// Resolves the queue store address.
///
/// `DATABASE_URL` wins. Otherwise `POSTGRES_PROVIDER` names the variable holding
/// the address (`POSTGRES_URL` by default), and failing that a local server is assumed.
pub(crate) fn database_url<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let vars = Vars(lookup);
    if let Some(url) = vars.get("DATABASE_URL") {
        return url;
    }
    let provider = vars
        .get("POSTGRES_PROVIDER")
        .unwrap_or_else(|| "POSTGRES_URL".to_string());
    (vars.0)(provider.as_str())
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| "postgres://localhost:5432".to_string())
}

/// SMTP connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// Implicit TLS. When off, STARTTLS is used if the server offers it.
    pub secure: bool,
    /// Username and password.
    pub credentials: Option<(String, String)>,
    pub pool: bool,
    pub connection_timeout: Duration,
    pub greeting_timeout: Duration,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1025,
            secure: false,
            credentials: None,
            pool: false,
            connection_timeout: Duration::from_secs(10),
            greeting_timeout: Duration::from_secs(10),
        }
    }
}

impl SmtpConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(process_env)
    }

    /// Like [`SmtpConfig::from_env`] but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let port: u16 = vars.parse("SMTP_PORT")?.unwrap_or(1025);
        let credentials = match (vars.get("SMTP_USER"), vars.get("SMTP_PASS")) {
            (Some(user), Some(pass)) => Some((user, pass)),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing { var: "SMTP_PASS" }),
            (None, Some(_)) => return Err(ConfigError::Missing { var: "SMTP_USER" }),
        };
        Ok(Self {
            host: vars.string("SMTP_HOST", "localhost"),
            port,
            secure: vars.flag("SMTP_SECURE")?.unwrap_or(port == 465),
            credentials,
            pool: vars.flag("SMTP_POOL")?.unwrap_or(false),
            connection_timeout: vars.millis("SMTP_CONNECTION_TIMEOUT", 10_000)?,
            greeting_timeout: vars.millis("SMTP_GREETING_TIMEOUT", 10_000)?,
        })
    }
}

/// Values used when a message does not specify them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailDefaults {
    pub from: String,
    pub logo_url: String,
    pub footer_text: String,
}

impl Default for EmailDefaults {
    fn default() -> Self {
        Self {
            from: "no-reply@localhost".to_string(),
            logo_url: String::new(),
            footer_text: DEFAULT_FOOTER.to_string(),
        }
    }
}

impl EmailDefaults {
    pub fn from_env() -> Self {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let defaults = Self::default();
        Self {
            from: vars.string("EMAIL_FROM", &defaults.from),
            logo_url: vars.string("EMAIL_LOGO_URL", &defaults.logo_url),
            footer_text: vars.string("EMAIL_FOOTER", &defaults.footer_text),
        }
    }
}

impl SendPolicy {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let defaults = Self::default();
        let max_attempts = vars.parse("EMAIL_SEND_ATTEMPTS")?.unwrap_or(defaults.max_attempts);
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "EMAIL_SEND_ATTEMPTS",
                value: "0".to_string(),
                reason: "at least one attempt is needed".to_string(),
            });
        }
        Ok(Self {
            max_attempts,
            backoff: vars.millis("EMAIL_SEND_BACKOFF_MS", 200)?,
            backoff_cap: vars.millis("EMAIL_SEND_BACKOFF_CAP_MS", 5_000)?,
        })
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Jobs processed at the same time, per queue.
    pub concurrency: usize,
    /// Pause before claiming again after finding nothing to do.
    pub poll_interval: Duration,
    /// How often abandoned jobs are looked for.
    pub maintenance_interval: Duration,
    /// Exit shortly after a successful start.
    pub smoke_test: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval: Duration::from_secs(2),
            maintenance_interval: Duration::from_secs(30),
            smoke_test: false,
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let defaults = Self::default();
        let concurrency = vars.parse("WORKER_CONCURRENCY")?.unwrap_or(defaults.concurrency);
        if concurrency == 0 {
            return Err(ConfigError::Invalid {
                var: "WORKER_CONCURRENCY",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(Self {
            concurrency,
            poll_interval: vars.millis("WORKER_POLL_INTERVAL_MS", 2_000)?,
            maintenance_interval: vars.millis("WORKER_MAINTENANCE_INTERVAL_MS", 30_000)?,
            smoke_test: vars.get("NODE_ENV").as_deref() == Some("test"),
        })
    }
}

/// Everything the worker process needs.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub schema: String,
    pub smtp: SmtpConfig,
    pub send: SendPolicy,
    pub email: EmailDefaults,
    pub worker: WorkerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);
        let database_url = database_url(&lookup);
        let schema = vars.string("PGMAILER_SCHEMA", crate::DEFAULT_SCHEMA);
        if !schema
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::Invalid {
                var: "PGMAILER_SCHEMA",
                value: schema,
                reason: "only letters, digits and underscores are allowed".to_string(),
            });
        }
        Ok(Self {
            database_url,
            schema,
            smtp: SmtpConfig::from_lookup(&lookup)?,
            send: SendPolicy::from_lookup(&lookup)?,
            email: EmailDefaults::from_lookup(&lookup),
            worker: WorkerConfig::from_lookup(&lookup)?,
        })
    }
}
