use std::time::Duration;

use secrecy::{ExposeSecret, SecretBox};
use serde::Deserialize;

use crate::prelude::*;


#[derive(Debug, confique::Config)]
pub struct RedisConfig {
    /// Connection used for the background task queue. Example:
    ///
    ///     [redis.tasks]
    ///     host = "localhost"
    ///     port = 6379
    ///     database = 0
    pub tasks: Option<RedisConnection>,

    /// Old name of `redis.tasks`. Still accepted if `redis.tasks` is not
    /// set, but deprecated and going to be removed.
    pub webhooks: Option<RedisConnection>,

    /// Connection used for caching. Should use a different database than
    /// `redis.tasks`. Example:
    ///
    ///     [redis.caching]
    ///     host = "localhost"
    ///     port = 6379
    ///     database = 1
    pub caching: Option<RedisConnection>,
}

/// Which configuration section the task queue connection was taken from.
#[derive(Debug, Clone, Copy)]
pub enum TasksSection<'a> {
    Tasks(&'a RedisConnection),
    /// The deprecated `webhooks` section.
    Webhooks(&'a RedisConnection),
}

impl<'a> TasksSection<'a> {
    pub fn connection(self) -> &'a RedisConnection {
        match self {
            Self::Tasks(c) | Self::Webhooks(c) => c,
        }
    }
}

impl RedisConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        self.tasks_section()?;
        self.caching_section()?;

        for (name, section) in [
            ("tasks", &self.tasks),
            ("webhooks", &self.webhooks),
            ("caching", &self.caching),
        ] {
            if let Some(c) = section {
                c.validate().context(format!("invalid 'redis.{name}' section"))?;
            }
        }

        Ok(())
    }

    /// Returns the connection for the task queue. `tasks` takes precedence
    /// over `webhooks`. Errors if neither is set.
    pub fn tasks_section(&self) -> Result<TasksSection<'_>> {
        match (&self.tasks, &self.webhooks) {
            (Some(tasks), _) => Ok(TasksSection::Tasks(tasks)),
            (None, Some(webhooks)) => Ok(TasksSection::Webhooks(webhooks)),
            (None, None) => bail!("'redis' section is missing the 'tasks' subsection \
                (required parameter 'redis.tasks' is missing)"),
        }
    }

    /// Returns the connection used for caching. Errors if it is not set.
    pub fn caching_section(&self) -> Result<&RedisConnection> {
        self.caching.as_ref().ok_or_else(|| anyhow!(
            "'redis' section is missing the 'caching' subsection \
                (required parameter 'redis.caching' is missing)"
        ))
    }
}


/// Connection parameters for one Redis purpose. If `sentinels` is non-empty,
/// Redis Sentinel is used and `host`/`port` are ignored.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisConnection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// List of `[host, port]` pairs of sentinel servers.
    #[serde(default)]
    pub sentinels: Vec<(String, u16)>,

    #[serde(default = "default_sentinel_service")]
    pub sentinel_service: String,

    #[serde(default)]
    pub password: Option<SecretBox<String>>,

    #[serde(default)]
    pub database: u32,

    #[serde(
        default = "default_timeout",
        deserialize_with = "crate::config::deserialize_duration",
    )]
    pub default_timeout: Duration,

    #[serde(default)]
    pub ssl: bool,
}

fn default_host() -> String {
    "localhost".into()
}

fn default_port() -> u16 {
    6379
}

fn default_sentinel_service() -> String {
    "default".into()
}

fn default_timeout() -> Duration {
    Duration::from_secs(300)
}

impl RedisConnection {
    fn validate(&self) -> Result<()> {
        if self.sentinels.iter().any(|(host, _)| host.trim().is_empty()) {
            bail!("sentinel host must not be empty");
        }

        Ok(())
    }

    /// Whether this connection goes through Redis Sentinel.
    pub fn using_sentinel(&self) -> bool {
        !self.sentinels.is_empty()
    }

    /// The password, or `None` if none or an empty one is configured.
    pub fn password(&self) -> Option<&str> {
        self.password.as_ref()
            .map(|p| p.expose_secret().as_str())
            .filter(|p| !p.is_empty())
    }

    /// Builds a `redis://` (or `rediss://` for SSL) connection string. The
    /// password is included if set.
    pub fn connection_string(&self) -> String {
        let mut out = String::from(if self.ssl { "rediss://" } else { "redis://" });
        if let Some(password) = self.password() {
            out.push_str(&format!(":{password}@"));
        }
        out.push_str(&format!("{}:{}/{}", self.host, self.port, self.database));
        out
    }
}

impl Default for RedisConnection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            sentinels: vec![],
            sentinel_service: default_sentinel_service(),
            password: None,
            database: 0,
            default_timeout: default_timeout(),
            ssl: false,
        }
    }
}
