use std::{
    fs, io::{self, Write}, path::{Path, PathBuf}, time::Duration,
};
use confique::Config as _;
use serde::Deserialize;
use url::Url;

use crate::prelude::*;


mod db;
mod display;
mod email;
mod general;
mod paths;
mod redis;
mod release_check;

#[cfg(test)]
pub(crate) mod tests;

pub use self::{
    db::DbConfig,
    display::DisplayConfig,
    email::EmailConfig,
    general::{Admin, CacheConfig, CorsConfig, GeneralConfig, NapalmConfig},
    paths::{PathsConfig, StorageConfig},
    redis::{RedisConfig, RedisConnection, TasksSection},
    release_check::ReleaseCheckConfig,
};


/// The locations where we look for a configuration file. The first existing
/// file in this list is used.
const DEFAULT_PATHS: &[&str] = &[
    "config.toml",
    "/etc/netbox/config.toml",
];

const NETBOX_CONFIG_PATH_ENV: &str = "NETBOX_CONFIG_PATH";

/// Configuration for NetBox.
///
/// All relative paths are relative to the location of this configuration file.
/// Duration values are specified as string with a unit, e.g. "27s". Valid
/// units: 'ms', 's', 'min', 'h' and 'd'.
///
/// Required values: `general.allowed_hosts`, `general.secret_key`, `db.name`,
/// `db.user`, `redis.tasks` and `redis.caching`. Everything else has a
/// default value.
#[derive(Debug, confique::Config)]
pub struct Config {
    #[config(nested)]
    pub general: GeneralConfig,

    #[config(nested)]
    pub db: DbConfig,

    /// Redis is used for two purposes, with separate connection settings: as
    /// background task queue (`[redis.tasks]`) and as query cache
    /// (`[redis.caching]`). Both subsections are required.
    #[config(nested)]
    pub redis: RedisConfig,

    #[config(nested)]
    pub cors: CorsConfig,

    #[config(nested)]
    pub display: DisplayConfig,

    #[config(nested)]
    pub paths: PathsConfig,

    #[config(nested)]
    pub storage: StorageConfig,

    #[config(nested)]
    pub cache: CacheConfig,

    #[config(nested)]
    pub email: EmailConfig,

    #[config(nested)]
    pub napalm: NapalmConfig,

    #[config(nested)]
    pub release_check: ReleaseCheckConfig,

    #[config(nested)]
    pub plugins: crate::plugins::PluginsConfig,

    /// Authentication of users identified by a trusted reverse proxy header,
    /// looked up in an LDAP directory (optional).
    #[config(nested)]
    pub remote_ldap: crate::auth::RemoteLdapConfig,

    #[config(nested)]
    pub log: crate::logger::LogConfig,
}

impl Config {
    /// Tries to find a config file by checking `NETBOX_CONFIG_PATH` and from a
    /// list of possible default config file locations. The first config file
    /// is loaded via [`Self::load_from`]. Returns the loaded config and the
    /// path that it was loaded from.
    pub fn from_env_or_default_locations() -> Result<(Self, PathBuf)> {
        let path = if let Some(path) = std::env::var_os(NETBOX_CONFIG_PATH_ENV) {
            PathBuf::from(path)
        } else {
            DEFAULT_PATHS.iter()
                .map(PathBuf::from)
                .find(|p| p.exists())
                .ok_or(anyhow!(
                    "no configuration file found. Note: we checked the following paths: {}",
                    DEFAULT_PATHS.join(", "),
                ))?
        };

        let config = Self::load_from(&path)
            .context(format!("failed to load configuration from '{}'", path.display()))?;

        Ok((config, path))
    }

    /// Loads the configuration from a specific TOML file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = Config::from_file(path)
            .context(format!("failed to read config file '{}'", path.display()))?;

        config.validate().context("failed to validate configuration")?;
        config.fix_paths(path)?;

        Ok(config)
    }

    /// Performs all validation that can be done on the configuration alone,
    /// i.e. without looking at plugins. Fails on the first problem.
    pub fn validate(&self) -> Result<()> {
        debug!("Validating configuration...");
        self.general.validate()?;
        self.redis.validate()?;
        self.cors.validate()?;
        self.email.validate()?;
        self.release_check.validate()?;
        self.remote_ldap.validate()?;

        Ok(())
    }

    /// Checks the config for problematic things that deserve a warning, but
    /// should not prevent startup.
    pub fn lint(&self) {
        self.storage.lint();
        self.remote_ldap.lint();
    }

    /// Goes through all paths in the configuration and changes relative paths
    /// to be absolute based on the path of the configuration file itself.
    /// Trailing slashes are removed.
    fn fix_paths(&mut self, config_path: &Path) -> Result<()> {
        fn fix_path(base_path: &Path, path: &mut PathBuf) {
            if path.is_relative() {
                *path = base_path.join(&path);
            }
            paths::strip_trailing_slash(path);
        }

        let absolute_config_path = config_path.canonicalize()
            .context("failed to canonicalize config path")?;
        let base = absolute_config_path.parent()
            .ok_or_else(|| anyhow!("config file path has no parent"))?;

        fix_path(base, &mut self.paths.docs_root);
        fix_path(base, &mut self.paths.media_root);
        fix_path(base, &mut self.paths.reports_root);
        fix_path(base, &mut self.paths.scripts_root);
        if let Some(p) = &mut self.paths.session_file_path {
            fix_path(base, p);
        }

        if let Some(p) = &mut self.log.file {
            fix_path(base, p);
        }

        Ok(())
    }
}

/// Writes the commented configuration template, generated from the doc
/// comments of [`Config`], to `path` or to stdout.
pub fn write_template(path: Option<&PathBuf>) -> Result<()> {
    let mut options = confique::toml::FormatOptions::default();
    options.general.nested_field_gap = 2;
    let template = confique::toml::template::<Config>(options);

    match path {
        Some(path) => {
            info!("Writing configuration template to '{}'", path.display());
            fs::write(path, template)
                .context(format!("failed to write '{}'", path.display()))?;
        }
        None => io::stdout().write_all(template.as_bytes())?,
    }

    Ok(())
}

/// Deserializes durations written as an integer with a unit, e.g. "90s".
pub(crate) fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(D::Error::custom)
}

/// Units: "ms", "s", "min", "h" and "d". Only "0" may omit the unit.
fn parse_duration(s: &str) -> Result<Duration, String> {
    const UNITS: &[(&str, u64)] = &[
        ("ms", 1),
        ("s", 1_000),
        ("min", 60_000),
        ("h", 3_600_000),
        ("d", 86_400_000),
    ];

    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    let (num, unit) = s.split_at(digits);
    let factor = UNITS.iter()
        .find(|(name, _)| *name == unit)
        .map(|(_, factor)| *factor)
        .ok_or_else(|| format!("invalid duration '{s}': expected a unit (ms, s, min, h or d)"))?;
    let num: u32 = num.parse()
        .map_err(|e| format!("invalid number in duration '{s}': {e}"))?;

    Ok(Duration::from_millis(u64::from(num) * factor))
}

/// Parses a URL and checks that it has one of the given schemes and a host.
/// Used for all URL-shaped settings.
pub(crate) fn parse_url_with_schemes(src: &str, schemes: &[&str]) -> Result<Url> {
    let url: Url = src.parse().map_err(|e| anyhow!("invalid URL '{src}': {e}"))?;

    anyhow::ensure!(
        schemes.contains(&url.scheme()),
        "URL scheme '{}' is not allowed (allowed: {})",
        url.scheme(),
        schemes.join(", "),
    );
    anyhow::ensure!(url.host_str().is_some_and(|h| !h.is_empty()), "URL must have a host");

    Ok(url)
}
