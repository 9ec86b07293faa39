use std::{collections::HashMap, net::IpAddr, time::Duration};

use regex::Regex;
use secrecy::SecretBox;
use serde::{Deserialize, Serialize};

use crate::prelude::*;


#[derive(Debug, confique::Config)]
pub struct GeneralConfig {
    /// Fully qualified names (FQDNs) and/or IP addresses under which this
    /// NetBox installation is reachable. Requests with a different `Host`
    /// header are rejected. Also used as the list of trusted CSRF origins.
    ///
    /// Example: ["netbox.example.com", "192.0.2.123"]
    pub allowed_hosts: Vec<String>,

    /// Secret key used for cryptographic signing (sessions, password reset
    /// tokens, ...). Must be at least 50 characters long, should be random
    /// and has to be kept secret. Changing it invalidates all sessions.
    pub secret_key: SecretBox<String>,

    /// People that receive error notifications via email. Example:
    ///
    ///     admins = [{ name = "Hank Hill", email = "hhill@example.com" }]
    #[config(default = [])]
    pub admins: Vec<Admin>,

    /// URL schemes that are allowed within links in NetBox.
    #[config(default = [
        "file", "ftp", "ftps", "http", "https", "irc", "mailto", "sftp", "ssh",
        "tel", "telnet", "tftp", "vnc", "xmpp",
    ])]
    pub allowed_url_schemes: Vec<String>,

    /// Base URL path if NetBox is not served at the root of the domain, e.g.
    /// "netbox/" for `https://example.com/netbox/`.
    #[config(default = "")]
    pub base_path: String,

    /// Number of days to retain changelog entries. Set to 0 to retain changes
    /// indefinitely.
    #[config(default = 90)]
    pub changelog_retention: u32,

    /// Enables debugging. Never enable this on a production system, as it
    /// can expose sensitive data.
    #[config(default = false)]
    pub debug: bool,

    /// Enables features that are only useful when developing NetBox itself.
    #[config(default = false)]
    pub developer: bool,

    /// Enforce unique IP space within the global table (all prefixes and IP
    /// addresses not assigned to a VRF).
    #[config(default = false)]
    pub enforce_global_unique: bool,

    /// Models that are exempt from the enforcement of view permissions.
    /// Entries have the form "<app>.<model>". The special value "*" exempts
    /// all models. Example: ["dcim.site", "dcim.region", "ipam.prefix"]
    #[config(default = [])]
    pub exempt_view_permissions: Vec<String>,

    /// HTTP proxies to use for outbound requests, per URL scheme. A proxy
    /// without a scheme (e.g. "10.10.1.10:3128") is an HTTP proxy. Example:
    ///
    ///     http_proxies = { http = "http://10.10.1.10:3128", https = "http://10.10.1.10:1080" }
    pub http_proxies: Option<HashMap<String, String>>,

    /// IP addresses recognized as internal to the system. The debugging
    /// toolbar is only shown to clients with these addresses.
    #[config(default = ["127.0.0.1", "::1"])]
    pub internal_ips: Vec<IpAddr>,

    /// Require authentication to view any data in NetBox (including the API).
    #[config(default = false)]
    pub login_required: bool,

    /// Lifetime of an authenticated session. If not set, the web framework's
    /// default of 14 days applies.
    #[config(deserialize_with = crate::config::deserialize_duration)]
    pub login_timeout: Option<Duration>,

    /// Shows a maintenance banner and disables certain write operations.
    #[config(default = false)]
    pub maintenance_mode: bool,

    /// Exposes Prometheus metrics. Also switches the database backend to an
    /// instrumented one.
    #[config(default = false)]
    pub metrics_enabled: bool,

    /// When determining the primary IP address of a device, prefer IPv4 over
    /// IPv6.
    #[config(default = false)]
    pub prefer_ipv4: bool,

    /// Time zone name, e.g. "Europe/Berlin".
    #[config(default = "UTC")]
    pub time_zone: String,
}

impl GeneralConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        for (scheme, proxy) in self.http_proxies.iter().flatten() {
            let proxy = if proxy.contains("://") {
                proxy.clone()
            } else {
                format!("http://{proxy}")
            };
            crate::config::parse_url_with_schemes(&proxy, &["http", "https", "socks5", "socks5h"])
                .context(format!("invalid proxy for scheme '{scheme}' in 'general.http_proxies'"))?;
        }

        Ok(())
    }

    /// Returns `base_path` with leading and trailing slashes stripped and
    /// exactly one trailing slash appended, or an empty string if no base
    /// path is configured.
    pub fn normalized_base_path(&self) -> String {
        let trimmed = self.base_path.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("{trimmed}/")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Admin {
    pub name: String,
    pub email: String,
}


/// Cross-origin resource sharing for the REST API.
#[derive(Debug, Clone, Serialize, confique::Config)]
pub struct CorsConfig {
    /// Allow requests from all origins. If `true`, the whitelists below are
    /// ignored.
    #[config(default = false)]
    pub origin_allow_all: bool,

    /// Origins that are allowed, e.g. ["https://hostname.example.com"].
    #[config(default = [])]
    pub origin_whitelist: Vec<String>,

    /// Regular expressions matching allowed origins, e.g.
    /// ["^https://\\w+\\.example\\.com$"].
    #[config(default = [])]
    pub origin_regex_whitelist: Vec<String>,
}

impl CorsConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        for pattern in &self.origin_regex_whitelist {
            Regex::new(pattern)
                .context(format!("invalid regex '{pattern}' in 'cors.origin_regex_whitelist'"))?;
        }

        Ok(())
    }
}


/// Caching of database queries in Redis.
#[derive(Debug, confique::Config)]
pub struct CacheConfig {
    /// How long query results are cached. Set to "0" to disable caching
    /// completely.
    #[config(default = "900s", deserialize_with = crate::config::deserialize_duration)]
    pub timeout: Duration,
}


/// Credentials and options for NAPALM, used to retrieve live data from
/// devices.
#[derive(Debug, confique::Config)]
pub struct NapalmConfig {
    #[config(default = "")]
    pub username: String,

    #[config(default = "")]
    pub password: SecretBox<String>,

    /// Timeout of a connection to a device.
    #[config(default = "30s", deserialize_with = crate::config::deserialize_duration)]
    pub timeout: Duration,

    /// Optional arguments passed to the NAPALM driver, e.g.
    /// `{ secret = "...", global_delay_factor = 2 }`.
    #[config(default = {})]
    pub args: HashMap<String, serde_json::Value>,
}
