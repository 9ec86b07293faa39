use std::collections::BTreeMap;

use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::RedisConnection;


/// Caching rules for one model (or all models of an app, e.g. "dcim.*").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Cached operations: "get", "fetch", "count", "aggregate", "exists" or
    /// "all". Accepts a single string or a list.
    #[serde(deserialize_with = "one_or_many")]
    pub ops: Vec<String>,

    /// Timeout in seconds, overriding the default one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl CachePolicy {
    fn ops(ops: &[&str]) -> Self {
        Self {
            ops: ops.iter().map(|s| s.to_string()).collect(),
            timeout: None,
        }
    }

    fn all() -> Self {
        Self::ops(&["all"])
    }
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => Ok(vec![s]),
        OneOrMany::Many(v) => Ok(v),
    }
}

/// The built-in cache policies. `None` means "never cache": tree models are
/// exempt as they are queried with raw SQL.
pub fn default_policies() -> BTreeMap<String, Option<CachePolicy>> {
    let all = || Some(CachePolicy::all());

    [
        ("auth.user", Some(CachePolicy { timeout: Some(15 * 60), ..CachePolicy::ops(&["get"]) })),
        ("auth.*", Some(CachePolicy::ops(&["fetch", "get"]))),
        ("auth.permission", all()),
        ("circuits.*", all()),
        ("dcim.region", None),
        ("dcim.rackgroup", None),
        ("dcim.*", all()),
        ("ipam.*", all()),
        ("extras.*", all()),
        ("secrets.*", all()),
        ("users.*", all()),
        ("tenancy.tenantgroup", None),
        ("tenancy.*", all()),
        ("virtualization.*", all()),
    ]
        .into_iter()
        .map(|(key, policy)| (key.to_owned(), policy))
        .collect()
}


/// Where cached query results are stored.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    Sentinel {
        locations: Vec<(String, u16)>,
        service_name: String,
        db: u32,
    },
    /// A `redis://` or `rediss://` connection string, possibly containing
    /// the password.
    Direct(#[serde(serialize_with = "redact_credentials")] SecretBox<String>),
}

impl CacheBackend {
    pub(crate) fn from_connection(c: &RedisConnection) -> Self {
        if c.using_sentinel() {
            Self::Sentinel {
                locations: c.sentinels.clone(),
                service_name: c.sentinel_service.clone(),
                db: c.database,
            }
        } else {
            Self::Direct(SecretBox::new(Box::new(c.connection_string())))
        }
    }
}

/// Serializes a connection string with the credentials masked.
fn redact_credentials<S: Serializer>(v: &SecretBox<String>, s: S) -> Result<S::Ok, S::Error> {
    let url = v.expose_secret();
    let masked = match (url.find("://"), url.rfind('@')) {
        (Some(start), Some(end)) if start + 3 <= end => {
            format!("{}:{}{}", &url[..start + 3], super::REDACTED, &url[end..])
        }
        _ => url.clone(),
    };
    s.serialize_str(&masked)
}

/// Query caching settings.
#[derive(Debug, Serialize)]
pub struct CachingSettings {
    /// Caching is disabled if the timeout is 0.
    pub enabled: bool,
    pub backend: CacheBackend,
    /// In seconds.
    pub default_timeout: u64,
    /// Built-in policies merged with the ones of all plugins.
    pub policies: BTreeMap<String, Option<CachePolicy>>,
    pub degrade_on_failure: bool,
}
