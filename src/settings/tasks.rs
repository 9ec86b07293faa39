use std::collections::BTreeMap;

use secrecy::{ExposeSecret, SecretBox};
use serde::Serialize;

use crate::config::RedisConnection;


/// Names of all background task queues. All of them use the same connection.
pub const QUEUES: &[&str] = &["default", "check_releases"];

/// Connection parameters of the task queue.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskQueueParams {
    Sentinel {
        sentinels: Vec<(String, u16)>,
        master_name: String,
        db: u32,
        #[serde(serialize_with = "super::redact_option")]
        password: Option<SecretBox<String>>,
        /// Always `None`: the default of the Redis client is used.
        socket_timeout: Option<u64>,
        /// In seconds.
        socket_connect_timeout: u64,
    },
    Direct {
        host: String,
        port: u16,
        db: u32,
        #[serde(serialize_with = "super::redact_option")]
        password: Option<SecretBox<String>>,
        /// In seconds.
        default_timeout: u64,
        ssl: bool,
    },
}

impl TaskQueueParams {
    pub(crate) fn from_connection(c: &RedisConnection) -> Self {
        let password = c.password().map(|p| SecretBox::new(Box::new(p.to_owned())));
        if c.using_sentinel() {
            Self::Sentinel {
                sentinels: c.sentinels.clone(),
                master_name: c.sentinel_service.clone(),
                db: c.database,
                password,
                socket_timeout: None,
                socket_connect_timeout: c.default_timeout.as_secs(),
            }
        } else {
            Self::Direct {
                host: c.host.clone(),
                port: c.port,
                db: c.database,
                password,
                default_timeout: c.default_timeout.as_secs(),
                ssl: c.ssl,
            }
        }
    }

    pub fn password(&self) -> Option<&str> {
        match self {
            Self::Sentinel { password, .. } | Self::Direct { password, .. } => {
                password.as_ref().map(|p| p.expose_secret().as_str())
            }
        }
    }
}

/// Background task settings.
#[derive(Debug, Serialize)]
pub struct TaskSettings {
    /// Whether the connection was taken from the deprecated
    /// `redis.webhooks` section.
    pub from_legacy_section: bool,
    /// Parameters per queue name.
    pub queues: BTreeMap<String, TaskQueueParams>,
}

impl TaskSettings {
    pub(crate) fn new(c: &RedisConnection, from_legacy_section: bool) -> Self {
        let queues = QUEUES.iter()
            .map(|name| (name.to_string(), TaskQueueParams::from_connection(c)))
            .collect();

        Self { from_legacy_section, queues }
    }
}
