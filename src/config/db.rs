use std::time::Duration;

use secrecy::SecretBox;


/// PostgreSQL connection. Only PostgreSQL is supported.
#[derive(Debug, confique::Config)]
pub struct DbConfig {
    /// Name of the database.
    pub name: String,

    /// The user to connect to the database with.
    pub user: String,

    /// The password of the database user.
    pub password: Option<SecretBox<String>>,

    /// The host of the database server.
    #[config(default = "localhost")]
    pub host: String,

    /// The port of the database server. If not set, the PostgreSQL default
    /// is used.
    pub port: Option<u16>,

    /// Maximum lifetime of a persistent database connection.
    #[config(default = "5min", deserialize_with = crate::config::deserialize_duration)]
    pub conn_max_age: Duration,
}
