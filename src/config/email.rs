use std::{path::PathBuf, time::Duration};

use secrecy::SecretBox;

use crate::prelude::*;


/// Outgoing email. If `server` is not set, no emails are sent.
#[derive(Debug, confique::Config)]
pub struct EmailConfig {
    /// Host name of the SMTP server.
    pub server: Option<String>,

    #[config(default = 25)]
    pub port: u16,

    pub username: Option<String>,

    pub password: Option<SecretBox<String>>,

    /// Use implicit TLS (usually port 465). Mutually exclusive with `use_tls`.
    #[config(default = false)]
    pub use_ssl: bool,

    /// Use STARTTLS (usually port 587). Mutually exclusive with `use_ssl`.
    #[config(default = false)]
    pub use_tls: bool,

    /// Path to a PEM-formatted certificate chain used for the SSL connection.
    pub ssl_certfile: Option<PathBuf>,

    /// Path to a PEM-formatted private key used for the SSL connection.
    pub ssl_keyfile: Option<PathBuf>,

    #[config(default = "10s", deserialize_with = crate::config::deserialize_duration)]
    pub timeout: Duration,

    /// Sender address of emails sent by NetBox.
    pub from_email: Option<String>,
}

impl EmailConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.use_ssl && self.use_tls {
            bail!("'email.use_ssl' and 'email.use_tls' are mutually exclusive, \
                so only set one of those settings to true");
        }

        Ok(())
    }
}
