use std::time::Duration;

use url::Url;

use crate::prelude::*;


/// The smallest allowed interval between two checks for new releases.
pub const MIN_RELEASE_CHECK_TIMEOUT: Duration = Duration::from_secs(3600);


/// Periodic check for new NetBox releases.
#[derive(Debug, confique::Config)]
pub struct ReleaseCheckConfig {
    /// API URL of the repository to check for new releases. If not set, no
    /// checks are performed. Example:
    /// "https://api.github.com/repos/netbox-community/netbox/releases".
    pub url: Option<String>,

    /// How long the result of a release check is cached. Has to be at least
    /// one hour.
    #[config(default = "24h", deserialize_with = crate::config::deserialize_duration)]
    pub timeout: Duration,
}

impl ReleaseCheckConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        self.parsed_url()?;

        if self.timeout < MIN_RELEASE_CHECK_TIMEOUT {
            bail!(
                "'release_check.timeout' has to be at least {} seconds (1 hour)",
                MIN_RELEASE_CHECK_TIMEOUT.as_secs(),
            );
        }

        Ok(())
    }

    /// Returns the parsed release check URL or `None` if none is configured.
    pub fn parsed_url(&self) -> Result<Option<Url>> {
        let Some(src) = self.url.as_deref().filter(|s| !s.is_empty()) else {
            return Ok(None);
        };

        crate::config::parse_url_with_schemes(src, &["http", "https", "ftp", "ftps"])
            .context("'release_check.url' must be a valid API URL. Example: \
                https://api.github.com/repos/netbox-community/netbox")?
            .pipe(Some)
            .pipe(Ok)
    }
}
