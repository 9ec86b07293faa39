use hyper::{header::HeaderName, HeaderMap};

use crate::prelude::*;
use super::{Directory, RemoteLdapBackend, RemoteLdapConfig, User, UserStore};


/// Logs in users identified by the remote user header, set by a trusted
/// reverse proxy.
#[derive(Debug)]
pub struct RemoteUserMiddleware<D, S> {
    header: HeaderName,
    backend: RemoteLdapBackend<D, S>,
}

impl<D: Directory, S: UserStore> RemoteUserMiddleware<D, S> {
    pub fn new(header: HeaderName, backend: RemoteLdapBackend<D, S>) -> Self {
        Self { header, backend }
    }

    /// Creates the middleware from the configuration. Returns `None` if
    /// remote LDAP authentication is disabled.
    pub fn from_config(config: &RemoteLdapConfig, directory: D, store: S) -> Result<Option<Self>> {
        let Some(settings) = config.resolve()? else {
            return Ok(None);
        };

        let header = config.header_name()?;
        let backend = RemoteLdapBackend::new(settings.users, directory, store);
        Ok(Some(Self::new(header, backend)))
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    pub fn backend(&self) -> &RemoteLdapBackend<D, S> {
        &self.backend
    }

    /// Returns the remote username from the request headers, if present and
    /// not empty.
    pub fn remote_username<'h>(&self, headers: &'h HeaderMap) -> Option<&'h str> {
        let value = headers.get(&self.header)?;
        let Ok(value) = value.to_str() else {
            debug!("Ignoring non-ASCII value of '{}' header", self.header);
            return None;
        };

        Some(value).filter(|v| !v.trim().is_empty())
    }

    /// Authenticates the request. `Ok(None)` means that there is no remote
    /// user or that the login was rejected.
    pub fn process_request(&self, headers: &HeaderMap) -> Result<Option<User>> {
        match self.remote_username(headers) {
            Some(username) => self.backend.authenticate(Some(headers), username),
            None => Ok(None),
        }
    }
}
