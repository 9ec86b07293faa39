//! Remote user authentication against an LDAP directory.
//!
//! The username is supplied by a trusted reverse proxy and only looked up in
//! the directory. No bind with the user's password ever happens.

use std::{collections::{BTreeSet, HashMap}, fmt};

use hyper::HeaderMap;

use crate::prelude::*;
use super::{LdapUserOptions, SearchScope, User, USER_PLACEHOLDER};


/// A single entry returned by the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    /// Attribute name to values. Names are as returned by the server.
    pub attrs: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    /// First value of the given attribute. Attribute names are compared
    /// case-insensitively, as LDAP does.
    pub fn first(&self, attr: &str) -> Option<&str> {
        self.attrs.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attr))
            .and_then(|(_, values)| values.first())
            .map(|s| s.as_str())
    }
}

/// Read access to an LDAP directory. Connecting and binding (with the service
/// account from `remote_ldap.bind_dn`) is the job of the implementation.
///
/// All methods are blocking. Errors are treated as infrastructure failures:
/// the login attempt fails, but the error is logged as a warning.
pub trait Directory {
    /// Performs a search and returns all matching entries. `attrlist` limits
    /// the loaded attributes; `None` means all.
    fn search(
        &self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attrlist: Option<&[String]>,
    ) -> Result<Vec<DirectoryEntry>>;

    /// Loads a single entry by DN. Returns `None` if it does not exist.
    fn entry(&self, dn: &str, attrlist: Option<&[String]>) -> Result<Option<DirectoryEntry>> {
        self.search(dn, SearchScope::Base, "(objectClass=*)", attrlist)
            .map(|entries| entries.into_iter().next())
    }

    /// DNs of all groups the given user is a member of.
    fn group_dns(&self, user_dn: &str) -> Result<Vec<String>>;

    /// Names of all groups the given user is a member of. By default, the
    /// value of the first RDN of each group DN, e.g. "netbox-admins" for
    /// "cn=netbox-admins,ou=groups,dc=example,dc=com".
    fn group_names(&self, user_dn: &str) -> Result<Vec<String>> {
        let names = self.group_dns(user_dn)?
            .iter()
            .filter_map(|dn| first_rdn_value(dn))
            .collect();
        Ok(names)
    }
}

/// Persistent storage of local users.
pub trait UserStore {
    /// Finds the user whose `field` (e.g. "username") equals `value`.
    fn find(&self, field: &str, value: &str) -> Result<Option<User>>;

    /// Creates or updates the given user.
    fn save(&self, user: &User) -> Result<()>;
}


/// A login attempt was rejected. This only affects this single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationFailed(pub String);

impl AuthenticationFailed {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl fmt::Display for AuthenticationFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for AuthenticationFailed {}

/// Everything that can go wrong while authenticating a remote user.
#[derive(Debug)]
pub enum LdapError {
    /// The user was rejected, e.g. because no DN could be found.
    AuthenticationFailed(AuthenticationFailed),
    /// Communicating with the directory failed.
    Directory(anyhow::Error),
    /// Reading or writing local users failed.
    Store(anyhow::Error),
}

impl fmt::Display for LdapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthenticationFailed(e) => write!(f, "authentication failed: {e}"),
            Self::Directory(e) => write!(f, "LDAP directory error: {e:#}"),
            Self::Store(e) => write!(f, "user store error: {e:#}"),
        }
    }
}

impl std::error::Error for LdapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::AuthenticationFailed(e) => Some(e),
            Self::Directory(e) | Self::Store(e) => Some(e.as_ref()),
        }
    }
}

impl From<AuthenticationFailed> for LdapError {
    fn from(value: AuthenticationFailed) -> Self {
        Self::AuthenticationFailed(value)
    }
}


/// Escapes a value for use in a DN (RFC 4514).
pub fn escape_dn_chars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let last = s.chars().count().saturating_sub(1);
    for (i, c) in s.chars().enumerate() {
        match c {
            '\\' | ',' | '+' | '"' | '<' | '>' | ';' | '=' => {
                out.push('\\');
                out.push(c);
            }
            '\0' => out.push_str("\\00"),
            '#' | ' ' if i == 0 => {
                out.push('\\');
                out.push(c);
            }
            ' ' if i == last => out.push_str("\\ "),
            _ => out.push(c),
        }
    }
    out
}

/// Escapes a value for use in a search filter (RFC 4515).
pub fn escape_filter_chars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\5c"),
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\0' => out.push_str("\\00"),
            _ => out.push(c),
        }
    }
    out
}

/// Returns the unescaped value of the first RDN of `dn`.
fn first_rdn_value(dn: &str) -> Option<String> {
    let mut rdn = String::new();
    let mut chars = dn.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                rdn.push(c);
                rdn.extend(chars.next());
            }
            ',' | '+' => break,
            _ => rdn.push(c),
        }
    }

    let (_, value) = rdn.split_once('=')?;
    let mut out = String::with_capacity(value.len());
    let mut chars = value.trim().chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            _ => out.push(c),
        }
    }
    Some(out).filter(|s| !s.is_empty())
}


/// A single remote user authentication attempt: the cleaned username plus
/// everything loaded from the directory along the way.
pub struct RemoteLdapUser<'a, D, S> {
    username: String,
    request: Option<&'a HeaderMap>,
    options: &'a LdapUserOptions,
    directory: &'a D,
    store: &'a S,

    /// The user's entry, once the DN has been resolved.
    entry: Option<DirectoryEntry>,
    group_dns: Option<Vec<String>>,
}

impl<'a, D: Directory, S: UserStore> RemoteLdapUser<'a, D, S> {
    pub fn new(
        username: impl Into<String>,
        request: Option<&'a HeaderMap>,
        options: &'a LdapUserOptions,
        directory: &'a D,
        store: &'a S,
    ) -> Self {
        Self {
            username: username.into(),
            request,
            options,
            directory,
            store,
            entry: None,
            group_dns: None,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// The user's DN, if already resolved.
    pub fn dn(&self) -> Option<&str> {
        self.entry.as_ref().map(|e| e.dn.as_str())
    }

    /// Runs the whole authentication: resolves the DN, checks group
    /// requirements and finds, creates or updates the local user.
    pub fn authenticate(mut self) -> Result<User, LdapError> {
        if let Some(forwarded) = self.forwarded_for() {
            debug!("Remote login for '{}' (forwarded for {forwarded})", self.username);
        }

        self.authenticate_user_dn()?;
        self.check_requirements()?;
        self.get_or_create_user()
    }

    fn forwarded_for(&self) -> Option<&str> {
        self.request?
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
    }

    /// Makes sure the username maps to a DN. Nothing is bound: the remote
    /// proxy already authenticated the user.
    fn authenticate_user_dn(&mut self) -> Result<(), LdapError> {
        if self.entry.is_none() {
            self.entry = self.resolve_dn()?;
        }
        if self.entry.is_none() {
            return Err(AuthenticationFailed::new("failed to map the username to a DN.").into());
        }
        Ok(())
    }

    /// Finds the user's entry via `user_dn_template` or, if that is not set,
    /// via `user_search`.
    fn resolve_dn(&self) -> Result<Option<DirectoryEntry>, LdapError> {
        let attrlist = self.options.user_attrlist.as_deref();

        if let Some(template) = &self.options.user_dn_template {
            let dn = template.replace(USER_PLACEHOLDER, &escape_dn_chars(&self.username));
            trace!("Looking up '{dn}'");
            let entry = self.directory.entry(&dn, attrlist).map_err(LdapError::Directory)?;
            if entry.is_none() {
                debug!("No LDAP entry '{dn}' for user '{}'", self.username);
            }
            return Ok(entry);
        }

        if let Some(search) = &self.options.user_search {
            let filter = search.filter.replace(
                USER_PLACEHOLDER,
                &escape_filter_chars(&self.username),
            );
            trace!("Searching '{}' with filter '{filter}'", search.base_dn);
            let mut results = self.directory
                .search(&search.base_dn, search.scope, &filter, attrlist)
                .map_err(LdapError::Directory)?;

            if results.len() != 1 {
                debug!(
                    "Search for user '{}' returned {} results, expected exactly one",
                    self.username,
                    results.len(),
                );
                return Ok(None);
            }
            return Ok(results.pop());
        }

        Ok(None)
    }

    fn entry(&self) -> Result<&DirectoryEntry, LdapError> {
        self.entry.as_ref()
            .ok_or_else(|| AuthenticationFailed::new("failed to map the username to a DN.").into())
    }

    fn is_member(&mut self, group_dn: &str) -> Result<bool, LdapError> {
        if self.group_dns.is_none() {
            let dn = self.entry()?.dn.clone();
            let groups = self.directory.group_dns(&dn).map_err(LdapError::Directory)?;
            self.group_dns = Some(groups);
        }

        let groups = self.group_dns.as_deref().unwrap_or_default();
        Ok(groups.iter().any(|g| g.eq_ignore_ascii_case(group_dn)))
    }

    fn check_requirements(&mut self) -> Result<(), LdapError> {
        let options = self.options;
        if let Some(group) = &options.require_group {
            if !self.is_member(group)? {
                return Err(AuthenticationFailed::new(
                    "user does not satisfy AUTH_LDAP_REQUIRE_GROUP",
                ).into());
            }
        }

        if let Some(group) = &options.deny_group {
            if self.is_member(group)? {
                return Err(AuthenticationFailed::new(
                    "user does not satisfy AUTH_LDAP_DENY_GROUP",
                ).into());
            }
        }

        Ok(())
    }

    fn get_or_create_user(&mut self) -> Result<User, LdapError> {
        let options = self.options;
        let (field, value) = match options.user_query_field.as_deref() {
            None | Some("username") => ("username", self.username.clone()),
            Some(field) => {
                let value = options.user_attr_map.get(field)
                    .and_then(|attr| self.entry.as_ref()?.first(attr))
                    .ok_or_else(|| AuthenticationFailed::new(format!(
                        "missing value for user_query_field '{field}'"
                    )))?;
                (field, value.to_owned())
            }
        };

        let existing = self.store.find(field, &value).map_err(LdapError::Store)?;
        let built = existing.is_none();
        let mut user = match existing {
            Some(user) => user,
            None if options.no_new_users => {
                return Err(AuthenticationFailed::new(
                    "user does not exist and no_new_users is set",
                ).into());
            }
            None => {
                debug!("Creating local user '{}'", self.username);
                User::new(self.username.clone())
            }
        };

        if built || options.always_update_user {
            self.populate_user(&mut user)?;
            self.store.save(&user).map_err(LdapError::Store)?;
        }

        Ok(user)
    }

    /// Copies attributes, flags and (optionally) groups from the directory
    /// to the local user.
    fn populate_user(&mut self, user: &mut User) -> Result<(), LdapError> {
        let options = self.options;
        let entry = self.entry()?;

        for (field, attr) in &options.user_attr_map {
            match entry.first(attr) {
                Some(value) => {
                    if !user.set_field(field, value.to_owned()) {
                        warn!("'{field}' in 'remote_ldap.user_attr_map' is not a user field");
                    }
                }
                None => warn!("{} does not have a value for the attribute {attr}", entry.dn),
            }
        }

        for (flag, group) in &options.user_flags_by_group {
            let value = self.is_member(group)?;
            if !user.set_flag(flag, value) {
                warn!("'{flag}' in 'remote_ldap.user_flags_by_group' is not a user flag");
            }
        }

        if options.mirror_groups {
            let dn = self.entry()?.dn.clone();
            let names = self.directory.group_names(&dn).map_err(LdapError::Directory)?;
            let except = &options.mirror_groups_except;

            let kept = user.groups.iter().filter(|g| except.contains(g)).cloned();
            let mirrored = names.into_iter().filter(|g| !except.contains(g));
            user.groups = kept.chain(mirrored).collect::<BTreeSet<_>>();
        }

        Ok(())
    }
}


/// Authenticates users identified by a trusted remote header against an LDAP
/// directory, without any password check.
pub struct RemoteLdapBackend<D, S> {
    options: LdapUserOptions,
    directory: D,
    store: S,
    clean_username: Box<dyn Fn(&str) -> String + Send + Sync>,
}

impl<D: Directory, S: UserStore> RemoteLdapBackend<D, S> {
    pub fn new(options: LdapUserOptions, directory: D, store: S) -> Self {
        Self {
            options,
            directory,
            store,
            clean_username: Box::new(|username| username.to_owned()),
        }
    }

    /// Replaces the username cleaning, which by default does nothing. Useful
    /// to e.g. remove a "@domain" suffix.
    pub fn with_username_cleaner(
        mut self,
        f: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.clean_username = Box::new(f);
        self
    }

    pub fn clean_username(&self, username: &str) -> String {
        (self.clean_username)(username)
    }

    pub fn options(&self) -> &LdapUserOptions {
        &self.options
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Like [`Self::authenticate`], but returns the reason for a failed login.
    pub fn try_authenticate(
        &self,
        request: Option<&HeaderMap>,
        remote_username: &str,
    ) -> Result<User, LdapError> {
        let username = self.clean_username(remote_username);
        let username = username.trim();
        RemoteLdapUser::new(username, request, &self.options, &self.directory, &self.store)
            .authenticate()
    }

    /// Authenticates the user with the given remote username. Returns
    /// `Ok(None)` if the login is rejected or the directory is unavailable.
    /// Only failures of the user store are returned as errors.
    pub fn authenticate(
        &self,
        request: Option<&HeaderMap>,
        remote_username: &str,
    ) -> Result<Option<User>> {
        match self.try_authenticate(request, remote_username) {
            Ok(user) => Ok(Some(user)),
            Err(LdapError::AuthenticationFailed(e)) => {
                debug!("Authentication failed for {}: {e}", remote_username.trim());
                Ok(None)
            }
            Err(LdapError::Directory(e)) => {
                warn!("Caught LDAP error while authenticating {}: {e:#}", remote_username.trim());
                Ok(None)
            }
            Err(LdapError::Store(e)) => Err(e)
                .context(format!("failed to authenticate {}", remote_username.trim())),
        }
    }
}

impl<D, S> fmt::Debug for RemoteLdapBackend<D, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteLdapBackend")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
