use std::{collections::HashMap, time::Duration};

use hyper::header::HeaderName;
use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Serialize};

use crate::prelude::*;


/// Placeholder in `user_dn_template` and in search filters that is replaced
/// by the (escaped) username.
pub const USER_PLACEHOLDER: &str = "%(user)s";

/// User flags that can be set from LDAP group membership.
pub const USER_FLAGS: &[&str] = &["is_active", "is_staff", "is_superuser"];


/// Remote user authentication via LDAP.
///
/// A trusted reverse proxy authenticates the user and passes the username in
/// a request header (`remote_auth_header`). That username is then looked up in
/// the LDAP directory, **without** any password check. Make sure that only the
/// proxy can reach NetBox, otherwise anyone can log in as anyone by setting
/// that header.
#[derive(Debug, confique::Config)]
pub struct RemoteLdapConfig {
    /// Whether remote LDAP authentication is used.
    #[config(default = false)]
    pub enabled: bool,

    /// URI of the LDAP server, e.g. "ldaps://ad.example.com". Required if
    /// `enabled` is `true`.
    pub server_uri: Option<String>,

    /// The request header containing the username. Either a plain header
    /// name ("Remote-User") or in CGI style ("HTTP_REMOTE_USER").
    #[config(default = "HTTP_REMOTE_USER")]
    pub remote_auth_header: String,

    /// Update the user's attributes from LDAP on every login, not only when
    /// the user is created.
    #[config(default = true)]
    pub always_update_user: bool,

    /// Furnish permissions for any user, regardless of which backend
    /// authenticated it.
    #[config(default = false)]
    pub authorize_all_users: bool,

    #[config(default = false)]
    pub bind_as_authenticating_user: bool,

    /// DN of the service account used to search the directory. Leave empty
    /// for an anonymous bind.
    #[config(default = "")]
    pub bind_dn: String,

    #[config(default = "")]
    pub bind_password: SecretBox<String>,

    /// How long LDAP lookups are cached. "0" disables caching.
    #[config(default = "0", deserialize_with = crate::config::deserialize_duration)]
    pub cache_timeout: Duration,

    /// Options set on each LDAP connection, e.g. `{ OPT_REFERRALS = 0 }`.
    #[config(default = {})]
    pub connection_options: HashMap<String, serde_json::Value>,

    /// Users in this group are denied login.
    pub deny_group: Option<String>,

    #[config(default = false)]
    pub find_group_perms: bool,

    /// Options set globally for the LDAP client library.
    #[config(default = {})]
    pub global_options: HashMap<String, serde_json::Value>,

    /// Where and how to search for groups. Example:
    ///
    ///     [remote_ldap.group_search]
    ///     base_dn = "dc=example,dc=com"
    ///     scope = "subtree"
    ///     filter = "(objectClass=group)"
    pub group_search: Option<LdapSearch>,

    /// Type of the LDAP groups, e.g. "GroupOfNamesType" or
    /// "NestedActiveDirectoryGroupType".
    pub group_type: Option<String>,

    /// Replace the user's groups with the names of their LDAP groups on
    /// every update.
    #[config(default = false)]
    pub mirror_groups: bool,

    /// Groups that are never touched when mirroring.
    #[config(default = [])]
    pub mirror_groups_except: Vec<String>,

    #[config(default = false)]
    pub permit_empty_password: bool,

    /// Only users in this group may log in.
    pub require_group: Option<String>,

    /// Do not create users that don't exist yet.
    #[config(default = false)]
    pub no_new_users: bool,

    #[config(default = false)]
    pub start_tls: bool,

    /// User field used to look up existing users. Its value is taken from
    /// the LDAP attribute that `user_attr_map` maps to this field. If not set,
    /// users are looked up by username.
    pub user_query_field: Option<String>,

    /// LDAP attributes to load for a user. If not set, all are loaded.
    pub user_attrlist: Option<Vec<String>>,

    /// Maps user fields to LDAP attributes, e.g.
    /// `{ first_name = "givenName", last_name = "sn", email = "mail" }`.
    #[config(default = {})]
    pub user_attr_map: HashMap<String, String>,

    /// Template to build the user's DN directly, e.g.
    /// "uid=%(user)s,ou=users,dc=example,dc=com". Takes precedence over
    /// `user_search`.
    pub user_dn_template: Option<String>,

    /// Maps user flags (`is_active`, `is_staff`, `is_superuser`) to the DN of
    /// a group. Members of that group get the flag set.
    #[config(default = {})]
    pub user_flags_by_group: HashMap<String, String>,

    /// How to search for the user's DN. `%(user)s` in the filter is replaced
    /// by the username. Example:
    ///
    ///     [remote_ldap.user_search]
    ///     base_dn = "ou=users,dc=example,dc=com"
    ///     filter = "(sAMAccountName=%(user)s)"
    pub user_search: Option<LdapSearch>,

    /// Do not verify the TLS certificate of the LDAP server.
    #[config(default = false)]
    pub ignore_cert_errors: bool,
}

/// An LDAP search definition: base DN, scope and filter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LdapSearch {
    pub base_dn: String,

    #[serde(default)]
    pub scope: SearchScope,

    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "(objectClass=*)".into()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchScope {
    Base,
    OneLevel,
    #[default]
    Subtree,
}

impl RemoteLdapConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let Some(uri) = &self.server_uri else {
            bail!("'remote_ldap.enabled' is true, but required parameter \
                'remote_ldap.server_uri' is missing");
        };
        let url: url::Url = uri.parse()
            .map_err(|e| anyhow!("'remote_ldap.server_uri' is not a valid URI: {e}"))?;
        if !["ldap", "ldaps", "ldapi"].contains(&url.scheme()) {
            bail!("'remote_ldap.server_uri' has to use 'ldap', 'ldaps' or 'ldapi' scheme");
        }

        self.header_name()?;

        if let Some(template) = &self.user_dn_template {
            if !template.contains(USER_PLACEHOLDER) {
                bail!("'remote_ldap.user_dn_template' has to contain '{USER_PLACEHOLDER}'");
            }
        }

        if let Some(flag) = self.user_flags_by_group.keys().find(|f| !USER_FLAGS.contains(&f.as_str())) {
            bail!(
                "'{flag}' in 'remote_ldap.user_flags_by_group' is not a valid flag \
                    (valid: {})",
                USER_FLAGS.join(", "),
            );
        }

        Ok(())
    }

    pub(crate) fn lint(&self) {
        if self.enabled && self.user_dn_template.is_none() && self.user_search.is_none() {
            warn!("Remote LDAP authentication is enabled, but neither \
                'remote_ldap.user_dn_template' nor 'remote_ldap.user_search' is set: \
                no username can be mapped to a DN, so every login will fail");
        }
    }

    /// The name of the HTTP header that carries the remote username.
    /// CGI-style names like `HTTP_REMOTE_USER` are converted to `remote-user`.
    pub fn header_name(&self) -> Result<HeaderName> {
        let raw = self.remote_auth_header.trim();
        let name = match raw.strip_prefix("HTTP_") {
            Some(rest) => rest.replace('_', "-"),
            None => raw.to_owned(),
        };

        HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes())
            .map_err(|e| anyhow!("'remote_ldap.remote_auth_header' is not a valid header: {e}"))
    }

    /// Returns the resolved settings if remote LDAP is enabled.
    pub fn resolve(&self) -> Result<Option<RemoteLdapSettings>> {
        if !self.enabled {
            return Ok(None);
        }

        let server_uri = self.server_uri.clone()
            .ok_or_else(|| anyhow!("required parameter 'remote_ldap.server_uri' is missing"))?;

        Ok(Some(RemoteLdapSettings {
            header: self.header_name()?.as_str().to_owned(),
            connection: LdapConnectionSettings {
                server_uri,
                bind_dn: self.bind_dn.clone(),
                bind_password: SecretBox::new(Box::new(self.bind_password.expose_secret().clone())),
                bind_as_authenticating_user: self.bind_as_authenticating_user,
                start_tls: self.start_tls,
                ignore_cert_errors: self.ignore_cert_errors,
                connection_options: self.connection_options.clone(),
                global_options: self.global_options.clone(),
                cache_timeout: self.cache_timeout.as_secs(),
                group_type: self.group_type.clone(),
                group_search: self.group_search.clone(),
                permit_empty_password: self.permit_empty_password,
            },
            users: LdapUserOptions {
                user_dn_template: self.user_dn_template.clone(),
                user_search: self.user_search.clone(),
                user_attrlist: self.user_attrlist.clone(),
                user_attr_map: self.user_attr_map.clone(),
                user_query_field: self.user_query_field.clone(),
                user_flags_by_group: self.user_flags_by_group.clone(),
                require_group: self.require_group.clone(),
                deny_group: self.deny_group.clone(),
                always_update_user: self.always_update_user,
                no_new_users: self.no_new_users,
                mirror_groups: self.mirror_groups,
                mirror_groups_except: self.mirror_groups_except.clone(),
                find_group_perms: self.find_group_perms,
                authorize_all_users: self.authorize_all_users,
            },
        }))
    }
}


/// Resolved remote LDAP settings.
#[derive(Debug, Serialize)]
pub struct RemoteLdapSettings {
    /// Lowercase name of the header the remote username is read from.
    pub header: String,
    pub connection: LdapConnectionSettings,
    pub users: LdapUserOptions,
}

/// Everything needed to connect and bind to the directory. Used by the
/// directory client, not by the backend itself.
#[derive(Debug, Serialize)]
pub struct LdapConnectionSettings {
    pub server_uri: String,
    pub bind_dn: String,
    #[serde(serialize_with = "crate::settings::redact")]
    pub bind_password: SecretBox<String>,
    pub bind_as_authenticating_user: bool,
    pub start_tls: bool,
    pub ignore_cert_errors: bool,
    pub connection_options: HashMap<String, serde_json::Value>,
    pub global_options: HashMap<String, serde_json::Value>,
    /// In seconds.
    pub cache_timeout: u64,
    pub group_type: Option<String>,
    pub group_search: Option<LdapSearch>,
    pub permit_empty_password: bool,
}

/// How users are mapped from directory entries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LdapUserOptions {
    pub user_dn_template: Option<String>,
    pub user_search: Option<LdapSearch>,
    pub user_attrlist: Option<Vec<String>>,
    pub user_attr_map: HashMap<String, String>,
    pub user_query_field: Option<String>,
    pub user_flags_by_group: HashMap<String, String>,
    pub require_group: Option<String>,
    pub deny_group: Option<String>,
    pub always_update_user: bool,
    pub no_new_users: bool,
    pub mirror_groups: bool,
    pub mirror_groups_except: Vec<String>,
    pub find_group_perms: bool,
    pub authorize_all_users: bool,
}
