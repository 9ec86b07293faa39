//! Authentication and authorization backends queried by the request pipeline.

use std::collections::{BTreeSet, HashSet};

use crate::prelude::*;


mod config;
mod ldap;
mod middleware;

pub use self::{
    config::{
        LdapConnectionSettings, LdapSearch, LdapUserOptions, RemoteLdapConfig,
        RemoteLdapSettings, SearchScope, USER_FLAGS, USER_PLACEHOLDER,
    },
    ldap::{
        escape_dn_chars, escape_filter_chars, AuthenticationFailed, Directory,
        DirectoryEntry, LdapError, RemoteLdapBackend, RemoteLdapUser, UserStore,
    },
    middleware::RemoteUserMiddleware,
};


/// Value of `general.exempt_view_permissions` that exempts all models.
pub const EXEMPT_ALL: &str = "*";


/// Data about a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    /// All permission labels the user has, directly or via groups, e.g.
    /// "dcim.add_device".
    pub permissions: HashSet<String>,
    /// Names of the groups the user is in.
    pub groups: BTreeSet<String>,
}

impl User {
    /// A new, active user without any permissions.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
            permissions: HashSet::new(),
            groups: BTreeSet::new(),
        }
    }

    /// Returns the value of a string field by name, as used by
    /// `user_query_field` and `user_attr_map`.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "username" => Some(&self.username),
            "first_name" => Some(&self.first_name),
            "last_name" => Some(&self.last_name),
            "email" => Some(&self.email),
            _ => None,
        }
    }

    /// Sets a string field by name. Returns `false` if there is no such field.
    pub fn set_field(&mut self, name: &str, value: String) -> bool {
        let field = match name {
            "username" => &mut self.username,
            "first_name" => &mut self.first_name,
            "last_name" => &mut self.last_name,
            "email" => &mut self.email,
            _ => return false,
        };
        *field = value;
        true
    }

    /// Sets one of the flags in [`USER_FLAGS`]. Returns `false` if there is no
    /// such flag.
    pub fn set_flag(&mut self, name: &str, value: bool) -> bool {
        let flag = match name {
            "is_active" => &mut self.is_active,
            "is_staff" => &mut self.is_staff,
            "is_superuser" => &mut self.is_superuser,
            _ => return false,
        };
        *flag = value;
        true
    }
}

/// A specific object a permission is checked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub app_label: String,
    pub model: String,
    pub pk: String,
}


/// A backend that answers permission questions.
pub trait PermissionBackend {
    /// Whether `user` has the permission `perm` ("<app>.<action>_<model>"),
    /// either on the model in general (`obj` is `None`) or on one object.
    fn has_perm(&self, user: &User, perm: &str, obj: Option<&ObjectRef>) -> bool;
}

/// The standard model-level permission check.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelBackend;

impl PermissionBackend for ModelBackend {
    fn has_perm(&self, user: &User, perm: &str, obj: Option<&ObjectRef>) -> bool {
        // Only model-level permissions exist, so no object-level permission is
        // ever granted.
        if !user.is_active || obj.is_some() {
            return false;
        }

        user.is_superuser || user.permissions.contains(perm)
    }
}


/// Models exempt from view permission enforcement, as configured in
/// `general.exempt_view_permissions`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExemptViewPermissions {
    all: bool,
    models: HashSet<String>,
}

impl ExemptViewPermissions {
    pub fn new<I, T>(entries: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut out = Self::default();
        for entry in entries {
            let entry = entry.into();
            if entry == EXEMPT_ALL {
                out.all = true;
            } else {
                out.models.insert(entry);
            }
        }
        out
    }

    /// Whether viewing `<app>.<model>` is exempt from enforcement.
    pub fn exempts(&self, app: &str, model: &str) -> bool {
        self.all || self.models.contains(&format!("{app}.{model}"))
    }

    /// Whether the given permission label is a view permission on an exempt
    /// model. Labels that cannot be parsed are never exempt.
    pub fn exempts_label(&self, perm: &str) -> bool {
        match parse_permission(perm) {
            Some(p) => p.action == "view" && self.exempts(p.app, p.model),
            None => false,
        }
    }
}


/// The parts of a permission label "<app>.<action>_<model>".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionParts<'a> {
    pub app: &'a str,
    pub action: &'a str,
    pub model: &'a str,
}

/// Splits a permission label into its parts. The label has to contain exactly
/// one '.' and the part after it exactly one '_', otherwise `None` is
/// returned.
///
/// Model names containing an underscore (e.g. "view_rack_group") therefore
/// never parse. That's a known limitation; such labels simply fall back to
/// the standard check.
pub fn parse_permission(perm: &str) -> Option<PermissionParts<'_>> {
    let (app, codename) = split_exactly_two(perm, '.')?;
    let (action, model) = split_exactly_two(codename, '_')?;
    Some(PermissionParts { app, action, model })
}

fn split_exactly_two(s: &str, sep: char) -> Option<(&str, &str)> {
    let mut parts = s.split(sep);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) => Some((a, b)),
        _ => None,
    }
}


/// The standard model backend, except that view permissions for exempt models
/// are always granted.
#[derive(Debug, Clone, Default)]
pub struct ViewExemptModelBackend<B = ModelBackend> {
    inner: B,
    exempt: ExemptViewPermissions,
}

impl ViewExemptModelBackend<ModelBackend> {
    pub fn new(exempt: ExemptViewPermissions) -> Self {
        Self::wrap(ModelBackend, exempt)
    }
}

impl<B: PermissionBackend> ViewExemptModelBackend<B> {
    /// Wraps an arbitrary backend that is consulted for everything that is
    /// not exempt.
    pub fn wrap(inner: B, exempt: ExemptViewPermissions) -> Self {
        Self { inner, exempt }
    }

    pub fn exempt(&self) -> &ExemptViewPermissions {
        &self.exempt
    }
}

impl<B: PermissionBackend> PermissionBackend for ViewExemptModelBackend<B> {
    fn has_perm(&self, user: &User, perm: &str, obj: Option<&ObjectRef>) -> bool {
        if self.exempt.exempts_label(perm) {
            trace!("Permission '{perm}' is exempt from view permission enforcement");
            return true;
        }

        self.inner.has_perm(user, perm, obj)
    }
}
