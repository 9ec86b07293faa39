//! Settings resolution and authentication backends for NetBox.
//!
//! [`config::Config`] is loaded from a TOML file and validated. From it and a
//! [`plugins::PluginRegistry`], [`settings::Settings`] derives every effective
//! setting NetBox runs with. The [`auth`] module contains the permission and
//! remote LDAP authentication backends those settings refer to.

pub mod auth;
pub mod config;
pub mod logger;
pub mod plugins;
pub mod prelude;
pub mod settings;


/// The NetBox release these settings belong to.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
