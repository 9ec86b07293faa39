//! Resolution of the loaded configuration into the final, immutable settings
//! the rest of the application runs with.
//!
//! Resolution happens once at startup and any error is fatal. All defaults
//! have already been applied by the configuration layer, so this module only
//! validates, derives values and merges in the plugins.

use std::{collections::{BTreeMap, HashMap}, net::IpAddr, path::PathBuf};

use secrecy::{ExposeSecret, SecretBox};
use serde::{Serialize, Serializer};

use crate::{
    auth::RemoteLdapSettings,
    config::{Admin, Config, TasksSection},
    plugins::{self, PluginRegistry, PluginSettings},
    prelude::*,
};

mod cache;
mod tasks;

#[cfg(test)]
mod tests;

pub use self::{
    cache::{default_policies, CacheBackend, CachePolicy, CachingSettings},
    tasks::{TaskQueueParams, TaskSettings, QUEUES},
};


/// Minimum size of user public keys used to encrypt secrets, in bits.
pub const SECRETS_MIN_PUBKEY_SIZE: u32 = 2048;

/// Page sizes offered in the UI. `display.paginate_count` is added if it is
/// not in this list already.
pub const PER_PAGE_DEFAULTS: &[u32] = &[25, 50, 100, 250, 500, 1000];

pub const EMAIL_SUBJECT_PREFIX: &str = "[NetBox] ";

const REDACTED: &str = "********";

const INSTALLED_APPS: &[&str] = &[
    "django.contrib.admin",
    "django.contrib.auth",
    "django.contrib.contenttypes",
    "django.contrib.sessions",
    "django.contrib.messages",
    "django.contrib.staticfiles",
    "django.contrib.humanize",
    "cacheops",
    "corsheaders",
    "debug_toolbar",
    "django_filters",
    "django_tables2",
    "django_prometheus",
    "mptt",
    "rest_framework",
    "taggit",
    "taggit_serializer",
    "timezone_field",
    "circuits",
    "dcim",
    "ipam",
    "extras",
    "secrets",
    "tenancy",
    "users",
    "utilities",
    "virtualization",
    // Has to come after "extras" so that it can override management commands.
    "django_rq",
    "drf_yasg",
];

const MIDDLEWARE_BEFORE_AUTH: &[&str] = &[
    "debug_toolbar.middleware.DebugToolbarMiddleware",
    "django_prometheus.middleware.PrometheusBeforeMiddleware",
    "corsheaders.middleware.CorsMiddleware",
    "django.contrib.sessions.middleware.SessionMiddleware",
    "django.middleware.common.CommonMiddleware",
    "django.middleware.csrf.CsrfViewMiddleware",
    "django.contrib.auth.middleware.AuthenticationMiddleware",
    "django.contrib.messages.middleware.MessageMiddleware",
    "django.middleware.clickjacking.XFrameOptionsMiddleware",
    "django.middleware.security.SecurityMiddleware",
    "utilities.middleware.ExceptionHandlingMiddleware",
];

pub const REMOTE_LDAP_MIDDLEWARE: &str = "utilities.middleware.RemoteLDAPMiddleware";

const MIDDLEWARE_AFTER_AUTH: &[&str] = &[
    "utilities.middleware.LoginRequiredMiddleware",
    "utilities.middleware.APIVersionMiddleware",
    "extras.middleware.ObjectChangeMiddleware",
    "django_prometheus.middleware.PrometheusAfterMiddleware",
];

pub const VIEW_EXEMPT_BACKEND: &str = "utilities.auth_backends.ViewExemptModelBackend";
pub const REMOTE_LDAP_BACKEND: &str = "utilities.auth_backends.RemoteLDAPBackend";

const DB_ENGINE: &str = "django.db.backends.postgresql";
const DB_ENGINE_WITH_METRICS: &str = "django_prometheus.db.backends.postgresql";

const FILE_SESSION_ENGINE: &str = "django.contrib.sessions.backends.file";


/// The fully resolved settings.
#[derive(Debug, Serialize)]
pub struct Settings {
    pub version: &'static str,
    /// "major.minor" of `version`.
    pub rest_api_version: String,
    pub hostname: String,

    pub allowed_hosts: Vec<String>,
    pub csrf_trusted_origins: Vec<String>,
    #[serde(serialize_with = "redact")]
    pub secret_key: SecretBox<String>,
    pub admins: Vec<Admin>,
    pub allowed_url_schemes: Vec<String>,
    /// Normalized: empty or with exactly one trailing slash.
    pub base_path: String,
    pub changelog_retention: u32,
    pub debug: bool,
    pub developer: bool,
    pub enforce_global_unique: bool,
    pub exempt_view_permissions: Vec<String>,
    pub http_proxies: Option<HashMap<String, String>>,
    pub internal_ips: Vec<IpAddr>,
    pub login_required: bool,
    pub maintenance_mode: bool,
    pub metrics_enabled: bool,
    pub prefer_ipv4: bool,
    pub time_zone: String,

    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub tasks: TaskSettings,
    pub caching: CachingSettings,
    pub sessions: SessionSettings,
    pub email: EmailSettings,

    pub installed_apps: Vec<String>,
    pub middleware: Vec<String>,
    pub authentication_backends: Vec<String>,
    pub urls: UrlSettings,
    pub rest_api: RestApiSettings,
    pub per_page_defaults: Vec<u32>,
    pub secrets_min_pubkey_size: u32,

    pub remote_ldap: Option<RemoteLdapSettings>,
    /// Validated settings of each enabled plugin, defaults filled in.
    pub plugins_config: BTreeMap<String, PluginSettings>,

    pub display: crate::config::DisplayConfig,
    pub paths: PathSettings,
    pub napalm: NapalmSettings,
    pub release_check: ReleaseCheckSettings,
    pub cors: crate::config::CorsConfig,
    pub logging: LoggingSettings,
}

#[derive(Debug, Serialize)]
pub struct DatabaseSettings {
    pub engine: &'static str,
    pub name: String,
    pub user: String,
    #[serde(serialize_with = "redact_option")]
    pub password: Option<SecretBox<String>>,
    pub host: String,
    pub port: Option<u16>,
    /// In seconds.
    pub conn_max_age: u64,
}

#[derive(Debug, Serialize)]
pub struct StorageSettings {
    /// `None` means local file storage in `paths.media_root`.
    pub default_file_storage: Option<String>,
    /// Only set if a backend is configured.
    pub config: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct SessionSettings {
    /// Lifetime of the session cookie in seconds. `None` means the web
    /// framework's default.
    pub cookie_age: Option<u64>,
    /// `None` means the default (database) engine.
    pub engine: Option<&'static str>,
    pub file_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct EmailSettings {
    pub host: Option<String>,
    pub port: u16,
    pub host_user: Option<String>,
    #[serde(serialize_with = "redact_option")]
    pub host_password: Option<SecretBox<String>>,
    pub use_ssl: bool,
    pub use_tls: bool,
    pub ssl_certfile: Option<PathBuf>,
    pub ssl_keyfile: Option<PathBuf>,
    /// In seconds.
    pub timeout: u64,
    pub subject_prefix: &'static str,
    pub server_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UrlSettings {
    pub static_url: String,
    pub media_url: String,
    pub login_url: String,
}

#[derive(Debug, Serialize)]
pub struct RestApiSettings {
    pub allowed_versions: Vec<String>,
    pub default_version: String,
    pub page_size: u32,
    pub max_page_size: u32,
}

#[derive(Debug, Serialize)]
pub struct PathSettings {
    pub docs_root: PathBuf,
    pub media_root: PathBuf,
    pub reports_root: PathBuf,
    pub scripts_root: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct NapalmSettings {
    pub username: String,
    #[serde(serialize_with = "redact")]
    pub password: SecretBox<String>,
    /// In seconds.
    pub timeout: u64,
    pub args: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct ReleaseCheckSettings {
    pub url: Option<url::Url>,
    /// In seconds.
    pub timeout: u64,
}

#[derive(Debug, Serialize)]
pub struct LoggingSettings {
    pub filters: BTreeMap<String, String>,
    pub file: Option<PathBuf>,
    pub stdout: bool,
}


impl Settings {
    /// Validates the configuration, resolves all enabled plugins and derives
    /// the final settings. Any error is fatal.
    pub fn resolve(config: &Config, registry: &PluginRegistry) -> Result<Self> {
        config.validate().context("failed to validate configuration")?;
        config.lint();

        let general = &config.general;
        let base_path = general.normalized_base_path();
        let rest_api_version = rest_api_version(crate::VERSION);

        // Redis
        let tasks = match config.redis.tasks_section()? {
            TasksSection::Tasks(c) => TaskSettings::new(c, false),
            TasksSection::Webhooks(c) => {
                warn!("The 'redis.webhooks' configuration section has been renamed to \
                    'redis.tasks'. Please update your configuration as support for the old \
                    name will be removed in a future release.");
                TaskSettings::new(c, true)
            }
        };
        let caching_conn = config.redis.caching_section()?;

        // Plugins
        let resolved_plugins = plugins::resolve(&config.plugins, registry)
            .context("failed to resolve plugins")?;

        let mut policies = default_policies();
        policies.extend(resolved_plugins.cache_policies);
        let caching = CachingSettings {
            enabled: !config.cache.timeout.is_zero(),
            backend: CacheBackend::from_connection(caching_conn),
            default_timeout: config.cache.timeout.as_secs(),
            policies,
            degrade_on_failure: true,
        };

        // Remote LDAP
        let remote_ldap = config.remote_ldap.resolve()
            .context("failed to resolve remote LDAP settings")?;

        let mut installed_apps = to_strings(INSTALLED_APPS);
        installed_apps.extend(resolved_plugins.installed_apps);

        let mut middleware = to_strings(MIDDLEWARE_BEFORE_AUTH);
        if remote_ldap.is_some() {
            middleware.push(REMOTE_LDAP_MIDDLEWARE.into());
        }
        middleware.extend(to_strings(MIDDLEWARE_AFTER_AUTH));
        middleware.extend(resolved_plugins.middleware);

        let mut authentication_backends = vec![VIEW_EXEMPT_BACKEND.to_owned()];
        if remote_ldap.is_some() {
            authentication_backends.insert(0, REMOTE_LDAP_BACKEND.into());
        }

        let storage = StorageSettings {
            default_file_storage: config.storage.backend.clone(),
            config: match config.storage.backend {
                Some(_) => config.storage.config.clone(),
                None => HashMap::new(),
            },
        };

        let sessions = SessionSettings {
            cookie_age: general.login_timeout.map(|d| d.as_secs()),
            engine: config.paths.session_file_path.as_ref().map(|_| FILE_SESSION_ENGINE),
            file_path: config.paths.session_file_path.clone(),
        };

        let email = &config.email;
        let email = EmailSettings {
            host: email.server.clone(),
            port: email.port,
            host_user: email.username.clone(),
            host_password: email.password.as_ref().map(clone_secret),
            use_ssl: email.use_ssl,
            use_tls: email.use_tls,
            ssl_certfile: email.ssl_certfile.clone(),
            ssl_keyfile: email.ssl_keyfile.clone(),
            timeout: email.timeout.as_secs(),
            subject_prefix: EMAIL_SUBJECT_PREFIX,
            server_email: email.from_email.clone(),
        };

        let db = &config.db;
        let database = DatabaseSettings {
            engine: if general.metrics_enabled { DB_ENGINE_WITH_METRICS } else { DB_ENGINE },
            name: db.name.clone(),
            user: db.user.clone(),
            password: db.password.as_ref().map(clone_secret),
            host: db.host.clone(),
            port: db.port,
            conn_max_age: db.conn_max_age.as_secs(),
        };

        let display = &config.display;
        let rest_api = RestApiSettings {
            allowed_versions: vec![rest_api_version.clone()],
            default_version: rest_api_version.clone(),
            page_size: display.paginate_count,
            max_page_size: display.max_page_size,
        };

        let release_check = ReleaseCheckSettings {
            url: config.release_check.parsed_url()?,
            timeout: config.release_check.timeout.as_secs(),
        };

        let paths = &config.paths;
        let out = Self {
            version: crate::VERSION,
            rest_api_version,
            hostname: hostname(),

            csrf_trusted_origins: general.allowed_hosts.clone(),
            allowed_hosts: general.allowed_hosts.clone(),
            secret_key: clone_secret(&general.secret_key),
            admins: general.admins.clone(),
            allowed_url_schemes: general.allowed_url_schemes.clone(),
            urls: UrlSettings {
                static_url: format!("/{base_path}static/"),
                media_url: format!("/{base_path}media/"),
                login_url: format!("/{base_path}login/"),
            },
            base_path,
            changelog_retention: general.changelog_retention,
            debug: general.debug,
            developer: general.developer,
            enforce_global_unique: general.enforce_global_unique,
            exempt_view_permissions: general.exempt_view_permissions.clone(),
            http_proxies: general.http_proxies.clone(),
            internal_ips: general.internal_ips.clone(),
            login_required: general.login_required,
            maintenance_mode: general.maintenance_mode,
            metrics_enabled: general.metrics_enabled,
            prefer_ipv4: general.prefer_ipv4,
            time_zone: general.time_zone.clone(),

            database,
            storage,
            tasks,
            caching,
            sessions,
            email,

            installed_apps,
            middleware,
            authentication_backends,
            rest_api,
            per_page_defaults: per_page_defaults(display.paginate_count),
            secrets_min_pubkey_size: SECRETS_MIN_PUBKEY_SIZE,

            remote_ldap,
            plugins_config: resolved_plugins.config,

            display: display.clone(),
            paths: PathSettings {
                docs_root: paths.docs_root.clone(),
                media_root: paths.media_root.clone(),
                reports_root: paths.reports_root.clone(),
                scripts_root: paths.scripts_root.clone(),
            },
            napalm: NapalmSettings {
                username: config.napalm.username.clone(),
                password: clone_secret(&config.napalm.password),
                timeout: config.napalm.timeout.as_secs(),
                args: config.napalm.args.clone(),
            },
            release_check,
            cors: config.cors.clone(),
            logging: LoggingSettings {
                filters: config.log.filters.to_map(),
                file: config.log.file.clone(),
                stdout: config.log.stdout,
            },
        };

        debug!(
            "Resolved settings: {} installed apps, {} middleware, {} plugin(s)",
            out.installed_apps.len(),
            out.middleware.len(),
            out.plugins_config.len(),
        );

        Ok(out)
    }

    /// Whether remote LDAP authentication is enabled.
    pub fn remote_ldap_enabled(&self) -> bool {
        self.remote_ldap.is_some()
    }

    /// The view permission exemptions, as used by
    /// [`ViewExemptModelBackend`][crate::auth::ViewExemptModelBackend].
    pub fn view_exemptions(&self) -> crate::auth::ExemptViewPermissions {
        crate::auth::ExemptViewPermissions::new(self.exempt_view_permissions.iter().cloned())
    }
}

/// "major.minor" of the given version.
fn rest_api_version(version: &str) -> String {
    version.split('.').take(2).collect::<Vec<_>>().join(".")
}

fn per_page_defaults(paginate_count: u32) -> Vec<u32> {
    let mut out = PER_PAGE_DEFAULTS.to_vec();
    if !out.contains(&paginate_count) {
        out.push(paginate_count);
        out.sort_unstable();
    }
    out
}

fn hostname() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            warn!("Failed to determine hostname: {e}");
            String::new()
        }
    }
}

fn to_strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn clone_secret(secret: &SecretBox<String>) -> SecretBox<String> {
    SecretBox::new(Box::new(secret.expose_secret().clone()))
}

/// Serializes a secret as a fixed placeholder.
pub fn redact<S: Serializer>(_: &SecretBox<String>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(REDACTED)
}

/// Serializes an optional secret as `null` or a fixed placeholder.
pub fn redact_option<S: Serializer>(
    v: &Option<SecretBox<String>>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match v {
        Some(_) => s.serialize_str(REDACTED),
        None => s.serialize_none(),
    }
}
