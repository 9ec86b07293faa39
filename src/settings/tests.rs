use std::{io, sync::{Arc, Mutex}};

use serde_json::{json, Value};

use crate::{
    config::tests::load_with,
    plugins::{Plugin, PluginRegistry, PluginSettings},
};
use super::*;


fn resolve(general: &str, rest: &str) -> Result<Settings> {
    Settings::resolve(&load_with(general, rest)?, &PluginRegistry::new())
}

fn resolve_ok(general: &str, rest: &str) -> Settings {
    resolve(general, rest).unwrap()
}


#[test]
fn minimal() {
    let settings = resolve_ok("", "");

    assert_eq!(settings.version, crate::VERSION);
    assert_eq!(settings.rest_api_version, "2.8");
    assert_eq!(settings.csrf_trusted_origins, settings.allowed_hosts);
    assert_eq!(settings.base_path, "");
    assert_eq!(settings.urls.static_url, "/static/");
    assert_eq!(settings.urls.media_url, "/media/");
    assert_eq!(settings.urls.login_url, "/login/");

    assert_eq!(settings.database.engine, "django.db.backends.postgresql");
    assert_eq!(settings.database.name, "netbox");
    assert_eq!(settings.database.conn_max_age, 300);

    assert_eq!(settings.rest_api.allowed_versions, ["2.8"]);
    assert_eq!(settings.rest_api.default_version, "2.8");
    assert_eq!(settings.rest_api.page_size, 50);
    assert_eq!(settings.rest_api.max_page_size, 1000);
    assert_eq!(settings.per_page_defaults, PER_PAGE_DEFAULTS);
    assert_eq!(settings.secrets_min_pubkey_size, 2048);

    assert_eq!(settings.email.subject_prefix, "[NetBox] ");
    assert_eq!(settings.email.port, 25);
    assert_eq!(settings.sessions.cookie_age, None);
    assert_eq!(settings.sessions.engine, None);

    assert_eq!(settings.authentication_backends, [VIEW_EXEMPT_BACKEND]);
    assert!(!settings.middleware.iter().any(|m| m == REMOTE_LDAP_MIDDLEWARE));
    assert_eq!(settings.installed_apps.len(), INSTALLED_APPS.len());
    assert!(settings.remote_ldap.is_none());
    assert!(settings.plugins_config.is_empty());
}

#[test]
fn base_path_is_used_in_urls() {
    let settings = resolve_ok("base_path = \"/netbox\"", "");
    assert_eq!(settings.base_path, "netbox/");
    assert_eq!(settings.urls.static_url, "/netbox/static/");
    assert_eq!(settings.urls.media_url, "/netbox/media/");
    assert_eq!(settings.urls.login_url, "/netbox/login/");
}

#[test]
fn metrics_switch_database_engine() {
    let settings = resolve_ok("metrics_enabled = true", "");
    assert_eq!(settings.database.engine, "django_prometheus.db.backends.postgresql");
}

#[test]
fn pagination() {
    let settings = resolve_ok("", "[display]\npaginate_count = 75");
    assert_eq!(settings.per_page_defaults, [25, 50, 75, 100, 250, 500, 1000]);
    assert_eq!(settings.rest_api.page_size, 75);

    let settings = resolve_ok("", "[display]\npaginate_count = 100");
    assert_eq!(settings.per_page_defaults, PER_PAGE_DEFAULTS);
}

#[test]
fn sessions() {
    let settings = resolve_ok("login_timeout = \"1h\"", "[paths]\nsession_file_path = \"sessions\"");
    assert_eq!(settings.sessions.cookie_age, Some(3600));
    assert_eq!(settings.sessions.engine, Some("django.contrib.sessions.backends.file"));
    assert!(settings.sessions.file_path.unwrap().is_absolute());
}

#[test]
fn direct_redis() {
    let settings = resolve_ok("", "");

    for name in QUEUES {
        match &settings.tasks.queues[*name] {
            TaskQueueParams::Direct { host, port, db, password, default_timeout, ssl } => {
                assert_eq!(host, "localhost");
                assert_eq!(*port, 6379);
                assert_eq!(*db, 0);
                assert!(password.is_none());
                assert_eq!(*default_timeout, 300);
                assert!(!ssl);
            }
            other => panic!("unexpected params {other:?}"),
        }
    }
    assert!(!settings.tasks.from_legacy_section);

    assert!(settings.caching.enabled);
    assert_eq!(settings.caching.default_timeout, 900);
    assert!(settings.caching.degrade_on_failure);
    match &settings.caching.backend {
        CacheBackend::Direct(s) => assert_eq!(s.expose_secret(), "redis://localhost:6379/1"),
        other => panic!("unexpected backend {other:?}"),
    }
}

#[test]
fn sentinel_redis() {
    let config = crate::config::tests::load(r#"
        [general]
        allowed_hosts = ["*"]
        secret_key = "abc"
        [db]
        name = "netbox"
        user = "netbox"
        [redis.webhooks]
        sentinels = [["s1.example.com", 26379]]
        sentinel_service = "netbox-tasks"
        password = "hunter2"
        database = 2
        default_timeout = "10s"
        [redis.caching]
        sentinels = [["s1.example.com", 26379], ["s2.example.com", 26380]]
        sentinel_service = "netbox-cache"
        database = 3
    "#).unwrap();
    let settings = Settings::resolve(&config, &PluginRegistry::new()).unwrap();

    assert!(settings.tasks.from_legacy_section);
    match &settings.tasks.queues["default"] {
        TaskQueueParams::Sentinel {
            sentinels, master_name, db, socket_timeout, socket_connect_timeout, ..
        } => {
            assert_eq!(sentinels, &[("s1.example.com".to_owned(), 26379)]);
            assert_eq!(master_name, "netbox-tasks");
            assert_eq!(*db, 2);
            assert_eq!(*socket_timeout, None);
            assert_eq!(*socket_connect_timeout, 10);
        }
        other => panic!("unexpected params {other:?}"),
    }
    assert_eq!(settings.tasks.queues["check_releases"].password(), Some("hunter2"));

    match &settings.caching.backend {
        CacheBackend::Sentinel { locations, service_name, db } => {
            assert_eq!(locations.len(), 2);
            assert_eq!(service_name, "netbox-cache");
            assert_eq!(*db, 3);
        }
        other => panic!("unexpected backend {other:?}"),
    }
}

/// Log output captured while a closure runs.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn resolve_capturing_warnings(config: &Config) -> (Settings, String) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    let settings = tracing::subscriber::with_default(subscriber, || {
        Settings::resolve(config, &PluginRegistry::new())
    }).unwrap();
    let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    (settings, output)
}

const RENAME_WARNING: &str = "'redis.webhooks' configuration section has been renamed";

#[test]
fn legacy_webhooks_section_warns() {
    let config = crate::config::tests::load(r#"
        [general]
        allowed_hosts = ["*"]
        secret_key = "abc"
        [db]
        name = "netbox"
        user = "netbox"
        [redis.webhooks]
        host = "tasks.example.com"
        [redis.caching]
        database = 1
    "#).unwrap();

    let (settings, logs) = resolve_capturing_warnings(&config);
    assert!(settings.tasks.from_legacy_section);
    assert!(logs.contains(RENAME_WARNING), "{logs}");
}

#[test]
fn tasks_section_does_not_warn() {
    let config = crate::config::tests::load(r#"
        [general]
        allowed_hosts = ["*"]
        secret_key = "abc"
        [db]
        name = "netbox"
        user = "netbox"
        [redis.tasks]
        host = "tasks.example.com"
        [redis.webhooks]
        host = "old.example.com"
        [redis.caching]
        database = 1
    "#).unwrap();

    let (settings, logs) = resolve_capturing_warnings(&config);
    assert!(!settings.tasks.from_legacy_section);
    assert!(!logs.contains(RENAME_WARNING), "{logs}");
    match &settings.tasks.queues["default"] {
        TaskQueueParams::Direct { host, .. } => assert_eq!(host, "tasks.example.com"),
        other => panic!("unexpected params {other:?}"),
    }
}

#[test]
fn release_check_url_is_serialized() {
    let url = "https://api.github.com/repos/netbox-community/netbox/releases";
    let settings = resolve_ok("", &format!("[release_check]\nurl = \"{url}\""));
    let json = serde_json::to_value(&settings).unwrap();
    assert_eq!(json["release_check"]["url"], json!(url));
    assert_eq!(json["release_check"]["timeout"], json!(86400));

    let json = serde_json::to_value(resolve_ok("", "")).unwrap();
    assert!(json["release_check"]["url"].is_null());
}

#[test]
fn ssl_redis_with_password() {
    let config = crate::config::tests::load(r#"
        [general]
        allowed_hosts = ["*"]
        secret_key = "abc"
        [db]
        name = "netbox"
        user = "netbox"
        [redis.tasks]
        [redis.caching]
        host = "cache.example.com"
        password = "s3cret"
        ssl = true
        database = 1
    "#).unwrap();
    let settings = Settings::resolve(&config, &PluginRegistry::new()).unwrap();
    match &settings.caching.backend {
        CacheBackend::Direct(s) => {
            assert_eq!(s.expose_secret(), "rediss://:s3cret@cache.example.com:6379/1");
        }
        other => panic!("unexpected backend {other:?}"),
    }
}

#[test]
fn zero_cache_timeout_disables_caching() {
    let settings = resolve_ok("", "[cache]\ntimeout = \"0\"");
    assert!(!settings.caching.enabled);
    assert_eq!(settings.caching.default_timeout, 0);
}

#[test]
fn storage_config_without_backend_is_ignored() {
    let settings = resolve_ok("", "[storage.config]\nAWS_ACCESS_KEY_ID = \"key\"");
    assert!(settings.storage.default_file_storage.is_none());
    assert!(settings.storage.config.is_empty());

    let settings = resolve_ok("", r#"
        [storage]
        backend = "storages.backends.s3boto3.S3Boto3Storage"
        config = { AWS_STORAGE_BUCKET_NAME = "netbox" }
    "#);
    assert_eq!(
        settings.storage.default_file_storage.as_deref(),
        Some("storages.backends.s3boto3.S3Boto3Storage"),
    );
    assert_eq!(settings.storage.config["AWS_STORAGE_BUCKET_NAME"], json!("netbox"));
}

#[test]
fn remote_ldap_adds_backend_and_middleware() {
    let settings = resolve_ok("", r#"
        [remote_ldap]
        enabled = true
        server_uri = "ldap://ldap.example.com"
        bind_dn = "cn=netbox,dc=example,dc=com"
        bind_password = "topsecret"
        user_dn_template = "uid=%(user)s,ou=users,dc=example,dc=com"
    "#);

    assert_eq!(settings.authentication_backends, [REMOTE_LDAP_BACKEND, VIEW_EXEMPT_BACKEND]);

    let pos = |name: &str| settings.middleware.iter().position(|m| m == name).unwrap();
    let ldap = pos(REMOTE_LDAP_MIDDLEWARE);
    assert_eq!(ldap, pos("utilities.middleware.ExceptionHandlingMiddleware") + 1);
    assert_eq!(ldap + 1, pos("utilities.middleware.LoginRequiredMiddleware"));

    let ldap = settings.remote_ldap.as_ref().unwrap();
    assert_eq!(ldap.header, "remote-user");
    assert_eq!(ldap.connection.server_uri, "ldap://ldap.example.com");
}

#[test]
fn secrets_are_redacted() {
    let config = crate::config::tests::load(r#"
        [general]
        allowed_hosts = ["*"]
        secret_key = "secret-key-value"
        [db]
        name = "netbox"
        user = "netbox"
        password = "db-password"
        [redis.tasks]
        password = "tasks-password"
        [redis.caching]
        password = "cache-password"
        [napalm]
        password = "napalm-password"
        [email]
        password = "email-password"
        [remote_ldap]
        enabled = true
        server_uri = "ldap://ldap.example.com"
        bind_password = "ldap-password"
    "#).unwrap();
    let settings = Settings::resolve(&config, &PluginRegistry::new()).unwrap();
    assert_eq!(settings.secret_key.expose_secret(), "secret-key-value");

    let json = serde_json::to_string_pretty(&settings).unwrap();
    for secret in [
        "secret-key-value",
        "db-password",
        "tasks-password",
        "cache-password",
        "napalm-password",
        "email-password",
        "ldap-password",
    ] {
        assert!(!json.contains(secret), "'{secret}' not redacted");
    }
    assert!(json.contains(REDACTED));
}

#[test]
fn invalid_config_is_fatal() {
    let msg = format!("{:#}", resolve("", "[email]\nuse_ssl = true\nuse_tls = true").unwrap_err());
    assert!(msg.contains("mutually exclusive"), "{msg}");
}

#[test]
fn api_version_is_major_minor() {
    assert_eq!(rest_api_version("2.8.9"), "2.8");
    assert_eq!(rest_api_version("2.10.1"), "2.10");
    assert_eq!(rest_api_version("3"), "3");
}


struct DummyPlugin;

impl Plugin for DummyPlugin {
    fn name(&self) -> &str {
        "netbox_dummy"
    }

    fn qualified_name(&self) -> String {
        "netbox_dummy.DummyPluginConfig".into()
    }

    fn middleware(&self) -> Vec<String> {
        vec!["netbox_dummy.middleware.DummyMiddleware".into()]
    }

    fn caching_config(&self) -> Value {
        json!({ "dummymodel": { "ops": ["get"] }, "*": null })
    }

    fn default_settings(&self) -> PluginSettings {
        let mut out = PluginSettings::new();
        out.insert("foo".into(), json!("bar"));
        out
    }
}

#[test]
fn plugins_are_merged() {
    let config = load_with("", r#"
        [plugins]
        enabled = ["netbox_dummy"]
        config.netbox_dummy = { foo = "override" }
    "#).unwrap();
    let mut registry = PluginRegistry::new();
    registry.register(DummyPlugin);
    let settings = Settings::resolve(&config, &registry).unwrap();

    assert_eq!(settings.installed_apps.last().unwrap(), "netbox_dummy.DummyPluginConfig");
    assert_eq!(settings.middleware.last().unwrap(), "netbox_dummy.middleware.DummyMiddleware");
    assert_eq!(
        settings.caching.policies["netbox_dummy.dummymodel"].as_ref().unwrap().ops,
        ["get"],
    );
    assert!(settings.caching.policies["netbox_dummy.*"].is_none());
    assert!(settings.caching.policies.contains_key("dcim.*"));
    assert_eq!(settings.plugins_config["netbox_dummy"]["foo"], json!("override"));
}

#[test]
fn unregistered_plugin_is_fatal() {
    let msg = format!("{:#}", resolve("", "[plugins]\nenabled = [\"netbox_missing\"]").unwrap_err());
    assert!(msg.contains("Unable to resolve plugin netbox_missing"), "{msg}");
}
