use std::{net::IpAddr, time::Duration};

use super::*;


/// Everything that is required, without section headers for `[general]`
/// values so that tests can add to that section.
const REQUIRED_GENERAL: &str = r#"
    allowed_hosts = ["netbox.example.com"]
    secret_key = "m8XRnFDbtMvdPVNBQH4FzZpwcLqY3jkJ7sWuGhxTEAaK2f5UeC"
"#;

const REQUIRED_REST: &str = r#"
    [db]
    name = "netbox"
    user = "netbox"

    [redis.tasks]

    [redis.caching]
    database = 1
"#;

/// Writes the given TOML into a temporary config file and loads it with the
/// real loader.
pub(crate) fn load(toml: &str) -> Result<Config> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.toml");
    fs::write(&path, toml)?;
    Config::load_from(&path)
}

/// Loads a config with all required values, plus `general` appended to the
/// `[general]` section and `rest` appended to the file.
pub(crate) fn load_with(general: &str, rest: &str) -> Result<Config> {
    load(&format!("[general]\n{REQUIRED_GENERAL}\n{general}\n{REQUIRED_REST}\n{rest}"))
}

pub(crate) fn minimal() -> Config {
    load_with("", "").unwrap()
}

fn error_of(result: Result<Config>) -> String {
    match result {
        Ok(_) => panic!("expected config to be invalid"),
        Err(e) => format!("{e:#}"),
    }
}


#[test]
fn defaults() {
    let config = minimal();

    assert_eq!(config.general.allowed_hosts, ["netbox.example.com"]);
    assert!(config.general.admins.is_empty());
    assert_eq!(config.general.allowed_url_schemes.len(), 14);
    assert_eq!(config.general.base_path, "");
    assert_eq!(config.general.changelog_retention, 90);
    assert!(!config.general.debug);
    assert!(config.general.exempt_view_permissions.is_empty());
    assert!(config.general.http_proxies.is_none());
    assert_eq!(
        config.general.internal_ips,
        ["127.0.0.1".parse::<IpAddr>().unwrap(), "::1".parse().unwrap()],
    );
    assert_eq!(config.general.login_timeout, None);
    assert_eq!(config.general.time_zone, "UTC");

    assert_eq!(config.db.host, "localhost");
    assert_eq!(config.db.port, None);

    assert_eq!(config.cache.timeout, Duration::from_secs(900));
    assert_eq!(config.display.paginate_count, 50);
    assert_eq!(config.display.max_page_size, 1000);
    assert_eq!(config.display.date_format, "N j, Y");
    assert_eq!(config.display.rack_elevation_default_unit_width, 220);
    assert_eq!(config.email.port, 25);
    assert_eq!(config.email.timeout, Duration::from_secs(10));
    assert_eq!(config.napalm.timeout, Duration::from_secs(30));
    assert_eq!(config.release_check.url, None);
    assert_eq!(config.release_check.timeout, Duration::from_secs(24 * 3600));
    assert!(config.storage.backend.is_none());
    assert!(config.plugins.enabled.is_empty());
    assert!(!config.remote_ldap.enabled);
    assert_eq!(config.remote_ldap.remote_auth_header, "HTTP_REMOTE_USER");
    assert!(config.remote_ldap.always_update_user);

    let tasks = config.redis.tasks_section().unwrap().connection();
    assert_eq!(tasks.host, "localhost");
    assert_eq!(tasks.port, 6379);
    assert_eq!(tasks.sentinel_service, "default");
    assert_eq!(tasks.default_timeout, Duration::from_secs(300));
    assert_eq!(config.redis.caching_section().unwrap().database, 1);
}

#[test]
fn relative_paths_are_resolved() {
    let config = load_with("", r#"
        [paths]
        media_root = "data/media/"
        scripts_root = "/opt/netbox/scripts/"
    "#).unwrap();

    assert!(config.paths.media_root.is_absolute());
    assert!(config.paths.media_root.ends_with("data/media"));
    assert_eq!(config.paths.scripts_root, Path::new("/opt/netbox/scripts"));
    assert!(config.paths.docs_root.is_absolute());
}

#[test]
fn missing_required_values_are_named() {
    let without_hosts = format!(r#"
        [general]
        secret_key = "abc"
        {REQUIRED_REST}
    "#);
    assert!(error_of(load(&without_hosts)).contains("allowed_hosts"));

    let without_key = format!(r#"
        [general]
        allowed_hosts = ["*"]
        {REQUIRED_REST}
    "#);
    assert!(error_of(load(&without_key)).contains("secret_key"));

    let without_db_name = format!(r#"
        [general]
        {REQUIRED_GENERAL}
        [db]
        user = "netbox"
        [redis.tasks]
        [redis.caching]
    "#);
    assert!(error_of(load(&without_db_name)).contains("db.name"));
}

#[test]
fn missing_redis_subsections() {
    let without_caching = format!(r#"
        [general]
        {REQUIRED_GENERAL}
        [db]
        name = "netbox"
        user = "netbox"
        [redis.tasks]
    "#);
    let msg = error_of(load(&without_caching));
    assert!(msg.contains("missing the 'caching' subsection"), "{msg}");

    let without_tasks = format!(r#"
        [general]
        {REQUIRED_GENERAL}
        [db]
        name = "netbox"
        user = "netbox"
        [redis.caching]
    "#);
    let msg = error_of(load(&without_tasks));
    assert!(msg.contains("missing the 'tasks' subsection"), "{msg}");
}

fn with_redis(redis: &str) -> Result<Config> {
    load(&format!(r#"
        [general]
        {REQUIRED_GENERAL}
        [db]
        name = "netbox"
        user = "netbox"
        {redis}
    "#))
}

#[test]
fn tasks_section_wins_over_webhooks() {
    let config = with_redis(r#"
        [redis.tasks]
        database = 3
        [redis.webhooks]
        database = 5
        [redis.caching]
    "#).unwrap();

    match config.redis.tasks_section().unwrap() {
        TasksSection::Tasks(c) => assert_eq!(c.database, 3),
        other => panic!("unexpected section {other:?}"),
    }
}

#[test]
fn legacy_webhooks_section() {
    let config = with_redis(r#"
        [redis.webhooks]
        host = "redis.example.com"
        [redis.caching]
    "#).unwrap();

    match config.redis.tasks_section().unwrap() {
        TasksSection::Webhooks(c) => assert_eq!(c.host, "redis.example.com"),
        other => panic!("unexpected section {other:?}"),
    }
}

#[test]
fn sentinels() {
    let config = with_redis(r#"
        [redis.tasks]
        sentinels = [["sentinel1.example.com", 26379], ["sentinel2.example.com", 26379]]
        sentinel_service = "netbox"
        [redis.caching]
    "#).unwrap();

    let tasks = config.redis.tasks_section().unwrap().connection();
    assert!(tasks.using_sentinel());
    assert_eq!(tasks.sentinels[1], ("sentinel2.example.com".to_owned(), 26379));
    assert!(!config.redis.caching_section().unwrap().using_sentinel());
}

#[test]
fn release_check() {
    let config = load_with("", r#"
        [release_check]
        url = "https://api.github.com/repos/netbox-community/netbox/releases"
        timeout = "1h"
    "#).unwrap();
    assert_eq!(
        config.release_check.parsed_url().unwrap().unwrap().host_str(),
        Some("api.github.com"),
    );

    let msg = error_of(load_with("", "[release_check]\ntimeout = \"59min\""));
    assert!(msg.contains("has to be at least 3600 seconds (1 hour)"), "{msg}");

    for url in ["not a url", "mailto:admin@example.com", "https://"] {
        let msg = error_of(load_with("", &format!("[release_check]\nurl = {url:?}")));
        assert!(msg.contains("must be a valid API URL"), "{url}: {msg}");
    }
}

#[test]
fn base_path_normalization() {
    for (input, expected) in [
        ("", ""),
        ("/", ""),
        ("netbox", "netbox/"),
        ("/netbox/", "netbox/"),
        ("//a/b//", "a/b/"),
    ] {
        let config = load_with(&format!("base_path = {input:?}"), "").unwrap();
        assert_eq!(config.general.normalized_base_path(), expected, "{input:?}");
    }
}

#[test]
fn invalid_values() {
    let msg = error_of(load_with("", "[email]\nuse_ssl = true\nuse_tls = true"));
    assert!(msg.contains("mutually exclusive"), "{msg}");

    let msg = error_of(load_with("", "[cors]\norigin_regex_whitelist = [\"^(unclosed\"]"));
    assert!(msg.contains("origin_regex_whitelist"), "{msg}");

    let msg = error_of(load_with("http_proxies = { http = \"no proxy\" }", ""));
    assert!(msg.contains("http_proxies"), "{msg}");

    assert!(load_with("internal_ips = [\"localhost\"]", "").is_err());
}

#[test]
fn proxies_without_scheme() {
    let config = load_with(
        r#"http_proxies = { http = "10.10.1.10:3128", https = "socks5://10.10.1.10:1080" }"#,
        "",
    ).unwrap();
    let proxies = config.general.http_proxies.unwrap();
    assert_eq!(proxies["http"], "10.10.1.10:3128");
    assert_eq!(proxies["https"], "socks5://10.10.1.10:1080");

    let msg = error_of(load_with(r#"http_proxies = { http = "ftp://10.10.1.10" }"#, ""));
    assert!(msg.contains("http_proxies"), "{msg}");
}

#[test]
fn remote_ldap() {
    let msg = error_of(load_with("", "[remote_ldap]\nenabled = true"));
    assert!(msg.contains("remote_ldap.server_uri"), "{msg}");

    let msg = error_of(load_with("", r#"
        [remote_ldap]
        enabled = true
        server_uri = "https://ad.example.com"
    "#));
    assert!(msg.contains("scheme"), "{msg}");

    let msg = error_of(load_with("", r#"
        [remote_ldap]
        enabled = true
        server_uri = "ldaps://ad.example.com"
        user_flags_by_group = { is_admin = "cn=admins,dc=example,dc=com" }
    "#));
    assert!(msg.contains("is_admin"), "{msg}");

    let msg = error_of(load_with("", r#"
        [remote_ldap]
        enabled = true
        server_uri = "ldaps://ad.example.com"
        user_dn_template = "uid=user,dc=example,dc=com"
    "#));
    assert!(msg.contains("%(user)s"), "{msg}");

    let config = load_with("", r#"
        [remote_ldap]
        enabled = true
        server_uri = "ldaps://ad.example.com"
        remote_auth_header = "HTTP_X_AUTH_USER"
        cache_timeout = "1h"
        user_attr_map = { first_name = "givenName", email = "mail" }

        [remote_ldap.user_search]
        base_dn = "ou=users,dc=example,dc=com"
        filter = "(sAMAccountName=%(user)s)"
    "#).unwrap();
    let ldap = &config.remote_ldap;
    assert_eq!(ldap.header_name().unwrap().as_str(), "x-auth-user");
    assert_eq!(ldap.cache_timeout, Duration::from_secs(3600));
    let search = ldap.user_search.as_ref().unwrap();
    assert_eq!(search.scope, crate::auth::SearchScope::Subtree);
    assert_eq!(ldap.user_attr_map["email"], "mail");
}

#[test]
fn remote_ldap_is_not_validated_when_disabled() {
    let config = load_with("", "[remote_ldap]\nserver_uri = \"https://x\"").unwrap();
    assert!(config.remote_ldap.resolve().unwrap().is_none());
}

#[test]
fn durations() {
    assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
    assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
    assert_eq!(parse_duration("27s"), Ok(Duration::from_secs(27)));
    assert_eq!(parse_duration("5min"), Ok(Duration::from_secs(300)));
    assert_eq!(parse_duration("24h"), Ok(Duration::from_secs(86400)));
    assert_eq!(parse_duration("2d"), Ok(Duration::from_secs(172800)));
    assert!(parse_duration("300").is_err());
    assert!(parse_duration("5 min").is_err());
    assert!(parse_duration("3w").is_err());
    assert!(parse_duration("h").is_err());
}

#[test]
fn template_mentions_all_sections() {
    let template = confique::toml::template::<Config>(Default::default());
    for section in ["[general]", "[db]", "[redis]", "[release_check]", "[remote_ldap]", "[log]"] {
        assert!(template.contains(section), "{section}");
    }

    // Examples in doc comments end up in the template as plain TOML.
    assert!(template.contains("[remote_ldap.user_search]"));
    assert!(template.contains(r#"AWS_STORAGE_BUCKET_NAME = "netbox""#));
    assert!(!template.contains("```"));
}
