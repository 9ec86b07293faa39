//! Plugins: explicit registration, validation of their settings and merging of
//! their contributions (installed app, middleware, cache policies) into the
//! resolved settings.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use crate::{prelude::*, settings::CachePolicy};


/// User-provided settings of a single plugin.
pub type PluginSettings = Map<String, Value>;


#[derive(Debug, confique::Config)]
pub struct PluginsConfig {
    /// Names of the plugins to enable. Each plugin has to be registered with
    /// the application, otherwise startup fails. Example: ["netbox_bgp"]
    #[config(default = [])]
    pub enabled: Vec<String>,

    /// Settings for each plugin, keyed by plugin name. Example:
    ///
    ///     [plugins.config.netbox_bgp]
    ///     device_ext_page = "right"
    #[config(default = {})]
    pub config: HashMap<String, PluginSettings>,
}


/// The contract every plugin has to fulfill.
///
/// Everything except the names has a default implementation. The provided
/// `validate` checks the version bounds and required settings and fills in
/// default settings, which is what most plugins want.
pub trait Plugin: Send + Sync {
    /// The name the plugin is enabled with in `plugins.enabled`.
    fn name(&self) -> &str;

    /// Fully qualified name of the plugin's app configuration, added to the
    /// list of installed apps, e.g. "netbox_bgp.BGPConfig".
    fn qualified_name(&self) -> String;

    /// Middleware the plugin wants appended to the middleware chain.
    fn middleware(&self) -> Vec<String> {
        vec![]
    }

    /// Cache policies for the plugin's models, keyed by model name. Has to be
    /// a JSON object whose values are either `null` (model is not cached) or
    /// a policy like `{ "ops": "all" }`.
    fn caching_config(&self) -> Value {
        Value::Object(Map::new())
    }

    /// Settings that have to be present in the plugin's configuration.
    fn required_settings(&self) -> &[&str] {
        &[]
    }

    /// Settings that are filled in if the user did not specify them.
    fn default_settings(&self) -> PluginSettings {
        Map::new()
    }

    /// Minimum NetBox version the plugin works with.
    fn min_version(&self) -> Option<&str> {
        None
    }

    /// Maximum NetBox version the plugin works with.
    fn max_version(&self) -> Option<&str> {
        None
    }

    /// Validates the user-provided settings of this plugin and assigns
    /// defaults. Errors are fatal.
    fn validate(&self, user_config: &mut PluginSettings) -> Result<()> {
        let current = parse_version(crate::VERSION)?;
        if let Some(min) = self.min_version() {
            if current < parse_version(min)? {
                bail!("Plugin {} requires NetBox minimum version {min}.", self.name());
            }
        }
        if let Some(max) = self.max_version() {
            if current > parse_version(max)? {
                bail!("Plugin {} requires NetBox maximum version {max}.", self.name());
            }
        }

        for setting in self.required_settings() {
            if !user_config.contains_key(*setting) {
                bail!(
                    "Plugin {} requires '{setting}' to be present in the \
                        'plugins.config.{}' section of the configuration.",
                    self.name(),
                    self.name(),
                );
            }
        }

        for (setting, value) in self.default_settings() {
            user_config.entry(setting).or_insert(value);
        }

        Ok(())
    }
}

/// Parses a dotted version like "2.8.9" into its numeric components.
fn parse_version(s: &str) -> Result<Vec<u64>> {
    s.split('.')
        .map(|part| part.parse::<u64>().map_err(|e| anyhow!("invalid version '{s}': {e}")))
        .collect()
}


/// All plugins the application knows about. Plugins are only used if they are
/// also listed in `plugins.enabled`.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin. A later registration with the same name replaces
    /// the earlier one.
    pub fn register(&mut self, plugin: impl Plugin + 'static) -> &mut Self {
        self.plugins.retain(|p| p.name() != plugin.name());
        self.plugins.push(Box::new(plugin));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins.iter().find(|p| p.name() == name).map(|p| &**p)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.plugins.iter().map(|p| p.name())).finish()
    }
}


/// Everything that enabled plugins contribute to the resolved settings.
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize)]
pub struct ResolvedPlugins {
    pub installed_apps: Vec<String>,
    pub middleware: Vec<String>,
    pub cache_policies: BTreeMap<String, Option<CachePolicy>>,
    /// The validated settings of each plugin, with defaults filled in.
    pub config: BTreeMap<String, PluginSettings>,
}

/// Resolves all enabled plugins in the configured order. Any failure is fatal
/// and names the offending plugin.
pub fn resolve(config: &PluginsConfig, registry: &PluginRegistry) -> Result<ResolvedPlugins> {
    let mut out = ResolvedPlugins::default();

    for name in &config.enabled {
        let plugin = registry.get(name).ok_or_else(|| anyhow!(
            "Unable to resolve plugin {name}: not registered. Check that the plugin is \
                built into this application and registered at startup."
        ))?;
        debug!("Resolving plugin '{name}' ({})", plugin.qualified_name());

        out.installed_apps.push(plugin.qualified_name());

        let mut user_config = config.config.get(name).cloned().unwrap_or_default();
        plugin.validate(&mut user_config)
            .context(format!("failed to validate configuration of plugin {name}"))?;
        out.config.insert(name.clone(), user_config);

        out.middleware.extend(plugin.middleware());

        let Value::Object(caching) = plugin.caching_config() else {
            bail!("Plugin {name} caching_config must be a dictionary.");
        };
        for (model, policy) in caching {
            let policy = serde_json::from_value::<Option<CachePolicy>>(policy)
                .context(format!("Plugin {name} has an invalid cache policy for '{model}'"))?;
            out.cache_policies.insert(format!("{name}.{model}"), policy);
        }
    }

    Ok(out)
}
