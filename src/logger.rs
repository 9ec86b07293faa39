use std::{
    collections::{BTreeMap, HashMap},
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};
use nu_ansi_term::{Color, Style};
use serde::Deserialize;
use termcolor::ColorChoice;
use tracing::{field::Visit, Level};
use tracing_log::NormalizeEvent;
use tracing_subscriber::{
    filter::{FilterFn, LevelFilter},
    fmt::FormatEvent,
    prelude::*,
};


use crate::prelude::*;


/// Log target of the remote LDAP authentication. Logged at "debug" level if
/// remote LDAP is enabled, unless a filter is configured for it.
pub const LDAP_TARGET: &str = "netbox_settings::auth::ldap";

#[derive(Debug, confique::Config)]
pub struct LogConfig {
    /// Minimum log level per module path prefix. A log message is checked
    /// against the entry with the longest prefix of its module path and
    /// dropped if there is none. Levels: "off", "error", "warn", "info",
    /// "debug" and "trace".
    ///
    /// Example: "info" in general, everything from plugin resolution, and
    /// nothing from the settings resolution:
    ///
    ///    [log]
    ///    filters.netbox_settings = "info"
    ///    filters."netbox_settings::plugins" = "trace"
    ///    filters."netbox_settings::settings" = "off"
    #[config(default = { "netbox_settings": "info" })]
    pub filters: Filters,

    /// Optional file that log messages are appended to. `${cmd}` is replaced
    /// by the subcommand, e.g. "/var/log/netbox/settings-${cmd}.log".
    pub file: Option<PathBuf>,

    /// Whether to write log messages to stdout.
    #[config(default = true)]
    pub stdout: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "HashMap<String, String>")]
pub struct Filters(HashMap<String, LevelFilter>);

impl TryFrom<HashMap<String, String>> for Filters {
    type Error = String;
    fn try_from(raw: HashMap<String, String>) -> Result<Self, Self::Error> {
        let mut out = HashMap::with_capacity(raw.len());
        for (prefix, level) in raw {
            out.insert(prefix, parse_level_filter(&level)?);
        }
        Ok(Self(out))
    }
}

impl Filters {
    /// The configured filters, with levels as lowercase strings.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.0.iter()
            .map(|(target, level)| (target.clone(), level.to_string().to_lowercase()))
            .collect()
    }

    /// Adds a filter for `target` unless one is configured for it or one of
    /// its submodules.
    fn with_fallback(mut self, target: &str, level: LevelFilter) -> Self {
        if !self.0.keys().any(|prefix| prefix.starts_with(target)) {
            self.0.insert(target.to_owned(), level);
        }
        self
    }

    /// Whether a log with the given target and level passes the filters.
    fn allows(&self, target: &str, level: &Level) -> bool {
        // If there are many filters, it might be worth to build an extra
        // prefix data structure, but in practice we only expect very few
        // entries.
        //
        // See the config doc comment to see the logic behind this filter.
        self.0.iter()
            .filter(|(target_prefix, _)| target.starts_with(*target_prefix))
            .max_by_key(|(target_prefix, _)| target_prefix.len())
            .map(|(_, level_filter)| level <= level_filter)
            .unwrap_or(false)
    }
}

fn parse_level_filter(s: &str) -> Result<LevelFilter, String> {
    const LEVELS: &[(&str, LevelFilter)] = &[
        ("off", LevelFilter::OFF),
        ("error", LevelFilter::ERROR),
        ("warn", LevelFilter::WARN),
        ("info", LevelFilter::INFO),
        ("debug", LevelFilter::DEBUG),
        ("trace", LevelFilter::TRACE),
    ];

    LEVELS.iter()
        .find(|(name, _)| *name == s)
        .map(|(_, level)| *level)
        .ok_or_else(|| format!("invalid log level '{s}'"))
}

/// Installs our own logger globally. Must only be called once!
///
/// If `debug_ldap` is set, the remote LDAP authentication is logged at
/// "debug" level unless configured otherwise.
pub fn init(config: &LogConfig, color: ColorChoice, cmd: &str, debug_ldap: bool) -> Result<()> {
    let filter = {
        let mut filters = config.filters.clone();
        if debug_ldap {
            filters = filters.with_fallback(LDAP_TARGET, LevelFilter::DEBUG);
        }
        let max_level = filters.0.values().max().copied().unwrap_or(LevelFilter::OFF);
        let filter = FilterFn::new(move |metadata| {
            filters.allows(metadata.target(), metadata.level())
        });
        filter.with_max_level_hint(max_level)
    };

    macro_rules! subscriber {
        ($writer:expr) => {
            tracing_subscriber::fmt::layer()
                .event_format(EventFormatter(color))
                .with_writer($writer)
        };
    }

    let stdout_output = if config.stdout {
        Some(subscriber!(std::io::stdout))
    } else {
        None
    };

    let file_output = match &config.file {
        Some(path) => {
            let file = open_log_file(path, cmd)?;
            Some(subscriber!(file).with_ansi(color == ColorChoice::Always))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_output)
        .with(stdout_output)
        .init();

    Ok(())
}

fn open_log_file(path: &Path, cmd: &str) -> Result<File> {
    use std::io::Write;

    let path = path.to_str()
        .ok_or_else(|| anyhow!("log file path '{}' is not valid UTF-8", path.display()))?
        .replace("${cmd}", cmd);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .context(format!("failed to open log file '{path}'"))?;

    // Blank line between runs.
    file.write_all(b"\n").context(format!("failed to write to log file '{path}'"))?;

    Ok(file)
}

type TracingWriter<'a> = tracing_subscriber::fmt::format::Writer<'a>;

/// Formats events as "<time> <level> <target> >  <message> ~~ <fields>".
/// Continuation lines of multi-line messages are aligned with the first one.
#[derive(Clone, Copy)]
struct EventFormatter(ColorChoice);

impl<S, N> FormatEvent<S, N> for EventFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: TracingWriter<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let use_ansi = self.0 == ColorChoice::Always
            || (writer.has_ansi_escapes() && self.0 != ColorChoice::Never);
        macro_rules! wr {
            ($style:expr, $fmt:literal $($args:tt)*) => {{
                with_style(&mut writer, use_ansi, $style, |w| {
                    write!(w, $fmt $($args)*)
                })?;
            }};
        }

        // Events coming from the `log` crate carry their real metadata in fields.
        let normalized_metadata = event.normalized_metadata();
        let metadata = normalized_metadata.as_ref().unwrap_or(event.metadata());

        let dim_style = Style::new().dimmed();
        let (level_style, body_style) = match *metadata.level() {
            Level::ERROR => (Style::new().fg(Color::Red).bold(), Style::new().fg(Color::Red)),
            Level::WARN => (Style::new().fg(Color::Yellow).bold(), Style::new().fg(Color::Yellow)),
            Level::INFO => (Style::new().fg(Color::Green), Style::new()),
            Level::DEBUG => (Style::new().fg(Color::Blue), Style::new().dimmed()),
            Level::TRACE => (Style::new().fg(Color::Magenta), Style::new().fg(Color::DarkGray)),
        };

        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S.%3f").to_string();
        wr!(dim_style, "{now} ");
        wr!(level_style, "{:5}", metadata.level());
        wr!(dim_style, " {} >  ", metadata.target());

        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        if let Some(message) = &fields.message {
            let indent = now.len() + " DEBUG ".len() + metadata.target().len() + 1;
            let mut lines = message.lines();
            wr!(body_style, "{}", lines.next().unwrap_or(""));
            for line in lines {
                write!(writer, "\n{:indent$}", "")?;
                wr!(dim_style, ">");
                wr!(body_style, "  {line}");
            }
        }

        if !fields.others.is_empty() {
            if fields.message.is_some() {
                wr!(level_style, " ~~");
            }
            for (name, value) in &fields.others {
                wr!(body_style.italic(), " {name}");
                wr!(body_style, "={value}");
            }
        }

        writeln!(writer, "{}", if use_ansi { nu_ansi_term::ansi::RESET } else { "" })
    }
}

/// Collects the message and all other fields of an event.
#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    others: Vec<(&'static str, String)>,
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = Some(format!("{value:?}")),
            name if name.starts_with("log.") => {}
            name => self.others.push((name, format!("{value:?}"))),
        }
    }
}

fn with_style(
    out: &mut TracingWriter<'_>,
    use_ansi: bool,
    style: Style,
    f: impl FnOnce(&mut TracingWriter<'_>) -> std::fmt::Result,
) -> std::fmt::Result {
    if use_ansi {
        write!(out, "{}", style.prefix())?;
    }
    f(out)?;
    if use_ansi {
        write!(out, "{}", style.suffix())?;
    }
    Ok(())
}
