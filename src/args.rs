//! This module defines the command line arguments accepted by the binary.

use std::{io::IsTerminal, path::PathBuf};
use termcolor::ColorChoice;

use crate::cmd;


#[derive(Debug, clap::Parser)]
#[clap(
    about = "Resolves and checks NetBox settings.",
    version,
)]
pub(crate) struct Args {
    /// Whether to use colors when printing to the terminal.
    #[clap(long, global = true, value_enum, default_value_t = ColorMode::Auto)]
    pub(crate) color: ColorMode,

    #[clap(subcommand)]
    pub(crate) cmd: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum ColorMode {
    Auto,
    Always,
    Never,
}

#[derive(Debug, clap::Subcommand)]
pub(crate) enum Command {
    /// Loads the configuration, resolves all settings and plugins and checks
    /// referenced directories.
    ///
    /// Useful before restarting NetBox, as it catches most configuration
    /// errors early. Exits with 0 if everything is Ok, and with 1 otherwise.
    Check {
        #[clap(flatten)]
        shared: Shared,
    },

    /// Prints the resolved settings as JSON. Secrets are redacted.
    Show {
        #[clap(flatten)]
        shared: Shared,
    },

    /// Outputs a template for the configuration file (which includes
    /// descriptions of all options).
    WriteConfig {
        /// Target file. If not specified, the template is written to stdout.
        target: Option<PathBuf>,
    },

    /// Checks whether a permission label (e.g. "dcim.view_device") is exempt
    /// from view permission enforcement.
    CheckPermission {
        #[clap(flatten)]
        args: cmd::check_permission::Args,

        #[clap(flatten)]
        shared: Shared,
    },
}

impl Command {
    /// Name used for `${cmd}` in the log file path.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Check { .. } => "check",
            Self::Show { .. } => "show",
            Self::WriteConfig { .. } => "write-config",
            Self::CheckPermission { .. } => "check-permission",
        }
    }
}

#[derive(Debug, clap::Args)]
pub(crate) struct Shared {
    /// Path to the configuration file. If this is not specified, the path in
    /// `NETBOX_CONFIG_PATH` is used, or else `config.toml` or
    /// `/etc/netbox/config.toml` is tried.
    #[clap(short, long)]
    pub(crate) config: Option<PathBuf>,
}

impl Args {
    pub(crate) fn stdout_color(&self) -> ColorChoice {
        self.color_choice(std::io::stdout().is_terminal())
    }

    pub(crate) fn stderr_color(&self) -> ColorChoice {
        self.color_choice(std::io::stderr().is_terminal())
    }

    fn color_choice(&self, is_terminal: bool) -> ColorChoice {
        match self.color {
            ColorMode::Always => ColorChoice::Always,
            ColorMode::Never => ColorChoice::Never,
            ColorMode::Auto if is_terminal => ColorChoice::Auto,
            ColorMode::Auto => ColorChoice::Never,
        }
    }
}
