//! Command line tool to check and inspect NetBox settings.

use clap::Parser;
use std::env;

use netbox_settings::{config::Config, logger, plugins::PluginRegistry, prelude::*};

use crate::args::{Args, Command};

mod args;
mod cmd;


fn main() {
    if let Err(e) = run() {
        // Log error in case stdout is not connected and it is logged into a file.
        error!("{:?}", e);

        eprintln!();
        eprintln!();
        bunt::eprintln!("{$red}▶▶▶ {$bold}Error:{/$}{/$} {[yellow+intense]}", e);
        eprintln!();
        if e.chain().len() > 1 {
            bunt::eprintln!("{$red+italic}Caused by:{/$}");
        }

        for (i, cause) in e.chain().skip(1).enumerate() {
            eprintln!(" {: >1$}‣ {cause}", "", i * 2);
        }

        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Backtraces are cheap enough here and almost always useful.
    if env::var("RUST_BACKTRACE") == Err(env::VarError::NotPresent) {
        env::set_var("RUST_BACKTRACE", "1");
    }

    let args = Args::parse();

    bunt::set_stdout_color_choice(args.stdout_color());
    bunt::set_stderr_color_choice(args.stderr_color());

    match &args.cmd {
        Command::Check { shared } => cmd::check::run(shared, &args)?,
        Command::Show { shared } => cmd::show::run(shared, &args)?,
        Command::WriteConfig { target } => netbox_settings::config::write_template(target.as_ref())?,
        Command::CheckPermission { args: perm_args, shared } => {
            cmd::check_permission::run(perm_args, shared, &args)?;
        }
    }

    Ok(())
}

/// Plugins compiled into this binary. Deployments embedding their own plugins
/// build their registry the same way.
pub(crate) fn plugin_registry() -> PluginRegistry {
    PluginRegistry::new()
}

pub(crate) fn load_config_and_init_logger(shared: &args::Shared, args: &Args) -> Result<Config> {
    let (config, path) = match &shared.config {
        Some(path) => {
            let config = Config::load_from(path)
                .context(format!("failed to load config from '{}'", path.display()))?;
            (config, path.clone())
        }
        None => Config::from_env_or_default_locations()?,
    };

    // The logger can only be initialized after the config is read.
    logger::init(&config.log, args.stdout_color(), args.cmd.name(), config.remote_ldap.enabled)?;
    info!("Loaded config from '{}'", path.display());

    Ok(config)
}
