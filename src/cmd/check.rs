//! A subcommand checking as much of the configuration as possible without
//! starting NetBox. Useful before an upgrade or a restart.

use std::path::Path;

use netbox_settings::{config::Config, prelude::*, settings::Settings};

use crate::{args, load_config_and_init_logger};


pub(crate) fn run(shared: &args::Shared, args: &args::Args) -> Result<()> {
    let config = load_config_and_init_logger(shared, args)
        .context("failed to load config: cannot proceed with `check` command")?;


    info!("Starting to verify various things...");
    let settings = Settings::resolve(&config, &crate::plugin_registry());
    let referenced_dirs = check_referenced_dirs(&config);
    info!("Done verifying various things");


    // Print summary after all log output
    let mut any_errors = false;
    println!();
    bunt::println!("{$bold+blue+intense}Summary{/$}");
    println!();
    print_outcome(&mut any_errors, "Load configuration", &Ok(()));
    print_outcome(&mut any_errors, "Resolve settings and plugins", &settings);
    print_outcome(&mut any_errors, "Checking referenced directories", &referenced_dirs);

    if let Ok(settings) = &settings {
        println!();
        bunt::println!(
            "   {$dimmed}{} installed apps, {} middleware, {} auth backends{/$}",
            settings.installed_apps.len(),
            settings.middleware.len(),
            settings.authentication_backends.len(),
        );
    }

    println!();
    if any_errors {
        bunt::println!("{$red+intense}➡  Errors have occured!{/$}");
        std::process::exit(1);
    } else {
        bunt::println!("{$green+intense}⮕  Everything OK{/$}");
        Ok(())
    }
}

fn print_outcome<T>(any_errors: &mut bool, label: &str, result: &Result<T>) {
    match result {
        Ok(_) => bunt::println!(" ▸ {[bold+intense]}  {$green+bold}✔ ok{/$}", label),
        Err(e) => {
            *any_errors = true;
            bunt::println!(" ▸ {[bold+intense]}  {$red+bold}✘ error{/$}", label);
            bunt::println!("      {$red}▶▶▶ {$bold}Error:{/$}{/$} {[yellow+intense]}", e);
            if e.chain().len() > 1 {
                println!();
                bunt::println!("      {$red+italic}Caused by:{/$}");
            }

            for (i, cause) in e.chain().skip(1).enumerate() {
                println!("       {: >1$}‣ {cause}", "", i * 2);
            }
            println!();
        }
    }
}

/// Directories NetBox reads from or writes to at runtime must exist.
fn check_referenced_dirs(config: &Config) -> Result<()> {
    let paths = &config.paths;
    let mut dirs = vec![
        ("media_root", &paths.media_root),
        ("reports_root", &paths.reports_root),
        ("scripts_root", &paths.scripts_root),
    ];
    if let Some(p) = &paths.session_file_path {
        dirs.push(("session_file_path", p));
    }

    for (name, path) in dirs {
        debug!("Checking that {name} '{}' is a directory...", path.display());
        if !is_dir(path)? {
            bail!("'paths.{name}' ('{}') is not a directory", path.display());
        }
    }

    Ok(())
}

fn is_dir(path: &Path) -> Result<bool> {
    let meta = std::fs::metadata(path)
        .context(format!("could not access '{}'", path.display()))?;
    Ok(meta.is_dir())
}
