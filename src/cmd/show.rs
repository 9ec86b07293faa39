use std::io::{self, Write};

use netbox_settings::{prelude::*, settings::Settings};

use crate::{args, load_config_and_init_logger};


pub(crate) fn run(shared: &args::Shared, args: &args::Args) -> Result<()> {
    let config = load_config_and_init_logger(shared, args)?;
    let settings = Settings::resolve(&config, &crate::plugin_registry())?;

    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &settings)
        .context("failed to serialize settings")?;
    writeln!(stdout)?;

    Ok(())
}
