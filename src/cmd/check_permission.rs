use netbox_settings::{auth::parse_permission, prelude::*};

use crate::{args, load_config_and_init_logger};


#[derive(Debug, clap::Args)]
pub(crate) struct Args {
    /// The permission label, e.g. "dcim.view_device".
    label: String,
}

pub(crate) fn run(cmd_args: &Args, shared: &args::Shared, args: &args::Args) -> Result<()> {
    let config = load_config_and_init_logger(shared, args)?;
    let exempt = netbox_settings::auth::ExemptViewPermissions::new(
        config.general.exempt_view_permissions.iter().cloned(),
    );

    let label = &cmd_args.label;
    match parse_permission(label) {
        None => bunt::println!(
            "{[bold]}: {$yellow}not a recognized permission label{/$}, \
                only the standard permission check applies",
            label,
        ),
        Some(_) if exempt.exempts_label(label) => bunt::println!(
            "{[bold]}: {$green}exempt{/$} from view permission enforcement",
            label,
        ),
        Some(parts) if parts.action != "view" => bunt::println!(
            "{[bold]}: not a view permission, the standard permission check applies",
            label,
        ),
        Some(_) => bunt::println!(
            "{[bold]}: {$red}not exempt{/$}, the standard permission check applies",
            label,
        ),
    }

    Ok(())
}
