//! Profile command handlers.

use tabled::Tabled;

use pserv_core::{Attributes, ProfileRecord, ProvisioningApi};

use crate::cli::{GlobalOpts, ProfilesArgs, ProfilesCommand};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Distro")]
    distro: String,
}

impl From<&ProfileRecord> for ProfileRow {
    fn from(p: &ProfileRecord) -> Self {
        Self {
            name: p.name.clone(),
            distro: p.distro.clone().unwrap_or_default(),
        }
    }
}

pub async fn handle(
    api: &ProvisioningApi,
    args: ProfilesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        ProfilesCommand::List { names } => {
            let profiles = if names.is_empty() {
                api.get_profiles().await?
            } else {
                api.get_profiles_by_name(&names).await?
            };
            let profiles: Vec<ProfileRecord> = profiles.into_values().collect();
            let out = output::render_list(
                &global.output,
                &profiles,
                |p| ProfileRow::from(p),
                |p| p.name.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ProfilesCommand::Add { name, distro } => {
            let created = api.add_profile(&name, &distro, &Attributes::new()).await?;
            if !global.quiet {
                eprintln!("Profile '{created}' created");
            }
            Ok(())
        }

        ProfilesCommand::Delete { names } => {
            api.delete_profiles_by_name(&names).await?;
            if !global.quiet {
                eprintln!("Deleted {} profile(s)", names.len());
            }
            Ok(())
        }
    }
}
