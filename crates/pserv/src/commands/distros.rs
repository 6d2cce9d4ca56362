//! Distribution command handlers.

use tabled::Tabled;

use pserv_core::{Attributes, DistroRecord, ProvisioningApi};

use crate::cli::{DistrosArgs, DistrosCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct DistroRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kernel")]
    kernel: String,
    #[tabled(rename = "Initrd")]
    initrd: String,
}

impl From<&DistroRecord> for DistroRow {
    fn from(d: &DistroRecord) -> Self {
        Self {
            name: d.name.clone(),
            kernel: d.kernel.clone().unwrap_or_default(),
            initrd: d.initrd.clone().unwrap_or_default(),
        }
    }
}

pub async fn handle(
    api: &ProvisioningApi,
    args: DistrosArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        DistrosCommand::List { names } => {
            let distros = if names.is_empty() {
                api.get_distros().await?
            } else {
                api.get_distros_by_name(&names).await?
            };
            let distros: Vec<DistroRecord> = distros.into_values().collect();
            let out = output::render_list(
                &global.output,
                &distros,
                |d| DistroRow::from(d),
                |d| d.name.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DistrosCommand::Add {
            name,
            kernel,
            initrd,
        } => {
            let created = api
                .add_distro(&name, &initrd, &kernel, &Attributes::new())
                .await?;
            if !global.quiet {
                eprintln!("Distro '{created}' created");
            }
            Ok(())
        }

        DistrosCommand::Delete { names } => {
            api.delete_distros_by_name(&names).await?;
            if !global.quiet {
                eprintln!("Deleted {} distro(s) and their dependents", names.len());
            }
            Ok(())
        }
    }
}
