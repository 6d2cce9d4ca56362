//! Node command handlers.

use secrecy::SecretString;
use tabled::Tabled;

use pserv_core::{Attributes, BootstrapMetadata, NodeRecord, ProvisioningApi};

use crate::cli::{GlobalOpts, NodesArgs, NodesCommand};
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Profile")]
    profile: String,
    #[tabled(rename = "MAC Addresses")]
    macs: String,
}

impl From<&NodeRecord> for NodeRow {
    fn from(n: &NodeRecord) -> Self {
        Self {
            name: n.name.clone(),
            profile: n.profile.clone().unwrap_or_default(),
            macs: n.mac_addresses.join(", "),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    api: &ProvisioningApi,
    args: NodesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        NodesCommand::List { names } => {
            let nodes = if names.is_empty() {
                api.get_nodes().await?
            } else {
                api.get_nodes_by_name(&names).await?
            };
            let nodes: Vec<NodeRecord> = nodes.into_values().collect();
            let out = output::render_list(
                &global.output,
                &nodes,
                |n| NodeRow::from(n),
                |n| n.name.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        NodesCommand::Add {
            name,
            profile,
            metadata_url,
            metadata_credentials,
            macs,
        } => {
            let url: url::Url = metadata_url.parse().map_err(|_| CliError::Validation {
                field: "metadata-url".into(),
                reason: format!("invalid URL: {metadata_url}"),
            })?;
            let metadata =
                BootstrapMetadata::new(url, SecretString::from(metadata_credentials));
            let created = api
                .add_node(&name, &profile, &metadata, &macs, &Attributes::new())
                .await?;
            if !global.quiet {
                eprintln!("Node '{created}' created");
            }
            Ok(())
        }

        NodesCommand::Delete { names } => {
            api.delete_nodes_by_name(&names).await?;
            if !global.quiet {
                eprintln!("Deleted {} node(s)", names.len());
            }
            Ok(())
        }

        NodesCommand::SetMacs { name, macs } => {
            api.set_node_mac_addresses(&name, &macs).await?;
            if !global.quiet {
                eprintln!("MAC addresses updated for '{name}'");
            }
            Ok(())
        }

        NodesCommand::Start { names } => {
            api.start_nodes(&names).await?;
            if !global.quiet {
                eprintln!("Power on requested for {} node(s)", names.len());
            }
            Ok(())
        }

        NodesCommand::Stop { names } => {
            api.stop_nodes(&names).await?;
            if !global.quiet {
                eprintln!("Power off requested for {} node(s)", names.len());
            }
            Ok(())
        }
    }
}
