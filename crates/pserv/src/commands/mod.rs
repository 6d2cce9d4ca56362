//! Command dispatch: bridges CLI args -> provisioning calls -> output formatting.

pub mod config_cmd;
pub mod distros;
pub mod nodes;
pub mod profiles;
pub mod templates;

use pserv_core::{ProvisioningApi, TemplateKind};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a backend-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    api: &ProvisioningApi,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Nodes(args) => nodes::handle(api, args, global).await,
        Command::Profiles(args) => profiles::handle(api, args, global).await,
        Command::Distros(args) => distros::handle(api, args, global).await,
        Command::Templates(args) => {
            templates::handle(api, TemplateKind::Template, args, global).await
        }
        Command::Snippets(args) => templates::handle(api, TemplateKind::Snippet, args, global).await,
        Command::Sync => {
            api.sync().await?;
            if !global.quiet {
                eprintln!("Sync complete");
            }
            Ok(())
        }
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Err(CliError::Config {
            message: "command does not need a backend connection".into(),
        }),
    }
}
