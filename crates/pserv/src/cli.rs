//! Clap derive structures for the `pserv` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// pserv -- drive a network-install provisioning backend
#[derive(Debug, Parser)]
#[command(
    name = "pserv",
    version,
    about = "Manage distros, profiles, and nodes on a provisioning backend",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Backend profile to use
    #[arg(long, short = 'p', env = "PSERV_PROFILE", global = true)]
    pub profile: Option<String>,

    /// XML-RPC endpoint URL (overrides profile)
    #[arg(long, env = "PSERV_URL", global = true)]
    pub url: Option<String>,

    /// Backend user (overrides profile)
    #[arg(long, short = 'u', env = "PSERV_USER", global = true)]
    pub user: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "PSERV_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept invalid TLS certificates
    #[arg(long, short = 'k', env = "PSERV_INSECURE", global = true)]
    pub insecure: bool,

    /// Per-call timeout in seconds (overrides profile)
    #[arg(long, env = "PSERV_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output Enum ──────────────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage nodes (backend systems)
    #[command(alias = "n")]
    Nodes(NodesArgs),

    /// Manage install profiles
    Profiles(ProfilesArgs),

    /// Manage bootable distributions
    Distros(DistrosArgs),

    /// Read and write installer templates
    Templates(TemplatesArgs),

    /// Read and write template snippets
    Snippets(TemplatesArgs),

    /// Regenerate the backend's netboot configuration
    Sync,

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  NODES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct NodesArgs {
    #[command(subcommand)]
    pub command: NodesCommand,
}

#[derive(Debug, Subcommand)]
pub enum NodesCommand {
    /// List nodes (all, or only the named ones)
    #[command(alias = "ls")]
    List {
        /// Node names
        names: Vec<String>,
    },

    /// Create or replace a node
    Add {
        /// Node name
        name: String,

        /// Install profile
        #[arg(long)]
        profile: String,

        /// URL the installed node uses to fetch its metadata
        #[arg(long)]
        metadata_url: String,

        /// One-shot credentials for the metadata service
        #[arg(long, env = "PSERV_METADATA_CREDENTIALS", hide_env_values = true)]
        metadata_credentials: String,

        /// MAC address to give the node (repeatable, assigned eth0, eth1, ...)
        #[arg(long = "mac", value_name = "MAC")]
        macs: Vec<String>,
    },

    /// Delete nodes (absent ones are ignored)
    #[command(alias = "rm")]
    Delete {
        /// Node names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Replace a node's MAC addresses
    SetMacs {
        /// Node name
        name: String,

        /// Desired MAC addresses (none clears them all)
        macs: Vec<String>,
    },

    /// Power nodes on
    Start {
        /// Node names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Power nodes off
    Stop {
        /// Node names
        #[arg(required = true)]
        names: Vec<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  PROFILES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ProfilesArgs {
    #[command(subcommand)]
    pub command: ProfilesCommand,
}

#[derive(Debug, Subcommand)]
pub enum ProfilesCommand {
    /// List profiles (all, or only the named ones)
    #[command(alias = "ls")]
    List {
        /// Profile names
        names: Vec<String>,
    },

    /// Create or replace a profile
    Add {
        /// Profile name
        name: String,

        /// Backing distribution
        #[arg(long)]
        distro: String,
    },

    /// Delete profiles and the nodes using them
    #[command(alias = "rm")]
    Delete {
        /// Profile names
        #[arg(required = true)]
        names: Vec<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DISTROS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DistrosArgs {
    #[command(subcommand)]
    pub command: DistrosCommand,
}

#[derive(Debug, Subcommand)]
pub enum DistrosCommand {
    /// List distributions (all, or only the named ones)
    #[command(alias = "ls")]
    List {
        /// Distribution names
        names: Vec<String>,
    },

    /// Create or replace a distribution
    Add {
        /// Distribution name
        name: String,

        /// Installer kernel path on the backend
        #[arg(long)]
        kernel: String,

        /// Installer initrd path on the backend
        #[arg(long)]
        initrd: String,
    },

    /// Delete distributions and everything built on them
    #[command(alias = "rm")]
    Delete {
        /// Distribution names
        #[arg(required = true)]
        names: Vec<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  TEMPLATES / SNIPPETS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct TemplatesArgs {
    #[command(subcommand)]
    pub command: TemplatesCommand,
}

#[derive(Debug, Subcommand)]
pub enum TemplatesCommand {
    /// List paths
    #[command(alias = "ls")]
    List,

    /// Print a file's contents
    Read {
        /// Path on the backend
        path: String,
    },

    /// Overwrite a file from a local file ("-" for stdin)
    Write {
        /// Path on the backend
        path: String,

        /// Local source
        file: PathBuf,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Display the current configuration (passwords redacted)
    Show,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a password in the system keyring (read from stdin)
    SetPassword {
        /// Profile name
        #[arg(long)]
        profile: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn nodes_add_parses_metadata() {
        let cli = Cli::try_parse_from([
            "pserv",
            "nodes",
            "add",
            "node-1",
            "--profile",
            "precise-amd64",
            "--metadata-url",
            "http://registry/metadata/",
            "--metadata-credentials",
            "secret",
            "--mac",
            "aa:bb:cc:dd:ee:01",
            "--mac",
            "aa:bb:cc:dd:ee:02",
        ])
        .unwrap();

        match cli.command {
            Command::Nodes(NodesArgs {
                command:
                    NodesCommand::Add {
                        name,
                        profile,
                        macs,
                        ..
                    },
            }) => {
                assert_eq!(name, "node-1");
                assert_eq!(profile, "precise-amd64");
                assert_eq!(macs, vec!["aa:bb:cc:dd:ee:01", "aa:bb:cc:dd:ee:02"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn set_macs_accepts_an_empty_list() {
        let cli = Cli::try_parse_from(["pserv", "nodes", "set-macs", "node-1"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Nodes(NodesArgs {
                command: NodesCommand::SetMacs { ref macs, .. }
            }) if macs.is_empty()
        ));
    }

    #[test]
    fn delete_requires_names() {
        assert!(Cli::try_parse_from(["pserv", "distros", "delete"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["pserv", "sync", "--timeout", "5", "-o", "json", "-vv"]).unwrap();
        assert_eq!(cli.global.timeout, Some(5));
        assert_eq!(cli.global.verbose, 2);
        assert!(matches!(cli.global.output, OutputFormat::Json));
    }
}
