//! Definitions of CLI arguments and commands for the deploy scripts

use clap::{Args, Parser, Subcommand};

use crate::extensions::ExtensionAction;

/// Deploy and upgrade the contract collection described by a chain manifest
#[derive(Parser)]
pub struct Cli {
    /// Private key of the deployer
    #[arg(short, long, env = "DEPLOYER_PRIV_KEY", hide_env_values = true)]
    pub priv_key: String,

    /// Path to the keystore file the private key was exported from; its
    /// ciphertext is embedded in deployment records when provided
    #[arg(long)]
    pub keystore_path: Option<String>,

    /// Network RPC URL, overriding the manifest's chain profile
    #[arg(short, long)]
    pub rpc_url: Option<String>,

    /// Path to the chain manifest JSON file
    #[arg(short, long)]
    pub manifest_path: String,

    /// Root directory of compiled contract artifacts
    #[arg(short, long)]
    pub artifacts_dir: String,

    /// Directory holding checksums, deployment records, and the inventory
    /// file
    #[arg(short, long, default_value = crate::constants::DEFAULT_STATE_DIR)]
    pub state_dir: String,

    /// Fold constructor arguments into the deployment checksum, so editing
    /// a manifest's args forces a redeploy instead of a silent skip
    #[arg(long)]
    pub args_in_checksum: bool,

    /// The command to run
    #[command(subcommand)]
    pub command: Command,
}

/// The deploy script commands
#[derive(Subcommand)]
pub enum Command {
    /// Deploy a named contract and its dependencies
    Deploy(DeployArgs),
    /// Apply an extension lifecycle action to a deployed proxy
    UpgradeExtension(UpgradeExtensionArgs),
}

/// Deploy a named contract (with dependencies) for a chain
#[derive(Args)]
pub struct DeployArgs {
    /// Logical name of the contract to deploy
    #[arg(short, long)]
    pub contract: String,

    /// Deploy for this tenant only, instead of every tenant the manifest
    /// declares
    #[arg(short, long)]
    pub tenant: Option<String>,
}

/// Add, replace, or remove an extension on a deployed proxy
#[derive(Args)]
pub struct UpgradeExtensionArgs {
    /// Logical name of the upgradable contract
    #[arg(short, long)]
    pub contract: String,

    /// The tenant whose deployment is upgraded
    #[arg(short, long)]
    pub tenant: String,

    /// The extension's metadata name, as declared in the manifest
    #[arg(short, long)]
    pub extension: String,

    /// The lifecycle action to apply
    #[arg(short, long)]
    pub action: ExtensionAction,
}
