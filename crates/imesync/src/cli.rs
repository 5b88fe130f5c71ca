//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// imesync - configuration deployment and sync for an input-method app
#[derive(Parser, Debug)]
#[command(name = "imesync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Directory holding runtime.yaml (default: ~/.imesync)
    #[arg(long, global = true, env = "IMESYNC_SETTINGS_DIR")]
    pub settings: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy the current configuration to the input engine
    Deploy(DeployArgs),

    /// Propagate files and synchronize user dictionaries without a full redeploy
    Sync,

    /// Recreate data directories from the bundled defaults
    Reset(ResetArgs),

    /// Back up the data directories and configuration
    Backup(BackupArgs),

    /// Restore from a backup archive
    Restore(RestoreArgs),

    /// Configuration document
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Input schema selection
    #[command(subcommand)]
    Schema(SchemaCommands),
}

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// No progress output; uses the shorter silent timeout
    #[arg(long)]
    pub silent: bool,
}

#[derive(Args, Debug)]
pub struct ResetArgs {
    /// Skip confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    /// List existing backups instead of creating one
    #[arg(short, long, conflicts_with = "delete")]
    pub list: bool,

    /// Delete a backup (file name or path inside the backup directory)
    #[arg(short, long, value_name = "FILE")]
    pub delete: Option<Utf8PathBuf>,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Backup archive (.tar.gz)
    pub archive: Utf8PathBuf,

    /// Skip confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the current configuration
    Show(ConfigShowArgs),

    /// Reset one field to its default value and redeploy
    RestoreDefault(ConfigRestoreDefaultArgs),
}

#[derive(Args, Debug)]
pub struct ConfigShowArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Include default values for unset fields
    #[arg(long)]
    pub resolved: bool,
}

#[derive(Args, Debug)]
pub struct ConfigRestoreDefaultArgs {
    /// Field path, e.g. keyboard.enable-key-sounds
    pub field: String,
}

#[derive(Subcommand, Debug)]
pub enum SchemaCommands {
    /// List available schemas and the current selection
    List,

    /// Add a schema to the selection and redeploy
    Select(SchemaIdArgs),

    /// Remove a schema from the selection and redeploy
    Deselect(SchemaIdArgs),
}

#[derive(Args, Debug)]
pub struct SchemaIdArgs {
    /// Schema id
    pub id: String,
}
