//! Command-line interface definitions for the `sfvol` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI for the `sfvol` binary.
#[derive(Debug, Parser)]
#[command(
    name = "sfvol",
    version,
    about = "Manage SolidFire volumes and their iSCSI attachments on this host",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, global = true)]
    pub(crate) debug: bool,
    /// Command to run.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Top-level command groups.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Volume related commands.
    #[command(subcommand)]
    Volume(VolumeCommand),
}

/// Subcommands of `sfvol volume`.
#[derive(Debug, Subcommand)]
pub(crate) enum VolumeCommand {
    /// Create a tenant volume unless one with the same name exists.
    Create(CreateCommand),
    /// List active volumes.
    List(ListCommand),
    /// Delete volumes by identifier.
    Delete(DeleteCommand),
    /// Log in to a volume and print its block device.
    Attach(AttachCommand),
    /// Log out of a volume and remove its node record.
    Detach(DetachCommand),
    /// Attach, format if blank and mount a tenant volume by name.
    Mount(NameCommand),
    /// Unmount and detach a tenant volume by name.
    Unmount(NameCommand),
}

/// Arguments for `sfvol volume create`.
#[derive(Debug, Args)]
pub(crate) struct CreateCommand {
    /// Volume name.
    pub(crate) name: String,
    /// Size in GiB; the configured default applies when omitted.
    #[arg(long, value_name = "GIB")]
    pub(crate) size: Option<u64>,
    /// QoS as `min,max,burst`, for example `1000,5000,15000`.
    #[arg(long, value_name = "MIN,MAX,BURST")]
    pub(crate) qos: Option<String>,
    /// Named volume type from the configured catalogue. Takes precedence
    /// over `--qos` when it matches.
    #[arg(long = "type", value_name = "TYPE")]
    pub(crate) volume_type: Option<String>,
}

/// Arguments for `sfvol volume list`.
#[derive(Debug, Args)]
pub(crate) struct ListCommand {
    /// Only list volumes owned by this account.
    #[arg(long, value_name = "ID", conflicts_with_all = ["start_id", "limit"])]
    pub(crate) account: Option<i64>,
    /// First volume identifier to list from.
    #[arg(long, value_name = "ID")]
    pub(crate) start_id: Option<i64>,
    /// Maximum number of volumes to return. Every page is fetched when
    /// omitted.
    #[arg(long, value_name = "COUNT")]
    pub(crate) limit: Option<u32>,
}

/// Arguments for `sfvol volume delete`.
#[derive(Debug, Args)]
pub(crate) struct DeleteCommand {
    /// Identifiers of the volumes to delete.
    #[arg(required = true, value_name = "VOLUME_ID")]
    pub(crate) ids: Vec<i64>,
}

/// Arguments for `sfvol volume attach`.
#[derive(Debug, Args)]
pub(crate) struct AttachCommand {
    /// Identifier of the volume to attach.
    #[arg(value_name = "VOLUME_ID")]
    pub(crate) id: i64,
    /// Initiator interface; the configured one applies when omitted.
    #[arg(long, value_name = "IFACE")]
    pub(crate) iface: Option<String>,
}

/// Arguments for `sfvol volume detach`.
#[derive(Debug, Args)]
pub(crate) struct DetachCommand {
    /// Identifier of the volume to detach.
    #[arg(value_name = "VOLUME_ID")]
    pub(crate) id: i64,
}

/// Arguments naming a tenant volume.
#[derive(Debug, Args)]
pub(crate) struct NameCommand {
    /// Volume name.
    pub(crate) name: String,
}
