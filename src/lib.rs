//! Core library for the `sfvol` SolidFire volume tool.
//!
//! The crate talks to a SolidFire-style controller over JSON-RPC to manage
//! tenant accounts and volumes, and drives the host's iSCSI initiator to
//! attach those volumes as local block devices. [`VolumeDriver`] combines the
//! pieces into name-keyed create, mount, unmount and remove operations with a
//! lock per volume.

pub mod command;
pub mod config;
pub mod directory;
pub mod driver;
pub mod iscsi;
pub mod lock;
pub mod mount;
pub mod rpc;
pub mod test_support;
pub mod types;

pub use command::{CommandError, CommandOutput, CommandRunner, ProcessCommandRunner};
pub use config::{ConfigError, SolidFireConfig};
pub use directory::{
    AccountDirectory, CreateVolumeRequest, CreateVolumeRequestBuilder, Deletion, DirectoryError,
    VolumeDirectory, VolumeType, VolumeTypes,
};
pub use driver::{
    CreateOptions, DriverError, DriverSettings, HostDriver, VolumeDriver, VolumeSummary,
};
pub use iscsi::{
    DeviceBinding, IscsiAdmin, SessionError, SessionOrchestrator, SessionSettings, SessionState,
    TargetResolution,
};
pub use lock::{VolumeLockGuard, VolumeLocks};
pub use mount::{MountError, MountExecutor, ProcessMountExecutor};
pub use rpc::{HttpTransport, RpcClient, RpcError, Transport, TransportSettings};
pub use types::{Account, AccountId, IscsiTarget, Qos, Volume, VolumeId};
