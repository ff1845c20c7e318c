//! Name-keyed volume driver combining the directories, the session
//! orchestrator and the mount executor.
//!
//! Every mutating operation holds the per-volume lock for its name, so work
//! on unrelated volumes runs concurrently while two operations on the same
//! volume never interleave.

use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::command::{CommandRunner, ProcessCommandRunner};
use crate::config::{ConfigError, SolidFireConfig};
use crate::directory::{
    AccountDirectory, CreateVolumeRequest, Deletion, DirectoryError, VolumeDirectory, VolumeTypes,
};
use crate::iscsi::{DeviceBinding, IscsiAdmin, SessionError, SessionOrchestrator};
use crate::lock::VolumeLocks;
use crate::mount::{DEFAULT_FILESYSTEM, MountError, MountExecutor, ProcessMountExecutor};
use crate::rpc::{HttpTransport, RpcClient, RpcError, Transport};
use crate::types::{Account, Qos, QosParseError, Volume, VolumeId};

/// Default base directory volumes are mounted under.
pub const DEFAULT_MOUNT_POINT: &str = "/var/lib/solidfire/mount";

/// Default initiator interface.
pub const DEFAULT_INITIATOR_IFACE: &str = "default";

/// Driver wired to the real controller and host tooling.
pub type HostDriver = VolumeDriver<HttpTransport, ProcessCommandRunner, ProcessMountExecutor>;

/// Errors raised by [`VolumeDriver`] operations.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Wrapper for directory failures.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    /// Wrapper for attach and detach failures.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Wrapper for filesystem and mount failures.
    #[error(transparent)]
    Mount(#[from] MountError),
    /// Raised when configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Raised when a create option cannot be interpreted.
    #[error("invalid {option} option: {message}")]
    InvalidOption {
        /// Option name.
        option: &'static str,
        /// What was wrong with it.
        message: String,
    },
    /// Raised when a volume name cannot be used as a mount directory.
    #[error("invalid volume name '{0}'")]
    InvalidName(String),
    /// Raised when start-up cannot complete.
    #[error("driver start-up failed while {stage}: {message}")]
    Startup {
        /// What the driver was doing.
        stage: &'static str,
        /// Failure description.
        message: String,
    },
}

impl From<RpcError> for DriverError {
    fn from(value: RpcError) -> Self {
        Self::Directory(DirectoryError::Rpc(value))
    }
}

/// Options accepted when creating a volume.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CreateOptions {
    /// Size in GiB; the configured default applies when unset.
    pub size_gib: Option<u64>,
    /// QoS as `min,max,burst`.
    pub qos: Option<String>,
    /// Named volume type from the catalogue.
    pub volume_type: Option<String>,
}

/// Settings the driver needs beyond its collaborators.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DriverSettings {
    /// Tenant account name owning every volume.
    pub tenant_name: String,
    /// Size used when a create does not name one.
    pub default_volume_size_gib: u64,
    /// Base directory volumes are mounted under.
    pub mount_point: Utf8PathBuf,
    /// Initiator interface used for logins.
    pub initiator_iface: String,
    /// Filesystem created on blank volumes.
    pub filesystem: String,
    /// Named QoS presets.
    pub volume_types: VolumeTypes,
}

impl DriverSettings {
    /// Creates settings for `tenant_name` with defaults for everything else.
    #[must_use]
    pub fn new(tenant_name: impl Into<String>) -> Self {
        Self {
            tenant_name: tenant_name.into(),
            default_volume_size_gib: 1,
            mount_point: Utf8PathBuf::from(DEFAULT_MOUNT_POINT),
            initiator_iface: String::from(DEFAULT_INITIATOR_IFACE),
            filesystem: String::from(DEFAULT_FILESYSTEM),
            volume_types: VolumeTypes::default(),
        }
    }
}

/// What the driver reports about a volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeSummary {
    /// Volume name.
    pub name: String,
    /// Directory the volume is (or would be) mounted at.
    pub mountpoint: Utf8PathBuf,
    /// Controller record.
    pub volume: Volume,
}

/// Manages the tenant's volumes by name.
#[derive(Debug)]
pub struct VolumeDriver<T, R, M> {
    settings: DriverSettings,
    account: Account,
    volumes: VolumeDirectory<T>,
    sessions: SessionOrchestrator<T, R, M>,
    locks: VolumeLocks,
}

impl HostDriver {
    /// Builds and initialises a driver for the host from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] for invalid configuration and
    /// [`DriverError::Startup`] when initialisation fails.
    pub async fn from_config(config: &SolidFireConfig) -> Result<Self, DriverError> {
        config.validate()?;
        let transport = HttpTransport::new(&config.transport_settings()).map_err(|err| {
            DriverError::Startup {
                stage: "building the controller client",
                message: err.to_string(),
            }
        })?;
        let rpc = RpcClient::new(transport);
        let sessions = SessionOrchestrator::new(
            config.session_settings()?,
            AccountDirectory::new(rpc.clone()),
            IscsiAdmin::new(ProcessCommandRunner, config.iscsiadm_bin.as_str()),
            ProcessMountExecutor::new(ProcessCommandRunner),
        );
        Self::initialise(config.driver_settings()?, rpc, sessions).await
    }
}

impl<T, R, M> VolumeDriver<T, R, M>
where
    T: Transport + Clone + Sync,
    R: CommandRunner + Sync,
    M: MountExecutor + Sync,
{
    /// Resolves or creates the tenant account and prepares the mount base.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Startup`] when the account cannot be resolved
    /// or the mount base cannot be created.
    pub async fn initialise(
        settings: DriverSettings,
        rpc: RpcClient<T>,
        sessions: SessionOrchestrator<T, R, M>,
    ) -> Result<Self, DriverError> {
        let account = AccountDirectory::new(rpc.clone())
            .get_or_create(&settings.tenant_name)
            .await
            .map_err(|err| DriverError::Startup {
                stage: "resolving the tenant account",
                message: err.to_string(),
            })?;
        std::fs::create_dir_all(&settings.mount_point).map_err(|err| DriverError::Startup {
            stage: "creating the mount base directory",
            message: format!("{}: {err}", settings.mount_point),
        })?;
        info!(
            tenant = %settings.tenant_name,
            account_id = %account.account_id,
            mount_point = %settings.mount_point,
            "volume driver initialised"
        );
        Ok(Self {
            settings,
            account,
            volumes: VolumeDirectory::new(rpc),
            sessions,
            locks: VolumeLocks::new(),
        })
    }

    /// Returns the tenant account.
    #[must_use]
    pub const fn account(&self) -> &Account {
        &self.account
    }

    /// Returns the volume directory.
    #[must_use]
    pub const fn volumes(&self) -> &VolumeDirectory<T> {
        &self.volumes
    }

    /// Returns the session orchestrator.
    #[must_use]
    pub const fn sessions(&self) -> &SessionOrchestrator<T, R, M> {
        &self.sessions
    }

    /// Returns the driver settings.
    #[must_use]
    pub const fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    /// Returns the mount directory for `name` without touching the host.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidName`] for names that are not a single
    /// path component or that carry surrounding whitespace. Every name-keyed
    /// operation validates through here, so the lock key, the controller
    /// name and the mount directory are the same string.
    pub fn path(&self, name: &str) -> Result<Utf8PathBuf, DriverError> {
        if name.is_empty()
            || name.trim() != name
            || name == "."
            || name == ".."
            || name.contains('/')
        {
            return Err(DriverError::InvalidName(name.to_owned()));
        }
        Ok(self.settings.mount_point.join(name))
    }

    /// Creates the tenant volume `name` unless it already exists.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] for invalid options or directory failures.
    pub async fn create(&self, name: &str, options: &CreateOptions) -> Result<Volume, DriverError> {
        self.path(name)?;
        let _guard = self.locks.lock(name).await;
        let size_gib = options
            .size_gib
            .unwrap_or(self.settings.default_volume_size_gib);
        let request = CreateVolumeRequest::builder()
            .name(name)
            .account_id(self.account.account_id)
            .size_gib(size_gib)
            .qos(self.resolve_qos(options)?)
            .build()?;
        let volume = self.volumes.create_volume(&request).await?;
        info!(name, volume_id = %volume.volume_id, "volume ready");
        Ok(volume)
    }

    /// Detaches the volume if attached, then deletes it.
    ///
    /// Detach failures are logged and do not stop the delete.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the lookup or the delete fails.
    pub async fn remove(&self, name: &str) -> Result<Deletion, DriverError> {
        self.path(name)?;
        let _guard = self.locks.lock(name).await;
        let volume = self.find(name).await?;
        if let Err(err) = self.sessions.detach(&volume, None) {
            warn!(name, error = %err, "detach before delete failed; deleting anyway");
        }
        Ok(self.volumes.delete_volume(volume.volume_id).await?)
    }

    /// Attaches the volume, formats it if blank and mounts it under the
    /// mount base. Returns the mount directory.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when any stage fails.
    pub async fn mount(&self, name: &str) -> Result<Utf8PathBuf, DriverError> {
        let mountpoint = self.path(name)?;
        let _guard = self.locks.lock(name).await;
        let volume = self.find(name).await?;
        let binding = self
            .sessions
            .attach(&volume, &self.settings.initiator_iface)
            .await?;
        let executor = self.sessions.mount_executor();
        executor.ensure_filesystem(&binding.device, &self.settings.filesystem)?;
        executor.mount(&binding.device, &mountpoint)?;
        Ok(mountpoint)
    }

    /// Unmounts and detaches the volume.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the lookup fails or any detach stage
    /// fails.
    pub async fn unmount(&self, name: &str) -> Result<(), DriverError> {
        let mountpoint = self.path(name)?;
        let _guard = self.locks.lock(name).await;
        let volume = self.find(name).await?;
        self.sessions.detach(&volume, Some(&mountpoint))?;
        Ok(())
    }

    /// Looks up a tenant volume by name.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the volume is missing or ambiguous.
    pub async fn get(&self, name: &str) -> Result<VolumeSummary, DriverError> {
        let mountpoint = self.path(name)?;
        let volume = self.find(name).await?;
        Ok(VolumeSummary {
            name: volume.name.clone(),
            mountpoint,
            volume,
        })
    }

    /// Lists the tenant's active volumes.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the listing fails.
    pub async fn list(&self) -> Result<Vec<VolumeSummary>, DriverError> {
        let volumes = self
            .volumes
            .list_for_account(self.account.account_id)
            .await?;
        Ok(volumes
            .into_iter()
            .filter(|volume| volume.is_active() && volume.account_id == self.account.account_id)
            .map(|volume| VolumeSummary {
                name: volume.name.clone(),
                mountpoint: self.settings.mount_point.join(&volume.name),
                volume,
            })
            .collect())
    }

    /// Attaches the volume with identifier `volume_id` without mounting it.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the lookup or attach fails.
    pub async fn attach_by_id(
        &self,
        volume_id: VolumeId,
        iface: Option<&str>,
    ) -> Result<DeviceBinding, DriverError> {
        let volume = self.volumes.get_by_id(volume_id).await?;
        let _guard = self.locks.lock(&volume.name).await;
        let interface = iface.unwrap_or(&self.settings.initiator_iface);
        Ok(self.sessions.attach(&volume, interface).await?)
    }

    /// Detaches the volume with identifier `volume_id` without unmounting.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the lookup or any detach stage fails.
    pub async fn detach_by_id(&self, volume_id: VolumeId) -> Result<(), DriverError> {
        let volume = self.volumes.get_by_id(volume_id).await?;
        let _guard = self.locks.lock(&volume.name).await;
        self.sessions.detach(&volume, None)?;
        Ok(())
    }

    async fn find(&self, name: &str) -> Result<Volume, DriverError> {
        Ok(self
            .volumes
            .find_by_name(name, self.account.account_id)
            .await?)
    }

    /// A matching volume type wins; otherwise the `min,max,burst` string
    /// applies; otherwise the controller default.
    fn resolve_qos(&self, options: &CreateOptions) -> Result<Qos, DriverError> {
        if let Some(name) = options.volume_type.as_deref() {
            if let Some(qos) = self.settings.volume_types.resolve(name) {
                debug!(volume_type = name, "using volume type QoS");
                return Ok(qos);
            }
            warn!(volume_type = name, "unknown volume type");
        }
        options
            .qos
            .as_deref()
            .map_or_else(|| Ok(Qos::default()), |text| {
                text.parse::<Qos>().map_err(|err: QosParseError| {
                    DriverError::InvalidOption {
                        option: "qos",
                        message: err.to_string(),
                    }
                })
            })
    }
}
