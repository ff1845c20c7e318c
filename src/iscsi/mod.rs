//! iSCSI session orchestration.
//!
//! [`SessionOrchestrator`] turns a controller volume into a local block
//! device and back. Attachment state is never tracked in memory: the
//! by-path link udev creates for a logged-in LUN is the only record, so a
//! session established by another process is reused as-is.
//!
//! An attach walks `Detached → Discovering → Authenticating → Attached`; a
//! detach walks `Attached → Detaching → Detached` and always finishes, even
//! when individual stages fail.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info, warn};

use crate::command::CommandRunner;
use crate::directory::AccountDirectory;
use crate::mount::MountExecutor;
use crate::rpc::Transport;
use crate::types::{IscsiTarget, Volume};

mod admin;
pub mod device;
mod error;
pub mod sendtargets;

pub use admin::{DEFAULT_ISCSIADM, ISCSI_ERR_NO_OBJS_FOUND, IscsiAdmin};
pub use device::DEFAULT_DEVICE_ROOT;
pub use error::{DetachFailure, DetachStage, LoginStep, SessionError};

/// Default number of checks for the device path after login.
pub const DEFAULT_ATTACH_POLL_ATTEMPTS: u32 = 5;

/// Default pause between device path checks.
pub const DEFAULT_ATTACH_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Lifecycle of a volume's session on this host.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    /// No session and no device link.
    Detached,
    /// Checking tooling and locating the target portal.
    Discovering,
    /// Creating the node record and logging in with CHAP.
    Authenticating,
    /// Logged in with a device link present.
    Attached,
    /// Unmounting, logging out and deleting the node record.
    Detaching,
}

impl fmt::Display for SessionState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Detached => "detached",
            Self::Discovering => "discovering",
            Self::Authenticating => "authenticating",
            Self::Attached => "attached",
            Self::Detaching => "detaching",
        };
        formatter.write_str(label)
    }
}

/// How the login portal for a volume is found. Both log in with CHAP.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TargetResolution {
    /// Use the storage virtual IP directly.
    #[default]
    ByPath,
    /// Ask the storage virtual IP for its targets and use the advertised
    /// portal.
    SendTargets,
}

impl FromStr for TargetResolution {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "by-path" | "bypath" | "svip" => Ok(Self::ByPath),
            "sendtargets" | "send-targets" | "discovery" => Ok(Self::SendTargets),
            other => Err(format!(
                "unknown target resolution '{other}' (expected by-path or sendtargets)"
            )),
        }
    }
}

impl fmt::Display for TargetResolution {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::ByPath => "by-path",
            Self::SendTargets => "sendtargets",
        })
    }
}

/// Host-side settings for the orchestrator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionSettings {
    /// Storage virtual IP, optionally with a port.
    pub svip: Option<String>,
    /// How the login portal is found.
    pub target_resolution: TargetResolution,
    /// Directory holding by-path links.
    pub device_root: Utf8PathBuf,
    /// Number of device path checks after login.
    pub attach_poll_attempts: u32,
    /// Pause between device path checks.
    pub attach_poll_interval: Duration,
}

impl SessionSettings {
    /// Creates settings for `svip` with host defaults.
    #[must_use]
    pub fn new(svip: Option<String>) -> Self {
        Self {
            svip: svip
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty()),
            target_resolution: TargetResolution::default(),
            device_root: Utf8PathBuf::from(DEFAULT_DEVICE_ROOT),
            attach_poll_attempts: DEFAULT_ATTACH_POLL_ATTEMPTS,
            attach_poll_interval: DEFAULT_ATTACH_POLL_INTERVAL,
        }
    }

    /// Selects how the login portal is found.
    #[must_use]
    pub const fn target_resolution(mut self, value: TargetResolution) -> Self {
        self.target_resolution = value;
        self
    }

    /// Overrides the by-path directory.
    #[must_use]
    pub fn device_root(mut self, value: impl Into<Utf8PathBuf>) -> Self {
        self.device_root = value.into();
        self
    }

    /// Overrides the post-login polling schedule.
    #[must_use]
    pub const fn attach_polling(mut self, attempts: u32, interval: Duration) -> Self {
        self.attach_poll_attempts = attempts;
        self.attach_poll_interval = interval;
        self
    }
}

/// Local device backing an attached volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceBinding {
    /// Deterministic by-path link.
    pub host_path: Utf8PathBuf,
    /// Block device the link resolves to, such as `/dev/sdb`.
    pub device: Utf8PathBuf,
    /// `true` when an existing session was reused without logging in.
    pub reused: bool,
}

/// Attaches and detaches volumes over iSCSI.
#[derive(Clone, Debug)]
pub struct SessionOrchestrator<T, R, M> {
    settings: SessionSettings,
    accounts: AccountDirectory<T>,
    admin: IscsiAdmin<R>,
    mount: M,
}

impl<T, R, M> SessionOrchestrator<T, R, M>
where
    T: Transport + Sync,
    R: CommandRunner + Sync,
    M: MountExecutor + Sync,
{
    /// Creates an orchestrator.
    #[must_use]
    pub const fn new(
        settings: SessionSettings,
        accounts: AccountDirectory<T>,
        admin: IscsiAdmin<R>,
        mount: M,
    ) -> Self {
        Self {
            settings,
            accounts,
            admin,
            mount,
        }
    }

    /// Returns the orchestrator settings.
    #[must_use]
    pub const fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Returns the mount executor.
    #[must_use]
    pub const fn mount_executor(&self) -> &M {
        &self.mount
    }

    /// Returns the by-path link `volume` appears at when attached through
    /// the storage virtual IP.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SvipUnset`] or [`SessionError::MissingIqn`].
    pub fn host_path(&self, volume: &Volume) -> Result<Utf8PathBuf, SessionError> {
        let target = self.svip_target(volume)?;
        Ok(device::host_path(
            &self.settings.device_root,
            &target.portal,
            &target.iqn,
        ))
    }

    /// Infers the session state of `volume` from the host.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the target or path cannot be derived.
    pub fn probe_state(&self, volume: &Volume) -> Result<SessionState, SessionError> {
        let path = self.host_path(volume)?;
        if device::is_present(&path)? {
            Ok(SessionState::Attached)
        } else {
            Ok(SessionState::Detached)
        }
    }

    /// Attaches `volume` through `iface` and returns its device binding.
    ///
    /// An existing by-path link short-circuits the whole sequence; no login
    /// is attempted.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] describing the first failure. Nothing is
    /// rolled back except the node record after a failed login.
    pub async fn attach(&self, volume: &Volume, iface: &str) -> Result<DeviceBinding, SessionError> {
        let svip_target = self.svip_target(volume)?;
        let svip_path = device::host_path(
            &self.settings.device_root,
            &svip_target.portal,
            &svip_target.iqn,
        );

        if let Some(binding) = Self::reuse(&svip_path)? {
            info!(volume_id = %volume.volume_id, device = %binding.device, "volume already attached");
            return Ok(binding);
        }

        transition(volume, SessionState::Discovering);
        self.admin.probe()?;
        let target = match self.settings.target_resolution {
            TargetResolution::ByPath => svip_target,
            TargetResolution::SendTargets => {
                let listing = self.admin.discover(&svip_target.portal)?;
                let discovered =
                    sendtargets::select_target(&listing, &svip_target.portal, &svip_target.iqn)?;
                debug!(
                    volume_id = %volume.volume_id,
                    portal = %discovered.portal,
                    "discovered target portal"
                );
                discovered
            }
        };
        let host_path = device::host_path(&self.settings.device_root, &target.portal, &target.iqn);
        if host_path != svip_path
            && let Some(binding) = Self::reuse(&host_path)?
        {
            info!(volume_id = %volume.volume_id, device = %binding.device, "volume already attached");
            return Ok(binding);
        }

        let account = self
            .accounts
            .get_by_id(volume.account_id)
            .await
            .map_err(|source| SessionError::Account {
                account_id: volume.account_id,
                source,
            })?;

        transition(volume, SessionState::Authenticating);
        self.admin
            .login_with_chap(&target, iface, &account.username, &account.initiator_secret)?;

        device::wait_for_path(
            &host_path,
            self.settings.attach_poll_attempts,
            self.settings.attach_poll_interval,
        )
        .await?;
        let resolved = device::resolve_device(&host_path)?.ok_or_else(|| {
            SessionError::DeviceResolution {
                path: host_path.clone(),
                message: String::from("device link vanished after login"),
            }
        })?;

        transition(volume, SessionState::Attached);
        info!(volume_id = %volume.volume_id, device = %resolved, "attached volume");
        Ok(DeviceBinding {
            host_path,
            device: resolved,
            reused: false,
        })
    }

    /// Detaches `volume`, unmounting `mount_point` first when given.
    ///
    /// Every stage runs regardless of earlier failures.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::DetachIncomplete`] listing every failed stage,
    /// or a configuration error when no target can be derived.
    pub fn detach(
        &self,
        volume: &Volume,
        mount_point: Option<&Utf8Path>,
    ) -> Result<(), SessionError> {
        let target = self.svip_target(volume)?;
        transition(volume, SessionState::Detaching);
        let mut failures = Vec::new();

        if let Some(path) = mount_point
            && let Err(err) = self.mount.unmount(path)
        {
            failures.push(DetachFailure {
                stage: DetachStage::Unmount,
                message: err.to_string(),
            });
        }

        let portal = match self.settings.target_resolution {
            TargetResolution::ByPath => Some(target.portal.as_str()),
            TargetResolution::SendTargets => None,
        };
        if let Err(message) = self.admin.logout(&target.iqn, portal) {
            failures.push(DetachFailure {
                stage: DetachStage::Logout,
                message,
            });
        }
        if let Err(message) = self.admin.delete_node(&target) {
            failures.push(DetachFailure {
                stage: DetachStage::DeleteNode,
                message,
            });
        }

        transition(volume, SessionState::Detached);
        if failures.is_empty() {
            info!(volume_id = %volume.volume_id, "detached volume");
            return Ok(());
        }
        warn!(volume_id = %volume.volume_id, failed = failures.len(), "detach incomplete");
        Err(SessionError::DetachIncomplete {
            iqn: target.iqn,
            failures,
        })
    }

    fn svip_target(&self, volume: &Volume) -> Result<IscsiTarget, SessionError> {
        let svip = self
            .settings
            .svip
            .as_deref()
            .ok_or(SessionError::SvipUnset)?;
        if volume.iqn.trim().is_empty() {
            return Err(SessionError::MissingIqn {
                volume_id: volume.volume_id,
            });
        }
        Ok(IscsiTarget::new(svip, &volume.iqn))
    }

    /// Returns a binding for an existing link, or `None` when absent or when
    /// it disappears between the check and the resolution.
    fn reuse(path: &Utf8Path) -> Result<Option<DeviceBinding>, SessionError> {
        if !device::is_present(path)? {
            return Ok(None);
        }
        let Some(resolved) = device::resolve_device(path)? else {
            debug!(%path, "device link vanished during probe; logging in");
            return Ok(None);
        };
        Ok(Some(DeviceBinding {
            host_path: path.to_owned(),
            device: resolved,
            reused: true,
        }))
    }
}

fn transition(volume: &Volume, state: SessionState) {
    debug!(volume_id = %volume.volume_id, iqn = %volume.iqn, %state, "session state");
}
