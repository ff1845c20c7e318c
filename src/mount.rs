//! Filesystem probing, formatting and mounting of attached block devices.
//!
//! The session orchestrator and the volume driver only talk to the
//! [`MountExecutor`] trait; [`ProcessMountExecutor`] shells out to `blkid`,
//! `mkfs.*`, `mount` and `umount` through a [`CommandRunner`].

use std::ffi::OsString;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::command::{CommandError, CommandRunner, ProcessCommandRunner};

/// Filesystem created on volumes that carry none.
pub const DEFAULT_FILESYSTEM: &str = "ext4";

/// Exit status `blkid` uses when the device carries no recognised signature.
const BLKID_NO_SIGNATURE: i32 = 2;

/// Errors raised by a [`MountExecutor`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum MountError {
    /// Raised when the mount point directory cannot be created.
    #[error("failed to create mount point {path}: {message}")]
    MountPoint {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Operating system error text.
        message: String,
    },
    /// Raised when a mount-related command exits unsuccessfully.
    #[error("{operation} failed for {target}: {message}")]
    Command {
        /// Operation that failed (`probe`, `format`, `mount` or `unmount`).
        operation: &'static str,
        /// Device or mount point the operation targeted.
        target: Utf8PathBuf,
        /// Exit status and stderr of the command.
        message: String,
    },
    /// Raised when a command cannot be started.
    #[error(transparent)]
    Spawn(#[from] CommandError),
}

/// Mounts and unmounts attached devices.
pub trait MountExecutor {
    /// Returns the filesystem type on `device`, or `None` when it is blank.
    ///
    /// # Errors
    ///
    /// Returns [`MountError`] when the device cannot be probed.
    fn filesystem_type(&self, device: &Utf8Path) -> Result<Option<String>, MountError>;

    /// Creates a `fs_type` filesystem on `device`, destroying its contents.
    ///
    /// # Errors
    ///
    /// Returns [`MountError`] when formatting fails.
    fn format(&self, device: &Utf8Path, fs_type: &str) -> Result<(), MountError>;

    /// Mounts `device` at `mount_point`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`MountError`] when the directory or the mount cannot be made.
    fn mount(&self, device: &Utf8Path, mount_point: &Utf8Path) -> Result<(), MountError>;

    /// Unmounts `mount_point`. Succeeds when nothing is mounted there.
    ///
    /// # Errors
    ///
    /// Returns [`MountError`] when the unmount fails.
    fn unmount(&self, mount_point: &Utf8Path) -> Result<(), MountError>;

    /// Formats `device` with `fs_type` unless it already carries a
    /// filesystem. Returns `true` when a format was performed.
    ///
    /// # Errors
    ///
    /// Returns [`MountError`] when probing or formatting fails.
    fn ensure_filesystem(&self, device: &Utf8Path, fs_type: &str) -> Result<bool, MountError> {
        if let Some(existing) = self.filesystem_type(device)? {
            debug!(%device, filesystem = %existing, "device already formatted");
            return Ok(false);
        }
        info!(%device, filesystem = fs_type, "formatting blank device");
        self.format(device, fs_type)?;
        Ok(true)
    }
}

impl<M: MountExecutor + ?Sized> MountExecutor for std::sync::Arc<M> {
    fn filesystem_type(&self, device: &Utf8Path) -> Result<Option<String>, MountError> {
        (**self).filesystem_type(device)
    }

    fn format(&self, device: &Utf8Path, fs_type: &str) -> Result<(), MountError> {
        (**self).format(device, fs_type)
    }

    fn mount(&self, device: &Utf8Path, mount_point: &Utf8Path) -> Result<(), MountError> {
        (**self).mount(device, mount_point)
    }

    fn unmount(&self, mount_point: &Utf8Path) -> Result<(), MountError> {
        (**self).unmount(mount_point)
    }
}

/// [`MountExecutor`] that runs the host's mount tooling.
#[derive(Clone, Debug, Default)]
pub struct ProcessMountExecutor<R = ProcessCommandRunner> {
    runner: R,
}

impl<R: CommandRunner> ProcessMountExecutor<R> {
    /// Creates an executor issuing commands through `runner`.
    #[must_use]
    pub const fn new(runner: R) -> Self {
        Self { runner }
    }

    fn run(
        &self,
        operation: &'static str,
        target: &Utf8Path,
        program: &str,
        args: &[&str],
    ) -> Result<crate::command::CommandOutput, MountError> {
        let argv: Vec<OsString> = args.iter().map(OsString::from).collect();
        debug!(operation, %target, program, "running mount tooling");
        let output = self.runner.run(program, &argv)?;
        if output.is_success() {
            return Ok(output);
        }
        Err(MountError::Command {
            operation,
            target: target.to_owned(),
            message: output.failure_message(),
        })
    }
}

impl<R: CommandRunner> MountExecutor for ProcessMountExecutor<R> {
    fn filesystem_type(&self, device: &Utf8Path) -> Result<Option<String>, MountError> {
        let argv = [OsString::from(device.as_str())];
        let output = self.runner.run("blkid", &argv)?;
        if output.code == Some(BLKID_NO_SIGNATURE) {
            return Ok(None);
        }
        if !output.is_success() {
            return Err(MountError::Command {
                operation: "probe",
                target: device.to_owned(),
                message: output.failure_message(),
            });
        }
        Ok(parse_blkid_type(&output.stdout))
    }

    fn format(&self, device: &Utf8Path, fs_type: &str) -> Result<(), MountError> {
        let program = format!("mkfs.{fs_type}");
        let force = if fs_type == "xfs" { "-f" } else { "-F" };
        self.run("format", device, &program, &[force, device.as_str()])?;
        Ok(())
    }

    fn mount(&self, device: &Utf8Path, mount_point: &Utf8Path) -> Result<(), MountError> {
        std::fs::create_dir_all(mount_point).map_err(|err| MountError::MountPoint {
            path: mount_point.to_owned(),
            message: err.to_string(),
        })?;
        self.run(
            "mount",
            mount_point,
            "mount",
            &[device.as_str(), mount_point.as_str()],
        )?;
        info!(%device, %mount_point, "mounted volume");
        Ok(())
    }

    fn unmount(&self, mount_point: &Utf8Path) -> Result<(), MountError> {
        match self.run("unmount", mount_point, "umount", &[mount_point.as_str()]) {
            Ok(_) => {
                info!(%mount_point, "unmounted volume");
                Ok(())
            }
            Err(MountError::Command { message, .. }) if is_not_mounted(&message) => {
                debug!(%mount_point, "nothing mounted");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

fn is_not_mounted(message: &str) -> bool {
    message.contains("not mounted")
        || message.contains("no mount point specified")
        || message.contains("No such file or directory")
}

/// Extracts the `TYPE="..."` value from `blkid` output.
fn parse_blkid_type(stdout: &str) -> Option<String> {
    stdout
        .split_whitespace()
        .find_map(|token| token.strip_prefix("TYPE="))
        .map(|value| value.trim_matches('"').to_owned())
        .filter(|value| !value.is_empty())
}
