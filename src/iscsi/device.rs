//! Deterministic by-path names and block-device resolution.
//!
//! udev publishes every logged-in LUN as a symlink such as
//! `/dev/disk/by-path/ip-10.10.5.100:3260-iscsi-<iqn>-lun-0 -> ../../sdb`.
//! The link's presence is the only record of an attachment.

use std::io::ErrorKind;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use super::SessionError;

/// Directory udev populates with by-path links.
pub const DEFAULT_DEVICE_ROOT: &str = "/dev/disk/by-path";

/// LUN every volume is exposed at.
pub const VOLUME_LUN: u32 = 0;

/// Returns the by-path link name for `iqn` behind `portal`.
#[must_use]
pub fn by_path_name(portal: &str, iqn: &str) -> String {
    format!("ip-{portal}-iscsi-{iqn}-lun-{VOLUME_LUN}")
}

/// Returns the full by-path link for `iqn` behind `portal` under `root`.
#[must_use]
pub fn host_path(root: &Utf8Path, portal: &str, iqn: &str) -> Utf8PathBuf {
    root.join(by_path_name(portal, iqn))
}

/// Maps a by-path link target to its `/dev` node.
///
/// Relative targets must be of the form `../../<name>`; absolute targets are
/// accepted only under `/dev`.
#[must_use]
pub fn device_from_link_target(target: &str) -> Option<Utf8PathBuf> {
    let trimmed = target.trim();
    if trimmed.starts_with("/dev/") {
        return Some(Utf8PathBuf::from(trimmed));
    }
    trimmed
        .strip_prefix("../../")
        .filter(|name| !name.is_empty() && !name.contains(".."))
        .map(|name| Utf8Path::new("/dev").join(name))
}

/// Returns `true` when `path` exists as a link or file, without following
/// it.
///
/// # Errors
///
/// Returns [`SessionError::DeviceResolution`] when the path cannot be
/// inspected for reasons other than absence.
pub fn is_present(path: &Utf8Path) -> Result<bool, SessionError> {
    match std::fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(SessionError::DeviceResolution {
            path: path.to_owned(),
            message: err.to_string(),
        }),
    }
}

/// Resolves the block device behind the by-path link at `path`.
///
/// Returns `Ok(None)` when the link disappeared since it was last seen, which
/// happens when a concurrent detach wins the race.
///
/// # Errors
///
/// Returns [`SessionError::DeviceResolution`] when the path is not a link or
/// its target has an unexpected shape.
pub fn resolve_device(path: &Utf8Path) -> Result<Option<Utf8PathBuf>, SessionError> {
    let failure = |message: String| SessionError::DeviceResolution {
        path: path.to_owned(),
        message,
    };
    let target = match std::fs::read_link(path) {
        Ok(target) => target,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(failure(err.to_string())),
    };
    let text = target
        .to_str()
        .ok_or_else(|| failure(String::from("link target is not UTF-8")))?;
    let device = device_from_link_target(text)
        .ok_or_else(|| failure(format!("unexpected link target '{text}'")))?;
    debug!(%path, %device, "resolved device");
    Ok(Some(device))
}

/// Checks for `path` up to `attempts` times, sleeping `interval` after each
/// miss.
///
/// # Errors
///
/// Returns [`SessionError::AttachTimeout`] when the path never appears, or
/// [`SessionError::DeviceResolution`] when it cannot be inspected.
pub async fn wait_for_path(
    path: &Utf8Path,
    attempts: u32,
    interval: Duration,
) -> Result<(), SessionError> {
    for attempt in 1..=attempts {
        if is_present(path)? {
            debug!(%path, attempt, "device path present");
            return Ok(());
        }
        debug!(%path, attempt, attempts, "device path not present yet");
        tokio::time::sleep(interval).await;
    }
    Err(SessionError::AttachTimeout {
        path: path.to_owned(),
        attempts,
    })
}
