//! Remote volume directory.
//!
//! The controller does not enforce name uniqueness, so lookups by name filter
//! the account's listing client-side and treat duplicates as an integrity
//! error. Nothing is cached between calls.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::rpc::{RpcClient, Transport};
use crate::types::{AccountId, Volume, VolumeId};

use super::{CreateVolumeRequest, DirectoryError};

/// Controller error names meaning "no such volume".
const VOLUME_ABSENT: &[&str] = &["xVolumeIDDoesNotExist", "xVolumeDoesNotExist"];

/// Page size used by [`VolumeDirectory::list_all_active`] when the caller
/// passes zero.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

#[derive(Serialize)]
struct AccountParams {
    #[serde(rename = "accountID")]
    account_id: AccountId,
}

#[derive(Serialize)]
struct ListActiveParams {
    #[serde(rename = "startVolumeID")]
    start_volume_id: VolumeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
}

#[derive(Serialize)]
struct VolumeParams {
    #[serde(rename = "volumeID")]
    volume_id: VolumeId,
}

#[derive(Deserialize)]
struct VolumesResult {
    #[serde(default)]
    volumes: Vec<Volume>,
}

#[derive(Deserialize)]
struct CreateVolumeResult {
    #[serde(rename = "volumeID")]
    volume_id: VolumeId,
}

/// Outcome of [`VolumeDirectory::delete_volume`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Deletion {
    /// The controller deleted the volume.
    Deleted,
    /// The controller reported the volume as already gone.
    AlreadyAbsent,
}

/// Creates, finds, lists and deletes volumes on the controller.
#[derive(Clone, Debug)]
pub struct VolumeDirectory<T> {
    rpc: RpcClient<T>,
}

impl<T: Transport> VolumeDirectory<T> {
    /// Creates a directory issuing calls through `rpc`.
    #[must_use]
    pub const fn new(rpc: RpcClient<T>) -> Self {
        Self { rpc }
    }

    /// Lists every volume owned by `account_id`, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Rpc`] when the call fails.
    pub async fn list_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Volume>, DirectoryError> {
        let result: VolumesResult = self
            .rpc
            .call("ListVolumesForAccount", &AccountParams { account_id })
            .await?;
        Ok(result.volumes)
    }

    /// Lists one page of active volumes starting at `start`.
    ///
    /// A page shorter than `limit` is the last one; callers wanting every
    /// volume use [`VolumeDirectory::list_all_active`].
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Rpc`] when the call fails.
    pub async fn list_active(
        &self,
        start: VolumeId,
        limit: Option<u32>,
    ) -> Result<Vec<Volume>, DirectoryError> {
        let params = ListActiveParams {
            start_volume_id: start,
            limit,
        };
        let result: VolumesResult = self.rpc.call("ListActiveVolumes", &params).await?;
        Ok(result.volumes)
    }

    /// Lists every active volume by paging through
    /// [`VolumeDirectory::list_active`] until a short page comes back.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Rpc`] when any page fails.
    pub async fn list_all_active(&self, page_size: u32) -> Result<Vec<Volume>, DirectoryError> {
        let limit = if page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size
        };
        let mut volumes = Vec::new();
        let mut start = VolumeId::new(0);
        loop {
            let page = self.list_active(start, Some(limit)).await?;
            let short = page.len() < usize::try_from(limit).unwrap_or(usize::MAX);
            let Some(last) = page.iter().map(|volume| volume.volume_id).max() else {
                break;
            };
            volumes.extend(page);
            if short {
                break;
            }
            start = VolumeId::new(last.get().saturating_add(1));
        }
        debug!(count = volumes.len(), "listed active volumes");
        Ok(volumes)
    }

    /// Fetches one active volume by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::VolumeMissing`] when the controller has no
    /// active volume with that identifier.
    pub async fn get_by_id(&self, volume_id: VolumeId) -> Result<Volume, DirectoryError> {
        let page = self.list_active(volume_id, Some(1)).await?;
        page.into_iter()
            .find(|volume| volume.volume_id == volume_id)
            .ok_or(DirectoryError::VolumeMissing { volume_id })
    }

    /// Finds the single active volume called `name` owned by `account_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::VolumeNotFound`] when nothing matches and
    /// [`DirectoryError::Ambiguous`] when more than one volume matches.
    pub async fn find_by_name(
        &self,
        name: &str,
        account_id: AccountId,
    ) -> Result<Volume, DirectoryError> {
        let mut matches: Vec<Volume> = self
            .list_for_account(account_id)
            .await?
            .into_iter()
            .filter(|volume| volume.name == name && volume.is_active())
            .collect();

        match matches.len() {
            0 => Err(DirectoryError::VolumeNotFound {
                name: name.to_owned(),
                account_id,
            }),
            1 => matches.pop().ok_or_else(|| DirectoryError::VolumeNotFound {
                name: name.to_owned(),
                account_id,
            }),
            count => {
                warn!(name, %account_id, count, "duplicate active volume names");
                Err(DirectoryError::Ambiguous {
                    name: name.to_owned(),
                    account_id,
                    count,
                })
            }
        }
    }

    /// Returns the volume named in `request`, creating it when absent.
    ///
    /// An existing volume is returned unchanged even if its size or QoS
    /// differ from the request.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Validation`] for an invalid request,
    /// [`DirectoryError::Ambiguous`] when duplicates already exist, or any
    /// failure of the create or follow-up lookup.
    pub async fn create_volume(
        &self,
        request: &CreateVolumeRequest,
    ) -> Result<Volume, DirectoryError> {
        request.validate()?;
        match self.find_by_name(&request.name, request.account_id).await {
            Ok(existing) => {
                debug!(name = %request.name, volume_id = %existing.volume_id, "volume already exists");
                return Ok(existing);
            }
            Err(DirectoryError::VolumeNotFound { .. }) => {}
            Err(err) => return Err(err),
        }

        let created: CreateVolumeResult = self.rpc.call("CreateVolume", request).await?;
        info!(name = %request.name, volume_id = %created.volume_id, "created volume");
        self.get_by_id(created.volume_id).await
    }

    /// Deletes a volume, treating "already absent" as success.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Rpc`] for any failure other than the
    /// controller reporting the volume as absent.
    pub async fn delete_volume(&self, volume_id: VolumeId) -> Result<Deletion, DirectoryError> {
        let result: Result<serde_json::Value, _> = self
            .rpc
            .call("DeleteVolume", &VolumeParams { volume_id })
            .await;
        match result {
            Ok(_) => {
                info!(%volume_id, "deleted volume");
                Ok(Deletion::Deleted)
            }
            Err(err) if err.is_api_error_named(VOLUME_ABSENT) => {
                debug!(%volume_id, "volume already absent");
                Ok(Deletion::AlreadyAbsent)
            }
            Err(err) => Err(err.into()),
        }
    }
}
