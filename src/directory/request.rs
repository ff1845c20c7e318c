//! Volume creation requests and the named volume-type catalogue.

use serde::{Deserialize, Serialize};

use crate::types::{AccountId, Qos};

use super::DirectoryError;

/// Byte count for a single gibibyte.
pub const BYTES_PER_GIB: u64 = 1024 * 1024 * 1024;

/// Parameters of the controller `CreateVolume` call.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CreateVolumeRequest {
    /// Volume name, unique per account by convention of this crate.
    pub name: String,
    /// Owning account.
    #[serde(rename = "accountID")]
    pub account_id: AccountId,
    /// Size in bytes.
    #[serde(rename = "totalSize")]
    pub total_size: i64,
    /// Expose 512-byte sector emulation.
    #[serde(rename = "enable512e")]
    pub enable_512e: bool,
    /// QoS bounds; omitted when unset so the controller default applies.
    #[serde(skip_serializing_if = "Qos::is_unset")]
    pub qos: Qos,
}

impl CreateVolumeRequest {
    /// Starts a builder for a [`CreateVolumeRequest`].
    #[must_use]
    pub fn builder() -> CreateVolumeRequestBuilder {
        CreateVolumeRequestBuilder::default()
    }

    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Validation`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), DirectoryError> {
        if self.name.is_empty() {
            return Err(DirectoryError::Validation(String::from("name")));
        }
        if self.total_size <= 0 {
            return Err(DirectoryError::Validation(String::from("total_size")));
        }
        Ok(())
    }
}

/// Builder for [`CreateVolumeRequest`] that trims and validates on build.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CreateVolumeRequestBuilder {
    name: String,
    account_id: AccountId,
    total_size: Option<u64>,
    size_gib: Option<u64>,
    enable_512e: bool,
    qos: Qos,
}

impl CreateVolumeRequestBuilder {
    /// Sets the volume name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets the owning account.
    #[must_use]
    pub const fn account_id(mut self, value: AccountId) -> Self {
        self.account_id = value;
        self
    }

    /// Sets the size in bytes. Takes precedence over [`Self::size_gib`].
    #[must_use]
    pub const fn total_size(mut self, bytes: u64) -> Self {
        self.total_size = Some(bytes);
        self
    }

    /// Sets the size in GiB.
    #[must_use]
    pub const fn size_gib(mut self, gib: u64) -> Self {
        self.size_gib = Some(gib);
        self
    }

    /// Enables 512-byte sector emulation.
    #[must_use]
    pub const fn enable_512e(mut self, value: bool) -> Self {
        self.enable_512e = value;
        self
    }

    /// Sets QoS bounds.
    #[must_use]
    pub const fn qos(mut self, value: Qos) -> Self {
        self.qos = value;
        self
    }

    /// Builds and validates the request.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Validation`] when the name is blank, the
    /// size is missing or zero, or the size overflows the wire type.
    pub fn build(self) -> Result<CreateVolumeRequest, DirectoryError> {
        let size_error = || DirectoryError::Validation(String::from("total_size"));
        let bytes = match (self.total_size, self.size_gib) {
            (Some(bytes), _) => bytes,
            (None, Some(gib)) => gib.checked_mul(BYTES_PER_GIB).ok_or_else(size_error)?,
            (None, None) => return Err(size_error()),
        };
        let request = CreateVolumeRequest {
            name: self.name.trim().to_owned(),
            account_id: self.account_id,
            total_size: i64::try_from(bytes).map_err(|_| size_error())?,
            enable_512e: self.enable_512e,
            qos: self.qos,
        };
        request.validate()?;
        Ok(request)
    }
}

/// Named QoS preset (for example `Gold`).
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct VolumeType {
    /// Preset name, matched case-insensitively.
    #[serde(rename = "type", alias = "Type")]
    pub name: String,
    /// QoS bounds applied to volumes of this type.
    #[serde(alias = "QOS")]
    pub qos: Qos,
}

/// Catalogue of [`VolumeType`] presets.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VolumeTypes(Vec<VolumeType>);

impl VolumeTypes {
    /// Wraps a list of presets.
    #[must_use]
    pub const fn new(types: Vec<VolumeType>) -> Self {
        Self(types)
    }

    /// Parses a JSON array of `{"type": .., "qos": {..}}` presets.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Validation`] when the document is malformed.
    pub fn from_json(document: &str) -> Result<Self, DirectoryError> {
        serde_json::from_str(document)
            .map(Self)
            .map_err(|err| DirectoryError::Validation(format!("volume types: {err}")))
    }

    /// Returns the QoS of the preset named `name`, ignoring case.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Qos> {
        let wanted = name.trim();
        self.0
            .iter()
            .find(|preset| preset.name.eq_ignore_ascii_case(wanted))
            .map(|preset| preset.qos)
    }

    /// Returns `true` when no presets are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
