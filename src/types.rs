//! Records exchanged with the storage controller.
//!
//! The controller owns every record here; the crate only holds a copy for the
//! lifetime of a single operation and never caches between calls.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status string the controller reports for live volumes.
pub const ACTIVE_STATUS: &str = "active";

/// Default iSCSI portal port appended when the SVIP does not carry one.
pub const DEFAULT_ISCSI_PORT: u16 = 3260;

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw controller identifier.
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw controller identifier.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(formatter)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                value.trim().parse::<i64>().map(Self)
            }
        }
    };
}

id_newtype!(
    /// Controller-assigned volume identifier.
    VolumeId
);
id_newtype!(
    /// Controller-assigned account (tenant) identifier.
    AccountId
);

/// Quality-of-service bounds attached to a volume.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Qos {
    /// Guaranteed IOPS floor.
    #[serde(rename = "minIOPS", default, skip_serializing_if = "is_zero")]
    pub min_iops: i64,
    /// Sustained IOPS ceiling.
    #[serde(rename = "maxIOPS", default, skip_serializing_if = "is_zero")]
    pub max_iops: i64,
    /// Short-term burst ceiling.
    #[serde(rename = "burstIOPS", default, skip_serializing_if = "is_zero")]
    pub burst_iops: i64,
}

#[expect(
    clippy::trivially_copy_pass_by_ref,
    reason = "serde skip_serializing_if passes fields by reference"
)]
const fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl Qos {
    /// Returns `true` when no bound is set and the controller default applies.
    #[must_use]
    pub const fn is_unset(&self) -> bool {
        self.min_iops == 0 && self.max_iops == 0 && self.burst_iops == 0
    }
}

/// Errors raised when parsing a `min,max,burst` QoS triple.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum QosParseError {
    /// The input did not contain exactly three comma separated values.
    #[error("expected min,max,burst IOPS, got '{0}'")]
    Shape(String),
    /// One of the values was not an integer.
    #[error("invalid IOPS value '{0}'")]
    Value(String),
}

impl FromStr for Qos {
    type Err = QosParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = value.split(',').map(str::trim).collect();
        let [min, max, burst] = fields.as_slice() else {
            return Err(QosParseError::Shape(value.to_owned()));
        };
        let parse = |field: &str| {
            field
                .parse::<i64>()
                .map_err(|_| QosParseError::Value(field.to_owned()))
        };
        Ok(Self {
            min_iops: parse(min)?,
            max_iops: parse(max)?,
            burst_iops: parse(burst)?,
        })
    }
}

/// Volume record as reported by the controller.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    /// Unique, controller-assigned identifier.
    #[serde(rename = "volumeID")]
    pub volume_id: VolumeId,
    /// Human-readable name. Not unique on the controller.
    pub name: String,
    /// Owning account.
    #[serde(rename = "accountID")]
    pub account_id: AccountId,
    /// Lifecycle status, `active` for live volumes.
    #[serde(default)]
    pub status: String,
    /// Provisioned size in bytes.
    #[serde(default)]
    pub total_size: i64,
    /// QoS bounds.
    #[serde(default)]
    pub qos: Qos,
    /// Target IQN, stable once the volume exists.
    #[serde(default)]
    pub iqn: String,
    /// Creation timestamp reported by the controller.
    #[serde(default)]
    pub create_time: String,
    /// Access mode (for example `readWrite`).
    #[serde(default)]
    pub access: String,
}

impl Volume {
    /// Returns `true` when the controller reports the volume as live.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ACTIVE_STATUS
    }
}

/// Tenant account record, including its CHAP secrets.
#[derive(Clone, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Controller-assigned identifier.
    #[serde(rename = "accountID")]
    pub account_id: AccountId,
    /// Account username, also the CHAP username.
    #[serde(default)]
    pub username: String,
    /// Account status.
    #[serde(default)]
    pub status: String,
    /// CHAP secret presented by the initiator.
    #[serde(default)]
    pub initiator_secret: String,
    /// CHAP secret presented by the target.
    #[serde(default)]
    pub target_secret: String,
}

impl fmt::Debug for Account {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Account")
            .field("account_id", &self.account_id)
            .field("username", &self.username)
            .field("status", &self.status)
            .field("initiator_secret", &"<redacted>")
            .field("target_secret", &"<redacted>")
            .finish()
    }
}

/// Ephemeral iSCSI target descriptor, rebuilt for every attach and detach.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IscsiTarget {
    /// Portal host, without IPv6 brackets.
    pub ip: String,
    /// Portal in `host:port` form as used by `iscsiadm`.
    pub portal: String,
    /// Target IQN.
    pub iqn: String,
    /// Raw discovery line when the target was found through SendTargets.
    pub discovery: Option<String>,
}

impl IscsiTarget {
    /// Builds the target for `iqn` behind the storage virtual IP.
    #[must_use]
    pub fn new(svip: &str, iqn: &str) -> Self {
        let (ip, portal) = split_portal(svip.trim());
        Self {
            ip,
            portal,
            iqn: iqn.trim().to_owned(),
            discovery: None,
        }
    }
}

/// Splits `host[:port]` into the host and a portal that always names a port.
///
/// IPv6 hosts are bracketed in the portal. A bare IPv6 address carries no
/// port; use `[addr]:port` to give one.
fn split_portal(svip: &str) -> (String, String) {
    if let Some(rest) = svip.strip_prefix('[')
        && let Some((host, tail)) = rest.split_once(']')
    {
        let portal = match tail.strip_prefix(':') {
            Some(port) if is_port(port) => format!("[{host}]:{port}"),
            _ => format!("[{host}]:{DEFAULT_ISCSI_PORT}"),
        };
        return (host.to_owned(), portal);
    }
    match svip.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && is_port(port) => {
            (host.to_owned(), svip.to_owned())
        }
        Some(_) => (svip.to_owned(), format!("[{svip}]:{DEFAULT_ISCSI_PORT}")),
        None => (svip.to_owned(), format!("{svip}:{DEFAULT_ISCSI_PORT}")),
    }
}

fn is_port(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|byte| byte.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn volume_deserialises_controller_shape() {
        let json = r#"{
            "volumeID": 42,
            "name": "pg-data",
            "accountID": 5,
            "status": "active",
            "totalSize": 1073741824,
            "qos": {"minIOPS": 100, "maxIOPS": 1000, "burstIOPS": 2000, "burstTime": 60},
            "iqn": "iqn.2010-01.com.solidfire:abcd.pg-data.42",
            "volumeAccessGroups": []
        }"#;
        let volume: Volume = serde_json::from_str(json).expect("decode volume");
        assert_eq!(volume.volume_id, VolumeId::new(42));
        assert_eq!(volume.account_id, AccountId::new(5));
        assert!(volume.is_active());
        assert_eq!(volume.qos.burst_iops, 2000);
    }

    #[test]
    fn unset_qos_serialises_empty() {
        let json = serde_json::to_string(&Qos::default()).expect("encode qos");
        assert_eq!(json, "{}");
    }

    #[test]
    fn account_debug_redacts_secrets() {
        let account = Account {
            initiator_secret: String::from("s3cret-initiator"),
            target_secret: String::from("s3cret-target"),
            ..Account::default()
        };
        let rendered = format!("{account:?}");
        assert!(!rendered.contains("s3cret"), "rendered: {rendered}");
    }

    #[rstest]
    #[case("1000,5000,15000", Qos { min_iops: 1000, max_iops: 5000, burst_iops: 15000 })]
    #[case(" 50 , 100 , 150 ", Qos { min_iops: 50, max_iops: 100, burst_iops: 150 })]
    fn qos_parses_triples(#[case] input: &str, #[case] expected: Qos) {
        assert_eq!(input.parse::<Qos>(), Ok(expected));
    }

    #[rstest]
    #[case("1000,5000")]
    #[case("1,2,3,4")]
    fn qos_rejects_wrong_shape(#[case] input: &str) {
        assert!(matches!(input.parse::<Qos>(), Err(QosParseError::Shape(_))));
    }

    #[test]
    fn qos_rejects_non_numeric() {
        assert_eq!(
            "1,fast,3".parse::<Qos>(),
            Err(QosParseError::Value(String::from("fast")))
        );
    }

    #[rstest]
    #[case("10.0.0.5", "10.0.0.5", "10.0.0.5:3260")]
    #[case("10.0.0.5:3261", "10.0.0.5", "10.0.0.5:3261")]
    #[case("fd00::5", "fd00::5", "[fd00::5]:3260")]
    #[case("[fd00::5]", "fd00::5", "[fd00::5]:3260")]
    #[case("[fd00::5]:3261", "fd00::5", "[fd00::5]:3261")]
    fn target_derives_portal(#[case] svip: &str, #[case] ip: &str, #[case] portal: &str) {
        let target = IscsiTarget::new(svip, "iqn.x");
        assert_eq!(target.ip, ip);
        assert_eq!(target.portal, portal);
    }
}
