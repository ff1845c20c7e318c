//! Canned controller records shared by integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared fixtures under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/controller.rs"]
//! mod controller;
//! ```
//!
//! Crates that leave some of these fixtures unused mark the `mod` item with
//! `#[expect(dead_code, ...)]`.

use serde_json::{Value, json};

/// Tenant account name used across tests.
pub const TENANT: &str = "docker";

/// Identifier of the tenant account.
pub const ACCOUNT_ID: i64 = 5;

/// Storage virtual IP without a port.
pub const SVIP: &str = "10.10.5.100";

/// Portal derived from [`SVIP`].
pub const PORTAL: &str = "10.10.5.100:3260";

/// CHAP initiator secret of the tenant account.
pub const INITIATOR_SECRET: &str = "initsecret123";

/// Returns the IQN the controller assigns to volume `name` with `id`.
pub fn iqn(name: &str, id: i64) -> String {
    format!("iqn.2010-01.com.solidfire:x.{name}.{id}")
}

/// Active volume record owned by the tenant account.
pub fn volume(id: i64, name: &str) -> Value {
    volume_with(id, name, ACCOUNT_ID, "active")
}

/// Volume record with an explicit owner and status.
pub fn volume_with(id: i64, name: &str, account_id: i64, status: &str) -> Value {
    json!({
        "volumeID": id,
        "name": name,
        "accountID": account_id,
        "status": status,
        "totalSize": 1_073_741_824_i64,
        "iqn": iqn(name, id),
        "access": "readWrite",
        "createTime": "2016-03-01T20:45:54Z",
        "qos": {"minIOPS": 100, "maxIOPS": 15000, "burstIOPS": 15000}
    })
}

/// Result body for the volume listing calls.
pub fn volumes(records: Vec<Value>) -> Value {
    json!({ "volumes": records })
}

/// Tenant account record.
pub fn account_record() -> Value {
    json!({
        "accountID": ACCOUNT_ID,
        "username": TENANT,
        "status": "active",
        "initiatorSecret": INITIATOR_SECRET,
        "targetSecret": "targetsecret1"
    })
}

/// Result body for `GetAccountByName` and `GetAccountByID`.
pub fn account() -> Value {
    json!({ "account": account_record() })
}
