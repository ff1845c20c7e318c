//! Volume directory behaviour against a scripted controller.

#[expect(dead_code, reason = "this test crate uses a subset of the shared fixtures")]
#[path = "common/controller.rs"]
mod controller;

use rstest::rstest;
use serde_json::json;
use sfvol::test_support::ScriptedTransport;
use sfvol::{
    AccountId, CreateVolumeRequest, Deletion, DirectoryError, Qos, RpcClient, RpcError,
    VolumeDirectory, VolumeId,
};

use controller::{ACCOUNT_ID, volume, volume_with, volumes};

fn directory(transport: &ScriptedTransport) -> VolumeDirectory<ScriptedTransport> {
    VolumeDirectory::new(RpcClient::new(transport.clone()))
}

fn request(name: &str) -> CreateVolumeRequest {
    CreateVolumeRequest::builder()
        .name(name)
        .account_id(AccountId::new(ACCOUNT_ID))
        .size_gib(1)
        .build()
        .expect("valid request")
}

#[rstest]
#[case::none(vec![volume(1, "other")], 0)]
#[case::one(vec![volume(1, "pgdata"), volume(2, "other")], 1)]
#[case::deleted_twin_ignored(
    vec![volume(1, "pgdata"), volume_with(2, "pgdata", ACCOUNT_ID, "deleted")],
    1
)]
#[case::many(vec![volume(1, "pgdata"), volume(2, "pgdata")], 2)]
#[tokio::test]
async fn find_by_name_distinguishes_missing_unique_and_ambiguous(
    #[case] records: Vec<serde_json::Value>,
    #[case] matching: usize,
) {
    let transport = ScriptedTransport::new();
    transport.push_result("ListVolumesForAccount", volumes(records));

    let result = directory(&transport)
        .find_by_name("pgdata", AccountId::new(ACCOUNT_ID))
        .await;

    match (matching, result) {
        (0, Err(err)) => assert!(err.is_not_found(), "unexpected error: {err}"),
        (1, Ok(found)) => {
            assert_eq!(found.name, "pgdata");
            assert_eq!(found.volume_id, VolumeId::new(1));
        }
        (count, Err(DirectoryError::Ambiguous { count: reported, .. })) => {
            assert_eq!(reported, count);
        }
        (count, other) => panic!("unexpected outcome for {count} matches: {other:?}"),
    }
}

#[tokio::test]
async fn find_by_name_queries_the_owning_account() {
    let transport = ScriptedTransport::new();
    transport.push_result("ListVolumesForAccount", volumes(vec![volume(1, "pgdata")]));

    directory(&transport)
        .find_by_name("pgdata", AccountId::new(ACCOUNT_ID))
        .await
        .expect("volume found");

    let calls = transport.calls();
    let params = &calls.first().expect("one call").params;
    assert_eq!(params, &json!({"accountID": ACCOUNT_ID}));
}

#[tokio::test]
async fn create_is_idempotent_by_name() {
    let transport = ScriptedTransport::new();
    transport.push_result("ListVolumesForAccount", volumes(vec![]));
    transport.push_result("CreateVolume", json!({"volumeID": 42}));
    transport.push_result("ListActiveVolumes", volumes(vec![volume(42, "pgdata")]));
    transport.push_result("ListVolumesForAccount", volumes(vec![volume(42, "pgdata")]));
    let volumes_dir = directory(&transport);

    let first = volumes_dir
        .create_volume(&request("pgdata"))
        .await
        .expect("first create succeeds");
    let second = volumes_dir
        .create_volume(&request("pgdata"))
        .await
        .expect("second create returns existing volume");

    assert_eq!(first, second);
    assert_eq!(transport.count("CreateVolume"), 1);
    assert_eq!(transport.pending(), 0);
}

#[tokio::test]
async fn create_sends_size_in_bytes_and_qos() {
    let transport = ScriptedTransport::new();
    transport.push_result("ListVolumesForAccount", volumes(vec![]));
    transport.push_result("CreateVolume", json!({"volumeID": 7}));
    transport.push_result("ListActiveVolumes", volumes(vec![volume(7, "gold")]));
    let create = CreateVolumeRequest::builder()
        .name("gold")
        .account_id(AccountId::new(ACCOUNT_ID))
        .size_gib(2)
        .qos(Qos {
            min_iops: 1000,
            max_iops: 5000,
            burst_iops: 15000,
        })
        .build()
        .expect("valid request");

    directory(&transport)
        .create_volume(&create)
        .await
        .expect("create succeeds");

    let calls = transport.calls();
    let params = &calls
        .iter()
        .find(|call| call.method == "CreateVolume")
        .expect("create issued")
        .params;
    assert_eq!(params["name"], "gold");
    assert_eq!(params["accountID"], ACCOUNT_ID);
    assert_eq!(params["totalSize"], 2_147_483_648_i64);
    assert_eq!(params["qos"]["minIOPS"], 1000);
    assert_eq!(params["qos"]["burstIOPS"], 15000);
}

#[tokio::test]
async fn create_refuses_to_add_a_third_duplicate() {
    let transport = ScriptedTransport::new();
    transport.push_result(
        "ListVolumesForAccount",
        volumes(vec![volume(1, "pgdata"), volume(2, "pgdata")]),
    );

    let err = directory(&transport)
        .create_volume(&request("pgdata"))
        .await
        .expect_err("duplicates block creation");

    assert!(matches!(err, DirectoryError::Ambiguous { count: 2, .. }));
    assert_eq!(transport.count("CreateVolume"), 0);
}

#[rstest]
#[case("xVolumeIDDoesNotExist")]
#[case("xVolumeDoesNotExist")]
#[tokio::test]
async fn delete_of_absent_volume_succeeds(#[case] name: &str) {
    let transport = ScriptedTransport::new();
    transport.push_api_error("DeleteVolume", 500, name, "Volume 9 does not exist.");

    let outcome = directory(&transport)
        .delete_volume(VolumeId::new(9))
        .await
        .expect("absent volume is not an error");

    assert_eq!(outcome, Deletion::AlreadyAbsent);
}

#[tokio::test]
async fn delete_reports_deleted() {
    let transport = ScriptedTransport::new();
    transport.push_result("DeleteVolume", json!({}));

    let outcome = directory(&transport)
        .delete_volume(VolumeId::new(9))
        .await
        .expect("delete succeeds");

    assert_eq!(outcome, Deletion::Deleted);
    let calls = transport.calls();
    assert_eq!(
        calls.first().map(|call| &call.params),
        Some(&json!({"volumeID": 9}))
    );
}

#[tokio::test]
async fn transport_failures_surface_as_rpc_errors() {
    let transport = ScriptedTransport::new();
    transport.push_transport_error("ListVolumesForAccount", "connection refused");

    let err = directory(&transport)
        .list_for_account(AccountId::new(ACCOUNT_ID))
        .await
        .expect_err("transport fails");

    assert!(matches!(
        err,
        DirectoryError::Rpc(RpcError::Transport { .. })
    ));
}
