//! BDD scenarios for the session lifecycle.

use rstest_bdd_macros::scenario;

use super::test_helpers::{SessionContext, session_context};

#[scenario(
    path = "tests/features/session.feature",
    name = "Attach an unattached volume with CHAP"
)]
fn scenario_attach_with_chap(session_context: SessionContext) {
    drop(session_context);
}

#[scenario(
    path = "tests/features/session.feature",
    name = "Reuse an existing session"
)]
fn scenario_reuse_session(session_context: SessionContext) {
    drop(session_context);
}

#[scenario(
    path = "tests/features/session.feature",
    name = "Surface missing initiator tooling"
)]
fn scenario_missing_tooling(session_context: SessionContext) {
    drop(session_context);
}

#[scenario(
    path = "tests/features/session.feature",
    name = "Time out waiting for the device"
)]
fn scenario_attach_timeout(session_context: SessionContext) {
    drop(session_context);
}

#[scenario(
    path = "tests/features/session.feature",
    name = "Report every failed detach stage"
)]
fn scenario_detach_failures(session_context: SessionContext) {
    drop(session_context);
}
