//! BDD step definitions for the session lifecycle.

use rstest_bdd_macros::{given, then, when};
use sfvol::SessionError;
use tokio::runtime::Runtime;

use super::test_helpers::{
    SessionContext, SessionOutcome, SessionTestError, VOLUME_ID, scenario_volume,
};
use crate::controller;

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Setup(#[from] SessionTestError),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a host with iscsiadm installed")]
fn iscsiadm_installed(session_context: &SessionContext) {
    session_context.host.runner.push_success();
}

#[given("a host without iscsiadm")]
fn iscsiadm_missing(session_context: &SessionContext) {
    session_context.host.runner.push_spawn_failure();
}

#[given("the controller knows the tenant account")]
fn tenant_account_known(session_context: &SessionContext) {
    session_context
        .host
        .transport
        .push_result("GetAccountByID", controller::account());
}

#[given("logins publish device \"{target}\"")]
fn logins_publish_device(session_context: &SessionContext, target: String) {
    let host = &session_context.host;
    host.runner.push_successes(5);
    host.runner.link_on_login(
        host.link_for("pgdata", VOLUME_ID).into_std_path_buf(),
        target,
    );
}

#[given("logins never publish a device")]
fn logins_publish_nothing(session_context: &SessionContext) {
    session_context.host.runner.push_successes(5);
}

#[given("volume \"{name}\" is already attached as \"{target}\"")]
fn volume_already_attached(
    session_context: &SessionContext,
    name: String,
    target: String,
) -> Result<(), StepError> {
    session_context
        .host
        .plug(&name, VOLUME_ID, &target)
        .map(drop)
        .map_err(|err| StepError::Setup(SessionTestError::Fixture(err)))
}

#[given("logout and node removal fail")]
fn logout_and_removal_fail(session_context: &SessionContext) {
    session_context.host.runner.push_failure(8);
    session_context.host.runner.push_failure(6);
}

#[when("I attach volume \"{name}\"")]
fn attach_volume(session_context: &SessionContext, name: String) -> Result<(), StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let volume = scenario_volume(&name)?;
    let sessions = session_context.orchestrator();
    let outcome = match runtime.block_on(async { sessions.attach(&volume, "default").await }) {
        Ok(binding) => SessionOutcome::Attached {
            device: binding.device.into_string(),
        },
        Err(err) => SessionOutcome::Failed(err),
    };
    session_context.record(outcome);
    Ok(())
}

#[when("I detach volume \"{name}\"")]
fn detach_volume(session_context: &SessionContext, name: String) -> Result<(), StepError> {
    let volume = scenario_volume(&name)?;
    let outcome = match session_context.orchestrator().detach(&volume, None) {
        Ok(()) => SessionOutcome::Detached,
        Err(err) => SessionOutcome::Failed(err),
    };
    session_context.record(outcome);
    Ok(())
}

#[then("the volume is attached at device \"{device}\"")]
fn attached_at(session_context: &SessionContext, device: String) -> Result<(), StepError> {
    match session_context.outcome() {
        Some(SessionOutcome::Attached { device: actual }) if actual == device => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected attachment at {device}, got {other:?}"
        ))),
    }
}

#[then("\"{count}\" login was attempted")]
fn logins_attempted(session_context: &SessionContext, count: usize) -> Result<(), StepError> {
    let actual = session_context.host.runner.count_with_arg("--login");
    if actual == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} logins, saw {actual}"
        )))
    }
}

#[then("the attach fails with \"{kind}\"")]
fn attach_fails_with(session_context: &SessionContext, kind: String) -> Result<(), StepError> {
    let Some(SessionOutcome::Failed(err)) = session_context.outcome() else {
        return Err(StepError::Assertion(String::from(
            "expected failure outcome",
        )));
    };
    let matched = match kind.as_str() {
        "tooling" => matches!(err, SessionError::ToolingUnavailable { .. }),
        "timeout" => matches!(err, SessionError::AttachTimeout { .. }),
        other => {
            return Err(StepError::Assertion(format!(
                "unknown failure kind {other}"
            )));
        }
    };
    if matched {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {kind} failure, got {err}"
        )))
    }
}

#[then("the detach reports \"{count}\" failed stages")]
fn detach_reports(session_context: &SessionContext, count: usize) -> Result<(), StepError> {
    match session_context.outcome() {
        Some(SessionOutcome::Failed(SessionError::DetachIncomplete { failures, .. }))
            if failures.len() == count =>
        {
            Ok(())
        }
        other => Err(StepError::Assertion(format!(
            "expected {count} failed detach stages, got {other:?}"
        ))),
    }
}
