//! Shared fixtures for session BDD scenarios.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rstest::fixture;
use sfvol::{SessionError, TargetResolution, Volume};
use thiserror::Error;

use crate::controller;
use crate::host::{Host, ScriptedOrchestrator};

/// Identifier every scenario volume is given.
pub const VOLUME_ID: i64 = 7;

#[derive(Clone, Debug)]
pub enum SessionOutcome {
    Attached { device: String },
    Detached,
    Failed(SessionError),
}

#[derive(Clone, Debug)]
pub struct SessionContext {
    pub host: Host,
    outcome: Arc<Mutex<Option<SessionOutcome>>>,
}

impl SessionContext {
    pub fn orchestrator(&self) -> ScriptedOrchestrator {
        self.host.orchestrator(TargetResolution::ByPath)
    }

    pub fn record(&self, outcome: SessionOutcome) {
        *self.lock_outcome() = Some(outcome);
    }

    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.lock_outcome().clone()
    }

    fn lock_outcome(&self) -> MutexGuard<'_, Option<SessionOutcome>> {
        self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone, Debug, Error)]
pub enum SessionTestError {
    #[error("invalid session fixture: {0}")]
    Fixture(String),
}

/// Builds the active scenario volume called `name`.
pub fn scenario_volume(name: &str) -> Result<Volume, SessionTestError> {
    serde_json::from_value(controller::volume(VOLUME_ID, name))
        .map_err(|err| SessionTestError::Fixture(err.to_string()))
}

#[fixture]
pub fn session_context_result() -> Result<SessionContext, SessionTestError> {
    let host = Host::new().map_err(SessionTestError::Fixture)?;
    Ok(SessionContext {
        host,
        outcome: Arc::new(Mutex::new(None)),
    })
}

#[fixture]
pub fn session_context(
    session_context_result: Result<SessionContext, SessionTestError>,
) -> SessionContext {
    session_context_result
        .unwrap_or_else(|err| panic!("session context fixture should initialise: {err}"))
}
