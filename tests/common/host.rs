//! Scripted host used by session and driver tests.
//!
//! Wires a [`SessionOrchestrator`] to a scripted controller, a scripted
//! `iscsiadm` and an in-memory mount executor, with a temporary directory
//! standing in for `/dev/disk/by-path`.

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use sfvol::iscsi::device;
use sfvol::test_support::{RecordingMount, ScriptedRunner, ScriptedTransport};
use sfvol::{
    AccountDirectory, IscsiAdmin, RpcClient, SessionOrchestrator, SessionSettings,
    TargetResolution,
};
use tempfile::TempDir;

use crate::controller::{PORTAL, SVIP, iqn};

/// Orchestrator type exercised by the tests.
pub type ScriptedOrchestrator = SessionOrchestrator<ScriptedTransport, ScriptedRunner, RecordingMount>;

/// Scripted collaborators sharing state with every orchestrator they build.
#[derive(Clone, Debug)]
pub struct Host {
    pub transport: ScriptedTransport,
    pub runner: ScriptedRunner,
    pub mount: RecordingMount,
    pub device_root: Utf8PathBuf,
    _root: Arc<TempDir>,
}

impl Host {
    pub fn new() -> Result<Self, String> {
        let root = TempDir::new().map_err(|err| err.to_string())?;
        let device_root = Utf8PathBuf::from_path_buf(root.path().to_path_buf())
            .map_err(|path| format!("non UTF-8 temp dir: {}", path.display()))?;
        Ok(Self {
            transport: ScriptedTransport::new(),
            runner: ScriptedRunner::new(),
            mount: RecordingMount::new(),
            device_root,
            _root: Arc::new(root),
        })
    }

    pub fn rpc(&self) -> RpcClient<ScriptedTransport> {
        RpcClient::new(self.transport.clone())
    }

    pub fn settings(&self, resolution: TargetResolution) -> SessionSettings {
        SessionSettings::new(Some(String::from(SVIP)))
            .target_resolution(resolution)
            .device_root(self.device_root.clone())
            .attach_polling(3, Duration::from_millis(5))
    }

    pub fn orchestrator(&self, resolution: TargetResolution) -> ScriptedOrchestrator {
        SessionOrchestrator::new(
            self.settings(resolution),
            AccountDirectory::new(self.rpc()),
            IscsiAdmin::new(self.runner.clone(), "iscsiadm"),
            self.mount.clone(),
        )
    }

    /// Returns the by-path link for volume `name` with `id` behind the SVIP.
    pub fn link_for(&self, name: &str, id: i64) -> Utf8PathBuf {
        device::host_path(&self.device_root, PORTAL, &iqn(name, id))
    }

    /// Creates the by-path link as udev would after a login.
    pub fn plug(&self, name: &str, id: i64, target: &str) -> Result<Utf8PathBuf, String> {
        let link = self.link_for(name, id);
        std::os::unix::fs::symlink(target, &link).map_err(|err| err.to_string())?;
        Ok(link)
    }

    /// Scripts a successful probe and CHAP login that makes udev publish the
    /// link for volume `name` with `id`.
    pub fn script_login(&self, name: &str, id: i64, target: &str) {
        self.runner.push_success();
        self.runner.push_successes(5);
        self.runner
            .link_on_login(self.link_for(name, id).into_std_path_buf(), target);
    }
}
