//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Value, json};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::command::{CommandError, CommandOutput, CommandRunner};
use crate::mount::{MountError, MountExecutor};
use crate::rpc::{RpcError, RpcFuture, Transport};

fn locked<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Records a single call made through [`ScriptedTransport`].
#[derive(Clone, Debug, PartialEq)]
pub struct TransportCall {
    /// Remote method name.
    pub method: String,
    /// Decoded `params` member of the request envelope.
    pub params: Value,
}

#[derive(Debug)]
struct ScriptedReply {
    method: String,
    reply: Result<Vec<u8>, RpcError>,
}

/// Scripted controller transport that replays responses in FIFO order.
///
/// Each reply names the method it expects; a call for a different method
/// fails with a transport error so mis-ordered scripts are caught early.
#[derive(Clone, Debug, Default)]
pub struct ScriptedTransport {
    replies: Arc<Mutex<VecDeque<ScriptedReply>>>,
    calls: Arc<Mutex<Vec<TransportCall>>>,
    yields: Arc<AtomicBool>,
}

impl ScriptedTransport {
    /// Creates a transport with no queued replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call yield to the runtime once before its reply is
    /// delivered, so concurrent callers interleave the way they would over
    /// a network.
    pub fn yield_before_replies(&self) {
        self.yields.store(true, Ordering::SeqCst);
    }

    /// Queues a successful response whose `result` member is `result`.
    pub fn push_result(&self, method: &str, result: Value) {
        let body = json!({"id": 1, "result": result}).to_string().into_bytes();
        self.push(method, Ok(body));
    }

    /// Queues an API error envelope.
    pub fn push_api_error(&self, method: &str, code: i64, name: &str, message: &str) {
        let body = json!({"id": 1, "error": {"code": code, "name": name, "message": message}})
            .to_string()
            .into_bytes();
        self.push(method, Ok(body));
    }

    /// Queues a raw response body.
    pub fn push_raw(&self, method: &str, body: impl Into<Vec<u8>>) {
        self.push(method, Ok(body.into()));
    }

    /// Queues a transport-level failure.
    pub fn push_transport_error(&self, method: &str, message: &str) {
        self.push(
            method,
            Err(RpcError::Transport {
                method: method.to_owned(),
                message: message.to_owned(),
            }),
        );
    }

    fn push(&self, method: &str, reply: Result<Vec<u8>, RpcError>) {
        locked(&self.replies).push_back(ScriptedReply {
            method: method.to_owned(),
            reply,
        });
    }

    /// Returns a snapshot of all calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<TransportCall> {
        locked(&self.calls).clone()
    }

    /// Returns how many calls were made for `method`.
    #[must_use]
    pub fn count(&self, method: &str) -> usize {
        locked(&self.calls)
            .iter()
            .filter(|call| call.method == method)
            .count()
    }

    /// Returns the number of replies not yet consumed.
    #[must_use]
    pub fn pending(&self) -> usize {
        locked(&self.replies).len()
    }

    fn next(&self, method: &str, body: &[u8]) -> Result<Vec<u8>, RpcError> {
        let params = serde_json::from_slice::<Value>(body)
            .ok()
            .and_then(|envelope| envelope.get("params").cloned())
            .unwrap_or(Value::Null);
        locked(&self.calls).push(TransportCall {
            method: method.to_owned(),
            params,
        });

        let unexpected = |message: String| RpcError::Transport {
            method: method.to_owned(),
            message,
        };
        let scripted = locked(&self.replies)
            .pop_front()
            .ok_or_else(|| unexpected(String::from("no scripted response available")))?;
        if scripted.method != method {
            return Err(unexpected(format!(
                "scripted response was for {}",
                scripted.method
            )));
        }
        scripted.reply
    }
}

impl Transport for ScriptedTransport {
    fn post<'a>(&'a self, method: &'a str, body: Vec<u8>) -> RpcFuture<'a, Vec<u8>> {
        let reply = self.next(method, &body);
        let yields = self.yields.load(Ordering::SeqCst);
        Box::pin(async move {
            if yields {
                tokio::task::yield_now().await;
            }
            reply
        })
    }
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }

    /// Returns `true` when any argument equals `needle`.
    #[must_use]
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|arg| arg == needle)
    }
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
/// When a link is registered with [`ScriptedRunner::link_on_login`], a
/// successful `--login` invocation creates it, standing in for udev.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<Result<CommandOutput, CommandError>>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
    login_link: Arc<Mutex<Option<(PathBuf, PathBuf)>>>,
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        locked(&self.invocations).clone()
    }

    /// Returns how many invocations carried the argument `needle`.
    #[must_use]
    pub fn count_with_arg(&self, needle: &str) -> usize {
        locked(&self.invocations)
            .iter()
            .filter(|call| call.has_arg(needle))
            .count()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes `count` successful exit statuses.
    pub fn push_successes(&self, count: usize) {
        for _ in 0..count {
            self.push_success();
        }
    }

    /// Pushes a specific exit code.
    pub fn push_exit_code(&self, code: i32) {
        self.push_output(Some(code), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        locked(&self.responses).push_back(Ok(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }));
    }

    /// Pushes a failure to start the program.
    pub fn push_spawn_failure(&self) {
        locked(&self.responses).push_back(Err(CommandError::Spawn {
            program: String::from("scripted"),
            message: String::from("No such file or directory (os error 2)"),
        }));
    }

    /// Creates a symlink at `link` pointing to `target` when a `--login`
    /// invocation succeeds.
    pub fn link_on_login(&self, link: impl Into<PathBuf>, target: impl Into<PathBuf>) {
        *locked(&self.login_link) = Some((link.into(), target.into()));
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        let invocation = CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        };
        let is_login = invocation.has_arg("--login");
        locked(&self.invocations).push(invocation);

        let response = locked(&self.responses).pop_front().unwrap_or_else(|| {
            Err(CommandError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
        });

        if is_login
            && matches!(&response, Ok(output) if output.is_success())
            && let Some((link, target)) = locked(&self.login_link).as_ref()
        {
            std::os::unix::fs::symlink(target, link).map_err(|err| CommandError::Spawn {
                program: program.to_owned(),
                message: format!("failed to create {}: {err}", link.display()),
            })?;
        }
        response
    }
}

/// Mount call recorded by [`RecordingMount`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MountCall {
    /// Filesystem probe of a device.
    Probe(Utf8PathBuf),
    /// Format of a device with a filesystem type.
    Format(Utf8PathBuf, String),
    /// Mount of a device at a mount point.
    Mount(Utf8PathBuf, Utf8PathBuf),
    /// Unmount of a mount point.
    Unmount(Utf8PathBuf),
}

#[derive(Debug, Default)]
struct MountState {
    calls: Vec<MountCall>,
    filesystem: Option<String>,
    fail_mount: bool,
    fail_unmount: bool,
}

/// In-memory [`MountExecutor`] that records calls and never touches the host.
#[derive(Clone, Debug, Default)]
pub struct RecordingMount {
    state: Arc<Mutex<MountState>>,
}

impl RecordingMount {
    /// Creates an executor whose devices report no filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports `fs_type` for every probed device.
    pub fn set_filesystem(&self, fs_type: &str) {
        locked(&self.state).filesystem = Some(fs_type.to_owned());
    }

    /// Makes subsequent mounts fail.
    pub fn fail_mount(&self) {
        locked(&self.state).fail_mount = true;
    }

    /// Makes subsequent unmounts fail.
    pub fn fail_unmount(&self) {
        locked(&self.state).fail_unmount = true;
    }

    /// Returns a snapshot of recorded calls.
    #[must_use]
    pub fn calls(&self) -> Vec<MountCall> {
        locked(&self.state).calls.clone()
    }
}

impl MountExecutor for RecordingMount {
    fn filesystem_type(&self, device: &Utf8Path) -> Result<Option<String>, MountError> {
        let mut state = locked(&self.state);
        state.calls.push(MountCall::Probe(device.to_owned()));
        Ok(state.filesystem.clone())
    }

    fn format(&self, device: &Utf8Path, fs_type: &str) -> Result<(), MountError> {
        let mut state = locked(&self.state);
        state
            .calls
            .push(MountCall::Format(device.to_owned(), fs_type.to_owned()));
        state.filesystem = Some(fs_type.to_owned());
        Ok(())
    }

    fn mount(&self, device: &Utf8Path, mount_point: &Utf8Path) -> Result<(), MountError> {
        let mut state = locked(&self.state);
        state
            .calls
            .push(MountCall::Mount(device.to_owned(), mount_point.to_owned()));
        if state.fail_mount {
            return Err(MountError::Command {
                operation: "mount",
                target: mount_point.to_owned(),
                message: String::from("simulated failure"),
            });
        }
        Ok(())
    }

    fn unmount(&self, mount_point: &Utf8Path) -> Result<(), MountError> {
        let mut state = locked(&self.state);
        state.calls.push(MountCall::Unmount(mount_point.to_owned()));
        if state.fail_unmount {
            return Err(MountError::Command {
                operation: "unmount",
                target: mount_point.to_owned(),
                message: String::from("target is busy"),
            });
        }
        Ok(())
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        Self::apply(pairs.iter().map(|(key, value)| (*key, Some(*value)))).await
    }

    /// Removes the listed variables while holding the global mutex.
    pub async fn remove_vars(keys: &[&str]) -> Self {
        Self::apply(keys.iter().map(|key| (*key, None))).await
    }

    async fn apply<'a>(changes: impl Iterator<Item = (&'a str, Option<&'a str>)> + Clone) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                changes.clone().all(|(key, _)| seen.insert(key))
            },
            "duplicate environment variable keys passed to EnvGuard"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::new();
        for (key, value) in changes {
            previous.push((key.to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`.
            unsafe {
                match value {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in self.previous.iter().rev() {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
