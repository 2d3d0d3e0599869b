// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Shell host: the GUI-shell runtime variant's compile service.
//!
//! The shell embeds the same engine inside a desktop application shell with
//! its own process lifecycle; its compiler is only reliable once the shell
//! signals readiness, and the compile must run inside the shell's own
//! environment. The host here models that boundary: a dedicated thread owns
//! the shell engine, readiness is broadcast on a watch channel, and compile
//! jobs travel over a queue with one-shot replies.
//!
//! Shell-produced buffers carry the engine's UNCHECKED flag, because the
//! shell environment cannot guarantee a stable source digest across its own
//! builds; consumers skip that validation for such artifacts.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use slipstream_engine::{CacheOptions, Engine};
use tokio::sync::{oneshot, watch};

use crate::error::{Error, Result};

/// Default time to wait for the shell to become ready.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle phase of a shell host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPhase {
    /// The shell is initializing
    Starting,
    /// The shell reached its ready lifecycle event
    Ready,
    /// The shell has shut down
    Stopped,
}

/// States a shell compile moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompileState {
    NotStarted,
    AwaitingReady,
    Ready,
    Compiling,
    Done,
    Failed,
}

struct CompileJob {
    source: String,
    reply: oneshot::Sender<std::result::Result<Vec<u8>, String>>,
}

/// Handle to a running shell host.
///
/// Dropping the handle closes the job queue and the shell thread exits.
pub struct ShellHost {
    phase: watch::Receiver<HostPhase>,
    jobs: mpsc::Sender<CompileJob>,
}

impl ShellHost {
    /// Spawns a shell host on its own thread.
    pub fn spawn() -> Result<ShellHost> {
        let (phase_tx, phase_rx) = watch::channel(HostPhase::Starting);
        let (job_tx, job_rx) = mpsc::channel::<CompileJob>();

        thread::Builder::new()
            .name("slipstream-shell".into())
            .spawn(move || {
                // The shell's own engine lives on this thread for its whole
                // lifecycle; readiness is only signaled once it exists.
                let mut engine = Engine::new();
                if phase_tx.send(HostPhase::Ready).is_err() {
                    return;
                }
                while let Ok(job) = job_rx.recv() {
                    let result = engine
                        .compile_with_cache_options(
                            &job.source,
                            &CacheOptions {
                                skip_source_check: true,
                            },
                        )
                        .map(|(_, bytes)| bytes)
                        .map_err(|err| err.to_string());
                    let _ = job.reply.send(result);
                }
                let _ = phase_tx.send(HostPhase::Stopped);
            })
            .map_err(|e| Error::RuntimeUnavailable(format!("failed to spawn shell: {}", e)))?;

        Ok(ShellHost {
            phase: phase_rx,
            jobs: job_tx,
        })
    }

    /// The host's current lifecycle phase.
    pub fn phase(&self) -> HostPhase {
        *self.phase.borrow()
    }

    /// Compiles `source` inside the shell, waiting up to `timeout` for the
    /// shell's ready event first.
    ///
    /// Fails with [`Error::RuntimeUnavailable`] if the shell never becomes
    /// ready within the timeout or exits underneath the call. The readiness
    /// subscription is dropped either way; a timed-out call leaves nothing
    /// behind.
    pub async fn compile(&self, source: &str, timeout: Duration) -> Result<Vec<u8>> {
        let mut state = CompileState::NotStarted;
        tracing::debug!(?state, "shell compile requested");

        state = CompileState::AwaitingReady;
        tracing::debug!(?state);
        let mut phase = self.phase.clone();
        let ready = tokio::time::timeout(
            timeout,
            phase.wait_for(|p| *p != HostPhase::Starting),
        )
        .await;
        let reached = match ready {
            Err(_) => {
                tracing::debug!(state = ?CompileState::Failed, "readiness timeout");
                return Err(Error::RuntimeUnavailable(format!(
                    "shell not ready within {:?}",
                    timeout
                )));
            }
            Ok(Err(_)) => {
                return Err(Error::RuntimeUnavailable(
                    "shell exited before signaling readiness".into(),
                ));
            }
            Ok(Ok(p)) => *p,
        };
        if reached == HostPhase::Stopped {
            return Err(Error::RuntimeUnavailable(
                "shell stopped before the compile could run".into(),
            ));
        }
        state = CompileState::Ready;
        tracing::debug!(?state);

        let (reply_tx, reply_rx) = oneshot::channel();
        self.jobs
            .send(CompileJob {
                source: source.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| Error::RuntimeUnavailable("shell job queue is closed".into()))?;
        state = CompileState::Compiling;
        tracing::debug!(?state);

        match reply_rx.await {
            Err(_) => {
                tracing::debug!(state = ?CompileState::Failed, "shell exited mid-compile");
                Err(Error::RuntimeUnavailable("shell exited during compile".into()))
            }
            Ok(Err(message)) => {
                tracing::debug!(state = ?CompileState::Failed, %message);
                Err(Error::Compile(message))
            }
            Ok(Ok(bytes)) => {
                state = CompileState::Done;
                tracing::debug!(?state, bytes = bytes.len());
                Ok(bytes)
            }
        }
    }
}
