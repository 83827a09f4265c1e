use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use obun_core::{
    ArtifactBuilder, BuildMode, BuildRecord, BuildRequest, CoreError, Fingerprint, FragmentStore,
};

use super::event::{WatchEvent, WatchState};
use super::listener::{fingerprint_file, spawn_listener, ChangeEvent, WatchSet};
use crate::error::RunnerError;
use crate::process::{exit_code, ProcessRunner, RunningProcess};

/// Rebuilds (and, in `run` mode, restarts) the artifact whenever a fragment
/// from the last build changes.
///
/// The loop is the only owner of the child process and the only consumer
/// of change events. A running process is always terminated, and its exit
/// awaited, before the next build starts.
pub struct WatchLoop<S> {
    builder: ArtifactBuilder<S>,
    request: BuildRequest,
    runner: ProcessRunner,
    events: mpsc::UnboundedSender<WatchEvent>,
    state: WatchState,
    generation: u64,
    last_good: Option<BuildRecord>,
    child: Option<RunningProcess>,
}

impl<S: FragmentStore> WatchLoop<S> {
    /// Create the loop and the receiving end of its progress events.
    pub fn new(
        builder: ArtifactBuilder<S>,
        request: BuildRequest,
    ) -> (Self, mpsc::UnboundedReceiver<WatchEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let runner = ProcessRunner::new(builder.settings().grace_period);
        let this = Self {
            builder,
            request,
            runner,
            events,
            state: WatchState::Idle,
            generation: 0,
            last_good: None,
            child: None,
        };
        (this, rx)
    }

    /// Watch until Ctrl-C.
    pub async fn run(self) -> Result<(), RunnerError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Cannot listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Watch until `shutdown` completes, then stop any live process.
    ///
    /// Build failures are reported and waited out. Only an environment
    /// failure (an unwritable artifact path) ends the loop with an error.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), RunnerError>
    where
        F: Future<Output = ()>,
    {
        let (set_tx, set_rx) = watch::channel(WatchSet::default());
        let (change_tx, mut changes) = mpsc::unbounded_channel();
        let listener = spawn_listener(set_rx, change_tx, self.builder.settings().poll_interval);
        tokio::pin!(shutdown);

        let mut result = self.cycle(&set_tx).await;

        while result.is_ok() {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                status = wait_child(&mut self.child) => {
                    self.on_child_exit(status);
                }
                event = changes.recv() => {
                    let Some(event) = event else {
                        warn!("Change listener stopped");
                        break;
                    };
                    if event.generation != self.generation {
                        continue;
                    }
                    let window = self.builder.settings().debounce;
                    let paths = debounce(&mut changes, event, window).await;
                    info!(files = paths.len(), "Changes detected, rebuilding");
                    self.emit(WatchEvent::ChangeDetected {
                        paths: paths.into_iter().collect(),
                    });
                    result = self.cycle(&set_tx).await;
                }
            }
        }

        listener.abort();
        let stopped = self.stop_child().await;
        self.set_state(WatchState::Stopped);
        result.and(stopped)
    }

    /// One stop-build-start cycle.
    async fn cycle(&mut self, set_tx: &watch::Sender<WatchSet>) -> Result<(), RunnerError> {
        self.stop_child().await?;
        self.set_state(WatchState::Building);

        let built = match self.builder.build(&self.request) {
            Ok(built) => built,
            Err(e) if e.is_environmental() => {
                error!("{e}");
                self.emit(WatchEvent::BuildFailed {
                    message: e.to_string(),
                    exit_code: e.exit_code(),
                });
                return Err(e.into());
            }
            Err(e) => {
                self.on_build_failure(&e, set_tx);
                return Ok(());
            }
        };

        let record = built.record;
        self.publish(
            set_tx,
            record
                .fragments
                .iter()
                .map(|(path, fp)| (path.clone(), Some(*fp)))
                .collect(),
        );
        self.emit(WatchEvent::Built {
            record: record.clone(),
        });

        if record.mode == BuildMode::Run {
            match self.runner.start(&record) {
                Ok(child) => {
                    self.emit(WatchEvent::ProcessStarted {
                        pid: child.pid(),
                        artifact: child.artifact().to_path_buf(),
                    });
                    self.child = Some(child);
                    self.set_state(WatchState::Running);
                }
                Err(e) => {
                    error!("{e}");
                    self.emit(WatchEvent::ProcessFailed {
                        message: e.to_string(),
                    });
                    self.set_state(WatchState::Built);
                }
            }
        } else {
            self.set_state(WatchState::Built);
        }

        self.last_good = Some(record);
        Ok(())
    }

    /// Keep watching what the last good build used, the entry, and whatever
    /// the error points at. Baselines are the files' current content so an
    /// edit that already happened does not trigger a rebuild loop.
    fn on_build_failure(&mut self, err: &CoreError, set_tx: &watch::Sender<WatchSet>) {
        warn!("Build failed: {err}");
        self.emit(WatchEvent::BuildFailed {
            message: err.to_string(),
            exit_code: err.exit_code(),
        });

        let mut paths: BTreeSet<PathBuf> = self
            .last_good
            .iter()
            .flat_map(|r| r.fragments.keys().cloned())
            .collect();
        paths.insert(self.request.entry.clone());
        paths.extend(err.involved_paths().into_iter().map(PathBuf::from));

        let baseline = paths
            .into_iter()
            .map(|p| {
                let fp = fingerprint_file(&p);
                (p, fp)
            })
            .collect();
        self.publish(set_tx, baseline);

        let state = if self.last_good.is_some() {
            WatchState::Built
        } else {
            WatchState::Idle
        };
        self.set_state(state);
    }

    fn publish(
        &mut self,
        set_tx: &watch::Sender<WatchSet>,
        mut baseline: BTreeMap<PathBuf, Option<Fingerprint>>,
    ) {
        baseline
            .entry(self.request.entry.clone())
            .or_insert_with(|| fingerprint_file(&self.request.entry));
        self.generation += 1;
        set_tx.send_replace(WatchSet {
            generation: self.generation,
            baseline,
        });
    }

    async fn stop_child(&mut self) -> Result<(), RunnerError> {
        let Some(child) = self.child.take() else {
            return Ok(());
        };
        let pid = child.pid();
        info!(pid, "Stopping running process");
        let status = child.terminate().await?;
        self.emit(WatchEvent::ProcessTerminated {
            pid,
            code: exit_code(&status),
        });
        Ok(())
    }

    fn on_child_exit(&mut self, status: Result<ExitStatus, RunnerError>) {
        let Some(child) = self.child.take() else {
            return;
        };
        let code = match status {
            Ok(status) => exit_code(&status),
            Err(e) => {
                warn!(pid = child.pid(), "Lost track of process: {e}");
                -1
            }
        };
        info!(pid = child.pid(), code, "Process exited");
        self.emit(WatchEvent::ProcessExited {
            pid: child.pid(),
            code,
        });
        self.set_state(WatchState::Built);
    }

    fn set_state(&mut self, state: WatchState) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "Watch state");
            self.state = state;
            self.emit(WatchEvent::StateChanged { state });
        }
    }

    fn emit(&self, event: WatchEvent) {
        let _ = self.events.send(event);
    }
}

/// Coalesce further events until `window` passes without one. Events all
/// share `first`'s generation: the set cannot change while nothing builds.
async fn debounce(
    changes: &mut mpsc::UnboundedReceiver<ChangeEvent>,
    first: ChangeEvent,
    window: Duration,
) -> BTreeSet<PathBuf> {
    let mut paths = BTreeSet::from([first.path]);
    while let Ok(Some(event)) = tokio::time::timeout(window, changes.recv()).await {
        if event.generation == first.generation {
            paths.insert(event.path);
        }
    }
    paths
}

/// Resolves when the child exits; never resolves if there is none.
async fn wait_child(child: &mut Option<RunningProcess>) -> Result<ExitStatus, RunnerError> {
    match child {
        Some(child) => child.wait().await,
        None => std::future::pending().await,
    }
}
