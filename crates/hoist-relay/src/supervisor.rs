//! Process supervision.
//!
//! [`Relay`] owns the application process for a warm instance. The first
//! forward starts it; concurrent forwards that arrive while it is starting
//! wait on the same start instead of launching their own. A forward that
//! finds the process gone marks it crashed and retries once, restarting it
//! if the restart budget allows.
//!
//! All transitions happen under one mutex and are published on a watch
//! channel. The lock is never held across a loopback call.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tokio::process::{Child, Command};
use tokio::sync::{watch, Mutex, Notify};

use hoist_config::{Config, RelaySettings};
use hoist_core::{Request, Response};

use crate::budget::RestartBudget;
use crate::error::RelayError;
use crate::forward::Forwarder;
use crate::probe;
use crate::state::ProcessState;

/// Environment variable carrying the assigned loopback port.
pub const PORT_ENV: &str = "PORT";
/// Environment variable carrying the deployment stage.
pub const STAGE_ENV: &str = "HOIST_STAGE";
/// Environment variable carrying the deployed commit.
pub const COMMIT_ENV: &str = "HOIST_COMMIT";

/// Builder for [`Relay`].
#[derive(Debug, Clone)]
pub struct RelayBuilder {
    settings: RelaySettings,
    env: Vec<(String, String)>,
}

impl RelayBuilder {
    /// Adds an environment variable for the application process.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Adds several environment variables.
    #[must_use]
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sets the stage exported as `HOIST_STAGE`.
    #[must_use]
    pub fn stage(self, stage: impl Into<String>) -> Self {
        self.env(STAGE_ENV, stage)
    }

    /// Sets the commit exported as `HOIST_COMMIT`.
    #[must_use]
    pub fn commit(self, commit: impl Into<String>) -> Self {
        self.env(COMMIT_ENV, commit)
    }

    /// Builds the relay. No process is launched until the first forward.
    pub fn build(self) -> Result<Relay, RelayError> {
        let forwarder = Forwarder::new(self.settings.request_timeout)?;
        let (state_tx, _) = watch::channel(ProcessState::Stopped);

        Ok(Relay {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    child: None,
                    port: 0,
                    budget: RestartBudget::from(self.settings.restarts),
                    exhausted: None,
                }),
                settings: self.settings,
                env: self.env,
                forwarder,
                state_tx,
                closing: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                drained: Notify::new(),
                generation: AtomicU64::new(0),
                launches: AtomicU64::new(0),
                restarts: AtomicU64::new(0),
            }),
        })
    }
}

struct Shared {
    settings: RelaySettings,
    env: Vec<(String, String)>,
    forwarder: Forwarder,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ProcessState>,
    closing: AtomicBool,
    in_flight: AtomicUsize,
    drained: Notify,
    generation: AtomicU64,
    launches: AtomicU64,
    restarts: AtomicU64,
}

struct Inner {
    child: Option<Child>,
    port: u16,
    budget: RestartBudget,
    /// Crash reason that exhausted the restart budget.
    exhausted: Option<String>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.try_lock() {
            if let Some(child) = inner.child.as_ref() {
                signal_group(child, GroupSignal::Kill);
            }
        }
    }
}

/// Supervisor and loopback relay for the application process.
///
/// Cloning is cheap; clones share the same process.
///
/// # Example
///
/// ```no_run
/// # async fn run() -> Result<(), hoist_relay::RelayError> {
/// use hoist_config::RelaySettings;
/// use hoist_core::Request;
/// use hoist_relay::Relay;
/// use http::Method;
///
/// let relay = Relay::builder(RelaySettings {
///     command: "node server.js".to_string(),
///     ..RelaySettings::default()
/// })
/// .stage("production")
/// .build()?;
///
/// let response = relay.forward(&Request::builder(Method::GET, "/").build()).await?;
/// println!("{}", response.status);
///
/// relay.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Relay {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("command", &self.shared.settings.command)
            .field("state", &self.state())
            .field("generation", &self.generation())
            .finish()
    }
}

impl Relay {
    /// Starts building a relay for `settings`.
    pub fn builder(settings: RelaySettings) -> RelayBuilder {
        RelayBuilder {
            settings,
            env: Vec::new(),
        }
    }

    /// Builds a relay from the `proxy` section and the `environment` map.
    pub fn from_config(config: &Config) -> Result<Self, RelayError> {
        Self::builder(config.proxy.clone())
            .envs(config.environment.clone())
            .build()
    }

    /// Current process state.
    pub fn state(&self) -> ProcessState {
        self.shared.state_tx.borrow().clone()
    }

    /// Receiver that observes every state transition.
    pub fn watch(&self) -> watch::Receiver<ProcessState> {
        self.shared.state_tx.subscribe()
    }

    /// Number of launch attempts so far.
    pub fn launch_count(&self) -> u64 {
        self.shared.launches.load(Ordering::SeqCst)
    }

    /// Number of restarts charged to the restart budget.
    pub fn restart_count(&self) -> u64 {
        self.shared.restarts.load(Ordering::SeqCst)
    }

    /// Start generation. Increments every time a start begins.
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    /// Forwards `request` to the application, starting it if needed.
    ///
    /// A crash during the exchange is retried once.
    pub async fn forward(&self, request: &Request) -> Result<Response, RelayError> {
        let _guard = self.enter()?;

        let (port, generation) = self.ensure_ready().await?;
        match self.shared.forwarder.forward(port, request).await {
            Err(RelayError::Crash { reason }) => {
                self.mark_crashed(generation, &reason).await;
                tracing::info!(
                    request_id = %request.request_id(),
                    reason = %reason,
                    "retrying request after crash"
                );

                let (port, generation) = self.ensure_ready().await?;
                match self.shared.forwarder.forward(port, request).await {
                    Err(RelayError::Crash { reason }) => {
                        self.mark_crashed(generation, &reason).await;
                        Err(RelayError::Crash { reason })
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Stops forwarding, drains in-flight requests for up to the shutdown
    /// timeout, then terminates the process. Later calls do nothing.
    pub async fn shutdown(&self) {
        if self.shared.closing.swap(true, Ordering::SeqCst) {
            return;
        }

        let child = {
            let mut inner = self.shared.inner.lock().await;
            self.shared.state_tx.send_replace(ProcessState::Stopping);
            inner.child.take()
        };

        let grace = self.shared.settings.shutdown_timeout;
        let started = Instant::now();
        tracing::info!(
            in_flight = self.shared.in_flight.load(Ordering::SeqCst),
            grace = ?grace,
            "relay shutting down"
        );

        if tokio::time::timeout(grace, self.drained()).await.is_err() {
            tracing::warn!(
                in_flight = self.shared.in_flight.load(Ordering::SeqCst),
                "in-flight requests still running after grace period"
            );
        }

        if let Some(child) = child {
            terminate(child, grace.saturating_sub(started.elapsed())).await;
        }
    }

    fn enter(&self) -> Result<InFlight<'_>, RelayError> {
        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight {
            shared: &self.shared,
        };
        if self.shared.closing.load(Ordering::SeqCst) {
            return Err(RelayError::ShuttingDown);
        }
        Ok(guard)
    }

    async fn drained(&self) {
        loop {
            let notified = self.shared.drained.notified();
            if self.shared.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Returns the port and generation of a ready process, starting one or
    /// waiting for a start in progress.
    async fn ensure_ready(&self) -> Result<(u16, u64), RelayError> {
        loop {
            let mut rx = {
                let mut inner = self.shared.inner.lock().await;
                let state = self.state();
                match state {
                    ProcessState::Ready => {
                        return Ok((inner.port, self.generation()));
                    }
                    ProcessState::Stopping => {
                        return Err(inner
                            .exhausted
                            .clone()
                            .map_or(RelayError::ShuttingDown, |reason| {
                                RelayError::BudgetExhausted { reason }
                            }));
                    }
                    _ if state.can_start() => self.begin_start(&mut inner, &state)?,
                    _ => {}
                }
                self.shared.state_tx.subscribe()
            };

            let outcome = rx
                .wait_for(|s| !s.is_starting())
                .await
                .map(|s| s.clone())
                .map_err(|_| RelayError::ShuttingDown)?;
            if let ProcessState::Crashed(reason) = outcome {
                return Err(RelayError::startup(reason));
            }
        }
    }

    /// Moves to `Starting` and spawns the launch. Caller holds the lock.
    fn begin_start(&self, inner: &mut Inner, state: &ProcessState) -> Result<(), RelayError> {
        if let ProcessState::Crashed(reason) = state {
            if !inner.budget.try_acquire(Instant::now()) {
                tracing::error!(
                    reason = %reason,
                    max_restarts = self.shared.settings.restarts.max_restarts,
                    window = ?self.shared.settings.restarts.window,
                    "restart budget exhausted, relay disabled"
                );
                inner.exhausted = Some(reason.clone());
                if let Some(child) = inner.child.take() {
                    reap(child);
                }
                self.shared.state_tx.send_replace(ProcessState::Stopping);
                return Err(RelayError::BudgetExhausted {
                    reason: reason.clone(),
                });
            }
            self.shared.restarts.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(
                reason = %reason,
                restarts_left = inner.budget.remaining(Instant::now()),
                "restarting application"
            );
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.state_tx.send_replace(ProcessState::Starting);

        // The start runs detached so a cancelled caller cannot strand it.
        let relay = self.clone();
        tokio::spawn(async move { relay.run_start(generation).await });
        Ok(())
    }

    async fn run_start(&self, generation: u64) {
        let result = self.launch().await;

        let mut inner = self.shared.inner.lock().await;
        if self.generation() != generation || !self.state().is_starting() {
            if let Ok((child, _)) = result {
                tracing::debug!(generation, "discarding process started during shutdown");
                reap(child);
            }
            return;
        }

        match result {
            Ok((child, port)) => {
                tracing::info!(generation, port, pid = child.id(), "application ready");
                inner.child = Some(child);
                inner.port = port;
                self.shared.state_tx.send_replace(ProcessState::Ready);
            }
            Err(reason) => {
                tracing::error!(generation, reason = %reason, "application failed to start");
                metrics::counter!("hoist_process_crashes_total").increment(1);
                self.shared
                    .state_tx
                    .send_replace(ProcessState::Crashed(reason));
            }
        }
    }

    async fn launch(&self) -> Result<(Child, u16), String> {
        let settings = &self.shared.settings;
        let port = free_port()
            .await
            .map_err(|e| format!("no free loopback port: {e}"))?;

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&settings.command)
            .current_dir(&settings.working_dir)
            .envs(self.shared.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env(PORT_ENV, port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        self.shared.launches.fetch_add(1, Ordering::SeqCst);
        metrics::counter!("hoist_process_launches_total").increment(1);

        let mut child = command
            .spawn()
            .map_err(|e| format!("launch failed: {e}"))?;
        tracing::info!(
            command = %settings.command,
            pid = child.id(),
            port,
            "launched application"
        );

        if let Err(reason) = probe::wait_ready(port, &mut child, settings.startup_timeout).await {
            reap(child);
            return Err(reason);
        }
        Ok((child, port))
    }

    /// Records a crash seen by a forward from `generation`. Stale reports
    /// from an earlier generation are ignored.
    async fn mark_crashed(&self, generation: u64, reason: &str) {
        let mut inner = self.shared.inner.lock().await;
        if self.generation() != generation || self.state() != ProcessState::Ready {
            return;
        }

        tracing::warn!(generation, reason, "application crashed");
        metrics::counter!("hoist_process_crashes_total").increment(1);
        if let Some(child) = inner.child.take() {
            reap(child);
        }
        self.shared
            .state_tx
            .send_replace(ProcessState::Crashed(reason.to_string()));
    }
}

struct InFlight<'a> {
    shared: &'a Shared,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.shared.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.shared.drained.notify_waiters();
        }
    }
}

async fn free_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    Ok(listener.local_addr()?.port())
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Term,
    Kill,
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: GroupSignal) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    let signal = match signal {
        GroupSignal::Term => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    if let Err(e) = killpg(Pid::from_raw(pid), signal) {
        tracing::debug!(pid, error = %e, "signalling process group failed");
    }
}

#[cfg(not(unix))]
fn signal_group(_child: &Child, _signal: GroupSignal) {}

/// Kills a process that is no longer wanted and collects its exit status in
/// the background.
fn reap(mut child: Child) {
    signal_group(&child, GroupSignal::Kill);
    let _ = child.start_kill();
    tokio::spawn(async move {
        let _ = child.wait().await;
    });
}

/// SIGTERM, wait up to `grace`, then kill.
async fn terminate(mut child: Child, grace: Duration) {
    #[cfg(unix)]
    signal_group(&child, GroupSignal::Term);
    #[cfg(not(unix))]
    let _ = child.start_kill();

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => tracing::info!(%status, "application exited"),
        Ok(Err(e)) => tracing::warn!(error = %e, "waiting for application failed"),
        Err(_) => {
            tracing::warn!("application ignored SIGTERM, killing");
            signal_group(&child, GroupSignal::Kill);
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "killing application failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use http::Method;

    use super::*;

    fn settings(command: &str) -> RelaySettings {
        RelaySettings {
            command: command.to_string(),
            startup_timeout: Duration::from_millis(300),
            ..RelaySettings::default()
        }
    }

    #[tokio::test]
    async fn test_initial_state() {
        let relay = Relay::builder(settings("true")).build().unwrap();
        assert_eq!(relay.state(), ProcessState::Stopped);
        assert_eq!(relay.launch_count(), 0);
        assert_eq!(relay.generation(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exiting_command_is_startup_failure() {
        let relay = Relay::builder(settings("exit 7")).build().unwrap();
        let request = Request::builder(Method::GET, "/").build();

        let err = relay.forward(&request).await.unwrap_err();
        assert!(matches!(err, RelayError::Startup { ref reason } if reason.starts_with("process exited")));
        assert!(matches!(relay.state(), ProcessState::Crashed(_)));
        assert_eq!(relay.launch_count(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_never_listening_command_times_out() {
        let relay = Relay::builder(settings("sleep 5")).build().unwrap();
        let request = Request::builder(Method::GET, "/").build();

        let err = relay.forward(&request).await.unwrap_err();
        assert!(matches!(err, RelayError::Startup { ref reason } if reason == "startup timeout"));
    }

    #[tokio::test]
    async fn test_shutdown_before_start_rejects_forwards() {
        let relay = Relay::builder(settings("true")).build().unwrap();
        relay.shutdown().await;
        relay.shutdown().await;

        let request = Request::builder(Method::GET, "/").build();
        assert!(matches!(
            relay.forward(&request).await,
            Err(RelayError::ShuttingDown)
        ));
        assert_eq!(relay.state(), ProcessState::Stopping);
        assert_eq!(relay.launch_count(), 0);
    }
}
