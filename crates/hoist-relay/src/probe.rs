//! Readiness probing.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::process::Child;
use tokio::time::Instant;

/// Delay before the first retry.
pub const INITIAL_DELAY: Duration = Duration::from_millis(10);

/// Upper bound for the delay between attempts.
pub const MAX_DELAY: Duration = Duration::from_millis(100);

/// Geometric backoff: 10ms growing by 1.5x, capped at 100ms.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
}

impl Backoff {
    /// Starts at [`INITIAL_DELAY`].
    pub fn new() -> Self {
        Self {
            next: INITIAL_DELAY,
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = current.mul_f64(1.5).min(MAX_DELAY);
        Some(current)
    }
}

/// Waits until `port` accepts a TCP connection.
///
/// Fails with a reason when the deadline passes or the child exits first.
pub(crate) async fn wait_ready(port: u16, child: &mut Child, timeout: Duration) -> Result<(), String> {
    let deadline = Instant::now() + timeout;
    let mut backoff = Backoff::new();

    loop {
        if let Ok(stream) = TcpStream::connect(("127.0.0.1", port)).await {
            drop(stream);
            return Ok(());
        }

        match child.try_wait() {
            Ok(Some(status)) => return Err(format!("process exited: {status}")),
            Ok(None) => {}
            Err(e) => return Err(format!("process wait failed: {e}")),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err("startup timeout".to_string());
        }
        let delay = backoff.next().unwrap_or(MAX_DELAY);
        tokio::time::sleep(delay.min(deadline - now)).await;
    }
}
