//! Stoppable background threads
//!
//! Hot-plug watching and layout polling run on their own threads. Both stop
//! cooperatively: a shared flag is raised and the owner waits a bounded time
//! for the thread to notice. A thread that misses the deadline is detached.

use anyhow::{anyhow, Result};
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::constants::{WORKER_JOIN_TIMEOUT_MS, WORKER_TICK_MS};

/// Stop request shared with a worker thread
#[derive(Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Sleep for `duration` in small ticks.
    ///
    /// Returns false as soon as a stop is requested.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let tick = Duration::from_millis(WORKER_TICK_MS);
        loop {
            if self.is_set() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(tick.min(deadline - now));
        }
    }
}

/// A named background thread with cooperative shutdown
pub struct BackgroundWorker {
    name: String,
    stop: StopFlag,
    done_rx: mpsc::Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundWorker {
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(StopFlag) + Send + 'static,
    {
        let stop = StopFlag::default();
        let (done_tx, done_rx) = mpsc::channel();
        let thread_stop = stop.clone();

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                body(thread_stop);
                let _ = done_tx.send(());
            })
            .map_err(|e| anyhow!("Failed to start {} thread: {}", name, e))?;

        Ok(Self {
            name: name.to_string(),
            stop,
            done_rx,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Request a stop and wait up to `timeout`. Returns true if the thread was joined.
    pub fn stop_within(&mut self, timeout: Duration) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };
        self.stop.raise();

        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    warn!("{} thread panicked", self.name);
                }
                debug!("{} thread stopped", self.name);
                true
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    "{} thread did not stop within {:?}, detaching",
                    self.name, timeout
                );
                false
            }
        }
    }

    pub fn stop(&mut self) -> bool {
        self.stop_within(Duration::from_millis(WORKER_JOIN_TIMEOUT_MS))
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooperative_stop() {
        let mut worker = BackgroundWorker::spawn("test-worker", |stop| {
            while stop.sleep(Duration::from_millis(50)) {}
        })
        .unwrap();

        assert!(worker.is_running());
        assert!(worker.stop());
        assert!(!worker.is_running());
    }

    #[test]
    fn test_unresponsive_worker_is_detached() {
        let mut worker = BackgroundWorker::spawn("stuck-worker", |_stop| {
            std::thread::sleep(Duration::from_millis(500));
        })
        .unwrap();

        assert!(!worker.stop_within(Duration::from_millis(20)));
        // A second stop is a no-op
        assert!(worker.stop_within(Duration::from_millis(20)));
    }

    #[test]
    fn test_stop_flag_sleep_returns_early() {
        let flag = StopFlag::default();
        flag.raise();
        assert!(!flag.sleep(Duration::from_secs(10)));
    }
}
