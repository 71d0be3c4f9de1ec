//! TTL Cleanup Task
//!
//! Dedicated background thread that periodically removes expired cache
//! entries until it is stopped or the cache it serves has been dropped.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

/// How long [`Sweeper::stop`] waits for the thread to exit.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Something the sweeper can clean.
pub trait Sweep {
    /// Removes expired entries and returns how many were removed.
    fn sweep(&self) -> usize;
}

#[derive(Debug, Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    /// Sleeps for up to `timeout`; returns true once stop was requested.
    fn wait(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            self.wake.wait_for(&mut stopped, timeout);
        }
        *stopped
    }

    fn stop(&self) {
        *self.stopped.lock() = true;
        self.wake.notify_all();
    }
}

// == Sweeper ==
/// Handle to a running cleanup thread.
///
/// The thread only holds a weak reference to its target, so dropping the
/// cache without calling [`Sweeper::stop`] ends the thread at its next tick.
#[derive(Debug)]
pub struct Sweeper {
    signal: Arc<StopSignal>,
    exited: mpsc::Receiver<()>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawns a thread that calls `target.sweep()` every `interval`.
    ///
    /// # Example
    /// ```ignore
    /// let sweeper = Sweeper::spawn(Arc::downgrade(&core), Duration::from_secs(60))?;
    /// // Later, during shutdown:
    /// sweeper.stop();
    /// ```
    pub fn spawn<T>(target: Weak<T>, interval: Duration) -> io::Result<Self>
    where
        T: Sweep + Send + Sync + 'static,
    {
        let signal = Arc::new(StopSignal::default());
        let thread_signal = Arc::clone(&signal);
        // Dropped when the thread returns, which disconnects `exited`
        let (exit_tx, exited) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("cache-cleanup".to_string())
            .spawn(move || {
                let _exit_tx = exit_tx;
                info!("Starting TTL cleanup thread with interval of {:?}", interval);
                run(&thread_signal, &target, interval);
                debug!("TTL cleanup thread exiting");
            })?;

        Ok(Self {
            signal,
            exited,
            handle,
        })
    }

    /// Whether the thread is still alive.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signals the thread to stop and waits up to [`SHUTDOWN_TIMEOUT`] for it.
    ///
    /// A thread that does not exit in time is detached.
    pub fn stop(self) {
        self.signal.stop();
        match self.exited.recv_timeout(SHUTDOWN_TIMEOUT) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "TTL cleanup thread did not stop within {:?}, detaching it",
                    SHUTDOWN_TIMEOUT
                );
            }
            _ => {
                if self.handle.join().is_err() {
                    warn!("TTL cleanup thread panicked");
                } else {
                    info!("Stopped TTL cleanup thread");
                }
            }
        }
    }
}

fn run<T: Sweep>(signal: &StopSignal, target: &Weak<T>, interval: Duration) {
    loop {
        if signal.wait(interval) {
            break;
        }

        let Some(target) = target.upgrade() else {
            debug!("Cache dropped, nothing left to clean");
            break;
        };

        let removed = target.sweep();
        if removed > 0 {
            info!("TTL cleanup: removed {} expired entries", removed);
        } else {
            debug!("TTL cleanup: no expired entries found");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[derive(Default)]
    struct CountingTarget {
        sweeps: AtomicUsize,
    }

    impl Sweep for CountingTarget {
        fn sweep(&self) -> usize {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            1
        }
    }

    fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    #[test]
    fn test_sweeper_runs_periodically() {
        let target = Arc::new(CountingTarget::default());
        let sweeper = Sweeper::spawn(Arc::downgrade(&target), Duration::from_millis(10)).unwrap();

        assert!(wait_until(Duration::from_secs(2), || {
            target.sweeps.load(Ordering::SeqCst) >= 3
        }));

        sweeper.stop();
    }

    #[test]
    fn test_sweeper_stops_promptly_mid_interval() {
        let target = Arc::new(CountingTarget::default());
        let sweeper = Sweeper::spawn(Arc::downgrade(&target), Duration::from_secs(3600)).unwrap();
        assert!(sweeper.is_running());

        let start = Instant::now();
        sweeper.stop();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(target.sweeps.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_sweeps_after_stop() {
        let target = Arc::new(CountingTarget::default());
        let sweeper = Sweeper::spawn(Arc::downgrade(&target), Duration::from_millis(5)).unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            target.sweeps.load(Ordering::SeqCst) >= 1
        }));

        sweeper.stop();
        let after_stop = target.sweeps.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(target.sweeps.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_sweeper_exits_when_target_dropped() {
        let target = Arc::new(CountingTarget::default());
        let sweeper = Sweeper::spawn(Arc::downgrade(&target), Duration::from_millis(10)).unwrap();

        drop(target);

        assert!(wait_until(Duration::from_secs(2), || !sweeper.is_running()));
        sweeper.stop();
    }
}
