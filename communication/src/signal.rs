//! The one-shot stop signal broadcast to all workers.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Edge-triggered flag that initiates teardown.
///
/// The scheduler and every channel share one instance. Once set it stays set;
/// blocked channel operations observe it on their next poll interval.
#[derive(Debug, Default)]
pub struct StopSignal {
    state: Mutex<bool>,
    cond: Condvar,
}

impl StopSignal {
    pub fn new() -> StopSignal {
        StopSignal::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        // A worker can only poison this mutex by panicking between lock and
        // unlock of a plain bool store, in which case the value is still sound.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self) {
        let mut set = self.lock();
        if !*set {
            *set = true;
            self.cond.notify_all();
        }
    }

    pub fn is_set(&self) -> bool {
        *self.lock()
    }

    /// Blocks until the signal is set or `timeout` elapses.
    ///
    /// Returns `true` if the signal was set. `None` waits indefinitely.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut set = self.lock();
        match timeout {
            None => {
                while !*set {
                    set = self
                        .cond
                        .wait(set)
                        .unwrap_or_else(|e| e.into_inner());
                }
                true
            }
            Some(timeout) => {
                let (set, _) = self
                    .cond
                    .wait_timeout_while(set, timeout, |set| !*set)
                    .unwrap_or_else(|e| e.into_inner());
                *set
            }
        }
    }
}
