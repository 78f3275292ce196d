//! Synchronization between the exit observer and the cancellation observer
//!
//! The two observers of a run fire from different places: the exit observer
//! from the task waiting on the child, the cancellation observer from
//! whichever thread cancels the token. [`RunGuard`] decides which of them
//! finalizes the run and [`CompletionLatch`] carries the winner's signal to
//! the waiting executor.

use futures::channel::oneshot;
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single-assignment slot read by at most one waiter
///
/// The first [`fulfill`](Self::fulfill) wins; later attempts are no-ops.
#[derive(Debug)]
pub struct CompletionLatch<T> {
    sender: Mutex<Option<oneshot::Sender<T>>>,
    receiver: Mutex<Option<oneshot::Receiver<T>>>,
}

impl<T> CompletionLatch<T> {
    /// Create a pending latch
    pub fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Fulfill the latch
    ///
    /// Returns false, dropping `value`, if the latch was already fulfilled.
    pub fn fulfill(&self, value: T) -> bool {
        let sender = lock(&self.sender).take();
        match sender {
            Some(sender) => {
                // A waiter that went away does not undo the fulfillment.
                let _ = sender.send(value);
                true
            }
            None => false,
        }
    }

    /// Whether the latch has been fulfilled
    pub fn is_fulfilled(&self) -> bool {
        lock(&self.sender).is_none()
    }

    /// Wait for the value
    ///
    /// Returns `None` if another caller already waited on this latch.
    pub async fn wait(&self) -> Option<T> {
        let receiver = lock(&self.receiver).take()?;
        receiver.await.ok()
    }
}

impl<T> Default for CompletionLatch<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// The process is running and nobody has claimed the outcome
    Running,
    /// The process exited before cancellation
    Completed,
    /// Cancellation won the race
    Cancelled,
}

/// Mutex-guarded [`RunState`] that leaves `Running` exactly once
#[derive(Debug)]
pub struct RunGuard {
    state: Mutex<RunState>,
}

impl RunGuard {
    /// Create a guard in the `Running` state
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RunState::Running),
        }
    }

    /// Move from `Running` to `to`
    ///
    /// Returns true for the single caller that performs the transition. The
    /// lock is held only for the check-and-set.
    pub fn try_transition(&self, to: RunState) -> bool {
        if to == RunState::Running {
            return false;
        }

        let mut state = lock(&self.state);
        if *state != RunState::Running {
            return false;
        }
        *state = to;
        true
    }

    /// The current state
    pub fn state(&self) -> RunState {
        *lock(&self.state)
    }
}

impl Default for RunGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_second_fulfill_is_noop() {
        let latch = CompletionLatch::new();
        assert!(!latch.is_fulfilled());

        assert!(latch.fulfill(1));
        assert!(!latch.fulfill(2));
        assert!(latch.is_fulfilled());

        assert_eq!(smol::block_on(latch.wait()), Some(1));
    }

    #[test]
    fn test_single_waiter() {
        let latch = CompletionLatch::new();
        latch.fulfill("done");

        assert_eq!(smol::block_on(latch.wait()), Some("done"));
        assert_eq!(smol::block_on(latch.wait()), None);
    }

    #[smol_potat::test]
    async fn test_wait_before_fulfill() {
        let latch = Arc::new(CompletionLatch::new());
        let remote = latch.clone();

        let filler = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            remote.fulfill(7)
        });

        assert_eq!(latch.wait().await, Some(7));
        assert!(filler.join().unwrap());
    }

    #[test]
    fn test_run_state_transitions_once() {
        let guard = RunGuard::new();
        assert_eq!(guard.state(), RunState::Running);

        assert!(guard.try_transition(RunState::Cancelled));
        assert!(!guard.try_transition(RunState::Completed));
        assert!(!guard.try_transition(RunState::Cancelled));
        assert_eq!(guard.state(), RunState::Cancelled);
    }

    #[test]
    fn test_cannot_transition_back_to_running() {
        let guard = RunGuard::new();
        assert!(!guard.try_transition(RunState::Running));
        assert!(guard.try_transition(RunState::Completed));
        assert!(!guard.try_transition(RunState::Running));
        assert_eq!(guard.state(), RunState::Completed);
    }

    #[test]
    fn test_concurrent_transitions_have_one_winner() {
        for _ in 0..50 {
            let guard = Arc::new(RunGuard::new());
            let latch = Arc::new(CompletionLatch::new());
            let winners = Arc::new(AtomicUsize::new(0));

            let handles: Vec<_> = [RunState::Completed, RunState::Cancelled]
                .into_iter()
                .cycle()
                .take(8)
                .map(|target| {
                    let guard = guard.clone();
                    let latch = latch.clone();
                    let winners = winners.clone();
                    std::thread::spawn(move || {
                        if guard.try_transition(target) {
                            winners.fetch_add(1, Ordering::SeqCst);
                            assert!(latch.fulfill(target));
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            assert_eq!(winners.load(Ordering::SeqCst), 1);
            assert_eq!(smol::block_on(latch.wait()), Some(guard.state()));
        }
    }
}
