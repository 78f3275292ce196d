//! Cancellation tokens
//!
//! A [`CancellationToken`] is the trigger a caller hands to the executor to
//! give up on a run. Cancelling is idempotent. Callbacks registered with
//! [`CancellationToken::register`] run exactly once, on the thread that
//! cancels, and never while the token's lock is held. A token created with
//! [`CancellationToken::with_timeout`] cancels itself once its deadline has
//! passed and somebody observes it.

use async_channel::{Receiver, Sender};
use async_io::Timer;
use futures_lite::future;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a cancellation token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CancellationId(u64);

impl fmt::Display for CancellationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type Callback = Box<dyn FnOnce(CancellationId) + Send + 'static>;

struct State {
    /// The token that originally triggered this one, once cancelled
    cause: Option<CancellationId>,
    next_key: u64,
    callbacks: HashMap<u64, Callback>,
}

struct Inner {
    id: CancellationId,
    deadline: Option<Instant>,
    /// The token this one was linked from; its deadline is observed through us
    parent: Option<CancellationToken>,
    state: Mutex<State>,
    /// Closed on cancellation; wakes every `cancelled()` waiter
    closer: Sender<()>,
    closed: Receiver<()>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A cloneable trigger observed by the executor
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Create a token that only fires when [`cancel`](Self::cancel) is called
    pub fn new() -> Self {
        Self::with_deadline(None, None)
    }

    /// Create a token that fires after `timeout` has elapsed
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now().checked_add(timeout), None)
    }

    fn with_deadline(deadline: Option<Instant>, parent: Option<CancellationToken>) -> Self {
        let (closer, closed) = async_channel::bounded(1);
        Self {
            inner: Arc::new(Inner {
                id: CancellationId(NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed)),
                deadline,
                parent,
                state: Mutex::new(State {
                    cause: None,
                    next_key: 0,
                    callbacks: HashMap::new(),
                }),
                closer,
                closed,
            }),
        }
    }

    /// The identity of this token
    pub fn id(&self) -> CancellationId {
        self.inner.id
    }

    /// The earliest instant after which this token is cancelled, if any
    ///
    /// For a linked token this includes the deadlines of the tokens it was
    /// linked from.
    pub fn deadline(&self) -> Option<Instant> {
        let inherited = self.inner.parent.as_ref().and_then(|p| p.deadline());
        match (self.inner.deadline, inherited) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Cancel the token, running every registered callback
    pub fn cancel(&self) {
        self.cancel_with_cause(self.inner.id);
    }

    fn cancel_with_cause(&self, cause: CancellationId) {
        let callbacks = {
            let mut state = self.inner.lock();
            if state.cause.is_some() {
                return;
            }
            state.cause = Some(cause);
            std::mem::take(&mut state.callbacks)
        };

        debug!(token = %self.inner.id, cause = %cause, "cancellation requested");
        self.inner.closer.close();

        for (_, callback) in callbacks {
            run_callback(callback, cause);
        }
    }

    /// Whether the token has been cancelled, firing it if its deadline passed
    pub fn is_cancelled(&self) -> bool {
        self.fire_if_expired();
        self.inner.lock().cause.is_some()
    }

    /// The token whose cancellation caused this one to fire
    ///
    /// This is the token's own id unless it was cancelled through a link
    /// created with [`linked`](Self::linked).
    pub fn cancelled_by(&self) -> Option<CancellationId> {
        self.fire_if_expired();
        self.inner.lock().cause
    }

    /// Fire expired deadlines, the parent's first so that it is reported as the cause
    fn fire_if_expired(&self) {
        if let Some(parent) = &self.inner.parent {
            parent.fire_if_expired();
        }

        let expired = self
            .inner
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline);
        if expired {
            self.cancel();
        }
    }

    /// Resolve once the token is cancelled
    ///
    /// If the token or one it was linked from has a deadline, awaiting this
    /// future is what fires it.
    pub async fn cancelled(&self) {
        let closed = async {
            // Nothing is ever sent, so this only returns once the channel closes.
            let _ = self.inner.closed.recv().await;
        };

        match self.deadline() {
            Some(deadline) => {
                future::or(closed, async {
                    Timer::at(deadline).await;
                    self.fire_if_expired();
                    if self.is_cancelled() {
                        return;
                    }
                    // A parent whose link was dropped does not cancel us.
                    match self.inner.deadline {
                        Some(own) => {
                            Timer::at(own).await;
                            self.cancel();
                        }
                        None => future::pending::<()>().await,
                    }
                })
                .await
            }
            None => closed.await,
        }
    }

    /// Register a callback to run when the token is cancelled
    ///
    /// The callback receives the id of the token that triggered the
    /// cancellation. If the token is already cancelled the callback runs
    /// immediately on the calling thread. Dropping the returned
    /// [`Registration`] unregisters a callback that has not yet run.
    pub fn register<F>(&self, callback: F) -> Registration
    where
        F: FnOnce(CancellationId) + Send + 'static,
    {
        self.fire_if_expired();

        let mut state = self.inner.lock();
        if let Some(cause) = state.cause {
            drop(state);
            run_callback(Box::new(callback), cause);
            return Registration { slot: None };
        }

        let key = state.next_key;
        state.next_key += 1;
        state.callbacks.insert(key, Box::new(callback));

        Registration {
            slot: Some((self.inner.clone(), key)),
        }
    }

    /// Create a token that is cancelled when this one is, or after `timeout`
    ///
    /// When this token fires, by hand or by its own deadline, the returned
    /// token reports this token's id as its cause. The link lasts as long as
    /// the returned [`Registration`] is alive.
    pub fn linked(&self, timeout: Option<Duration>) -> (CancellationToken, Registration) {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        let child = CancellationToken::with_deadline(deadline, Some(self.clone()));
        let link = {
            let child = child.clone();
            self.register(move |cause| child.cancel_with_cause(cause))
        };
        (child, link)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("id", &self.inner.id)
            .field("deadline", &self.inner.deadline)
            .field("cause", &self.inner.lock().cause)
            .finish()
    }
}

/// Panics in callbacks are contained so one observer cannot break the others.
fn run_callback(callback: Callback, cause: CancellationId) {
    if panic::catch_unwind(AssertUnwindSafe(|| callback(cause))).is_err() {
        debug!(cause = %cause, "cancellation callback panicked");
    }
}

/// Keeps a cancellation callback registered; dropping it unregisters
#[must_use = "dropping a registration unregisters its callback"]
pub struct Registration {
    slot: Option<(Arc<Inner>, u64)>,
}

impl Registration {
    /// Unregister the callback
    ///
    /// Returns true if the callback was still pending, false if it already
    /// ran or is running.
    pub fn unregister(mut self) -> bool {
        self.remove()
    }

    fn remove(&mut self) -> bool {
        match self.slot.take() {
            Some((inner, key)) => inner.lock().callbacks.remove(&key).is_some(),
            None => false,
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.remove();
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("pending", &self.slot.is_some())
            .finish()
    }
}
