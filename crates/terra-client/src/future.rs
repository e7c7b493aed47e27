//! `ResolvedFuture`, a transport-neutral handle on one in-flight call.
//!
//! The transport side holds a [`Completer`] and resolves it exactly once.
//! The caller can block on [`ResolvedFuture::get`], poll
//! [`ResolvedFuture::is_done`], register callbacks, cancel, or `.await` it.
//!
//! The first outcome wins: a reply arriving after a cancel (or a cancel
//! arriving after a reply) is discarded.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use crate::error::RpcFailure;

type Outcome<T> = Result<T, RpcFailure>;
type Callback<T> = Box<dyn FnOnce(&Outcome<T>) + Send>;
type CancelHook = Box<dyn FnOnce() + Send>;

enum State<T> {
    Pending {
        callbacks: Vec<Callback<T>>,
        wakers: Vec<Waker>,
    },
    Done(Outcome<T>),
}

struct Shared<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
    cancel_hook: Mutex<Option<CancelHook>>,
}

impl<T: Clone> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store the outcome if none is stored yet. Returns whether it was stored.
    fn resolve(&self, outcome: Outcome<T>) -> bool {
        let mut state = self.lock();
        let (callbacks, wakers) = match &mut *state {
            State::Done(_) => return false,
            State::Pending { callbacks, wakers } => {
                (std::mem::take(callbacks), std::mem::take(wakers))
            }
        };
        let for_callbacks = (!callbacks.is_empty()).then(|| outcome.clone());
        *state = State::Done(outcome);
        drop(state);

        self.ready.notify_all();
        for waker in wakers {
            waker.wake();
        }
        if let Some(outcome) = for_callbacks {
            for callback in callbacks {
                callback(&outcome);
            }
        }
        true
    }
}

/// Transport-side half. Dropping it without completing leaves the future
/// pending; the channel always completes or fails its calls instead.
pub struct Completer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone> Completer<T> {
    /// Deliver the outcome. Returns false if the future was already resolved.
    pub fn complete(self, outcome: Outcome<T>) -> bool {
        self.shared.resolve(outcome)
    }
}

/// Result handle for one call.
pub struct ResolvedFuture<T> {
    shared: Arc<Shared<T>>,
}

/// A linked future/completer pair.
pub fn pair<T: Clone>() -> (ResolvedFuture<T>, Completer<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State::Pending {
            callbacks: Vec::new(),
            wakers: Vec::new(),
        }),
        ready: Condvar::new(),
        cancel_hook: Mutex::new(None),
    });
    (
        ResolvedFuture {
            shared: shared.clone(),
        },
        Completer { shared },
    )
}

impl<T: Clone> ResolvedFuture<T> {
    /// Block the current thread until the call resolves.
    ///
    /// Do not call this from an async runtime worker thread; `.await` the
    /// future there instead.
    pub fn get(&self) -> Outcome<T> {
        let mut state = self.shared.lock();
        loop {
            if let State::Done(outcome) = &*state {
                return outcome.clone();
            }
            state = self
                .shared
                .ready
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Like [`get`](Self::get) but gives up after `timeout` with
    /// `RpcFailure::Timeout`. Giving up does not resolve the future.
    pub fn get_timeout(&self, timeout: Duration) -> Outcome<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            if let State::Done(outcome) = &*state {
                return outcome.clone();
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(RpcFailure::Timeout);
            }
            let (guard, _) = self
                .shared
                .ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            state = guard;
        }
    }

    /// Non-blocking: has the call resolved (successfully or not)?
    pub fn is_done(&self) -> bool {
        matches!(&*self.shared.lock(), State::Done(_))
    }

    /// The outcome if resolved, without blocking.
    pub fn try_get(&self) -> Option<Outcome<T>> {
        match &*self.shared.lock() {
            State::Done(outcome) => Some(outcome.clone()),
            State::Pending { .. } => None,
        }
    }

    /// Run `callback` once when the call resolves.
    ///
    /// Pending: runs on the transport's delivery task, after callbacks
    /// registered earlier. Already resolved: runs immediately on this thread.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(&Outcome<T>) + Send + 'static,
    {
        let mut state = self.shared.lock();
        match &mut *state {
            State::Pending { callbacks, .. } => callbacks.push(Box::new(callback)),
            State::Done(outcome) => {
                let outcome = outcome.clone();
                drop(state);
                callback(&outcome);
            }
        }
    }

    /// Best-effort cancel.
    ///
    /// Returns true if the future resolved to `RpcFailure::Cancelled`. If a
    /// reply had already arrived, the reply stands and this returns false.
    pub fn cancel(&self) -> bool {
        if !self.shared.resolve(Err(RpcFailure::Cancelled)) {
            return false;
        }
        let hook = self
            .shared
            .cancel_hook
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(hook) = hook {
            hook();
        }
        true
    }

    /// Installed by the transport: how to withdraw the call from the wire.
    pub(crate) fn set_cancel_hook(&self, hook: CancelHook) {
        *self
            .shared
            .cancel_hook
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(hook);
    }
}

impl<T: Clone> Future for ResolvedFuture<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.shared.lock();
        match &mut *state {
            State::Done(outcome) => Poll::Ready(outcome.clone()),
            State::Pending { wakers, .. } => {
                if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl<T> std::fmt::Debug for ResolvedFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let done = matches!(
            &*self.shared.state.lock().unwrap_or_else(|e| e.into_inner()),
            State::Done(_)
        );
        f.debug_struct("ResolvedFuture").field("done", &done).finish()
    }
}
