//! Coalescing of rapid successive writes.
//!
//! A dragged slider produces a burst of requests; only the last value should
//! reach the appliance once the input settles.

use futures_util::future::BoxFuture;
use log::{debug, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type Action<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

struct State<T> {
    value: Option<T>,
    pending: Option<CancellationToken>,
}

/// Runs an action with the last requested value once no new value has
/// arrived for the quiet period.
///
/// Each [`call`](Debouncer::call) replaces the stored value and restarts the
/// timer. Must be used from within a tokio runtime.
pub struct Debouncer<T> {
    delay: Duration,
    state: Arc<Mutex<State<T>>>,
    action: Action<T>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F>(delay: Duration, action: F) -> Self
    where
        F: Fn(T) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        Self {
            delay,
            state: Arc::new(Mutex::new(State {
                value: None,
                pending: None,
            })),
            action: Arc::new(action),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Store `value` and (re)start the quiet period.
    pub fn call(&self, value: T) {
        let token = CancellationToken::new();
        {
            let mut state = self.state.lock();
            state.value = Some(value);
            if let Some(previous) = state.pending.replace(token.clone()) {
                previous.cancel();
            }
        }

        let state = self.state.clone();
        let action = self.action.clone();
        let delay = self.delay;

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let value = {
                        let mut state = state.lock();
                        // A newer call may have raced the timer
                        if token.is_cancelled() {
                            return;
                        }
                        state.pending = None;
                        state.value.take()
                    };
                    match value {
                        Some(value) => {
                            debug!("Quiet period elapsed, firing");
                            action(value).await;
                        }
                        None => warn!("Debouncer fired without a value"),
                    }
                }
            }
        });
    }

    /// True while a value waits for the quiet period to end.
    pub fn is_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    /// Drop the waiting value without firing.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        if let Some(token) = state.pending.take() {
            token.cancel();
        }
        state.value = None;
    }

    /// Fire the waiting value now instead of after the quiet period.
    pub async fn flush(&self) {
        let value = {
            let mut state = self.state.lock();
            if let Some(token) = state.pending.take() {
                token.cancel();
            }
            state.value.take()
        };
        if let Some(value) = value {
            (self.action)(value).await;
        }
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Some(token) = self.state.lock().pending.take() {
            token.cancel();
        }
    }
}
