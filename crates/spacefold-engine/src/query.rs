//! Result sets: reactive read-only views over the object graph.
//!
//! A result set pairs a getter (a snapshot function over the item
//! manager) with the manager's change-event stream. Every change
//! re-invokes the getter; subscribers are notified only when the computed
//! result actually differs. The subscription is non-owning: dropping it
//! unregisters the listener, and a result set never mutates item state.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::error::{EngineError, Result};
use crate::item::ItemEvent;

/// Capacity of each subscription's delivery channel.
const SUBSCRIPTION_CAPACITY: usize = 64;

/// A reactive, predicate-filtered read view.
///
/// `T` is whatever the getter computes — typically a `Vec<Item>` snapshot
/// or a single looked-up value.
pub struct ResultSet<T> {
    getter: Arc<dyn Fn() -> T + Send + Sync>,
    events: broadcast::Sender<ItemEvent>,
}

impl<T> ResultSet<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    /// Build a result set from an update-event source and a getter.
    pub fn new(
        events: broadcast::Sender<ItemEvent>,
        getter: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            getter: Arc::new(getter),
            events,
        }
    }

    /// Evaluate the getter right now.
    pub fn current(&self) -> T {
        (self.getter)()
    }

    /// Subscribe to changes of the computed result.
    ///
    /// The returned subscription yields a value whenever the result
    /// differs from the previously delivered one. No debouncing: every
    /// distinct result is delivered (batching is a caller concern).
    /// Dropping the subscription unregisters the listener.
    pub fn subscribe(&self) -> Subscription<T> {
        let getter = Arc::clone(&self.getter);
        let mut events = self.events.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);

        let task = tokio::spawn(async move {
            let mut last = getter();
            loop {
                match events.recv().await {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        let next = getter();
                        if next != last {
                            last = next.clone();
                            if tx.send(next).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Subscription { rx, task }
    }

    /// Resolve with the first result matching the predicate.
    ///
    /// Checks the current value before listening, so an already-true
    /// condition resolves immediately without waiting for a new event.
    pub async fn wait_for(&self, predicate: impl Fn(&T) -> bool) -> Result<T> {
        // Register for events before the initial check so a change
        // landing in between cannot be missed.
        let mut events = self.events.subscribe();

        let current = self.current();
        if predicate(&current) {
            return Ok(current);
        }

        loop {
            match events.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                    let value = self.current();
                    if predicate(&value) {
                        return Ok(value);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(EngineError::EventStreamClosed);
                }
            }
        }
    }
}

/// A live change subscription. Dropping it unsubscribes.
pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
    task: JoinHandle<()>,
}

impl<T> Subscription<T> {
    /// Receive the next changed result, or `None` once the source closes.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
