//! Application lifecycle events.
//!
//! The host application reports foreground/background transitions to a [`LifecycleHub`];
//! interested components subscribe a [`LifecycleObserver`]. Observers can also be invoked
//! directly, which is how tests simulate the app going to the background.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Application run state as reported by the host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    Active,
    Inactive,
    Background,
}

impl AppState {
    /// Inactive and background both count as "not in front of the user"
    pub fn is_away(self) -> bool {
        matches!(self, AppState::Inactive | AppState::Background)
    }
}

/// Receives lifecycle transitions
pub trait LifecycleObserver: Send + Sync {
    /// The app returned to the foreground
    fn on_foreground(&self) {}

    /// The app left the foreground; `state` is the state it moved to
    fn on_background(&self, state: AppState);
}

/// Something observers can subscribe to
pub trait LifecycleSource: Send + Sync {
    fn subscribe(&self, observer: Arc<dyn LifecycleObserver>) -> Subscription;
}

type ObserverMap = DashMap<u64, Arc<dyn LifecycleObserver>>;

/// Active subscription; unsubscribes when dropped
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    observers: Weak<ObserverMap>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(observers) = self.observers.upgrade() {
            observers.remove(&self.id);
        }
    }
}

/// Fans lifecycle transitions out to subscribed observers
pub struct LifecycleHub {
    current: Mutex<AppState>,
    observers: Arc<ObserverMap>,
    next_id: AtomicU64,
}

impl LifecycleHub {
    /// Create a hub; the app starts in the foreground
    pub fn new() -> Self {
        Self::with_state(AppState::Active)
    }

    pub fn with_state(state: AppState) -> Self {
        Self {
            current: Mutex::new(state),
            observers: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn current(&self) -> AppState {
        *self.current.lock()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Report a new app state, notifying observers on foreground/background edges
    pub fn transition(&self, next: AppState) {
        let previous = {
            let mut current = self.current.lock();
            std::mem::replace(&mut *current, next)
        };
        debug!(from = ?previous, to = ?next, "App state changed");

        // snapshot so observers may unsubscribe from inside a callback
        let observers: Vec<_> = self.observers.iter().map(|e| e.value().clone()).collect();

        if previous == AppState::Active && next.is_away() {
            for observer in observers {
                observer.on_background(next);
            }
        } else if previous.is_away() && next == AppState::Active {
            for observer in observers {
                observer.on_foreground();
            }
        }
    }
}

impl Default for LifecycleHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleSource for LifecycleHub {
    fn subscribe(&self, observer: Arc<dyn LifecycleObserver>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.insert(id, observer);
        Subscription {
            id,
            observers: Arc::downgrade(&self.observers),
        }
    }
}
