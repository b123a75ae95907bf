//! Connectivity tracking.
//!
//! A [`ConnectivityProbe`] reports the raw reachability signal. The
//! [`ConnectivityMonitor`] turns it into edges: listeners hear about each
//! flip exactly once, and repeated identical readings are silent.

use crate::events::{Listener, ListenerId, Listeners};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Source of the reachability signal.
pub trait ConnectivityProbe: Send + Sync {
    /// Returns true if the remote store is believed reachable.
    fn is_online(&self) -> bool;
}

/// A probe whose answer is set by hand.
#[derive(Debug)]
pub struct ManualProbe {
    online: AtomicBool,
}

impl ManualProbe {
    /// Creates a probe with an initial answer.
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    /// Changes the answer returned by the next probe.
    pub fn set(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Default for ManualProbe {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityProbe for ManualProbe {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// A connectivity transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// Offline to online.
    Online,
    /// Online to offline.
    Offline,
}

impl fmt::Display for ConnectivityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectivityEvent::Online => "online",
            ConnectivityEvent::Offline => "offline",
        })
    }
}

/// Tracks the online/offline state and publishes its edges.
pub struct ConnectivityMonitor {
    probe: Arc<dyn ConnectivityProbe>,
    state: watch::Sender<bool>,
    listeners: Listeners<ConnectivityEvent>,
}

impl ConnectivityMonitor {
    /// Creates a monitor seeded from the probe's current answer.
    pub fn new(probe: Arc<dyn ConnectivityProbe>) -> Self {
        let (state, _) = watch::channel(probe.is_online());
        Self {
            probe,
            state,
            listeners: Listeners::new(),
        }
    }

    /// Returns the last known state.
    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Re-reads the probe and publishes an edge if the state changed.
    pub fn refresh(&self) -> Option<ConnectivityEvent> {
        self.set_online(self.probe.is_online())
    }

    /// Records a reading. Returns the edge if this reading flipped the state.
    pub fn set_online(&self, online: bool) -> Option<ConnectivityEvent> {
        let flipped = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if !flipped {
            return None;
        }

        let event = if online {
            ConnectivityEvent::Online
        } else {
            ConnectivityEvent::Offline
        };
        info!(state = %event, "connectivity changed");
        self.listeners.emit(&event);
        Some(event)
    }

    /// Registers a callback for connectivity edges.
    pub fn subscribe(&self, listener: Listener<ConnectivityEvent>) -> ListenerId {
        self.listeners.add(listener)
    }

    /// Removes a connectivity callback.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Returns a receiver that wakes on every state change.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}
