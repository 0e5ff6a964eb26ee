//! Connection supervisor.
//!
//! Owns the liveness state of every remote target. Each probe or real
//! connection attempt overwrites the target's state (no hysteresis); a state
//! change is published once as a [`Transition`] on a broadcast channel.

use crate::dialect::Dialect;
use crate::engine::{RemoteConnector, RemoteSession};
use crate::error::{SyncError, SyncResult};
use crate::types::Target;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    Unknown,
    Down,
    Up,
}

/// Point-in-time view of one remote target.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetStatus {
    pub target: Target,
    pub endpoint: String,
    pub state: LinkState,
    /// Start of the current uninterrupted Up period.
    pub up_since: Option<DateTime<Utc>>,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Edge-triggered state change of one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub target: Target,
    pub from: LinkState,
    pub to: LinkState,
    pub at: DateTime<Utc>,
}

impl Transition {
    /// A target that was known to be down answered again.
    pub fn is_recovery(&self) -> bool {
        self.from == LinkState::Down && self.to == LinkState::Up
    }
}

/// A remote target registered with the supervisor, in priority order.
pub struct RemoteSlot {
    pub target: Target,
    pub connector: Arc<dyn RemoteConnector>,
    pub connect_timeout: Duration,
}

impl RemoteSlot {
    pub fn new(target: Target, connector: Arc<dyn RemoteConnector>, connect_timeout: Duration) -> Self {
        Self {
            target,
            connector,
            connect_timeout,
        }
    }
}

pub struct ConnectionSupervisor {
    remotes: Vec<RemoteSlot>,
    /// Never held across an await point.
    state: Mutex<HashMap<Target, TargetStatus>>,
    events: broadcast::Sender<Transition>,
}

impl ConnectionSupervisor {
    pub fn new(remotes: Vec<RemoteSlot>) -> Self {
        let state = remotes
            .iter()
            .map(|slot| {
                (
                    slot.target,
                    TargetStatus {
                        target: slot.target,
                        endpoint: slot.connector.describe(),
                        state: LinkState::Unknown,
                        up_since: None,
                        last_checked: None,
                        last_error: None,
                    },
                )
            })
            .collect();
        let (events, _) = broadcast::channel(64);
        Self {
            remotes,
            state: Mutex::new(state),
            events,
        }
    }

    /// Remote targets in priority order.
    pub fn targets(&self) -> Vec<Target> {
        self.remotes.iter().map(|slot| slot.target).collect()
    }

    pub fn dialect(&self, target: Target) -> Option<Dialect> {
        self.slot(target).map(|slot| slot.connector.dialect())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Transition> {
        self.events.subscribe()
    }

    /// Opens a session, recording the outcome. Never fails: errors become `None`.
    pub async fn connect(&self, target: Target) -> Option<Box<dyn RemoteSession>> {
        self.try_connect(target).await.ok()
    }

    /// Typed variant of [`ConnectionSupervisor::connect`].
    pub async fn try_connect(&self, target: Target) -> SyncResult<Box<dyn RemoteSession>> {
        let slot = self.slot(target).ok_or_else(|| SyncError::Connect {
            target,
            message: "target not configured".to_string(),
        })?;
        let attempt = tokio::time::timeout(slot.connect_timeout, slot.connector.connect()).await;
        let result = match attempt {
            Ok(Ok(session)) => Ok(session),
            Ok(Err(e)) => Err(SyncError::Connect {
                target,
                message: e.to_string(),
            }),
            Err(_) => Err(SyncError::Timeout {
                target,
                timeout_ms: slot.connect_timeout.as_millis() as u64,
            }),
        };
        match &result {
            Ok(_) => self.record(target, true, None),
            Err(e) => {
                debug!(remote = %target, error = %e, "connect failed");
                self.record(target, false, Some(e.to_string()))
            }
        };
        result
    }

    /// Cheap probe: open a session and close it right away.
    pub async fn ping(&self, target: Target) -> bool {
        match self.try_connect(target).await {
            Ok(session) => {
                if let Err(e) = session.close().await {
                    debug!(remote = %target, error = %e, "closing probe session failed");
                }
                true
            }
            Err(_) => false,
        }
    }

    /// Pings every remote concurrently.
    pub async fn ping_all(&self) -> Vec<(Target, bool)> {
        let probes = self.remotes.iter().map(|slot| async move {
            let up = self.ping(slot.target).await;
            (slot.target, up)
        });
        join_all(probes).await
    }

    /// Downgrades a target after a failure on an already open session.
    pub fn mark_down(&self, target: Target, error: &SyncError) {
        self.record(target, false, Some(error.to_string()));
    }

    /// `Local` is assumed always reachable.
    pub fn is_active(&self, target: Target) -> bool {
        if target == Target::Local {
            return true;
        }
        self.status(target)
            .map(|status| status.state == LinkState::Up)
            .unwrap_or(false)
    }

    pub fn status(&self, target: Target) -> Option<TargetStatus> {
        self.lock_state().get(&target).cloned()
    }

    /// Status of every remote in priority order.
    pub fn snapshot(&self) -> Vec<TargetStatus> {
        let state = self.lock_state();
        self.remotes
            .iter()
            .filter_map(|slot| state.get(&slot.target).cloned())
            .collect()
    }

    /// True when `target` is Up and has not dropped since `since`.
    pub fn continuously_up_since(&self, target: Target, since: DateTime<Utc>) -> bool {
        match self.status(target) {
            Some(TargetStatus {
                state: LinkState::Up,
                up_since: Some(up_since),
                ..
            }) => up_since <= since,
            _ => false,
        }
    }

    fn slot(&self, target: Target) -> Option<&RemoteSlot> {
        self.remotes.iter().find(|slot| slot.target == target)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, HashMap<Target, TargetStatus>> {
        // A panic while holding the lock leaves plain data behind; keep using it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, target: Target, up: bool, error: Option<String>) -> Option<Transition> {
        let now = Utc::now();
        let transition = {
            let mut state = self.lock_state();
            let status = state.get_mut(&target)?;
            let from = status.state;
            let to = if up { LinkState::Up } else { LinkState::Down };
            status.state = to;
            status.last_checked = Some(now);
            if up {
                status.last_error = None;
                if from != LinkState::Up {
                    status.up_since = Some(now);
                }
            } else {
                status.up_since = None;
                status.last_error = error;
            }
            (from != to).then_some(Transition {
                target,
                from,
                to,
                at: now,
            })
        };
        if let Some(t) = transition {
            debug!(remote = %target, from = ?t.from, to = ?t.to, "link state changed");
            let _ = self.events.send(t);
        }
        transition
    }
}
