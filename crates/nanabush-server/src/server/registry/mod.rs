//! In-memory registry of active client sessions.
//!
//! The [`ClientRegistry`] owns every [`ClientSession`] and is the only state
//! shared between concurrently executing calls. It handles registration,
//! heartbeat validation, expiry and idle cleanup.
//!
//! ## Locking
//!
//! The session table sits behind a single [`RwLock`]:
//!
//! - [`register`](ClientRegistry::register),
//!   [`heartbeat`](ClientRegistry::heartbeat) and
//!   [`cleanup`](ClientRegistry::cleanup) take the write lock.
//! - [`snapshot`](ClientRegistry::snapshot) and
//!   [`count`](ClientRegistry::count) take the read lock.
//!
//! Each operation holds the lock for one short critical section and copies out
//! whatever it returns before releasing it, so callers never observe a
//! half-updated session and never hold a reference into the table.

mod clock;
mod session;

#[cfg(test)]
pub use clock::ManualClock;
pub use clock::{Clock, SystemClock};
pub use session::{ClientSession, HeartbeatOutcome, RegisterParams, Registration};

use core::time::Duration;
use nanabush_core::{Error, Result, types};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Timing policy applied to every session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Cadence reported to clients in every registration/heartbeat response.
    pub heartbeat_interval: Duration,
    /// Registrations older than this are evicted on their next heartbeat.
    pub registration_ttl: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            heartbeat_interval: types::HEARTBEAT_INTERVAL,
            registration_ttl: types::REGISTRATION_TTL,
        }
    }
}

struct Table {
    sessions: HashMap<String, ClientSession>,
    // Never reset, so identifiers stay unique for the process lifetime even
    // after sessions are removed.
    issued: u64,
}

/// Thread-safe table of active client sessions.
pub struct ClientRegistry<C = SystemClock> {
    table: RwLock<Table>,
    policy: SessionPolicy,
    clock: C,
}

impl ClientRegistry<SystemClock> {
    /// Creates an empty registry backed by the system clock.
    pub fn new(policy: SessionPolicy) -> Self {
        Self::with_clock(policy, SystemClock)
    }
}

impl<C: Clock> ClientRegistry<C> {
    /// Creates an empty registry reading time from `clock`.
    pub fn with_clock(policy: SessionPolicy, clock: C) -> Self {
        Self {
            table: RwLock::new(Table {
                sessions: HashMap::new(),
                issued: 0,
            }),
            policy,
            clock,
        }
    }

    pub const fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Current time according to the registry's clock.
    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    /// Registers a new client session.
    ///
    /// Both timestamps of the new session are set to now. The returned
    /// expiry is `now + registration_ttl`, capped at `now + MAX_TIMING` if
    /// that sum is not representable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if `params.name` is empty. Nothing is
    /// stored in that case.
    pub fn register(&self, params: RegisterParams) -> Result<Registration> {
        Error::require("client_name", &params.name)?;

        let now = self.clock.now();
        let mut table = self.table.write();

        table.issued += 1;
        let session_id = format!("client-{}-{}", unix_secs(now), table.issued);

        let session = ClientSession {
            id: session_id.clone(),
            name: params.name,
            version: params.version,
            namespace: params.namespace,
            metadata: params.metadata,
            registered_at: now,
            last_heartbeat: now,
        };
        table.sessions.insert(session_id.clone(), session);
        let total = table.sessions.len();
        drop(table);

        tracing::info!(session_id = %session_id, total_clients = total, "Client registered");

        Ok(Registration {
            session_id,
            expires_at: now
                .checked_add(self.policy.registration_ttl)
                .or_else(|| now.checked_add(types::MAX_TIMING))
                .unwrap_or(now),
        })
    }

    /// Validates and refreshes a session.
    ///
    /// Checks, in order: the session exists, the name matches the one it was
    /// registered with, and the registration is still within its validity
    /// window. Only a session passing all three has its heartbeat refreshed;
    /// an expired one is evicted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if either argument is empty. Session
    /// problems are reported through [`HeartbeatOutcome`], never as errors.
    pub fn heartbeat(&self, session_id: &str, name: &str) -> Result<HeartbeatOutcome> {
        Error::require("client_id", session_id)?;
        Error::require("client_name", name)?;

        let now = self.clock.now();
        let mut table = self.table.write();

        let Some(session) = table.sessions.get_mut(session_id) else {
            drop(table);
            tracing::info!(session_id, name, "Heartbeat from unknown client");
            return Ok(HeartbeatOutcome::UnknownSession);
        };

        if session.name != name {
            let expected = session.name.clone();
            drop(table);
            tracing::warn!(
                session_id,
                expected = %expected,
                got = name,
                "Heartbeat client name mismatch"
            );
            return Ok(HeartbeatOutcome::NameMismatch);
        }

        if session.age(now) > self.policy.registration_ttl {
            table.sessions.remove(session_id);
            drop(table);
            tracing::info!(session_id, name, "Client registration expired");
            return Ok(HeartbeatOutcome::Expired);
        }

        session.last_heartbeat = now.max(session.registered_at);
        drop(table);

        tracing::debug!(session_id, name, "Heartbeat acknowledged");
        Ok(HeartbeatOutcome::Accepted)
    }

    /// Returns copies of all sessions, ordered by session identifier.
    pub fn snapshot(&self) -> Vec<ClientSession> {
        let mut sessions: Vec<ClientSession> =
            self.table.read().sessions.values().cloned().collect();
        sessions.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        sessions
    }

    /// Number of active sessions.
    pub fn count(&self) -> usize {
        self.table.read().sessions.len()
    }

    /// Removes every session idle for longer than `max_idle` and returns how
    /// many were removed.
    pub fn cleanup(&self, max_idle: Duration) -> usize {
        let now = self.clock.now();
        let mut table = self.table.write();
        let before = table.sessions.len();

        table.sessions.retain(|id, session| {
            let keep = session.idle(now) <= max_idle;
            if !keep {
                tracing::info!(
                    session_id = %id,
                    name = %session.name,
                    idle_secs = session.idle(now).as_secs(),
                    "Removing expired client"
                );
            }
            keep
        });

        let remaining = table.sessions.len();
        drop(table);

        let removed = before - remaining;
        if removed > 0 {
            tracing::info!(removed, remaining, "Cleaned up expired clients");
        }
        removed
    }
}

fn unix_secs(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
