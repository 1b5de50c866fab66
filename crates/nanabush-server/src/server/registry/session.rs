use core::time::Duration;
use std::collections::HashMap;
use std::time::SystemTime;

/// One registered client, as seen from outside the registry.
///
/// The registry hands out clones of its records; mutating a `ClientSession`
/// never affects registry state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientSession {
    pub id: String,
    pub name: String,
    pub version: String,
    pub namespace: String,
    pub metadata: HashMap<String, String>,
    pub registered_at: SystemTime,
    /// Never earlier than `registered_at`.
    pub last_heartbeat: SystemTime,
}

impl ClientSession {
    /// Time elapsed since registration, saturating at zero if the wall clock
    /// moved backwards.
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.registered_at).unwrap_or_default()
    }

    /// Time elapsed since the last accepted heartbeat, saturating at zero.
    pub fn idle(&self, now: SystemTime) -> Duration {
        now.duration_since(self.last_heartbeat).unwrap_or_default()
    }
}

/// Input of [`ClientRegistry::register`](super::ClientRegistry::register).
#[derive(Clone, Debug, Default)]
pub struct RegisterParams {
    pub name: String,
    pub version: String,
    pub namespace: String,
    pub metadata: HashMap<String, String>,
}

/// Result of a successful registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub session_id: String,
    pub expires_at: SystemTime,
}

/// How a heartbeat was resolved.
///
/// Every variant other than [`HeartbeatOutcome::Accepted`] asks the client to
/// register again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// The session was refreshed.
    Accepted,
    /// No session with this identifier exists (never registered, expired or
    /// cleaned up).
    UnknownSession,
    /// The session exists but was registered under a different name.
    NameMismatch,
    /// The registration outlived its validity window and was evicted.
    Expired,
}

impl HeartbeatOutcome {
    pub const fn accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub const fn re_register_required(self) -> bool {
        !self.accepted()
    }

    pub const fn message(self) -> &'static str {
        match self {
            Self::Accepted => "Heartbeat acknowledged",
            Self::UnknownSession => "Client not registered or expired",
            Self::NameMismatch => "Client name mismatch",
            Self::Expired => "Registration expired",
        }
    }
}
