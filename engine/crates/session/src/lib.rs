use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of the relay a connection sits on.
///
/// Assigned once during the handshake and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionRole {
    /// Trusted game server: pushes positions, receives commands.
    Producer,
    /// Browser: only receives snapshots.
    Consumer,
}

impl ConnectionRole {
    /// Resolve the role for a handshake credential.
    ///
    /// Anything other than an exact match with a non-empty shared secret
    /// degrades to `Consumer`; the handshake itself never fails.
    pub fn from_credential(token: Option<&str>, shared_secret: &str) -> Self {
        match token {
            Some(t) if !shared_secret.is_empty() && t == shared_secret => Self::Producer,
            _ => Self::Consumer,
        }
    }
}

/// Where an outgoing frame should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputTarget {
    Session(SessionId),
    Group(ConnectionRole),
}

#[derive(Debug, Clone)]
pub struct SessionOutput {
    pub target: OutputTarget,
    pub text: String,
}

impl SessionOutput {
    pub fn new(session_id: SessionId, text: impl Into<String>) -> Self {
        Self {
            target: OutputTarget::Session(session_id),
            text: text.into(),
        }
    }

    /// Fan-out frame for every connection holding `role`.
    pub fn to_group(role: ConnectionRole, text: impl Into<String>) -> Self {
        Self {
            target: OutputTarget::Group(role),
            text: text.into(),
        }
    }
}

/// Tracks the role of every live connection.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    roles: BTreeMap<SessionId, ConnectionRole>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection. A repeated id keeps its original role.
    pub fn register(&mut self, session_id: SessionId, role: ConnectionRole) {
        if let Some(existing) = self.roles.get(&session_id) {
            tracing::warn!(?session_id, ?existing, "connection registered twice, keeping first role");
            return;
        }
        self.roles.insert(session_id, role);
    }

    pub fn role_of(&self, session_id: SessionId) -> Option<ConnectionRole> {
        self.roles.get(&session_id).copied()
    }

    /// Forget a connection, returning the role it held.
    pub fn remove(&mut self, session_id: SessionId) -> Option<ConnectionRole> {
        self.roles.remove(&session_id)
    }

    pub fn count(&self, role: ConnectionRole) -> usize {
        self.roles.values().filter(|r| **r == role).count()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
