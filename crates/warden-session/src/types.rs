//! Core identity and state types for sessions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a transport connection, assigned by the substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a connection id from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for ConnectionId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Identity of the role a session was authenticated as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleId(u64);

impl RoleId {
    /// Creates a role id from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "role-{}", self.0)
    }
}

/// Progress of a session through the handshake.
///
/// Only ever advances `Unkeyed -> Keyed -> Authenticated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleState {
    /// No key exchange has happened yet.
    #[default]
    Unkeyed,
    /// A session secret is established.
    Keyed,
    /// An external authority has vouched for the peer.
    Authenticated(RoleId),
}

impl RoleState {
    /// Short name used in logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Unkeyed => "unkeyed",
            Self::Keyed => "keyed",
            Self::Authenticated(_) => "authenticated",
        }
    }

    /// True once a session secret exists.
    #[must_use]
    pub const fn is_keyed(&self) -> bool {
        !matches!(self, Self::Unkeyed)
    }

    /// True once authenticated.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// The authenticated role, if any.
    #[must_use]
    pub const fn role(&self) -> Option<RoleId> {
        match self {
            Self::Authenticated(role) => Some(*role),
            _ => None,
        }
    }
}

impl fmt::Display for RoleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authenticated(role) => write!(f, "authenticated({role})"),
            other => f.write_str(other.name()),
        }
    }
}
