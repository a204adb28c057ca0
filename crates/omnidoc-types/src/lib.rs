//! Shared types for the Omnidoc subscriber-management platform.
//!
//! This crate provides the vocabulary used across every Omnidoc crate:
//! principal roles, the authenticated [`Principal`], the entity kinds that
//! flow through notifications, and notification topic names.
//!
//! No crate in the workspace depends on anything *except* `omnidoc-types` for
//! cross-cutting type definitions. This keeps the dependency graph clean and
//! prevents circular dependencies.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod topic;
pub use topic::{Topic, TopicError};

/// Role carried by every user and embedded in their bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access, including user deletion.
    Admin,
    /// Supervisor: sees every agency and manages users.
    Controleur,
    /// Data-entry clerk restricted to their own agency.
    Saisie,
}

impl Role {
    /// Returns the string label stored in the database and in tokens.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Controleur => "controleur",
            Self::Saisie => "saisie",
        }
    }

    /// Whether this role reads and writes subscribers of every agency.
    pub fn sees_all_agencies(self) -> bool {
        matches!(self, Self::Admin | Self::Controleur)
    }

    /// Whether this role may list, create and update users.
    pub fn can_manage_users(self) -> bool {
        matches!(self, Self::Admin | Self::Controleur)
    }

    /// Whether this role may delete users.
    pub fn can_delete_users(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role label.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role: {0}")]
pub struct ParseRoleError(pub String);

impl std::str::FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "controleur" => Ok(Self::Controleur),
            "saisie" => Ok(Self::Saisie),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

/// An authenticated actor, as recovered from a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Database id of the user.
    pub id: i64,
    /// Login email.
    pub email: String,
    /// Role granted to the user.
    pub role: Role,
    /// Agency the user belongs to, if any.
    pub agence: Option<String>,
}

impl Principal {
    /// Returns `true` if the principal is an administrator.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Kinds of records that produce real-time notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Abonne,
    Conjoint,
    Enfant,
    Document,
    User,
}

impl EntityKind {
    /// Every notifying entity kind.
    pub const ALL: [EntityKind; 5] = [
        Self::Abonne,
        Self::Conjoint,
        Self::Enfant,
        Self::Document,
        Self::User,
    ];

    /// Returns the wire label used in topic names and event names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Abonne => "abonne",
            Self::Conjoint => "conjoint",
            Self::Enfant => "enfant",
            Self::Document => "document",
            Self::User => "user",
        }
    }

    /// Parses a wire label.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of mutation a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutation {
    Created,
    Updated,
    Deleted,
}

impl Mutation {
    /// Builds the broadcast event name, e.g. `new_abonne` or `delete_document`.
    pub fn event_name(self, kind: EntityKind) -> String {
        let prefix = match self {
            Self::Created => "new",
            Self::Updated => "update",
            Self::Deleted => "delete",
        };
        format!("{}_{}", prefix, kind.as_str())
    }
}

/// Derived subscription status of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    /// `date_expiration` is today or later.
    #[serde(rename = "actif")]
    Active,
    /// `date_expiration` is in the past.
    #[serde(rename = "expire")]
    Expired,
}

impl SubscriptionStatus {
    /// Returns the label stored in query results and accepted in filters.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "actif",
            Self::Expired => "expire",
        }
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "actif" => Ok(Self::Active),
            "expire" => Ok(Self::Expired),
            other => Err(format!("unknown subscription status: {}", other)),
        }
    }
}
