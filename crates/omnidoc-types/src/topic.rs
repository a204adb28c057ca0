//! Notification topic names.
//!
//! Implicit topics (`agency:{agence}`, `admins`, `controleurs`) are joined by
//! the server at connection time. Entity topics (`{type}:{id}`) are joined
//! and left on client request.

use crate::{EntityKind, Role};
use std::fmt;
use thiserror::Error;

/// Errors produced when a client names a topic it may not join.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),
    #[error("invalid entity id")]
    InvalidEntityId,
}

/// A fan-out group in the notification hub.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every channel whose principal belongs to the agency.
    Agency(String),
    /// Every administrator channel.
    Admins,
    /// Every controleur channel.
    Controleurs,
    /// Fine-grained updates for a single record.
    Entity { kind: EntityKind, id: i64 },
}

impl Topic {
    /// Builds an entity topic from the `{type, id}` pair a client sends.
    ///
    /// The id must be a positive record id; `"007"` names the same topic as
    /// `7`.
    pub fn entity(kind: &str, id: &str) -> Result<Self, TopicError> {
        let kind = EntityKind::parse(kind)
            .ok_or_else(|| TopicError::UnknownEntityType(kind.to_string()))?;
        let id = id
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or(TopicError::InvalidEntityId)?;
        Ok(Self::Entity { kind, id })
    }

    /// Builds the entity topic for a record.
    pub fn for_record(kind: EntityKind, id: i64) -> Self {
        Self::Entity { kind, id }
    }

    /// The topic every user of a role joins automatically, if any.
    pub fn for_role(role: Role) -> Option<Self> {
        match role {
            Role::Admin => Some(Self::Admins),
            Role::Controleur => Some(Self::Controleurs),
            Role::Saisie => None,
        }
    }

}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agency(agence) => write!(f, "agency:{}", agence),
            Self::Admins => f.write_str("admins"),
            Self::Controleurs => f.write_str("controleurs"),
            Self::Entity { kind, id } => write!(f, "{}:{}", kind, id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_names() {
        assert_eq!(Topic::Agency("A1".into()).to_string(), "agency:A1");
        assert_eq!(Topic::Admins.to_string(), "admins");
        assert_eq!(
            Topic::for_record(EntityKind::Document, 42).to_string(),
            "document:42"
        );
    }

    #[test]
    fn client_entity_topics_are_validated() {
        assert_eq!(
            Topic::entity("abonne", "7"),
            Ok(Topic::Entity {
                kind: EntityKind::Abonne,
                id: 7
            })
        );
        assert_eq!(
            Topic::entity("abonne", "007"),
            Ok(Topic::for_record(EntityKind::Abonne, 7))
        );
        assert_eq!(Topic::entity("abonne", "-3"), Err(TopicError::InvalidEntityId));
        assert_eq!(Topic::entity("abonne", "x12"), Err(TopicError::InvalidEntityId));
        assert_eq!(
            Topic::entity("agency", "A1"),
            Err(TopicError::UnknownEntityType("agency".into()))
        );
        assert_eq!(Topic::entity("abonne", ""), Err(TopicError::InvalidEntityId));
        assert_eq!(
            Topic::entity("abonne", "1:admins"),
            Err(TopicError::InvalidEntityId)
        );
    }

    #[test]
    fn role_topics() {
        assert_eq!(Topic::for_role(Role::Admin), Some(Topic::Admins));
        assert_eq!(Topic::for_role(Role::Controleur), Some(Topic::Controleurs));
        assert_eq!(Topic::for_role(Role::Saisie), None);
    }
}
