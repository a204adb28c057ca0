//! Agency scoping of subscriber data.

use crate::query::Clauses;
use crate::RecordError;
use omnidoc_types::{EntityKind, Principal};
use rusqlite::{Connection, OptionalExtension};

/// Which subscribers a principal may read and write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessScope {
    /// Admins and controleurs: every agency.
    All,
    /// Saisie users: only their own agency.
    Agency(String),
    /// A saisie user without an agency sees nothing.
    Nothing,
}

impl AccessScope {
    pub fn for_principal(principal: &Principal) -> Self {
        if principal.role.sees_all_agencies() {
            return Self::All;
        }
        match principal.agence.as_deref().map(str::trim) {
            Some(agence) if !agence.is_empty() => Self::Agency(agence.to_string()),
            _ => Self::Nothing,
        }
    }

    /// Whether a subscriber owned by `agence` is visible.
    pub fn allows(&self, agence: Option<&str>) -> bool {
        match self {
            Self::All => true,
            Self::Agency(own) => agence == Some(own.as_str()),
            Self::Nothing => false,
        }
    }

    /// Adds the scope restriction on `column` to a WHERE clause.
    pub(crate) fn restrict(&self, clauses: &mut Clauses, column: &str) {
        match self {
            Self::All => {}
            Self::Agency(agence) => clauses.push(&format!("{} = {{}}", column), agence.clone()),
            Self::Nothing => clauses.push_raw("0"),
        }
    }

    /// The forced agency for scoped principals, `None` when unrestricted.
    pub fn forced_agency(&self) -> Option<&str> {
        match self {
            Self::Agency(agence) => Some(agence),
            _ => None,
        }
    }
}

/// Agency of the subscriber a record belongs to.
///
/// Spouses, children and documents resolve through their subscriber. User
/// records belong to no agency and are rejected.
pub fn record_agency(
    conn: &Connection,
    kind: EntityKind,
    id: i64,
) -> Result<Option<String>, RecordError> {
    let (sql, entity) = match kind {
        EntityKind::Abonne => ("SELECT agence FROM abonnes WHERE id = ?1", "abonne"),
        EntityKind::Conjoint => (
            "SELECT a.agence FROM conjoints c JOIN abonnes a ON a.id = c.abonne_id WHERE c.id = ?1",
            "conjoint",
        ),
        EntityKind::Enfant => (
            "SELECT a.agence FROM enfants e JOIN abonnes a ON a.id = e.abonne_id WHERE e.id = ?1",
            "enfant",
        ),
        EntityKind::Document => (
            "SELECT a.agence FROM documents d JOIN abonnes a ON a.id = d.abonne_id WHERE d.id = ?1",
            "document",
        ),
        EntityKind::User => {
            return Err(RecordError::Validation(
                "user records have no agency".to_string(),
            ))
        }
    };
    conn.query_row(sql, [id], |row| row.get::<_, Option<String>>(0))
        .optional()?
        .ok_or_else(|| RecordError::not_found(entity, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnidoc_types::Role;

    fn principal(role: Role, agence: Option<&str>) -> Principal {
        Principal {
            id: 1,
            email: "x@y.z".into(),
            role,
            agence: agence.map(str::to_string),
        }
    }

    #[test]
    fn roles_map_to_scopes() {
        assert_eq!(
            AccessScope::for_principal(&principal(Role::Admin, Some("A1"))),
            AccessScope::All
        );
        assert_eq!(
            AccessScope::for_principal(&principal(Role::Controleur, None)),
            AccessScope::All
        );
        assert_eq!(
            AccessScope::for_principal(&principal(Role::Saisie, Some("A1"))),
            AccessScope::Agency("A1".into())
        );
        assert_eq!(
            AccessScope::for_principal(&principal(Role::Saisie, Some("  "))),
            AccessScope::Nothing
        );
    }

    #[test]
    fn allows_only_own_agency() {
        let scope = AccessScope::Agency("A1".into());
        assert!(scope.allows(Some("A1")));
        assert!(!scope.allows(Some("A2")));
        assert!(!scope.allows(None));
        assert!(!AccessScope::Nothing.allows(Some("A1")));
        assert!(AccessScope::All.allows(None));
    }
}
