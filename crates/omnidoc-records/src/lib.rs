//! Entity services data layer for Omnidoc.
//!
//! CRUD for subscribers (abonnés), their spouses, children and documents,
//! and staff users, plus the reporting reads. Every function takes a
//! `&Connection`, so callers decide whether it runs inside a transaction
//! (a `rusqlite::Transaction` derefs to `Connection`).
//!
//! Subscriber access is filtered by [`AccessScope`]: records outside the
//! caller's agency behave as if they did not exist. Nested records take the
//! owning [`Abonne`], which can only be obtained through a scoped lookup.

pub mod abonnes;
pub mod conjoints;
pub mod documents;
pub mod enfants;
mod error;
mod query;
mod scope;
pub mod stats;
pub mod users;

pub use abonnes::{Abonne, AbonneDetail, AbonneFilter, AbonneInput, DeletedAbonne};
pub use conjoints::{Conjoint, ConjointInput};
pub use documents::{Document, NewDocument, CERTIFICATE_TYPE};
pub use enfants::{Enfant, EnfantInput};
pub use error::RecordError;
pub use scope::{record_agency, AccessScope};
pub use stats::{Bucket, RapportFilter, RapportRow, Statistiques};
pub use users::{User, UserInput};
