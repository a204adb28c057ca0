//! PDF generation for Omnidoc: subscription certificates, subscriber fact
//! sheets and the filtered subscriber report.
//!
//! Every generator returns the PDF bytes; writing them to storage and
//! registering a document row is the caller's job, so a failed render never
//! leaves a registered file behind.

mod certificate;
mod encoding;
mod fiche;
mod layout;
mod listing;

pub use certificate::{
    certificate_file_name, certificate_lines, french_date, generate_certificate, signature_token,
};
pub use encoding::to_win_ansi;
pub use fiche::generate_fiche;
pub use layout::{build_document, wrap, FlowWriter, Font, PageCanvas, TextLine, A4_HEIGHT, A4_WIDTH};
pub use listing::{generate_listing, ListingStats, ReportFilters, Share};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("pdf rendering failed: {0}")]
    Render(String),

    #[error("failed to load certificate template {path}: {reason}")]
    Template { path: String, reason: String },
}
