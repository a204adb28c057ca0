//! Filtered subscriber report: applied filters, a paginated table and a
//! statistics page.

use crate::layout::{FlowWriter, Font};
use crate::ReportError;
use omnidoc_records::Abonne;
use std::collections::BTreeMap;

const MARGIN: f32 = 50.0;
const COLUMN_X: f32 = 50.0;
const COLUMN_WIDTH: f32 = 100.0;
const ROW_HEIGHT: f32 = 30.0;
/// Rows stop this far above the bottom edge.
const BOTTOM_LIMIT: f32 = 100.0;
const HEADERS: [&str; 5] = ["Numéro", "Nom", "Prénom", "Statut", "Agence"];

/// Human-readable filters, printed under the title.
#[derive(Debug, Clone, Default)]
pub struct ReportFilters {
    pub agence: Option<String>,
    pub statut: Option<String>,
    pub date_debut: Option<String>,
    pub date_fin: Option<String>,
    pub search: Option<String>,
}

impl ReportFilters {
    fn describe(&self) -> Vec<String> {
        let entries = [
            ("Agence", &self.agence),
            ("Statut", &self.statut),
            ("Date de début", &self.date_debut),
            ("Date de fin", &self.date_fin),
            ("Recherche", &self.search),
        ];
        entries
            .into_iter()
            .filter_map(|(label, value)| {
                value
                    .as_deref()
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| format!("{} : {}", label, v))
            })
            .collect()
    }
}

/// One line of a percentage breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct Share {
    pub label: String,
    pub count: usize,
    pub percent: f64,
}

impl Share {
    pub fn render(&self) -> String {
        format!("{} : {} ({:.1}%)", self.label, self.count, self.percent)
    }
}

/// Counts by status and by agency over the listed rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingStats {
    pub total: usize,
    pub by_status: Vec<Share>,
    pub by_agency: Vec<Share>,
}

impl ListingStats {
    pub fn from_rows(rows: &[Abonne]) -> Self {
        let total = rows.len();
        let mut status: BTreeMap<String, usize> = BTreeMap::new();
        let mut agency: BTreeMap<String, usize> = BTreeMap::new();
        for row in rows {
            *status.entry(row.statut.as_str().to_string()).or_default() += 1;
            let label = row
                .agence
                .clone()
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| "Non renseignée".to_string());
            *agency.entry(label).or_default() += 1;
        }
        Self {
            total,
            by_status: shares(status, total),
            by_agency: shares(agency, total),
        }
    }
}

fn shares(counts: BTreeMap<String, usize>, total: usize) -> Vec<Share> {
    counts
        .into_iter()
        .map(|(label, count)| Share {
            label,
            count,
            percent: if total == 0 {
                0.0
            } else {
                count as f64 * 100.0 / total as f64
            },
        })
        .collect()
}

fn cell(value: Option<&str>) -> String {
    let value = value.unwrap_or("-");
    // Keep cells inside their 100pt column.
    if value.chars().count() > 16 {
        let truncated: String = value.chars().take(15).collect();
        format!("{}…", truncated)
    } else {
        value.to_string()
    }
}

fn draw_header(writer: &mut FlowWriter) {
    let y = writer.cursor() - ROW_HEIGHT;
    for (i, header) in HEADERS.iter().enumerate() {
        let x = COLUMN_X + COLUMN_WIDTH * i as f32;
        writer.canvas().text(Font::Bold, 11.0, x, y, header);
    }
    writer.move_down(ROW_HEIGHT);
    writer.rule();
}

/// Renders the report for `rows`.
pub fn generate_listing(
    rows: &[Abonne],
    filters: &ReportFilters,
    generated_at: &str,
) -> Result<Vec<u8>, ReportError> {
    let mut writer = FlowWriter::new(MARGIN);

    writer.centered(Font::Bold, 20.0, "Rapport des Abonnés");
    writer.paragraph(
        Font::Regular,
        9.0,
        0.0,
        &format!("Généré le {}", generated_at),
    );
    writer.move_down(8.0);

    let described = filters.describe();
    if !described.is_empty() {
        writer.paragraph(Font::Bold, 12.0, 0.0, "Filtres appliqués");
        for entry in described {
            writer.paragraph(Font::Regular, 10.0, 10.0, &entry);
        }
        writer.move_down(8.0);
    }

    draw_header(&mut writer);
    for row in rows {
        if writer.cursor() - ROW_HEIGHT < BOTTOM_LIMIT {
            writer.new_page();
            draw_header(&mut writer);
        }
        let y = writer.cursor() - ROW_HEIGHT + 10.0;
        let values = [
            cell(Some(&row.numero_identification)),
            cell(Some(&row.nom)),
            cell(Some(&row.prenom)),
            cell(Some(row.statut.as_str())),
            cell(row.agence.as_deref()),
        ];
        for (i, value) in values.iter().enumerate() {
            let x = COLUMN_X + COLUMN_WIDTH * i as f32;
            writer.canvas().text(Font::Regular, 10.0, x, y, value);
        }
        writer.move_down(ROW_HEIGHT);
    }
    if rows.is_empty() {
        writer.paragraph(Font::Regular, 10.0, 0.0, "Aucun abonné ne correspond aux filtres.");
    }

    let stats = ListingStats::from_rows(rows);
    writer.new_page();
    writer.centered(Font::Bold, 18.0, "Statistiques");
    writer.move_down(10.0);
    writer.paragraph(
        Font::Regular,
        12.0,
        0.0,
        &format!("Total des abonnés : {}", stats.total),
    );
    writer.move_down(8.0);
    writer.paragraph(Font::Bold, 12.0, 0.0, "Par statut");
    for share in &stats.by_status {
        writer.paragraph(Font::Regular, 11.0, 10.0, &share.render());
    }
    writer.move_down(8.0);
    writer.paragraph(Font::Bold, 12.0, 0.0, "Par agence");
    for share in &stats.by_agency {
        writer.paragraph(Font::Regular, 11.0, 10.0, &share.render());
    }

    writer.finish()
}
