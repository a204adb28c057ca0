//! Single-subscriber fact sheet.

use crate::layout::{FlowWriter, Font};
use crate::ReportError;
use omnidoc_records::AbonneDetail;

const MARGIN: f32 = 50.0;

fn or_dash(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => "-",
    }
}

/// Renders the fact sheet: identity, subscription, spouse, children.
pub fn generate_fiche(detail: &AbonneDetail, generated_at: &str) -> Result<Vec<u8>, ReportError> {
    let abonne = &detail.abonne;
    let mut writer = FlowWriter::new(MARGIN);

    writer.centered(Font::Bold, 20.0, "Fiche Abonné");
    writer.move_down(10.0);
    writer.rule();
    writer.move_down(10.0);

    writer.paragraph(Font::Bold, 14.0, 0.0, "Informations personnelles");
    let personal = [
        ("Nom", abonne.nom.as_str()),
        ("Prénom", abonne.prenom.as_str()),
        ("Date de naissance", or_dash(abonne.date_naissance.as_deref())),
        ("CIN", or_dash(abonne.cin.as_deref())),
        ("Téléphone", or_dash(abonne.telephone.as_deref())),
        ("Adresse", or_dash(abonne.adresse.as_deref())),
        ("Ville", or_dash(abonne.ville.as_deref())),
    ];
    for (label, value) in personal {
        writer.paragraph(Font::Regular, 11.0, 10.0, &format!("{} : {}", label, value));
    }
    writer.move_down(12.0);

    writer.paragraph(Font::Bold, 14.0, 0.0, "Abonnement");
    let subscription = [
        ("Numéro d'identification", abonne.numero_identification.as_str()),
        ("Date de début", abonne.date_debut.as_str()),
        ("Date d'expiration", abonne.date_expiration.as_str()),
        ("Statut", abonne.statut.as_str()),
        ("Agence", or_dash(abonne.agence.as_deref())),
    ];
    for (label, value) in subscription {
        writer.paragraph(Font::Regular, 11.0, 10.0, &format!("{} : {}", label, value));
    }
    writer.move_down(12.0);

    if !detail.conjoints.is_empty() {
        writer.paragraph(Font::Bold, 14.0, 0.0, "Conjoint");
        for conjoint in &detail.conjoints {
            writer.paragraph(
                Font::Regular,
                11.0,
                10.0,
                &format!("Nom complet : {} {}", conjoint.nom, conjoint.prenom),
            );
            writer.paragraph(
                Font::Regular,
                11.0,
                10.0,
                &format!(
                    "Date de naissance : {}",
                    or_dash(conjoint.date_naissance.as_deref())
                ),
            );
            if let Some(date_mariage) = conjoint.date_mariage.as_deref() {
                writer.paragraph(
                    Font::Regular,
                    11.0,
                    10.0,
                    &format!("Date de mariage : {}", date_mariage),
                );
            }
        }
        writer.move_down(12.0);
    }

    if !detail.enfants.is_empty() {
        writer.paragraph(Font::Bold, 14.0, 0.0, "Enfants");
        for (index, enfant) in detail.enfants.iter().enumerate() {
            writer.paragraph(
                Font::Regular,
                11.0,
                10.0,
                &format!(
                    "{}. {} {} - né(e) le {}",
                    index + 1,
                    enfant.nom,
                    enfant.prenom,
                    or_dash(enfant.date_naissance.as_deref())
                ),
            );
        }
        writer.move_down(12.0);
    }

    writer.ensure_space(40.0);
    writer.rule();
    writer.paragraph(
        Font::Regular,
        9.0,
        0.0,
        &format!("Document généré le {}", generated_at),
    );

    writer.finish()
}
