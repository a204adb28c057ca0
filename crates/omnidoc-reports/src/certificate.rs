//! Subscription certificate ("Attestation de Garantie").
//!
//! The wording and positions are fixed. When a template PDF is configured
//! the text is drawn over its first page, otherwise over a blank A4 page.

use crate::layout::{add_fonts, build_document, render_err, save, Font, PageCanvas, TextLine};
use crate::ReportError;
use chrono::NaiveDate;
use lopdf::{dictionary, Document, Object, ObjectId};
use omnidoc_records::Abonne;
use rand::Rng;
use std::path::Path;

const DEFAULT_VILLE: &str = "Rabat";
const SIGNATURE_LEN: usize = 20;
const SIGNATURE_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

const BENEFITS: [&str; 4] = [
    "Transport d'Ambulance Illimité : En cas d'urgence médicale.",
    "Consultations à Domicile : Tarif préférentiel de 150,00 Dh.",
    "Couverture Nationale : Services accessibles sur l'ensemble du territoire.",
    "Assistance Médicale Téléphonique : Disponible 24/7. : 0522240404",
];

const CONDITIONS: [&str; 2] = [
    "Cette garantie est valable pour une durée d'un an à compter de la date de souscription.",
    "Elle ne s'applique pas aux personnes atteintes de maladies chroniques.",
];

/// File name under which a subscriber's certificate is stored.
pub fn certificate_file_name(numero_identification: &str) -> String {
    format!("certificat_abonnement_{}.pdf", numero_identification)
}

/// Random base-36 token printed on the signature line.
pub fn signature_token() -> String {
    let mut rng = rand::thread_rng();
    (0..SIGNATURE_LEN)
        .map(|_| SIGNATURE_ALPHABET[rng.gen_range(0..SIGNATURE_ALPHABET.len())] as char)
        .collect()
}

/// Formats a stored `YYYY-MM-DD` (or ISO datetime) as `dd/mm/yyyy`,
/// falling back to `today` when it does not parse.
pub fn french_date(value: &str, today: NaiveDate) -> String {
    let date = value
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        .unwrap_or(today);
    date.format("%d/%m/%Y").to_string()
}

fn line(text: impl Into<String>, x: f32, y: f32, size: f32, font: Font) -> TextLine {
    TextLine {
        text: text.into(),
        x,
        y,
        size,
        font,
    }
}

/// Every text line of the certificate, in drawing order.
pub fn certificate_lines(abonne: &Abonne, today: NaiveDate, signature: &str) -> Vec<TextLine> {
    let mut lines = vec![
        line("Attestation de Garantie", 200.0, 742.0, 18.0, Font::Bold),
        line(
            "Omnidoc Assist, sous le partenariat avec Credit Solutions, atteste que :",
            50.0,
            701.0,
            11.0,
            Font::Regular,
        ),
        line(
            format!("Monsieur/Madame {} {}", abonne.nom, abonne.prenom),
            154.0,
            660.0,
            14.0,
            Font::Bold,
        ),
        line(
            format!(
                "CIN : {}",
                abonne
                    .cin
                    .as_deref()
                    .unwrap_or(&abonne.numero_identification)
            ),
            255.0,
            632.0,
            12.0,
            Font::Bold,
        ),
        line(
            "bénéficie des garanties suivantes dans le cadre de notre service d'assistance médicale Premium :",
            50.0,
            592.0,
            11.0,
            Font::Regular,
        ),
    ];

    let mut y = 565.0;
    for benefit in BENEFITS {
        lines.push(line(format!("• {}", benefit), 66.0, y, 10.5, Font::Regular));
        y -= 18.0;
    }

    y -= 10.0;
    for condition in CONDITIONS {
        lines.push(line(condition, 50.0, y, 10.5, Font::Regular));
        y -= 18.0;
    }

    let ville = abonne
        .ville
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_VILLE);
    lines.push(line(
        format!("Fait à {}, le {}", ville, french_date(&abonne.date_debut, today)),
        423.0,
        214.0,
        11.0,
        Font::Regular,
    ));
    lines.push(line(
        format!("Ce PDF est signé électroniquement avec : t{}==", signature),
        370.0,
        171.0,
        8.0,
        Font::Regular,
    ));

    lines
}

/// Renders the certificate for `abonne`.
pub fn generate_certificate(
    abonne: &Abonne,
    template: Option<&Path>,
) -> Result<Vec<u8>, ReportError> {
    let today = chrono::Local::now().date_naive();
    let lines = certificate_lines(abonne, today, &signature_token());

    let mut canvas = PageCanvas::new();
    for text in &lines {
        canvas.line(text);
    }

    match template {
        Some(path) if path.is_file() => overlay_on_template(path, canvas),
        Some(path) => {
            tracing::warn!(
                template = %path.display(),
                "certificate template not found, rendering on a blank page"
            );
            build_document(vec![canvas])
        }
        None => build_document(vec![canvas]),
    }
}

/// Where a page's `/Font` resource lives.
enum FontSlot {
    Inline,
    Referenced(ObjectId),
    Missing,
}

fn overlay_on_template(path: &Path, canvas: PageCanvas) -> Result<Vec<u8>, ReportError> {
    let mut doc = Document::load(path).map_err(|e| ReportError::Template {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let page_id = doc
        .get_pages()
        .values()
        .next()
        .copied()
        .ok_or_else(|| ReportError::Template {
            path: path.display().to_string(),
            reason: "template has no pages".to_string(),
        })?;

    let (regular, bold) = add_fonts(&mut doc);

    let slot = {
        let resources = doc
            .get_or_create_resources(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(render_err)?;
        match resources.get(b"Font") {
            Ok(Object::Reference(id)) => FontSlot::Referenced(*id),
            Ok(Object::Dictionary(_)) => FontSlot::Inline,
            _ => FontSlot::Missing,
        }
    };

    let fonts = match slot {
        FontSlot::Referenced(id) => doc
            .get_object_mut(id)
            .and_then(Object::as_dict_mut)
            .map_err(render_err)?,
        FontSlot::Inline => doc
            .get_or_create_resources(page_id)
            .and_then(Object::as_dict_mut)
            .and_then(|res| res.get_mut(b"Font"))
            .and_then(Object::as_dict_mut)
            .map_err(render_err)?,
        FontSlot::Missing => {
            let resources = doc
                .get_or_create_resources(page_id)
                .and_then(Object::as_dict_mut)
                .map_err(render_err)?;
            resources.set("Font", dictionary! {});
            resources
                .get_mut(b"Font")
                .and_then(Object::as_dict_mut)
                .map_err(render_err)?
        }
    };
    fonts.set(Font::Regular.resource_name(), regular);
    fonts.set(Font::Bold.resource_name(), bold);

    doc.add_page_contents(page_id, canvas.encode()?)
        .map_err(render_err)?;

    save(&mut doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnidoc_types::SubscriptionStatus;

    pub(crate) fn abonne() -> Abonne {
        Abonne {
            id: 1,
            nom: "Alami".into(),
            prenom: "Yassine".into(),
            date_naissance: None,
            cin: Some("BE123456".into()),
            telephone: None,
            ville: None,
            adresse: None,
            numero_identification: "X123".into(),
            date_debut: "2024-01-15".into(),
            date_expiration: "2025-01-15".into(),
            agence: Some("A1".into()),
            user_id: Some(1),
            created_at: "2024-01-15 10:00:00".into(),
            statut: SubscriptionStatus::Active,
            user_nom: None,
            user_prenom: None,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date")
    }

    #[test]
    fn fixed_wording_and_positions() {
        let lines = certificate_lines(&abonne(), today(), "abc");
        assert_eq!(lines[0].text, "Attestation de Garantie");
        assert_eq!((lines[0].x, lines[0].y), (200.0, 742.0));
        assert_eq!(lines[2].text, "Monsieur/Madame Alami Yassine");
        assert_eq!(lines[3].text, "CIN : BE123456");

        let bullets: Vec<_> = lines.iter().filter(|l| l.text.starts_with('•')).collect();
        assert_eq!(bullets.len(), 4);
        assert_eq!(bullets[0].y, 565.0);
        assert_eq!(bullets[3].y, 511.0);

        let fait = lines.iter().find(|l| l.text.starts_with("Fait")).expect("fait line");
        assert_eq!(fait.text, "Fait à Rabat, le 15/01/2024");
        assert_eq!((fait.x, fait.y), (423.0, 214.0));

        let signature = lines.last().expect("signature");
        assert_eq!(signature.text, "Ce PDF est signé électroniquement avec : tabc==");
    }

    #[test]
    fn unparsable_start_date_uses_today() {
        assert_eq!(french_date("n/a", today()), "01/06/2024");
        assert_eq!(french_date("2024-03-09T00:00:00.000Z", today()), "09/03/2024");
    }

    #[test]
    fn signature_is_base36() {
        let token = signature_token();
        assert_eq!(token.len(), 20);
        assert!(token.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn file_name() {
        assert_eq!(certificate_file_name("X123"), "certificat_abonnement_X123.pdf");
    }
}
