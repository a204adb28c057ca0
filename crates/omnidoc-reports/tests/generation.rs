use lopdf::Document;
use omnidoc_records::{Abonne, AbonneDetail, Conjoint, Enfant};
use omnidoc_reports::{
    build_document, generate_certificate, generate_fiche, generate_listing, ListingStats,
    PageCanvas, ReportFilters,
};
use omnidoc_types::SubscriptionStatus;

fn abonne(id: i64, numero: &str, agence: &str, statut: SubscriptionStatus) -> Abonne {
    Abonne {
        id,
        nom: "Alami".into(),
        prenom: "Yassine".into(),
        date_naissance: Some("1990-04-02".into()),
        cin: Some("BE123456".into()),
        telephone: Some("0600000000".into()),
        ville: Some("Casablanca".into()),
        adresse: Some("12 rue des Orangers".into()),
        numero_identification: numero.into(),
        date_debut: "2024-01-15".into(),
        date_expiration: "2025-01-15".into(),
        agence: Some(agence.into()),
        user_id: Some(1),
        created_at: "2024-01-15 10:00:00".into(),
        statut,
        user_nom: None,
        user_prenom: None,
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[test]
fn certificate_on_blank_page() {
    let bytes = generate_certificate(&abonne(1, "X123", "A1", SubscriptionStatus::Active), None)
        .expect("certificate");
    let doc = Document::load_mem(&bytes).expect("valid pdf");
    assert_eq!(doc.get_pages().len(), 1);
    assert!(contains(&bytes, b"Attestation de Garantie"));
    assert!(contains(&bytes, b"Fait \xE0 Casablanca, le 15/01/2024"));
}

#[test]
fn certificate_overlays_template() {
    let dir = tempfile::tempdir().expect("tempdir");
    let template = dir.path().join("template.pdf");
    let mut page = PageCanvas::new();
    page.text(omnidoc_reports::Font::Regular, 9.0, 40.0, 40.0, "Omnidoc Assist - modèle");
    std::fs::write(&template, build_document(vec![page]).expect("template")).expect("write");

    let bytes = generate_certificate(
        &abonne(1, "X123", "A1", SubscriptionStatus::Active),
        Some(&template),
    )
    .expect("certificate");
    assert_eq!(Document::load_mem(&bytes).expect("valid pdf").get_pages().len(), 1);
    assert!(contains(&bytes, b"Attestation de Garantie"));
    assert!(contains(&bytes, b"Omnidoc Assist - mod\xE8le"));
}

#[test]
fn missing_template_falls_back_to_blank_page() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bytes = generate_certificate(
        &abonne(1, "X123", "A1", SubscriptionStatus::Active),
        Some(&dir.path().join("absent.pdf")),
    )
    .expect("certificate");
    assert!(contains(&bytes, b"Attestation de Garantie"));
}

#[test]
fn corrupt_template_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let template = dir.path().join("broken.pdf");
    std::fs::write(&template, b"not a pdf").expect("write");
    assert!(generate_certificate(
        &abonne(1, "X123", "A1", SubscriptionStatus::Active),
        Some(&template)
    )
    .is_err());
}

#[test]
fn fiche_lists_children() {
    let detail = AbonneDetail {
        abonne: abonne(1, "X123", "A1", SubscriptionStatus::Active),
        conjoints: vec![Conjoint {
            id: 1,
            abonne_id: 1,
            nom: "Alami".into(),
            prenom: "Salma".into(),
            date_naissance: None,
            date_mariage: Some("2012-07-01".into()),
            created_at: String::new(),
        }],
        enfants: (1..=3)
            .map(|i| Enfant {
                id: i,
                abonne_id: 1,
                nom: "Alami".into(),
                prenom: format!("Enfant{}", i),
                date_naissance: None,
                created_at: String::new(),
            })
            .collect(),
        documents: vec![],
    };
    let bytes = generate_fiche(&detail, "01/06/2024 10:00").expect("fiche");
    assert!(contains(&bytes, b"Fiche Abonn\xE9"));
    assert!(contains(&bytes, b"3. Alami Enfant3"));
    assert!(contains(&bytes, b"Document g\xE9n\xE9r\xE9 le 01/06/2024 10:00"));
}

#[test]
fn listing_paginates_and_ends_with_statistics() {
    let rows: Vec<Abonne> = (0..40)
        .map(|i| {
            let statut = if i % 4 == 0 {
                SubscriptionStatus::Expired
            } else {
                SubscriptionStatus::Active
            };
            let agence = if i % 2 == 0 { "A1" } else { "A2" };
            abonne(i, &format!("N{:03}", i), agence, statut)
        })
        .collect();

    let bytes = generate_listing(&rows, &ReportFilters::default(), "01/06/2024").expect("listing");
    let doc = Document::load_mem(&bytes).expect("valid pdf");
    assert!(doc.get_pages().len() >= 3, "table spans pages, stats page last");
    assert!(contains(&bytes, b"Statistiques"));
    assert!(contains(&bytes, b"expire : 10 (25.0%)"));
    assert!(contains(&bytes, b"A1 : 20 (50.0%)"));

    let stats = ListingStats::from_rows(&rows);
    assert_eq!(stats.total, 40);
    assert_eq!(stats.by_status.len(), 2);
}
