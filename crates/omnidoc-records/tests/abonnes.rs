mod common;

use common::*;
use omnidoc_records::documents::{self, NewDocument};
use omnidoc_records::{
    abonnes, conjoints, enfants, record_agency, AbonneFilter, AbonneInput, AccessScope,
    ConjointInput, EnfantInput, RecordError,
};
use omnidoc_types::{EntityKind, SubscriptionStatus};

#[test]
fn create_then_read_returns_submitted_fields() {
    let conn = setup_db();
    let created = create(&conn, "Alami", "X123", "A1");

    let read = abonnes::get_abonne(&conn, &AccessScope::All, created.id).expect("read");
    assert_eq!(read, created);
    assert_eq!(read.nom, "Alami");
    assert_eq!(read.numero_identification, "X123");
    assert_eq!(read.date_debut, "2024-01-01");
    assert_eq!(read.agence.as_deref(), Some("A1"));
    assert_eq!(read.statut, SubscriptionStatus::Active);
    assert_eq!(read.user_nom.as_deref(), Some("Admin"));
}

#[test]
fn missing_required_field_is_a_validation_error() {
    let conn = setup_db();
    let mut payload = input("Alami", "X123", "A1");
    payload.date_expiration = None;
    let err = abonnes::create_abonne(&conn, &AccessScope::All, &payload, &admin())
        .expect_err("should fail");
    assert!(matches!(err, RecordError::Validation(msg) if msg.contains("date_expiration")));
}

#[test]
fn duplicate_identification_number_is_rejected() {
    let conn = setup_db();
    create(&conn, "Alami", "X123", "A1");
    let err = abonnes::create_abonne(
        &conn,
        &AccessScope::All,
        &input("Bennani", "X123", "A1"),
        &admin(),
    )
    .expect_err("duplicate");
    assert!(matches!(err, RecordError::Duplicate(_)));
}

#[test]
fn scoped_creator_is_forced_into_own_agency() {
    let conn = setup_db();
    let agent = saisie("A2");
    let scope = AccessScope::for_principal(&agent);
    let created =
        abonnes::create_abonne(&conn, &scope, &input("Alami", "X1", "A9"), &agent).expect("create");
    assert_eq!(created.agence.as_deref(), Some("A2"));
}

#[test]
fn saisie_lists_only_own_agency() {
    let conn = setup_db();
    create(&conn, "Alami", "X1", "A1");
    create(&conn, "Bennani", "X2", "A2");
    create(&conn, "Chraibi", "X3", "A1");

    let scope = AccessScope::for_principal(&saisie("A1"));
    let rows = abonnes::list_abonnes(&conn, &scope, &AbonneFilter::default()).expect("list");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|a| a.agence.as_deref() == Some("A1")));

    // Reads outside the scope look like missing records.
    let other = abonnes::list_abonnes(&conn, &AccessScope::All, &AbonneFilter::default())
        .expect("list all")
        .into_iter()
        .find(|a| a.numero_identification == "X2")
        .expect("X2");
    assert!(matches!(
        abonnes::get_abonne(&conn, &scope, other.id),
        Err(RecordError::NotFound { .. })
    ));
    assert!(abonnes::delete_abonne(&conn, &scope, other.id).is_err());
}

#[test]
fn search_is_case_insensitive_substring() {
    let conn = setup_db();
    create(&conn, "Alami", "X1", "A1");
    create(&conn, "Bennani", "X2", "A1");

    let filter = AbonneFilter {
        search: Some("LAM".into()),
        ..AbonneFilter::default()
    };
    let rows = abonnes::list_abonnes(&conn, &AccessScope::All, &filter).expect("list");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].nom, "Alami");

    let filter = AbonneFilter {
        search: Some("%".into()),
        ..AbonneFilter::default()
    };
    let rows = abonnes::list_abonnes(&conn, &AccessScope::All, &filter).expect("list");
    assert!(rows.is_empty(), "wildcards are matched literally");
}

#[test]
fn status_and_date_filters() {
    let conn = setup_db();
    create(&conn, "Alami", "X1", "A1");
    let mut expired = input("Bennani", "X2", "A1");
    expired.date_debut = Some("2020-03-01".into());
    expired.date_expiration = Some("2021-03-01".into());
    abonnes::create_abonne(&conn, &AccessScope::All, &expired, &admin()).expect("create");

    let filter = AbonneFilter {
        statut: Some("expire".into()),
        ..AbonneFilter::default()
    };
    let rows = abonnes::list_abonnes(&conn, &AccessScope::All, &filter).expect("list");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].statut, SubscriptionStatus::Expired);

    let filter = AbonneFilter {
        date_debut: Some("2023-01-01".into()),
        date_fin: Some("2024-12-31".into()),
        ..AbonneFilter::default()
    };
    let rows = abonnes::list_abonnes(&conn, &AccessScope::All, &filter).expect("list");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].nom, "Alami");

    let filter = AbonneFilter {
        statut: Some("paused".into()),
        ..AbonneFilter::default()
    };
    assert!(matches!(
        abonnes::list_abonnes(&conn, &AccessScope::All, &filter),
        Err(RecordError::Validation(_))
    ));
}

#[test]
fn update_keeps_absent_fields() {
    let conn = setup_db();
    let created = create(&conn, "Alami", "X1", "A1");
    let patch = AbonneInput {
        telephone: Some("0600000000".into()),
        ..AbonneInput::default()
    };
    let updated =
        abonnes::update_abonne(&conn, &AccessScope::All, created.id, &patch).expect("update");
    assert_eq!(updated.telephone.as_deref(), Some("0600000000"));
    assert_eq!(updated.nom, "Alami");
    assert_eq!(updated.ville.as_deref(), Some("Rabat"));
}

#[test]
fn identification_number_locks_once_documents_exist() {
    let conn = setup_db();
    let created = create(&conn, "Alami", "X1", "A1");

    let rename = AbonneInput {
        numero_identification: Some("X1-bis".into()),
        ..AbonneInput::default()
    };
    let renamed =
        abonnes::update_abonne(&conn, &AccessScope::All, created.id, &rename).expect("rename");
    assert_eq!(renamed.numero_identification, "X1-bis");

    documents::create_document(
        &conn,
        &renamed,
        &NewDocument {
            doc_type: "cin".into(),
            nom_fichier: "cin.pdf".into(),
            chemin_fichier: "uploads/X1-bis/cin.pdf".into(),
            taille_fichier: 12,
            created_by: Some(1),
        },
    )
    .expect("document");

    let rename = AbonneInput {
        numero_identification: Some("X1-ter".into()),
        ..AbonneInput::default()
    };
    assert!(matches!(
        abonnes::update_abonne(&conn, &AccessScope::All, created.id, &rename),
        Err(RecordError::Validation(_))
    ));
}

#[test]
fn detail_aggregates_dependents_and_delete_cascades() {
    let conn = setup_db();
    let owner = create(&conn, "Alami", "X1", "A1");

    conjoints::create_conjoint(
        &conn,
        &owner,
        &ConjointInput {
            nom: Some("Alami".into()),
            prenom: Some("Salma".into()),
            ..ConjointInput::default()
        },
    )
    .expect("conjoint");
    for (prenom, date) in [("Ines", "2015-05-01"), ("Adam", "2012-02-01")] {
        enfants::create_enfant(
            &conn,
            &owner,
            &EnfantInput {
                nom: Some("Alami".into()),
                prenom: Some(prenom.into()),
                date_naissance: Some(date.into()),
            },
        )
        .expect("enfant");
    }

    let detail = abonnes::get_abonne_detail(&conn, &AccessScope::All, owner.id).expect("detail");
    assert_eq!(detail.conjoints.len(), 1);
    assert_eq!(detail.enfants.len(), 2);
    assert_eq!(detail.enfants[0].prenom, "Adam", "children ordered by birth date");

    let json = serde_json::to_value(&detail).expect("serialize");
    assert_eq!(json["nom"], "Alami");
    assert_eq!(json["statut"], "actif");
    assert_eq!(json["enfants"].as_array().map(Vec::len), Some(2));

    abonnes::delete_abonne(&conn, &AccessScope::All, owner.id).expect("delete");
    for table in ["conjoints", "enfants", "documents"] {
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 0, "{table} should cascade");
    }
}

#[test]
fn nested_records_do_not_cross_owners() {
    let conn = setup_db();
    let first = create(&conn, "Alami", "X1", "A1");
    let second = create(&conn, "Bennani", "X2", "A1");

    let enfant = enfants::create_enfant(
        &conn,
        &first,
        &EnfantInput {
            nom: Some("Alami".into()),
            prenom: Some("Adam".into()),
            date_naissance: None,
        },
    )
    .expect("enfant");

    assert!(matches!(
        enfants::delete_enfant(&conn, &second, enfant.id),
        Err(RecordError::NotFound { entity: "enfant", .. })
    ));
    assert!(enfants::delete_enfant(&conn, &first, enfant.id).is_ok());
}

#[test]
fn dependents_resolve_to_their_subscriber_agency() {
    let conn = setup_db();
    let owner = create(&conn, "Alami", "X1", "A1");

    let conjoint = conjoints::create_conjoint(
        &conn,
        &owner,
        &ConjointInput {
            nom: Some("Alami".into()),
            prenom: Some("Salma".into()),
            ..ConjointInput::default()
        },
    )
    .expect("conjoint");
    let enfant = enfants::create_enfant(
        &conn,
        &owner,
        &EnfantInput {
            nom: Some("Alami".into()),
            prenom: Some("Adam".into()),
            date_naissance: None,
        },
    )
    .expect("enfant");
    let document = documents::create_document(
        &conn,
        &owner,
        &NewDocument {
            doc_type: "cin".into(),
            nom_fichier: "cin.pdf".into(),
            chemin_fichier: "uploads/X1/cin.pdf".into(),
            taille_fichier: 3,
            created_by: None,
        },
    )
    .expect("document");

    for (kind, id) in [
        (EntityKind::Abonne, owner.id),
        (EntityKind::Conjoint, conjoint.id),
        (EntityKind::Enfant, enfant.id),
        (EntityKind::Document, document.id),
    ] {
        assert_eq!(
            record_agency(&conn, kind, id).expect("agency").as_deref(),
            Some("A1")
        );
    }

    assert!(matches!(
        record_agency(&conn, EntityKind::Enfant, 999),
        Err(RecordError::NotFound { entity: "enfant", .. })
    ));
    assert!(matches!(
        record_agency(&conn, EntityKind::User, 1),
        Err(RecordError::Validation(_))
    ));
}

#[test]
fn rows_sharing_a_path_are_replaced_together() {
    let conn = setup_db();
    let owner = create(&conn, "Alami", "X1", "A1");
    let certificate = NewDocument {
        doc_type: "certificate".into(),
        nom_fichier: "certificat_abonnement_X1.pdf".into(),
        chemin_fichier: "uploads/X1/certificat_abonnement_X1.pdf".into(),
        taille_fichier: 10,
        created_by: None,
    };
    let first = documents::create_document(&conn, &owner, &certificate).expect("first");
    let second = documents::create_document(&conn, &owner, &certificate).expect("second");

    assert!(documents::is_path_referenced(&conn, &certificate.chemin_fichier, Some(first.id))
        .expect("lookup"));

    let removed =
        documents::delete_documents_at(&conn, &owner, &certificate.chemin_fichier).expect("delete");
    assert_eq!(
        removed.iter().map(|d| d.id).collect::<Vec<_>>(),
        vec![first.id, second.id]
    );
    assert!(!documents::is_path_referenced(&conn, &certificate.chemin_fichier, None)
        .expect("lookup"));
}
