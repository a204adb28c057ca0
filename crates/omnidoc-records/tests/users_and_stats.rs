mod common;

use common::*;
use omnidoc_records::{
    conjoints, enfants, stats, users, AccessScope, ConjointInput, EnfantInput, RapportFilter,
    RecordError, UserInput,
};
use omnidoc_types::Role;

fn user_input(email: &str) -> UserInput {
    UserInput {
        nom: Some("Tazi".into()),
        prenom: Some("Nadia".into()),
        email: Some(email.into()),
        password: Some("pw".into()),
        role: Some(Role::Saisie),
        agence: Some("A1".into()),
        ..UserInput::default()
    }
}

#[test]
fn user_crud_never_exposes_hashes() {
    let conn = setup_db();
    let user = users::create_user(&conn, &user_input("Nadia@Omnidoc.ma"), "hash-1").expect("create");
    assert_eq!(user.email, "nadia@omnidoc.ma");

    let json = serde_json::to_value(&user).expect("serialize");
    assert!(json.get("password_hash").is_none());
    assert!(json.get("password").is_none());

    let patch = UserInput {
        role: Some(Role::Controleur),
        ..UserInput::default()
    };
    let updated = users::update_user(&conn, user.id, &patch, Some("hash-2")).expect("update");
    assert_eq!(updated.role, Role::Controleur);
    assert_eq!(updated.nom, "Tazi");
    assert_eq!(users::get_password_hash(&conn, user.id).expect("hash"), "hash-2");

    users::delete_user(&conn, user.id).expect("delete");
    assert!(matches!(
        users::get_user(&conn, user.id),
        Err(RecordError::NotFound { .. })
    ));
}

#[test]
fn duplicate_email_is_rejected() {
    let conn = setup_db();
    users::create_user(&conn, &user_input("nadia@omnidoc.ma"), "h").expect("create");
    assert!(matches!(
        users::create_user(&conn, &user_input("NADIA@omnidoc.ma"), "h"),
        Err(RecordError::Duplicate(_))
    ));
}

#[test]
fn new_user_requires_role_and_password() {
    let mut input = user_input("x@omnidoc.ma");
    input.role = None;
    assert!(matches!(
        users::validate_new_user(&input),
        Err(RecordError::Validation(_))
    ));
    let mut input = user_input("x@omnidoc.ma");
    input.password = Some(" ".into());
    assert!(users::validate_new_user(&input).is_err());
}

#[test]
fn statistics_respect_scope() {
    let conn = setup_db();
    let a = create(&conn, "Alami", "X1", "A1");
    create(&conn, "Bennani", "X2", "A2");
    create(&conn, "Chraibi", "X3", "A1");

    enfants::create_enfant(
        &conn,
        &a,
        &EnfantInput {
            nom: Some("Alami".into()),
            prenom: Some("Adam".into()),
            date_naissance: None,
        },
    )
    .expect("enfant");
    conjoints::create_conjoint(
        &conn,
        &a,
        &ConjointInput {
            nom: Some("Alami".into()),
            prenom: Some("Salma".into()),
            ..ConjointInput::default()
        },
    )
    .expect("conjoint");

    let all = stats::statistiques(&conn, &AccessScope::All).expect("stats");
    assert_eq!(all.total_abonnes, 3);
    assert_eq!(all.abonnes_avec_conjoint, 1);
    assert_eq!(all.abonnes_par_agence.len(), 2);
    assert_eq!(all.abonnes_par_agence[0].label.as_deref(), Some("A1"));
    assert_eq!(all.abonnes_par_agence[0].count, 2);
    assert_eq!(all.enfants_par_abonne[0].nombre_enfants, 1);

    let scoped = stats::statistiques(&conn, &AccessScope::Agency("A2".into())).expect("stats");
    assert_eq!(scoped.total_abonnes, 1);
    assert_eq!(scoped.abonnes_avec_conjoint, 0);

    let json = serde_json::to_value(&all).expect("serialize");
    assert_eq!(json["totalAbonnes"], 3);
}

#[test]
fn report_rows_carry_counts() {
    let conn = setup_db();
    let a = create(&conn, "Alami", "X1", "A1");
    create(&conn, "Bennani", "X2", "A1");
    enfants::create_enfant(
        &conn,
        &a,
        &EnfantInput {
            nom: Some("Alami".into()),
            prenom: Some("Adam".into()),
            date_naissance: None,
        },
    )
    .expect("enfant");

    let rows = stats::rapport_abonnes(
        &conn,
        &AccessScope::All,
        &RapportFilter {
            search: Some("alami".into()),
            ..RapportFilter::default()
        },
    )
    .expect("report");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].nombre_enfants, 1);
    assert_eq!(rows[0].nombre_conjoints, 0);
    assert_eq!(rows[0].nombre_documents, 0);

    let nothing = stats::rapport_abonnes(&conn, &AccessScope::Nothing, &RapportFilter::default())
        .expect("report");
    assert!(nothing.is_empty());
}
