#![allow(dead_code)]

use omnidoc_db::run_migrations;
use omnidoc_records::{abonnes, AbonneInput, Abonne, AccessScope};
use omnidoc_types::{Principal, Role};
use rusqlite::Connection;

pub fn setup_db() -> Connection {
    let conn = Connection::open_in_memory().expect("open");
    conn.execute_batch("PRAGMA foreign_keys = ON;").expect("fk");
    run_migrations(&conn).expect("migrate");
    conn.execute(
        "INSERT INTO users (id, nom, prenom, email, password_hash, role, agence)
         VALUES (1, 'Admin', 'Root', 'admin@omnidoc.ma', 'x', 'admin', 'Siege')",
        [],
    )
    .expect("seed admin");
    conn
}

pub fn admin() -> Principal {
    Principal {
        id: 1,
        email: "admin@omnidoc.ma".into(),
        role: Role::Admin,
        agence: Some("Siege".into()),
    }
}

pub fn saisie(agence: &str) -> Principal {
    Principal {
        id: 1,
        email: "agent@omnidoc.ma".into(),
        role: Role::Saisie,
        agence: Some(agence.into()),
    }
}

pub fn input(nom: &str, numero: &str, agence: &str) -> AbonneInput {
    AbonneInput {
        nom: Some(nom.into()),
        prenom: Some("Yassine".into()),
        numero_identification: Some(numero.into()),
        date_debut: Some("2024-01-01".into()),
        date_expiration: Some("2099-01-01".into()),
        ville: Some("Rabat".into()),
        agence: Some(agence.into()),
        ..AbonneInput::default()
    }
}

pub fn create(conn: &Connection, nom: &str, numero: &str, agence: &str) -> Abonne {
    abonnes::create_abonne(conn, &AccessScope::All, &input(nom, numero, agence), &admin())
        .expect("create abonne")
}
