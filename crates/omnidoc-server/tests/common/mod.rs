#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use omnidoc_db::{open_database, DbPool, DbRuntimeSettings};
use omnidoc_identity::TokenIssuer;
use omnidoc_server::api_ws::NotificationHub;
use omnidoc_server::config::NotifyScope;
use omnidoc_server::storage::DocumentStorage;
use omnidoc_server::{app, AppState};
use omnidoc_types::{Principal, Role};
use serde_json::Value;
use std::path::PathBuf;
use tower::ServiceExt;

pub const SECRET: &[u8] = b"test-secret";
pub const BOUNDARY: &str = "omnidoc-test-boundary";

pub const ADMIN_ID: i64 = 1;
pub const CONTROLEUR_ID: i64 = 2;
pub const SAISIE_A1_ID: i64 = 3;
pub const SAISIE_A2_ID: i64 = 4;

pub struct TestApp {
    pub router: Router,
    pub pool: DbPool,
    pub hub: NotificationHub,
    pub tokens: TokenIssuer,
    pub upload_dir: PathBuf,
    _dir: tempfile::TempDir,
}

/// Builds the app over a fresh database file with four seeded users.
///
/// Seeded users carry an unusable password hash; tests obtain their tokens
/// through [`TestApp::token`].
pub fn setup() -> TestApp {
    setup_with(NotifyScope::Agency)
}

pub fn setup_with(scope: NotifyScope) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("omnidoc.db");
    let pool = open_database(db_path.to_str().unwrap(), DbRuntimeSettings::default()).unwrap();
    {
        let conn = pool.get().unwrap();
        let seed = [
            (ADMIN_ID, "Admin", "admin@omnidoc.test", "admin", None),
            (CONTROLEUR_ID, "Control", "controle@omnidoc.test", "controleur", None),
            (SAISIE_A1_ID, "Saisie", "a1@omnidoc.test", "saisie", Some("A1")),
            (SAISIE_A2_ID, "Saisie", "a2@omnidoc.test", "saisie", Some("A2")),
        ];
        for (id, nom, email, role, agence) in seed {
            conn.execute(
                "INSERT INTO users (id, nom, prenom, email, password_hash, role, agence)
                 VALUES (?1, ?2, 'Test', ?3, 'unusable', ?4, ?5)",
                rusqlite::params![id, nom, email, role, agence],
            )
            .unwrap();
        }
    }

    let upload_dir = dir.path().join("uploads");
    std::fs::create_dir_all(&upload_dir).unwrap();

    let hub = NotificationHub::new();
    let tokens = TokenIssuer::new(SECRET, 3600);
    let state = AppState {
        pool: pool.clone(),
        tokens: tokens.clone(),
        hub: hub.clone(),
        storage: DocumentStorage::new(&upload_dir, 5 * 1024 * 1024),
        certificate_template: None,
        notify_scope: scope,
        cors_origin: "http://localhost:3000".to_string(),
    };

    TestApp {
        router: app(state),
        pool,
        hub,
        tokens,
        upload_dir,
        _dir: dir,
    }
}

pub fn principal(id: i64) -> Principal {
    let (email, role, agence) = match id {
        ADMIN_ID => ("admin@omnidoc.test", Role::Admin, None),
        CONTROLEUR_ID => ("controle@omnidoc.test", Role::Controleur, None),
        SAISIE_A1_ID => ("a1@omnidoc.test", Role::Saisie, Some("A1")),
        SAISIE_A2_ID => ("a2@omnidoc.test", Role::Saisie, Some("A2")),
        other => panic!("no seeded user {}", other),
    };
    Principal {
        id,
        email: email.to_string(),
        role,
        agence: agence.map(str::to_string),
    }
}

impl TestApp {
    pub fn token(&self, id: i64) -> String {
        self.tokens.issue(&principal(id)).unwrap()
    }

    /// Sends a request and returns the status with the JSON body (or `Null`).
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, _, bytes) = self.call_raw(method, uri, token, body).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn call_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        (status, headers, bytes)
    }

    /// Uploads `bytes` as the multipart `document` field.
    pub async fn upload(
        &self,
        token: &str,
        abonne_id: i64,
        file_name: &str,
        bytes: &[u8],
        doc_type: Option<&str>,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/abonnes/{}/documents", abonne_id))
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(file_name, bytes, doc_type)))
            .unwrap();
        let (status, _, body) = self.send(request).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    pub fn count(&self, sql: &str) -> i64 {
        let conn = self.pool.get().unwrap();
        conn.query_row(sql, [], |row| row.get(0)).unwrap()
    }
}

pub fn multipart_body(file_name: &str, bytes: &[u8], doc_type: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(doc_type) = doc_type {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"type\"\r\n\r\n{}\r\n",
                BOUNDARY, doc_type
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"document\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            BOUNDARY, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// A subscriber payload with every required field.
pub fn abonne_payload(numero: &str) -> Value {
    serde_json::json!({
        "nom": "Alami",
        "prenom": "Yassine",
        "numero_identification": numero,
        "date_debut": "2024-01-01",
        "date_expiration": "2025-01-01",
        "ville": "Rabat",
        "cin": "AB12345",
    })
}

/// Creates a subscriber and returns its id.
pub async fn create_abonne(app: &TestApp, token: &str, body: Value) -> i64 {
    let (status, json) = app
        .call(Method::POST, "/api/abonnes", Some(token), Some(body))
        .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {}", json);
    json["id"].as_i64().unwrap()
}
