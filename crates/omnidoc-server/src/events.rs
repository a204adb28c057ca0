//! Mutation notifications.
//!
//! Handlers call [`notify`] after their transaction commits. Each mutation
//! produces one audience-scoped event (`new_*`, `update_*`, `delete_*`) and
//! one `data_update` on the record's entity topic.

use crate::api_ws::NotificationHub;
use crate::config::NotifyScope;
use omnidoc_types::{EntityKind, Mutation, Topic};
use serde::Serialize;

/// Topics that receive a mutation of `kind`.
///
/// Subscriber-family records go to their agency plus admins and controleurs;
/// user records go to admins and controleurs only.
pub fn audience(kind: EntityKind, agence: Option<&str>) -> Vec<Topic> {
    let mut topics = Vec::with_capacity(3);
    if kind != EntityKind::User {
        if let Some(agence) = agence.map(str::trim).filter(|a| !a.is_empty()) {
            topics.push(Topic::Agency(agence.to_string()));
        }
    }
    topics.push(Topic::Admins);
    topics.push(Topic::Controleurs);
    topics
}

/// Emits the notifications for a committed mutation. Never fails.
pub async fn notify<T: Serialize>(
    hub: &NotificationHub,
    scope: NotifyScope,
    kind: EntityKind,
    mutation: Mutation,
    id: i64,
    agence: Option<&str>,
    record: &T,
) {
    notify_agencies(hub, scope, kind, mutation, id, &[agence], record).await;
}

/// [`notify`] for a record that concerns several agencies, e.g. a subscriber
/// moved between agencies. Each channel receives the event once.
pub async fn notify_agencies<T: Serialize>(
    hub: &NotificationHub,
    scope: NotifyScope,
    kind: EntityKind,
    mutation: Mutation,
    id: i64,
    agencies: &[Option<&str>],
    record: &T,
) {
    let event = mutation.event_name(kind);
    let data = match serde_json::to_value(record) {
        Ok(data) => data,
        Err(e) => {
            tracing::error!(event = %event, id, "failed to serialize notification payload: {}", e);
            return;
        }
    };

    match scope {
        NotifyScope::All => hub.emit_to_all(&event, &data).await,
        NotifyScope::Agency => {
            let mut topics: Vec<Topic> = Vec::new();
            for agence in agencies {
                for topic in audience(kind, *agence) {
                    if !topics.contains(&topic) {
                        topics.push(topic);
                    }
                }
            }
            hub.emit_to_topics(&topics, &event, &data).await
        }
    }

    let update = match mutation {
        Mutation::Deleted => None,
        Mutation::Created | Mutation::Updated => Some(&data),
    };
    hub.publish_entity_update(kind, id, update).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnidoc_types::{Principal, Role};
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    async fn connect(
        hub: &NotificationHub,
        id: i64,
        role: Role,
        agence: Option<&str>,
    ) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(16);
        let principal = Principal {
            id,
            email: format!("u{}@example.com", id),
            role,
            agence: agence.map(str::to_string),
        };
        hub.register(&principal, tx).await;
        rx
    }

    fn events(rx: &mut mpsc::Receiver<String>) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(text) = rx.try_recv() {
            let frame: Value = serde_json::from_str(&text).unwrap();
            names.push(frame["event"].as_str().unwrap().to_string());
        }
        names
    }

    #[test]
    fn audience_by_kind() {
        assert_eq!(
            audience(EntityKind::Abonne, Some("A1")),
            vec![Topic::Agency("A1".into()), Topic::Admins, Topic::Controleurs]
        );
        assert_eq!(
            audience(EntityKind::Document, None),
            vec![Topic::Admins, Topic::Controleurs]
        );
        assert_eq!(
            audience(EntityKind::User, Some("A1")),
            vec![Topic::Admins, Topic::Controleurs]
        );
    }

    #[tokio::test]
    async fn agency_scope_keeps_other_agencies_out() {
        let hub = NotificationHub::new();
        let mut a1 = connect(&hub, 1, Role::Saisie, Some("A1")).await;
        let mut a2 = connect(&hub, 2, Role::Saisie, Some("A2")).await;
        let mut admin = connect(&hub, 3, Role::Admin, Some("A2")).await;

        notify(
            &hub,
            NotifyScope::Agency,
            EntityKind::Abonne,
            Mutation::Created,
            10,
            Some("A1"),
            &json!({"id": 10}),
        )
        .await;

        assert_eq!(events(&mut a1), vec!["new_abonne"]);
        assert!(events(&mut a2).is_empty());
        assert_eq!(events(&mut admin), vec!["new_abonne"]);
    }

    #[tokio::test]
    async fn moved_subscriber_reaches_both_agencies_once() {
        let hub = NotificationHub::new();
        let mut a1 = connect(&hub, 1, Role::Saisie, Some("A1")).await;
        let mut a2 = connect(&hub, 2, Role::Saisie, Some("A2")).await;
        let mut a3 = connect(&hub, 3, Role::Saisie, Some("A3")).await;
        let mut admin = connect(&hub, 4, Role::Admin, Some("A1")).await;

        notify_agencies(
            &hub,
            NotifyScope::Agency,
            EntityKind::Abonne,
            Mutation::Updated,
            10,
            &[Some("A2"), Some("A1")],
            &json!({"id": 10, "agence": "A2"}),
        )
        .await;

        assert_eq!(events(&mut a1), vec!["update_abonne"]);
        assert_eq!(events(&mut a2), vec!["update_abonne"]);
        assert!(events(&mut a3).is_empty());
        assert_eq!(events(&mut admin), vec!["update_abonne"]);
    }

    #[tokio::test]
    async fn legacy_scope_broadcasts_to_everyone() {
        let hub = NotificationHub::new();
        let mut a2 = connect(&hub, 2, Role::Saisie, Some("A2")).await;

        notify(
            &hub,
            NotifyScope::All,
            EntityKind::User,
            Mutation::Deleted,
            5,
            None,
            &json!({"id": 5}),
        )
        .await;

        assert_eq!(events(&mut a2), vec!["delete_user"]);
    }

    #[tokio::test]
    async fn entity_subscribers_get_data_update() {
        let hub = NotificationHub::new();
        let mut watcher = connect(&hub, 4, Role::Saisie, Some("A9")).await;
        hub.subscribe(4, Topic::for_record(EntityKind::Abonne, 10))
            .await;

        notify(
            &hub,
            NotifyScope::Agency,
            EntityKind::Abonne,
            Mutation::Updated,
            10,
            Some("A1"),
            &json!({"id": 10, "nom": "Alami"}),
        )
        .await;

        assert_eq!(events(&mut watcher), vec!["data_update"]);
    }
}
