//! WebSocket notification hub.
//!
//! One authenticated channel per principal. Channels are grouped into topics:
//! `agency:{agence}`, `admins` and `controleurs` are joined by the server at
//! connect time, `{type}:{id}` entity topics are joined on client request.

use crate::{
    api::{with_conn, ApiError},
    middleware::bearer_token,
    AppState,
};
use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade},
        Extension, Query,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use omnidoc_records::{record_agency, users, AccessScope, RecordError};
use omnidoc_types::{EntityKind, Principal, Topic};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Outbound queue depth per channel.
const OUTBOUND_QUEUE: usize = 256;

/// Frames sent by clients.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ClientFrame {
    Subscribe(TopicRequest),
    Unsubscribe(TopicRequest),
}

/// `{type, id}` naming an entity topic. The id may be a number or a string.
#[derive(Debug, Deserialize)]
pub struct TopicRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: EntityId,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Number(i64),
    Text(String),
}

impl TopicRequest {
    fn topic(&self) -> Result<Topic, omnidoc_types::TopicError> {
        let id = match &self.id {
            EntityId::Number(n) => n.to_string(),
            EntityId::Text(s) => s.clone(),
        };
        Topic::entity(&self.kind, &id)
    }
}

/// A server frame: `{"event": name, "data": payload}`.
#[derive(Debug, Serialize)]
struct ServerFrame<'a> {
    event: &'a str,
    data: &'a Value,
}

fn encode_frame(event: &str, data: &Value) -> Option<String> {
    match serde_json::to_string(&ServerFrame { event, data }) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::error!(event, "failed to serialize notification: {}", e);
            None
        }
    }
}

/// Server timestamp attached to `data_update` and `system_message` frames.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

struct Session {
    id: Uuid,
    sender: mpsc::Sender<String>,
}

#[derive(Default)]
struct Registry {
    /// principal id -> live session.
    sessions: HashMap<i64, Session>,
    /// topic -> member principal ids.
    topics: HashMap<Topic, HashSet<i64>>,
    /// principal id -> joined topics.
    memberships: HashMap<i64, HashSet<Topic>>,
}

impl Registry {
    fn join(&mut self, principal_id: i64, topic: Topic) {
        self.topics
            .entry(topic.clone())
            .or_default()
            .insert(principal_id);
        self.memberships
            .entry(principal_id)
            .or_default()
            .insert(topic);
    }

    fn leave(&mut self, principal_id: i64, topic: &Topic) {
        if let Some(members) = self.topics.get_mut(topic) {
            members.remove(&principal_id);
            if members.is_empty() {
                self.topics.remove(topic);
            }
        }
        if let Some(joined) = self.memberships.get_mut(&principal_id) {
            joined.remove(topic);
            if joined.is_empty() {
                self.memberships.remove(&principal_id);
            }
        }
    }

    /// Drops the session and every topic membership of `principal_id`.
    fn evict(&mut self, principal_id: i64) -> Option<Session> {
        let session = self.sessions.remove(&principal_id);
        if let Some(joined) = self.memberships.remove(&principal_id) {
            for topic in joined {
                if let Some(members) = self.topics.get_mut(&topic) {
                    members.remove(&principal_id);
                    if members.is_empty() {
                        self.topics.remove(&topic);
                    }
                }
            }
        }
        session
    }

    fn senders_for(&self, topics: &[Topic]) -> Vec<(i64, mpsc::Sender<String>)> {
        let mut seen = HashSet::new();
        let mut senders = Vec::new();
        for topic in topics {
            let Some(members) = self.topics.get(topic) else {
                continue;
            };
            for id in members {
                if seen.insert(*id) {
                    if let Some(session) = self.sessions.get(id) {
                        senders.push((*id, session.sender.clone()));
                    }
                }
            }
        }
        senders
    }
}

/// Registry of live channels and their topics.
///
/// Cloning is cheap and every clone shares the same registry.
#[derive(Clone, Default)]
pub struct NotificationHub {
    registry: Arc<RwLock<Registry>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the channel of an authenticated principal and joins its
    /// implicit topics.
    ///
    /// A principal has at most one live channel: a previous session is
    /// evicted, and dropping its sender closes that socket.
    pub async fn register(&self, principal: &Principal, sender: mpsc::Sender<String>) -> Uuid {
        let session_id = Uuid::new_v4();
        let mut registry = self.registry.write().await;

        if registry.evict(principal.id).is_some() {
            tracing::info!(principal_id = principal.id, "replacing existing notification channel");
        }

        registry.sessions.insert(
            principal.id,
            Session {
                id: session_id,
                sender,
            },
        );
        if let Some(agence) = principal.agence.as_deref().filter(|a| !a.trim().is_empty()) {
            registry.join(principal.id, Topic::Agency(agence.to_string()));
        }
        if let Some(topic) = Topic::for_role(principal.role) {
            registry.join(principal.id, topic);
        }

        session_id
    }

    /// Removes a session on disconnect.
    ///
    /// Does nothing if the principal has since reconnected under a newer
    /// session.
    pub async fn unregister(&self, principal_id: i64, session_id: Uuid) {
        let mut registry = self.registry.write().await;
        let current = registry.sessions.get(&principal_id).map(|s| s.id);
        if current == Some(session_id) {
            registry.evict(principal_id);
        }
    }

    /// Closes the live channel of a principal, if any.
    pub async fn disconnect_principal(&self, principal_id: i64) -> bool {
        self.registry.write().await.evict(principal_id).is_some()
    }

    /// Joins an entity topic. Returns `false` if the principal has no live
    /// channel.
    pub async fn subscribe(&self, principal_id: i64, topic: Topic) -> bool {
        let mut registry = self.registry.write().await;
        if !registry.sessions.contains_key(&principal_id) {
            return false;
        }
        registry.join(principal_id, topic);
        true
    }

    /// Leaves a topic. An emptied topic is dropped from the registry.
    pub async fn unsubscribe(&self, principal_id: i64, topic: &Topic) {
        self.registry.write().await.leave(principal_id, topic);
    }

    /// Sends to every connected channel.
    pub async fn emit_to_all(&self, event: &str, data: &Value) {
        let Some(frame) = encode_frame(event, data) else {
            return;
        };
        let senders: Vec<_> = {
            let registry = self.registry.read().await;
            registry
                .sessions
                .iter()
                .map(|(id, s)| (*id, s.sender.clone()))
                .collect()
        };
        deliver(event, &frame, senders);
    }

    /// Sends to the members of `agency:{agence}`.
    pub async fn emit_to_agency(&self, agence: &str, event: &str, data: &Value) {
        self.emit_to_topics(&[Topic::Agency(agence.to_string())], event, data)
            .await;
    }

    /// Sends to the members of `admins`.
    pub async fn emit_to_admins(&self, event: &str, data: &Value) {
        self.emit_to_topics(&[Topic::Admins], event, data).await;
    }

    /// Sends to the channel of one principal; a no-op when absent.
    pub async fn emit_to_principal(&self, principal_id: i64, event: &str, data: &Value) {
        let Some(frame) = encode_frame(event, data) else {
            return;
        };
        let sender = {
            let registry = self.registry.read().await;
            registry
                .sessions
                .get(&principal_id)
                .map(|s| (principal_id, s.sender.clone()))
        };
        deliver(event, &frame, sender.into_iter().collect());
    }

    /// Sends once to every channel that is a member of at least one of
    /// `topics`.
    pub async fn emit_to_topics(&self, topics: &[Topic], event: &str, data: &Value) {
        let Some(frame) = encode_frame(event, data) else {
            return;
        };
        let senders = self.registry.read().await.senders_for(topics);
        deliver(event, &frame, senders);
    }

    /// Sends `data_update {type, id, data, timestamp}` to `{type}:{id}`.
    pub async fn publish_entity_update(&self, kind: EntityKind, id: i64, data: Option<&Value>) {
        let payload = serde_json::json!({
            "type": kind.as_str(),
            "id": id,
            "data": data.cloned().unwrap_or(Value::Null),
            "timestamp": timestamp(),
        });
        self.emit_to_topics(&[Topic::for_record(kind, id)], "data_update", &payload)
            .await;
    }

    /// Sends `system_message {message, timestamp}` to everyone.
    pub async fn emit_system_message(&self, message: &str) {
        let payload = serde_json::json!({
            "message": message,
            "timestamp": timestamp(),
        });
        self.emit_to_all("system_message", &payload).await;
    }

    pub async fn is_connected(&self, principal_id: i64) -> bool {
        self.registry.read().await.sessions.contains_key(&principal_id)
    }

    pub async fn connected_count(&self) -> usize {
        self.registry.read().await.sessions.len()
    }

    /// Member principal ids of a topic, sorted.
    pub async fn topic_members(&self, topic: &Topic) -> Vec<i64> {
        let registry = self.registry.read().await;
        let mut members: Vec<i64> = registry
            .topics
            .get(topic)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default();
        members.sort_unstable();
        members
    }

    /// Number of topics with at least one member.
    pub async fn topic_count(&self) -> usize {
        self.registry.read().await.topics.len()
    }
}

fn deliver(event: &str, frame: &str, senders: Vec<(i64, mpsc::Sender<String>)>) {
    for (principal_id, sender) in senders {
        match sender.try_send(frame.to_string()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(principal_id, event, "outbound queue full, dropping notification");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(principal_id, event, "channel closed, notification not delivered");
            }
        }
    }
}

/// Query parameters of the `/ws` handshake.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Handler for `GET /ws`.
///
/// The token is verified before the upgrade and its subject must still
/// exist; otherwise the handshake answers 401 and nothing is registered.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    let token = params
        .token
        .filter(|t| !t.trim().is_empty())
        .or_else(|| bearer_token(&headers).map(str::to_string));
    let Some(token) = token else {
        return ApiError::Unauthorized("missing token".to_string()).into_response();
    };

    let principal = match state.tokens.verify(&token) {
        Ok(principal) => principal,
        Err(e) => {
            tracing::debug!("websocket handshake rejected: {}", e);
            return ApiError::from(e).into_response();
        }
    };

    let user_id = principal.id;
    let known = with_conn(&state, move |conn| match users::get_user(conn, user_id) {
        Ok(_) => Ok(true),
        Err(RecordError::NotFound { .. }) => Ok(false),
        Err(e) => Err(e.into()),
    })
    .await;
    match known {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(principal_id = user_id, "websocket handshake for a deleted user");
            return ApiError::Unauthorized("unknown user".to_string()).into_response();
        }
        Err(e) => return e.into_response(),
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, principal))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, principal: Principal) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);

    // The hub owns the only strong sender, so eviction ends the send task.
    let replies = tx.downgrade();
    let session_id = state.hub.register(&principal, tx).await;
    tracing::info!(principal_id = principal.id, role = %principal.role, "notification channel opened");

    let mut send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(AxumMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            _ = &mut send_task => break,
            incoming = stream.next() => match incoming {
                Some(Ok(AxumMessage::Text(text))) => {
                    handle_client_frame(&state, &principal, text.as_str(), &replies).await;
                }
                Some(Ok(AxumMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.hub.unregister(principal.id, session_id).await;
    send_task.abort();
    tracing::info!(principal_id = principal.id, "notification channel closed");
}

/// Checks that `principal` may see the record behind an entity topic.
///
/// Records outside the principal's agency answer not found, as the REST
/// routes do. User topics are reserved to user managers.
async fn authorize_subscription(
    state: &Arc<AppState>,
    principal: &Principal,
    topic: &Topic,
) -> Result<(), ApiError> {
    let Topic::Entity { kind, id } = *topic else {
        return Err(ApiError::BadRequest(format!("{} is not an entity topic", topic)));
    };
    if kind == EntityKind::User {
        if principal.role.can_manage_users() {
            return Ok(());
        }
        return Err(ApiError::Forbidden(format!("cannot subscribe to {}", topic)));
    }

    let agence = with_conn(state, move |conn| Ok(record_agency(conn, kind, id)?)).await?;
    if AccessScope::for_principal(principal).allows(agence.as_deref()) {
        Ok(())
    } else {
        Err(ApiError::NotFound(format!("{} {} not found", kind.as_str(), id)))
    }
}

async fn handle_client_frame(
    state: &Arc<AppState>,
    principal: &Principal,
    text: &str,
    replies: &mpsc::WeakSender<String>,
) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            send_error(replies, &format!("invalid frame: {}", e));
            return;
        }
    };

    match frame {
        ClientFrame::Subscribe(request) => match request.topic() {
            Ok(topic) => match authorize_subscription(state, principal, &topic).await {
                Ok(()) => {
                    state.hub.subscribe(principal.id, topic).await;
                }
                Err(ApiError::Internal(detail)) => {
                    tracing::error!(principal_id = principal.id, %topic, "subscription check failed: {}", detail);
                    send_error(replies, "an internal error occurred");
                }
                Err(e) => {
                    tracing::debug!(principal_id = principal.id, %topic, "subscription refused: {}", e);
                    send_error(replies, &e.to_string());
                }
            },
            Err(e) => send_error(replies, &e.to_string()),
        },
        ClientFrame::Unsubscribe(request) => match request.topic() {
            Ok(topic) => state.hub.unsubscribe(principal.id, &topic).await,
            Err(e) => send_error(replies, &e.to_string()),
        },
    }
}

fn send_error(replies: &mpsc::WeakSender<String>, message: &str) {
    let Some(sender) = replies.upgrade() else {
        return;
    };
    if let Some(frame) = encode_frame("error", &serde_json::json!({ "message": message })) {
        if sender.try_send(frame).is_err() {
            tracing::warn!("failed to queue error frame");
        }
    }
}
