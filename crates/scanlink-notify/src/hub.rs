//! In-process notification hub.
//!
//! Tracks connected clients, their room memberships and the client-originated
//! subscription events. Delivery to a client goes through an unbounded channel
//! so emitters never wait on slow consumers.

use crate::error::{NotifyError, Result};
use crate::event::{Event, OutboundMessage};
use crate::notifier::Notifier;
use crate::room::Room;
use scanlink_core::{
    EmployeeId, ServiceConfig,
    constants::{DEFAULT_GLOBAL_ROLES, DEFAULT_STAFF_ROLE},
    now_millis,
};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identifier assigned to a client on connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    fn generate() -> Self {
        ClientId(Uuid::new_v4())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hub configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Roles admitted to the global broadcast room.
    pub global_roles: Vec<String>,

    /// The only role admitted to the scanning staff room.
    pub staff_role: String,

    /// Text of the `connected` acknowledgement.
    pub welcome_message: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            global_roles: DEFAULT_GLOBAL_ROLES.iter().map(|r| r.to_string()).collect(),
            staff_role: DEFAULT_STAFF_ROLE.to_string(),
            welcome_message: "Connected to fingerprint server".to_string(),
        }
    }
}

impl HubConfig {
    pub fn welcome_message(mut self, message: impl Into<String>) -> Self {
        self.welcome_message = message.into();
        self
    }
}

impl From<&ServiceConfig> for HubConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            global_roles: config.global_roles.clone(),
            staff_role: config.staff_role.clone(),
            ..Self::default()
        }
    }
}

/// Events a client may send to the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Join `employee_{id}`. `by_room_id` records whether the client used the
    /// `roomID` spelling, which changes the acknowledgement shape.
    SubscribeEmployee {
        employee_id: EmployeeId,
        by_room_id: bool,
    },
    SubscribeGlobal {
        user_role: Option<String>,
    },
    UnsubscribeGlobal,
    SubscribeAllEmployee {
        user_role: Option<String>,
    },
}

impl ClientEvent {
    /// Decode a client event from its name and JSON body.
    ///
    /// # Errors
    /// `UnknownEvent` for names outside the vocabulary, `MalformedEvent` for
    /// bodies missing a usable identifier.
    pub fn parse(name: &str, data: &Value) -> Result<Self> {
        match name {
            "subscribe_employee" => {
                if let Some(value) = data.get("employeeID") {
                    Ok(ClientEvent::SubscribeEmployee {
                        employee_id: parse_employee_id(name, value)?,
                        by_room_id: false,
                    })
                } else if let Some(value) = data.get("roomID") {
                    Ok(ClientEvent::SubscribeEmployee {
                        employee_id: parse_employee_id(name, value)?,
                        by_room_id: true,
                    })
                } else {
                    Err(malformed(name, "employeeID or roomID is required"))
                }
            }
            "subscribe_global" => Ok(ClientEvent::SubscribeGlobal {
                user_role: user_role(data),
            }),
            "unsubscribe_global" => Ok(ClientEvent::UnsubscribeGlobal),
            "subscribe_all_employee" => Ok(ClientEvent::SubscribeAllEmployee {
                user_role: user_role(data),
            }),
            other => Err(NotifyError::UnknownEvent(other.to_string())),
        }
    }
}

fn parse_employee_id(event: &str, value: &Value) -> Result<EmployeeId> {
    let id = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    id.map(EmployeeId::new)
        .ok_or_else(|| malformed(event, format!("not an employee id: {value}")))
}

fn user_role(data: &Value) -> Option<String> {
    data.get("userRole")
        .and_then(Value::as_str)
        .filter(|role| !role.is_empty())
        .map(str::to_string)
}

fn malformed(event: &str, reason: impl Into<String>) -> NotifyError {
    NotifyError::MalformedEvent {
        event: event.to_string(),
        reason: reason.into(),
    }
}

/// A client's end of the hub: its id and the stream of messages addressed to it.
#[derive(Debug)]
pub struct ClientConnection {
    pub id: ClientId,
    rx: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl ClientConnection {
    pub async fn recv(&mut self) -> Option<OutboundMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<OutboundMessage> {
        self.rx.try_recv().ok()
    }
}

#[derive(Debug)]
struct ClientState {
    tx: mpsc::UnboundedSender<OutboundMessage>,
    rooms: HashSet<Room>,
}

impl ClientState {
    fn send(&self, message: OutboundMessage) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// Room-based fan-out to connected clients.
#[derive(Debug, Default)]
pub struct NotificationHub {
    config: HubConfig,
    clients: RwLock<HashMap<ClientId, ClientState>>,
}

impl NotificationHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            clients: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Register a client and push the `connected` acknowledgement.
    pub fn connect(&self) -> ClientConnection {
        let id = ClientId::generate();
        let (tx, rx) = mpsc::unbounded_channel();

        let state = ClientState {
            tx,
            rooms: HashSet::new(),
        };
        state.send(OutboundMessage::new(
            "connected",
            json!({
                "message": self.config.welcome_message,
                "clientId": id.to_string(),
                "timestamp": now_millis(),
            }),
        ));

        self.write().insert(id, state);
        info!(client_id = %id, "Client connected");

        ClientConnection { id, rx }
    }

    /// Remove a client and all of its room memberships.
    pub fn disconnect(&self, id: ClientId) {
        if self.write().remove(&id).is_some() {
            info!(client_id = %id, "Client disconnected");
        }
    }

    /// Handle an event sent by a client.
    ///
    /// Malformed and unknown events are answered with an `error` event before
    /// the error is returned.
    ///
    /// # Errors
    /// `UnknownClient` if `id` is not connected, otherwise the parse error.
    pub fn handle_client_event(&self, id: ClientId, name: &str, data: Value) -> Result<()> {
        let mut clients = self.write();
        let client = clients
            .get_mut(&id)
            .ok_or_else(|| NotifyError::UnknownClient(id.to_string()))?;

        let event = match ClientEvent::parse(name, &data) {
            Ok(event) => event,
            Err(error) => {
                warn!(client_id = %id, event = name, %error, "Rejected client event");
                client.send(OutboundMessage::new(
                    "error",
                    json!({ "message": error.to_string() }),
                ));
                return Err(error);
            }
        };

        match event {
            ClientEvent::SubscribeEmployee {
                employee_id,
                by_room_id,
            } => {
                let room = Room::Employee(employee_id);
                client.rooms.insert(room);
                info!(client_id = %id, room = %room, "Client subscribed to employee room");

                let ack = if by_room_id {
                    json!({ "roomID": employee_id, "roomName": room.name() })
                } else {
                    json!({ "employeeID": employee_id, "room": room.name() })
                };
                client.send(OutboundMessage::new("subscribed", ack));
            }
            ClientEvent::SubscribeGlobal { user_role } => {
                let allowed = user_role
                    .as_deref()
                    .is_some_and(|role| self.config.global_roles.iter().any(|r| r == role));
                let ack = gated_join(
                    client,
                    id,
                    Room::Global,
                    user_role,
                    allowed,
                    "Access denied - employees only",
                );
                client.send(OutboundMessage::new("subscribed_global", ack));
            }
            ClientEvent::UnsubscribeGlobal => {
                client.rooms.remove(&Room::Global);
                info!(client_id = %id, "Client unsubscribed from global notifications");
                client.send(OutboundMessage::new(
                    "unsubscribed_global",
                    json!({ "room": Room::Global.name() }),
                ));
            }
            ClientEvent::SubscribeAllEmployee { user_role } => {
                let allowed = user_role.as_deref() == Some(self.config.staff_role.as_str());
                let denial = format!(
                    "Access denied - employees with role {} only",
                    self.config.staff_role
                );
                let ack = gated_join(client, id, Room::AllEmployee, user_role, allowed, &denial);
                client.send(OutboundMessage::new("subscribed_all_employee", ack));
            }
        }

        Ok(())
    }

    /// Broadcast to the global room.
    pub fn emit_to_global(&self, event: impl Into<String>, payload: Value) {
        self.emit(&Room::Global, Event::new(event, payload));
    }

    /// Broadcast to the scanning staff room.
    pub fn emit_to_all_employee(&self, event: impl Into<String>, payload: Value) {
        self.emit(&Room::AllEmployee, Event::new(event, payload));
    }

    #[must_use]
    pub fn client_count(&self) -> usize {
        self.read().len()
    }

    /// Number of clients currently in `room`.
    #[must_use]
    pub fn room_size(&self, room: &Room) -> usize {
        self.read()
            .values()
            .filter(|c| c.rooms.contains(room))
            .count()
    }

    #[must_use]
    pub fn is_member(&self, id: ClientId, room: &Room) -> bool {
        self.read()
            .get(&id)
            .is_some_and(|c| c.rooms.contains(room))
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ClientId, ClientState>> {
        self.clients.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ClientId, ClientState>> {
        self.clients.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn gated_join(
    client: &mut ClientState,
    id: ClientId,
    room: Room,
    user_role: Option<String>,
    allowed: bool,
    denial: &str,
) -> Value {
    let role = user_role.as_deref().unwrap_or("unknown");
    if allowed {
        client.rooms.insert(room);
        info!(client_id = %id, role, room = %room, "Client joined broadcast room");
        json!({ "room": room.name(), "userRole": user_role, "success": true })
    } else {
        info!(client_id = %id, role, room = %room, "Client denied broadcast room");
        json!({
            "room": room.name(),
            "userRole": user_role,
            "success": false,
            "error": denial,
        })
    }
}

impl Notifier for NotificationHub {
    fn emit(&self, room: &Room, event: Event) {
        let message = OutboundMessage::enriched(&event);
        let mut delivered = 0;
        let mut gone = Vec::new();

        for (id, client) in self.read().iter() {
            if client.rooms.contains(room) && client.send(message.clone()) {
                delivered += 1;
            } else if client.tx.is_closed() {
                gone.push(*id);
            }
        }

        if !gone.is_empty() {
            let mut clients = self.write();
            for id in &gone {
                clients.remove(id);
            }
            info!(pruned = gone.len(), "Dropped clients without a live connection");
        }

        debug!(room = %room, event = %event.name, delivered, "Emitted event");
    }
}
