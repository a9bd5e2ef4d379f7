use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Events pushed from the server over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid },

    /// The full set of users holding a live connection (not a delta)
    GetOnlineUsers(Vec<Uuid>),

    /// A message was stored for this user
    NewMessage(Message),

    /// A message in one of this user's conversations was deleted.
    /// Carries the tombstoned message.
    MessageDeleted(Message),
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection. Must be the first frame.
    Identify { token: String },

    /// Leave the gateway cleanly
    Disconnect,
}
