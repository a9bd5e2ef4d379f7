use std::sync::Arc;

use axum::http::StatusCode;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use parley_db::Database;
use parley_gateway::presence::PresenceRegistry;
use parley_types::events::GatewayEvent;
use parley_types::models::Message;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("message not found")]
    NotFound,

    #[error("not allowed")]
    Forbidden,

    #[error("store failure: {0}")]
    Store(#[from] anyhow::Error),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Persists messages and pushes them to the counterpart's live connection.
///
/// The caller's result depends only on the store. Pushes are fire-and-forget.
#[derive(Clone)]
pub struct MessageDispatcher {
    db: Arc<Database>,
    presence: PresenceRegistry,
}

impl MessageDispatcher {
    pub fn new(db: Arc<Database>, presence: PresenceRegistry) -> Self {
        Self { db, presence }
    }

    pub async fn send(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        text: String,
        image: Option<String>,
    ) -> Result<Message, DispatchError> {
        let image = image.filter(|i| !i.trim().is_empty());
        if text.trim().is_empty() && image.is_none() {
            return Err(DispatchError::InvalidInput("message needs text or an image"));
        }
        if sender_id == receiver_id {
            return Err(DispatchError::InvalidInput("cannot message yourself"));
        }

        let message = self
            .blocking(move |db| {
                db.insert_message(
                    &sender_id.to_string(),
                    &receiver_id.to_string(),
                    &text,
                    image.as_deref(),
                )?
                .into_message()
            })
            .await?;

        match self.presence.lookup(receiver_id).await {
            Some(handle) if handle.push(GatewayEvent::NewMessage(message.clone())) => {
                debug!("Pushed message {} to {} (conn {})", message.id, receiver_id, handle.conn_id());
            }
            _ => debug!("{} offline, message {} stored only", receiver_id, message.id),
        }

        Ok(message)
    }

    /// Tombstone a message. Only its sender may delete it.
    pub async fn delete(&self, requester: Uuid, message_id: Uuid) -> Result<Message, DispatchError> {
        let existing = self
            .blocking(move |db| {
                db.get_message(&message_id.to_string())?
                    .map(|row| row.into_message())
                    .transpose()
            })
            .await?
            .ok_or(DispatchError::NotFound)?;

        if existing.sender_id != requester {
            return Err(DispatchError::Forbidden);
        }

        let deleted = self
            .blocking(move |db| {
                db.mark_deleted(&message_id.to_string())?
                    .map(|row| row.into_message())
                    .transpose()
            })
            .await?
            .ok_or(DispatchError::NotFound)?;

        info!("{} deleted message {}", requester, message_id);

        let counterpart = deleted.counterpart_of(requester);
        self.presence
            .send_to(counterpart, GatewayEvent::MessageDeleted(deleted.clone()))
            .await;

        Ok(deleted)
    }

    /// Run a store call off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T, DispatchError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(db.as_ref()))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                DispatchError::Store(anyhow::anyhow!("store task failed"))
            })?
            .map_err(DispatchError::Store)
    }
}
