use reqwest::{Client, RequestBuilder, Response};
use uuid::Uuid;

use parley_types::api::{ConversationPartner, SendMessageRequest};
use parley_types::models::Message;

use crate::engine::ChatApi;
use crate::error::ApiError;

/// REST transport, authenticated with the user's bearer token.
#[derive(Clone)]
pub struct HttpChatApi {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpChatApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let res = request.bearer_auth(&self.token).send().await?;
        let status = res.status();
        if !status.is_success() {
            tracing::debug!("Request rejected: {}", status);
            return Err(ApiError::Rejected(status.as_u16()));
        }
        Ok(res)
    }
}

impl ChatApi for HttpChatApi {
    async fn list_partners(&self) -> Result<Vec<ConversationPartner>, ApiError> {
        let url = format!("{}/conversations", self.base_url);
        let res = self.execute(self.client.get(url)).await?;
        Ok(res.json().await?)
    }

    async fn fetch_messages(&self, counterpart: Uuid) -> Result<Vec<Message>, ApiError> {
        let url = format!("{}/conversations/{}/messages", self.base_url, counterpart);
        let res = self.execute(self.client.get(url)).await?;
        Ok(res.json().await?)
    }

    async fn send_message(
        &self,
        receiver: Uuid,
        request: &SendMessageRequest,
    ) -> Result<Message, ApiError> {
        let url = format!("{}/conversations/{}/messages", self.base_url, receiver);
        let res = self.execute(self.client.post(url).json(request)).await?;
        Ok(res.json().await?)
    }

    async fn mark_seen(&self, message_id: Uuid) -> Result<(), ApiError> {
        let url = format!("{}/messages/{}/seen", self.base_url, message_id);
        self.execute(self.client.patch(url)).await?;
        Ok(())
    }

    async fn delete_message(&self, message_id: Uuid) -> Result<Message, ApiError> {
        let url = format!("{}/messages/{}", self.base_url, message_id);
        let res = self.execute(self.client.delete(url)).await?;
        Ok(res.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_drops_trailing_slash() {
        let api = HttpChatApi::new("http://localhost:3000/", "t");
        assert_eq!(api.base_url(), "http://localhost:3000");
    }
}
