use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::api::models::{
    ClientDetail, ClientUpdate, Conversation, ConversationRef, Filters, InboxEntry, NoteRef, NoteRequest,
    RemapRequest, StatusChange,
};
use crate::error::ApiError;

/// Remote operations of the inbox service. Each call is one round trip.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn fetch_incoming_messages(&self, project_id: &str, filters: &Filters) -> Result<Vec<Conversation>, ApiError>;
    async fn update_messages_status(&self, change: &StatusChange) -> Result<(), ApiError>;
    async fn update_selected_client(&self, update: &ClientUpdate) -> Result<(), ApiError>;
    async fn add_message_to_inbox(&self, entry: &InboxEntry) -> Result<(), ApiError>;
    async fn get_selected_client_info(&self, project_id: &str, client_id: &str) -> Result<ClientDetail, ApiError>;
    async fn add_note(&self, request: &NoteRequest) -> Result<(), ApiError>;
    async fn delete_note(&self, note: &NoteRef) -> Result<(), ApiError>;
    async fn delete_client_appeal(&self, conversation: &ConversationRef) -> Result<(), ApiError>;
    async fn remap_dialogs_to_teammate(&self, request: &RemapRequest) -> Result<(), ApiError>;
}

/// [`RemoteApi`] over the service's JSON HTTP API.
pub struct HttpApi {
    pub http: HttpClient,
    base: Url,
    token: Option<String>,
}

impl HttpApi {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ApiError> {
        let base = Url::parse(&Self::base_api(base_url))?;
        Ok(Self {
            http: HttpClient::new(),
            base,
            token,
        })
    }

    /// Normalizes the configured server URL to the `/api/` root with a trailing slash.
    fn base_api(base_url: &str) -> String {
        let trimmed = crate::utils::normalize_url(base_url);
        let trimmed = trimmed.trim_end_matches('/');
        if trimmed.ends_with("/api") { format!("{}/", trimmed) } else { format!("{}/api/", trimmed) }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base.join(path)?)
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(t) => req.header("Authorization", format!("Bearer {}", t)),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let resp = self.with_auth(req).send().await?;
        if !resp.status().is_success() {
            return Err(ApiError::Status(resp.status().as_u16()));
        }
        Ok(resp)
    }

    async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T, ApiError> {
        let json: Value = self.send(req).await?.json().await?;
        // Some deployments wrap list and detail payloads in `data`.
        let body = match json {
            Value::Object(mut map) if map.contains_key("data") => map.remove("data").unwrap_or(Value::Null),
            other => other,
        };
        Ok(serde_json::from_value(body)?)
    }
}

#[async_trait]
impl RemoteApi for HttpApi {
    async fn fetch_incoming_messages(&self, project_id: &str, filters: &Filters) -> Result<Vec<Conversation>, ApiError> {
        let url = self.endpoint(&format!("inbox/{}/messages/search", project_id))?;
        self.send_json(self.http.post(url).json(filters)).await
    }

    async fn update_messages_status(&self, change: &StatusChange) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("inbox/{}/clients/{}/status", change.project_id, change.client_id))?;
        self.send(self.http.patch(url).json(change)).await.map(drop)
    }

    async fn update_selected_client(&self, update: &ClientUpdate) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("inbox/{}/clients/{}", update.project_id, update.client_id))?;
        self.send(self.http.patch(url).json(update)).await.map(drop)
    }

    async fn add_message_to_inbox(&self, entry: &InboxEntry) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("inbox/{}/messages", entry.project_id))?;
        self.send(self.http.post(url).json(entry)).await.map(drop)
    }

    async fn get_selected_client_info(&self, project_id: &str, client_id: &str) -> Result<ClientDetail, ApiError> {
        let url = self.endpoint(&format!("inbox/{}/clients/{}", project_id, client_id))?;
        self.send_json(self.http.get(url)).await
    }

    async fn add_note(&self, request: &NoteRequest) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("inbox/{}/clients/{}/notes", request.project_id, request.client_id))?;
        self.send(self.http.post(url).json(&request.note)).await.map(drop)
    }

    async fn delete_note(&self, note: &NoteRef) -> Result<(), ApiError> {
        let url = self.endpoint(&format!(
            "inbox/{}/clients/{}/notes/{}",
            note.project_id, note.client_id, note.note_id
        ))?;
        self.send(self.http.delete(url)).await.map(drop)
    }

    async fn delete_client_appeal(&self, conversation: &ConversationRef) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("inbox/{}/clients/{}", conversation.project_id, conversation.client_id))?;
        self.send(self.http.delete(url)).await.map(drop)
    }

    async fn remap_dialogs_to_teammate(&self, request: &RemapRequest) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("inbox/{}/teammates/remap", request.project_id))?;
        self.send(self.http.post(url).json(request)).await.map(drop)
    }
}
