//! REST collaborator contracts: roster loading, history loading, sends
//! and roster mutation.
//!
//! The engine only sees the [`ChatApi`] trait; [`HttpApi`] implements it
//! against the chat server's REST surface. Trait methods return
//! `impl Future + Send` so the engine can run them as spawned tasks and
//! feed the completions back into its ordered event loop.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use parley_shared::{AttachmentRef, Group, GroupId, Message, Username};

/// Errors from the REST collaborators.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The request never produced a usable response (connection refused,
    /// timeout, malformed body).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status; `message` is the
    /// response body text, which the server uses for human-readable
    /// rejection reasons.
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl ApiError {
    /// The text to surface to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Http(e) => e.to_string(),
            ApiError::Rejected { message, status } => {
                if message.is_empty() {
                    format!("request failed with status {status}")
                } else {
                    message.clone()
                }
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// The request/response collaborator surface the engine depends on.
pub trait ChatApi: Clone + Send + Sync + 'static {
    /// `GET /api/contacts/{username}`
    fn contacts(&self, user: &Username) -> impl Future<Output = ApiResult<Vec<Username>>> + Send;

    /// `GET /api/groups/user/{username}`
    fn groups(&self, user: &Username) -> impl Future<Output = ApiResult<Vec<Group>>> + Send;

    /// `GET /api/chat/messages/{username}/{peer}`
    fn direct_history(
        &self,
        user: &Username,
        peer: &Username,
    ) -> impl Future<Output = ApiResult<Vec<Message>>> + Send;

    /// `GET /api/chat/group/{groupId}/messages`
    fn group_history(&self, group: GroupId)
        -> impl Future<Output = ApiResult<Vec<Message>>> + Send;

    /// `POST /api/chat/direct`. The returned message is the canonical,
    /// server-assigned copy the dispatcher appends locally.
    fn send_direct(
        &self,
        sender: &Username,
        to: &Username,
        content: Option<String>,
        attachment: Option<AttachmentRef>,
    ) -> impl Future<Output = ApiResult<Message>> + Send;

    /// `POST /api/chat/group/{groupId}/message`. The return value is used
    /// only for error detection — the sender's copy arrives through the
    /// group broadcast.
    fn send_group(
        &self,
        sender: &Username,
        group: GroupId,
        content: Option<String>,
        attachment: Option<AttachmentRef>,
    ) -> impl Future<Output = ApiResult<Message>> + Send;

    /// `POST /api/contacts/{username}/add`
    fn add_contact(
        &self,
        user: &Username,
        contact: &Username,
    ) -> impl Future<Output = ApiResult<()>> + Send;

    /// `DELETE /api/contacts/{username}/remove`
    fn remove_contact(
        &self,
        user: &Username,
        contact: &Username,
    ) -> impl Future<Output = ApiResult<()>> + Send;

    /// `POST /api/groups/create`
    fn create_group(
        &self,
        owner: &Username,
        name: &str,
    ) -> impl Future<Output = ApiResult<Group>> + Send;

    /// `POST /api/groups/{groupId}/participants/add`
    fn add_member(
        &self,
        group: GroupId,
        user: &Username,
    ) -> impl Future<Output = ApiResult<()>> + Send;

    /// `DELETE /api/groups/{groupId}/participants/remove`
    fn remove_member(
        &self,
        group: GroupId,
        user: &Username,
    ) -> impl Future<Output = ApiResult<()>> + Send;

    /// `POST /api/chat/group/{groupId}/leave`
    fn leave_group(
        &self,
        group: GroupId,
        user: &Username,
    ) -> impl Future<Output = ApiResult<()>> + Send;

    /// `DELETE /api/groups/{groupId}?requesterUsername=`
    fn delete_group(
        &self,
        group: GroupId,
        requester: &Username,
    ) -> impl Future<Output = ApiResult<()>> + Send;

    /// `GET /api/contacts/search?query=`
    fn search_users(&self, query: &str) -> impl Future<Output = ApiResult<Vec<Username>>> + Send;
}

/// Contact and search endpoints return `{ id, username }` entries; only
/// the username matters to this client.
#[derive(Debug, Deserialize)]
struct UserEntry {
    username: Username,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContactBody<'a> {
    contact_username: &'a Username,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MemberBody<'a> {
    username: &'a Username,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateGroupBody<'a> {
    name: &'a str,
    owner_username: &'a Username,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DirectSendForm<'a> {
    sender_username: &'a Username,
    receiver_username: &'a Username,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachment_id: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GroupSendForm<'a> {
    sender_username: &'a Username,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachment_id: Option<u64>,
}

/// [`ChatApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Map a non-success response to [`ApiError::Rejected`] with the body text.
async fn ok_or_rejected(response: reqwest::Response) -> ApiResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(ApiError::Rejected {
        status: status.as_u16(),
        message,
    })
}

impl ChatApi for HttpApi {
    async fn contacts(&self, user: &Username) -> ApiResult<Vec<Username>> {
        let response = self
            .client
            .get(self.url(&format!("/api/contacts/{user}")))
            .send()
            .await?;
        let entries: Vec<UserEntry> = ok_or_rejected(response).await?.json().await?;
        Ok(entries.into_iter().map(|e| e.username).collect())
    }

    async fn groups(&self, user: &Username) -> ApiResult<Vec<Group>> {
        let response = self
            .client
            .get(self.url(&format!("/api/groups/user/{user}")))
            .send()
            .await?;
        Ok(ok_or_rejected(response).await?.json().await?)
    }

    async fn direct_history(&self, user: &Username, peer: &Username) -> ApiResult<Vec<Message>> {
        let response = self
            .client
            .get(self.url(&format!("/api/chat/messages/{user}/{peer}")))
            .send()
            .await?;
        Ok(ok_or_rejected(response).await?.json().await?)
    }

    async fn group_history(&self, group: GroupId) -> ApiResult<Vec<Message>> {
        let response = self
            .client
            .get(self.url(&format!("/api/chat/group/{}/messages", group.0)))
            .send()
            .await?;
        Ok(ok_or_rejected(response).await?.json().await?)
    }

    async fn send_direct(
        &self,
        sender: &Username,
        to: &Username,
        content: Option<String>,
        attachment: Option<AttachmentRef>,
    ) -> ApiResult<Message> {
        let response = self
            .client
            .post(self.url("/api/chat/direct"))
            .form(&DirectSendForm {
                sender_username: sender,
                receiver_username: to,
                content: content.as_deref(),
                attachment_id: attachment.map(|a| a.0),
            })
            .send()
            .await?;
        Ok(ok_or_rejected(response).await?.json().await?)
    }

    async fn send_group(
        &self,
        sender: &Username,
        group: GroupId,
        content: Option<String>,
        attachment: Option<AttachmentRef>,
    ) -> ApiResult<Message> {
        let response = self
            .client
            .post(self.url(&format!("/api/chat/group/{}/message", group.0)))
            .form(&GroupSendForm {
                sender_username: sender,
                content: content.as_deref(),
                attachment_id: attachment.map(|a| a.0),
            })
            .send()
            .await?;
        Ok(ok_or_rejected(response).await?.json().await?)
    }

    async fn add_contact(&self, user: &Username, contact: &Username) -> ApiResult<()> {
        let response = self
            .client
            .post(self.url(&format!("/api/contacts/{user}/add")))
            .json(&ContactBody {
                contact_username: contact,
            })
            .send()
            .await?;
        ok_or_rejected(response).await?;
        Ok(())
    }

    async fn remove_contact(&self, user: &Username, contact: &Username) -> ApiResult<()> {
        let response = self
            .client
            .delete(self.url(&format!("/api/contacts/{user}/remove")))
            .json(&ContactBody {
                contact_username: contact,
            })
            .send()
            .await?;
        ok_or_rejected(response).await?;
        Ok(())
    }

    async fn create_group(&self, owner: &Username, name: &str) -> ApiResult<Group> {
        let response = self
            .client
            .post(self.url("/api/groups/create"))
            .json(&CreateGroupBody {
                name,
                owner_username: owner,
            })
            .send()
            .await?;
        Ok(ok_or_rejected(response).await?.json().await?)
    }

    async fn add_member(&self, group: GroupId, user: &Username) -> ApiResult<()> {
        let response = self
            .client
            .post(self.url(&format!("/api/groups/{}/participants/add", group.0)))
            .json(&MemberBody { username: user })
            .send()
            .await?;
        ok_or_rejected(response).await?;
        Ok(())
    }

    async fn remove_member(&self, group: GroupId, user: &Username) -> ApiResult<()> {
        let response = self
            .client
            .delete(self.url(&format!("/api/groups/{}/participants/remove", group.0)))
            .json(&MemberBody { username: user })
            .send()
            .await?;
        ok_or_rejected(response).await?;
        Ok(())
    }

    async fn leave_group(&self, group: GroupId, user: &Username) -> ApiResult<()> {
        let response = self
            .client
            .post(self.url(&format!("/api/chat/group/{}/leave", group.0)))
            .query(&[("username", user.as_str())])
            .send()
            .await?;
        ok_or_rejected(response).await?;
        Ok(())
    }

    async fn delete_group(&self, group: GroupId, requester: &Username) -> ApiResult<()> {
        let response = self
            .client
            .delete(self.url(&format!("/api/groups/{}", group.0)))
            .query(&[("requesterUsername", requester.as_str())])
            .send()
            .await?;
        ok_or_rejected(response).await?;
        Ok(())
    }

    async fn search_users(&self, query: &str) -> ApiResult<Vec<Username>> {
        let response = self
            .client
            .get(self.url("/api/contacts/search"))
            .query(&[("query", query)])
            .send()
            .await?;
        let entries: Vec<UserEntry> = ok_or_rejected(response).await?.json().await?;
        Ok(entries.into_iter().map(|e| e.username).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let api = HttpApi::new("http://localhost:8080/");
        assert_eq!(api.url("/api/contacts/alice"), "http://localhost:8080/api/contacts/alice");
    }

    #[test]
    fn test_send_form_uses_server_field_names() {
        let sender = Username::new("alice");
        let receiver = Username::new("bob");
        let form = DirectSendForm {
            sender_username: &sender,
            receiver_username: &receiver,
            content: Some("hi"),
            attachment_id: None,
        };
        let value = serde_json::to_value(&form).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "senderUsername": "alice",
                "receiverUsername": "bob",
                "content": "hi",
            })
        );
    }
}
