use super::{ensure_success, join_segments};
use crate::error::NexusError;
use crate::google_oauth::AuthenticatedClient;
use crate::types::gmail::{
    AttachmentBody, Draft, DraftList, GmailLabel, GmailMessage, LabelList, ListMessagesQuery,
    MessageList, MessageRef,
};
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

/// Thin client over `gmail/v1/users/me`. One call per method, no retries.
#[derive(Clone)]
pub struct GmailApi {
    client: AuthenticatedClient,
    base: Url,
}

impl GmailApi {
    pub fn new(client: AuthenticatedClient, base: Url) -> Self {
        Self { client, base }
    }

    pub fn client(&self) -> &AuthenticatedClient {
        &self.client
    }

    fn url(&self, segments: &[&str]) -> Result<Url, NexusError> {
        let mut all = vec!["users", "me"];
        all.extend_from_slice(segments);
        join_segments(&self.base, &all)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&(impl Serialize + ?Sized)>,
    ) -> Result<T, NexusError> {
        let mut req = self.client.request(method, self.url(segments)?).query(query);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = ensure_success(req.send().await?).await?;
        Ok(resp.json().await?)
    }

    /// For endpoints answering 204 / empty body.
    async fn call_empty(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&(impl Serialize + ?Sized)>,
    ) -> Result<(), NexusError> {
        let mut req = self.client.request(method, self.url(segments)?);
        if let Some(body) = body {
            req = req.json(body);
        }
        ensure_success(req.send().await?).await?;
        Ok(())
    }

    pub async fn list_messages(&self, q: &ListMessagesQuery) -> Result<MessageList, NexusError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        query.push(("maxResults", q.max_results.unwrap_or(10).to_string()));
        if let Some(token) = q.page_token.as_deref().filter(|t| !t.is_empty()) {
            query.push(("pageToken", token.to_string()));
        }
        if let Some(search) = q.q.as_deref().filter(|s| !s.is_empty()) {
            query.push(("q", search.to_string()));
        }
        for label in q
            .label_ids
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|l| !l.is_empty())
        {
            query.push(("labelIds", label.to_string()));
        }
        self.call(Method::GET, &["messages"], &query, None::<&()>).await
    }

    pub async fn get_message(&self, id: &str) -> Result<GmailMessage, NexusError> {
        self.call(
            Method::GET,
            &["messages", id],
            &[("format", "full".to_string())],
            None::<&()>,
        )
        .await
    }

    /// Send an RFC 5322 message already encoded as unpadded base64url.
    pub async fn send_raw(&self, raw: String) -> Result<MessageRef, NexusError> {
        self.call(Method::POST, &["messages", "send"], &[], Some(&json!({ "raw": raw })))
            .await
    }

    pub async fn modify_labels(
        &self,
        id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<(), NexusError> {
        let body = json!({ "addLabelIds": add, "removeLabelIds": remove });
        self.call::<MessageRef>(Method::POST, &["messages", id, "modify"], &[], Some(&body))
            .await
            .map(|_| ())
    }

    pub async fn trash(&self, id: &str) -> Result<(), NexusError> {
        self.call_empty(Method::POST, &["messages", id, "trash"], None::<&()>)
            .await
    }

    pub async fn untrash(&self, id: &str) -> Result<(), NexusError> {
        self.call_empty(Method::POST, &["messages", id, "untrash"], None::<&()>)
            .await
    }

    /// Permanent; bypasses the trash.
    pub async fn delete_message(&self, id: &str) -> Result<(), NexusError> {
        self.call_empty(Method::DELETE, &["messages", id], None::<&()>)
            .await
    }

    pub async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<AttachmentBody, NexusError> {
        self.call(
            Method::GET,
            &["messages", message_id, "attachments", attachment_id],
            &[],
            None::<&()>,
        )
        .await
    }

    pub async fn list_labels(&self) -> Result<LabelList, NexusError> {
        self.call(Method::GET, &["labels"], &[], None::<&()>).await
    }

    pub async fn create_label(&self, name: &str) -> Result<GmailLabel, NexusError> {
        let body = json!({
            "name": name,
            "labelListVisibility": "labelShow",
            "messageListVisibility": "show",
        });
        self.call(Method::POST, &["labels"], &[], Some(&body)).await
    }

    pub async fn rename_label(&self, id: &str, name: &str) -> Result<GmailLabel, NexusError> {
        self.call(
            Method::PATCH,
            &["labels", id],
            &[],
            Some(&json!({ "name": name })),
        )
        .await
    }

    pub async fn delete_label(&self, id: &str) -> Result<(), NexusError> {
        self.call_empty(Method::DELETE, &["labels", id], None::<&()>)
            .await
    }

    pub async fn list_drafts(&self) -> Result<DraftList, NexusError> {
        self.call(Method::GET, &["drafts"], &[], None::<&()>).await
    }

    pub async fn get_draft(&self, id: &str) -> Result<Draft, NexusError> {
        self.call(
            Method::GET,
            &["drafts", id],
            &[("format", "full".to_string())],
            None::<&()>,
        )
        .await
    }

    pub async fn create_draft(&self, raw: String) -> Result<Draft, NexusError> {
        let body = json!({ "message": { "raw": raw } });
        self.call(Method::POST, &["drafts"], &[], Some(&body)).await
    }

    pub async fn delete_draft(&self, id: &str) -> Result<(), NexusError> {
        self.call_empty(Method::DELETE, &["drafts", id], None::<&()>)
            .await
    }

    pub async fn send_draft(&self, id: &str) -> Result<MessageRef, NexusError> {
        self.call(Method::POST, &["drafts", "send"], &[], Some(&json!({ "id": id })))
            .await
    }
}
