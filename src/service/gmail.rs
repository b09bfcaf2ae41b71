use crate::api::GmailApi;
use crate::error::NexusError;
use crate::google_oauth::GoogleAuthManager;
use crate::google_oauth::state::random_token;
use crate::service::mime::{Envelope, Sender, render_message};
use crate::types::gmail::{
    AttachmentContent, FormattedDraft, FormattedMessage, GmailLabel, ListMessagesQuery,
    MessagePage, SendEmailRequest, SentMessage, decode_gmail_b64, encode_gmail_b64,
};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

const MESSAGE_FETCH_CONCURRENCY: usize = 4;
const TRASH_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedDraft {
    pub draft_id: String,
    pub message_id: Option<String>,
}

/// Gmail operations on the organization's admin mailbox.
pub struct GmailService {
    api: GmailApi,
    default_sender_name: String,
}

impl GmailService {
    /// `None` when the organization has no usable Google credential.
    pub async fn create(
        manager: &GoogleAuthManager,
        organization_id: &str,
    ) -> Result<Option<Self>, NexusError> {
        let Some(client) = manager.authenticated_client(organization_id).await? else {
            return Ok(None);
        };
        let google = manager.google_config();
        Ok(Some(Self {
            api: GmailApi::new(client, google.gmail_api_base.clone()),
            default_sender_name: google.default_sender_name.clone(),
        }))
    }

    /// List a page, then fetch and reshape every message on it.
    pub async fn get_messages(&self, query: &ListMessagesQuery) -> Result<MessagePage, NexusError> {
        let list = self.api.list_messages(query).await?;
        let messages: Vec<FormattedMessage> = stream::iter(list.messages)
            .map(|r| async move {
                let res = self.api.get_message(&r.id).await;
                (r.id, res)
            })
            .buffered(MESSAGE_FETCH_CONCURRENCY)
            .filter_map(|(id, res)| async move {
                match res {
                    Ok(msg) => Some(FormattedMessage::from(msg)),
                    Err(e) => {
                        warn!(message_id = %id, error = %e, "Skipping message that failed to load");
                        None
                    }
                }
            })
            .collect()
            .await;
        Ok(MessagePage {
            messages,
            next_page_token: list.next_page_token,
            result_size_estimate: list.result_size_estimate,
        })
    }

    pub async fn get_message(&self, id: &str) -> Result<FormattedMessage, NexusError> {
        Ok(self.api.get_message(id).await?.into())
    }

    fn render_raw(&self, req: &SendEmailRequest) -> Result<String, NexusError> {
        let from_email = self.api.client().admin_email();
        let display_name = req
            .from_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.default_sender_name);
        let domain = from_email.rsplit_once('@').map(|(_, d)| d).unwrap_or("localhost");
        let boundary = format!("boundary_{}", random_token());
        let message_id = format!("{}.{}@{}", Utc::now().timestamp_millis(), random_token(), domain);
        let mime = render_message(
            req,
            &Sender {
                display_name,
                email: from_email,
            },
            &Envelope {
                date: Utc::now(),
                boundary: &boundary,
                message_id: &message_id,
            },
        )?;
        Ok(encode_gmail_b64(mime.as_bytes()))
    }

    pub async fn send_email(&self, req: &SendEmailRequest) -> Result<SentMessage, NexusError> {
        let raw = self.render_raw(req)?;
        let sent = self.api.send_raw(raw).await?;
        info!(
            organization_id = %self.api.client().organization_id(),
            message_id = %sent.id,
            attachments = req.attachments.len(),
            "Email sent"
        );
        Ok(SentMessage {
            message_id: sent.id,
            thread_id: sent.thread_id,
        })
    }

    pub async fn mark_as_read(&self, id: &str, read: bool) -> Result<(), NexusError> {
        self.toggle_label(id, "UNREAD", !read).await
    }

    pub async fn mark_as_starred(&self, id: &str, starred: bool) -> Result<(), NexusError> {
        self.toggle_label(id, "STARRED", starred).await
    }

    async fn toggle_label(&self, id: &str, label: &str, on: bool) -> Result<(), NexusError> {
        let label = vec![label.to_string()];
        if on {
            self.api.modify_labels(id, &label, &[]).await
        } else {
            self.api.modify_labels(id, &[], &label).await
        }
    }

    pub async fn modify_labels(
        &self,
        id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<(), NexusError> {
        if add.is_empty() && remove.is_empty() {
            return Err(NexusError::BadRequest(
                "addLabelIds or removeLabelIds is required".to_string(),
            ));
        }
        self.api.modify_labels(id, add, remove).await
    }

    pub async fn trash_message(&self, id: &str) -> Result<(), NexusError> {
        self.api.trash(id).await
    }

    pub async fn untrash_message(&self, id: &str) -> Result<(), NexusError> {
        self.api.untrash(id).await
    }

    pub async fn delete_message(&self, id: &str) -> Result<(), NexusError> {
        self.api.delete_message(id).await
    }

    /// Attachment bytes with filename and type taken from the owning message part.
    pub async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<AttachmentContent, NexusError> {
        let message = self.api.get_message(message_id).await?;
        let (filename, mime_type) = message
            .payload
            .as_ref()
            .and_then(|p| p.find_attachment(attachment_id))
            .map(|part| {
                (
                    part.filename.clone().filter(|f| !f.is_empty()),
                    part.mime_type.clone(),
                )
            })
            .unwrap_or_default();

        let body = self.api.get_attachment(message_id, attachment_id).await?;
        let data = body
            .data
            .as_deref()
            .and_then(decode_gmail_b64)
            .ok_or_else(|| NexusError::NotFound("attachment has no content".to_string()))?;
        Ok(AttachmentContent {
            filename: filename.unwrap_or_else(|| format!("attachment_{attachment_id}")),
            mime_type: mime_type.unwrap_or_else(|| "application/octet-stream".to_string()),
            data,
        })
    }

    pub async fn get_labels(&self) -> Result<Vec<GmailLabel>, NexusError> {
        Ok(self.api.list_labels().await?.labels)
    }

    pub async fn create_label(&self, name: &str) -> Result<GmailLabel, NexusError> {
        self.api.create_label(require_name(name)?).await
    }

    pub async fn update_label(&self, id: &str, name: &str) -> Result<GmailLabel, NexusError> {
        self.api.rename_label(id, require_name(name)?).await
    }

    pub async fn delete_label(&self, id: &str) -> Result<(), NexusError> {
        self.api.delete_label(id).await
    }

    pub async fn save_draft(&self, req: &SendEmailRequest) -> Result<SavedDraft, NexusError> {
        let raw = self.render_raw(req)?;
        let draft = self.api.create_draft(raw).await?;
        Ok(SavedDraft {
            draft_id: draft.id,
            message_id: draft.message.map(|m| m.id),
        })
    }

    /// Drafts with their content; drafts that fail to load are skipped.
    pub async fn get_drafts(&self) -> Result<Vec<FormattedDraft>, NexusError> {
        let list = self.api.list_drafts().await?;
        let drafts = stream::iter(list.drafts)
            .map(|d| async move { (d.id.clone(), self.api.get_draft(&d.id).await) })
            .buffered(MESSAGE_FETCH_CONCURRENCY)
            .filter_map(|(id, res)| async move {
                match res {
                    Ok(draft) => draft
                        .message
                        .map(|m| FormattedDraft::from_draft(draft.id, m)),
                    Err(e) => {
                        warn!(draft_id = %id, error = %e, "Skipping draft that failed to load");
                        None
                    }
                }
            })
            .collect()
            .await;
        Ok(drafts)
    }

    pub async fn delete_draft(&self, id: &str) -> Result<(), NexusError> {
        self.api.delete_draft(id).await
    }

    pub async fn send_draft(&self, id: &str) -> Result<SentMessage, NexusError> {
        let sent = self.api.send_draft(id).await?;
        Ok(SentMessage {
            message_id: sent.id,
            thread_id: sent.thread_id,
        })
    }

    /// Permanently delete everything in the trash. Returns how many messages went.
    pub async fn empty_trash(&self) -> Result<usize, NexusError> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .api
                .list_messages(&ListMessagesQuery {
                    max_results: Some(TRASH_PAGE_SIZE),
                    page_token: page_token.take(),
                    q: None,
                    label_ids: Some("TRASH".to_string()),
                })
                .await?;
            ids.extend(page.messages.into_iter().map(|m| m.id));
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        let mut deleted = 0;
        for id in &ids {
            match self.api.delete_message(id).await {
                Ok(()) => deleted += 1,
                Err(e) => warn!(message_id = %id, error = %e, "Failed to delete trashed message"),
            }
        }
        info!(
            organization_id = %self.api.client().organization_id(),
            found = ids.len(),
            deleted,
            "Trash emptied"
        );
        Ok(deleted)
    }
}

fn require_name(name: &str) -> Result<&str, NexusError> {
    let name = name.trim();
    if name.is_empty() {
        Err(NexusError::BadRequest("label name is required".to_string()))
    } else {
        Ok(name)
    }
}
