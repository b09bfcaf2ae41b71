use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Gmail sends base64url, sometimes padded, sometimes not.
const GMAIL_B64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub fn decode_gmail_b64(data: &str) -> Option<Vec<u8>> {
    GMAIL_B64.decode(data.trim()).ok()
}

pub fn encode_gmail_b64(data: &[u8]) -> String {
    GMAIL_B64.encode(data)
}

// ---- wire types (users.messages / labels / drafts) ----

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageList {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    pub next_page_token: Option<String>,
    pub result_size_estimate: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub snippet: String,
    pub internal_date: Option<String>,
    pub payload: Option<MessagePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    pub mime_type: Option<String>,
    pub filename: Option<String>,
    #[serde(default)]
    pub headers: Vec<Header>,
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    pub attachment_id: Option<String>,
    #[serde(default)]
    pub size: u64,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentBody {
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailLabel {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub label_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_list_visibility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_list_visibility: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabelList {
    #[serde(default)]
    pub labels: Vec<GmailLabel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Draft {
    pub id: String,
    pub message: Option<GmailMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftList {
    #[serde(default)]
    pub drafts: Vec<DraftRef>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftRef {
    pub id: String,
    pub message: Option<MessageRef>,
}

// ---- request bodies accepted from the CRM ----

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMessagesQuery {
    pub max_results: Option<u32>,
    pub page_token: Option<String>,
    pub q: Option<String>,
    /// Comma separated.
    pub label_ids: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingAttachment {
    pub filename: String,
    #[serde(default = "default_attachment_mime")]
    pub mime_type: String,
    /// Standard base64 of the file bytes.
    pub content_base64: String,
}

fn default_attachment_mime() -> String {
    "application/octet-stream".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailRequest {
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub is_html: bool,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub from_name: Option<String>,
    #[serde(default)]
    pub attachments: Vec<OutgoingAttachment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadRequest {
    #[serde(default = "yes")]
    pub read: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StarRequest {
    #[serde(default = "yes")]
    pub starred: bool,
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyLabelsRequest {
    #[serde(default)]
    pub add_label_ids: Vec<String>,
    #[serde(default)]
    pub remove_label_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelNameRequest {
    pub name: String,
}

// ---- shapes returned to the CRM ----

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentMeta {
    pub attachment_id: String,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedMessage {
    pub id: String,
    pub thread_id: String,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub date: String,
    pub snippet: String,
    pub labels: Vec<String>,
    pub is_read: bool,
    pub is_starred: bool,
    pub has_attachments: bool,
    pub attachments: Vec<AttachmentMeta>,
    pub html_body: String,
    pub text_body: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<FormattedMessage>,
    pub next_page_token: Option<String>,
    pub result_size_estimate: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedDraft {
    pub draft_id: String,
    pub message_id: String,
    pub subject: String,
    pub to: String,
    pub body: String,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    pub message_id: String,
    pub thread_id: Option<String>,
}

/// Attachment bytes plus what the message says about them.
#[derive(Debug, Clone)]
pub struct AttachmentContent {
    pub filename: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl MessagePart {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    fn is(&self, mime: &str) -> bool {
        self.mime_type
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case(mime))
    }

    fn decoded_body(&self) -> Option<String> {
        let data = self.body.as_ref()?.data.as_deref()?;
        decode_gmail_b64(data).map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// First body of `mime` found depth-first.
    pub fn find_body(&self, mime: &str) -> Option<String> {
        if self.is(mime)
            && self.filename.as_deref().unwrap_or_default().is_empty()
            && let Some(body) = self.decoded_body()
        {
            return Some(body);
        }
        self.parts.iter().find_map(|p| p.find_body(mime))
    }

    pub fn attachments(&self) -> Vec<AttachmentMeta> {
        let mut out = Vec::new();
        self.collect_attachments(&mut out);
        out
    }

    fn collect_attachments(&self, out: &mut Vec<AttachmentMeta>) {
        if let (Some(filename), Some(body)) = (self.filename.as_deref(), self.body.as_ref())
            && !filename.is_empty()
            && let Some(id) = body.attachment_id.as_deref()
        {
            out.push(AttachmentMeta {
                attachment_id: id.to_string(),
                filename: filename.to_string(),
                mime_type: self
                    .mime_type
                    .clone()
                    .unwrap_or_else(default_attachment_mime),
                size: body.size,
            });
        }
        for part in &self.parts {
            part.collect_attachments(out);
        }
    }

    /// The part carrying `attachment_id`, searched depth-first.
    pub fn find_attachment(&self, attachment_id: &str) -> Option<&MessagePart> {
        let here = self
            .body
            .as_ref()
            .and_then(|b| b.attachment_id.as_deref())
            == Some(attachment_id);
        if here {
            return Some(self);
        }
        self.parts.iter().find_map(|p| p.find_attachment(attachment_id))
    }
}

impl From<GmailMessage> for FormattedMessage {
    fn from(msg: GmailMessage) -> Self {
        let payload = msg.payload.unwrap_or_default();
        let header = |name: &str| payload.header(name).unwrap_or_default().to_string();
        let attachments = payload.attachments();
        let html_body = payload.find_body("text/html").unwrap_or_default();
        let text_body = payload.find_body("text/plain").unwrap_or_default();
        FormattedMessage {
            subject: header("Subject"),
            from: header("From"),
            to: header("To"),
            date: header("Date"),
            is_read: !msg.label_ids.iter().any(|l| l == "UNREAD"),
            is_starred: msg.label_ids.iter().any(|l| l == "STARRED"),
            has_attachments: !attachments.is_empty(),
            attachments,
            html_body,
            text_body,
            id: msg.id,
            thread_id: msg.thread_id,
            snippet: msg.snippet,
            labels: msg.label_ids,
        }
    }
}

impl FormattedDraft {
    pub fn from_draft(draft_id: String, msg: GmailMessage) -> Self {
        let payload = msg.payload.unwrap_or_default();
        let body = payload
            .find_body("text/plain")
            .or_else(|| payload.find_body("text/html"))
            .unwrap_or_default();
        FormattedDraft {
            draft_id,
            message_id: msg.id,
            subject: payload.header("Subject").unwrap_or_default().to_string(),
            to: payload.header("To").unwrap_or_default().to_string(),
            body,
            date: msg
                .internal_date
                .as_deref()
                .and_then(|ms| ms.parse::<i64>().ok())
                .and_then(DateTime::<Utc>::from_timestamp_millis),
        }
    }
}
