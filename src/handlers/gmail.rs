use crate::middleware::{OrganizationScope, RequireKeyAuth};
use crate::service::GmailService;
use crate::service::gmail::SavedDraft;
use crate::types::gmail::{
    FormattedDraft, FormattedMessage, GmailLabel, LabelNameRequest, ListMessagesQuery,
    MessagePage, ModifyLabelsRequest, ReadRequest, SendEmailRequest, SentMessage, StarRequest,
};
use crate::{NexusError, router::NexusState};

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

async fn mailbox(state: &NexusState, organization: &OrganizationScope) -> Result<GmailService, NexusError> {
    GmailService::create(&state.manager, organization.as_str())
        .await?
        .ok_or(NexusError::NotConnected)
}

fn done() -> Json<Value> {
    Json(json!({ "success": true }))
}

/// GET /api/gmail/messages
pub async fn list_messages(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<MessagePage>, NexusError> {
    let gmail = mailbox(&state, &organization).await?;
    Ok(Json(gmail.get_messages(&query).await?))
}

/// GET /api/gmail/messages/{id}
pub async fn get_message(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
    Path(id): Path<String>,
) -> Result<Json<FormattedMessage>, NexusError> {
    let gmail = mailbox(&state, &organization).await?;
    Ok(Json(gmail.get_message(&id).await?))
}

/// DELETE /api/gmail/messages/{id} (permanent)
pub async fn delete_message(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
    Path(id): Path<String>,
) -> Result<Json<Value>, NexusError> {
    mailbox(&state, &organization).await?.delete_message(&id).await?;
    Ok(done())
}

/// POST /api/gmail/messages/send
pub async fn send_message(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
    Json(req): Json<SendEmailRequest>,
) -> Result<Json<SentMessage>, NexusError> {
    let gmail = mailbox(&state, &organization).await?;
    Ok(Json(gmail.send_email(&req).await?))
}

/// POST /api/gmail/messages/{id}/read
pub async fn mark_read(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
    Path(id): Path<String>,
    Json(req): Json<ReadRequest>,
) -> Result<Json<Value>, NexusError> {
    mailbox(&state, &organization)
        .await?
        .mark_as_read(&id, req.read)
        .await?;
    Ok(done())
}

/// POST /api/gmail/messages/{id}/star
pub async fn mark_starred(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
    Path(id): Path<String>,
    Json(req): Json<StarRequest>,
) -> Result<Json<Value>, NexusError> {
    mailbox(&state, &organization)
        .await?
        .mark_as_starred(&id, req.starred)
        .await?;
    Ok(done())
}

/// POST /api/gmail/messages/{id}/trash
pub async fn trash_message(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
    Path(id): Path<String>,
) -> Result<Json<Value>, NexusError> {
    mailbox(&state, &organization).await?.trash_message(&id).await?;
    Ok(done())
}

/// POST /api/gmail/messages/{id}/untrash
pub async fn untrash_message(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
    Path(id): Path<String>,
) -> Result<Json<Value>, NexusError> {
    mailbox(&state, &organization).await?.untrash_message(&id).await?;
    Ok(done())
}

/// POST /api/gmail/messages/{id}/labels
pub async fn modify_labels(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
    Path(id): Path<String>,
    Json(req): Json<ModifyLabelsRequest>,
) -> Result<Json<Value>, NexusError> {
    mailbox(&state, &organization)
        .await?
        .modify_labels(&id, &req.add_label_ids, &req.remove_label_ids)
        .await?;
    Ok(done())
}

/// GET /api/gmail/messages/{id}/attachments/{attachment_id} -> raw bytes.
pub async fn get_attachment(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
    Path((message_id, attachment_id)): Path<(String, String)>,
) -> Result<Response, NexusError> {
    let attachment = mailbox(&state, &organization)
        .await?
        .get_attachment(&message_id, &attachment_id)
        .await?;

    let content_type = HeaderValue::from_str(&attachment.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&content_disposition(&attachment.filename))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        attachment.data,
    )
        .into_response())
}

/// GET /api/gmail/labels
pub async fn list_labels(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
) -> Result<Json<Vec<GmailLabel>>, NexusError> {
    Ok(Json(mailbox(&state, &organization).await?.get_labels().await?))
}

/// POST /api/gmail/labels
pub async fn create_label(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
    Json(req): Json<LabelNameRequest>,
) -> Result<Json<GmailLabel>, NexusError> {
    let gmail = mailbox(&state, &organization).await?;
    Ok(Json(gmail.create_label(&req.name).await?))
}

/// PUT /api/gmail/labels/{id}
pub async fn update_label(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
    Path(id): Path<String>,
    Json(req): Json<LabelNameRequest>,
) -> Result<Json<GmailLabel>, NexusError> {
    let gmail = mailbox(&state, &organization).await?;
    Ok(Json(gmail.update_label(&id, &req.name).await?))
}

/// DELETE /api/gmail/labels/{id}
pub async fn delete_label(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
    Path(id): Path<String>,
) -> Result<Json<Value>, NexusError> {
    mailbox(&state, &organization).await?.delete_label(&id).await?;
    Ok(done())
}

/// GET /api/gmail/drafts
pub async fn list_drafts(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
) -> Result<Json<Vec<FormattedDraft>>, NexusError> {
    Ok(Json(mailbox(&state, &organization).await?.get_drafts().await?))
}

/// POST /api/gmail/drafts
pub async fn save_draft(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
    Json(req): Json<SendEmailRequest>,
) -> Result<Json<SavedDraft>, NexusError> {
    let gmail = mailbox(&state, &organization).await?;
    Ok(Json(gmail.save_draft(&req).await?))
}

/// DELETE /api/gmail/drafts/{id}
pub async fn delete_draft(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
    Path(id): Path<String>,
) -> Result<Json<Value>, NexusError> {
    mailbox(&state, &organization).await?.delete_draft(&id).await?;
    Ok(done())
}

/// POST /api/gmail/drafts/{id}/send
pub async fn send_draft(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
    Path(id): Path<String>,
) -> Result<Json<SentMessage>, NexusError> {
    let gmail = mailbox(&state, &organization).await?;
    Ok(Json(gmail.send_draft(&id).await?))
}

/// POST /api/gmail/trash/empty
pub async fn empty_trash(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
) -> Result<Json<Value>, NexusError> {
    let deleted = mailbox(&state, &organization).await?.empty_trash().await?;
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}

fn content_disposition(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    format!("attachment; filename=\"{safe}\"")
}
