use crate::middleware::{OrganizationScope, RequireKeyAuth};
use crate::service::CalendarService;
use crate::types::calendar::{CalendarEvent, EventInput, EventPage, ListEventsQuery};
use crate::{NexusError, router::NexusState};

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarSelector {
    pub calendar_id: Option<String>,
}

async fn calendar(
    state: &NexusState,
    organization: &OrganizationScope,
) -> Result<CalendarService, NexusError> {
    CalendarService::create(&state.manager, organization.as_str())
        .await?
        .ok_or(NexusError::NotConnected)
}

/// GET /api/calendar/events
pub async fn list_events(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
    Query(query): Query<ListEventsQuery>,
) -> Result<Json<EventPage>, NexusError> {
    let service = calendar(&state, &organization).await?;
    Ok(Json(service.list_events(&query).await?))
}

/// POST /api/calendar/events
pub async fn create_event(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
    Json(input): Json<EventInput>,
) -> Result<Json<CalendarEvent>, NexusError> {
    let service = calendar(&state, &organization).await?;
    Ok(Json(service.create_event(input).await?))
}

/// PUT /api/calendar/events/{id}
pub async fn update_event(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
    Path(id): Path<String>,
    Json(input): Json<EventInput>,
) -> Result<Json<CalendarEvent>, NexusError> {
    let service = calendar(&state, &organization).await?;
    Ok(Json(service.update_event(&id, input).await?))
}

/// DELETE /api/calendar/events/{id}?calendarId=
pub async fn delete_event(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
    Path(id): Path<String>,
    Query(selector): Query<CalendarSelector>,
) -> Result<Json<Value>, NexusError> {
    calendar(&state, &organization)
        .await?
        .delete_event(selector.calendar_id.as_deref(), &id)
        .await?;
    Ok(Json(json!({ "success": true })))
}
