use crate::api::CalendarApi;
use crate::api::calendar_api::PRIMARY_CALENDAR;
use crate::error::NexusError;
use crate::google_oauth::GoogleAuthManager;
use crate::types::calendar::{CalendarEvent, EventInput, EventPage, ListEventsQuery};
use tracing::info;

/// Calendar operations on the organization's admin calendars.
pub struct CalendarService {
    api: CalendarApi,
    organization_id: String,
}

impl CalendarService {
    /// `None` when the organization has no usable Google credential.
    pub async fn create(
        manager: &GoogleAuthManager,
        organization_id: &str,
    ) -> Result<Option<Self>, NexusError> {
        let Some(client) = manager.authenticated_client(organization_id).await? else {
            return Ok(None);
        };
        let organization_id = client.organization_id().to_string();
        Ok(Some(Self {
            api: CalendarApi::new(client, manager.google_config().calendar_api_base.clone()),
            organization_id,
        }))
    }

    pub async fn list_events(&self, query: &ListEventsQuery) -> Result<EventPage, NexusError> {
        Ok(self.api.list_events(query).await?.into())
    }

    pub async fn create_event(&self, input: EventInput) -> Result<CalendarEvent, NexusError> {
        validate(&input)?;
        let calendar_id = calendar_of(&input);
        let created = self.api.insert_event(&calendar_id, &input.into()).await?;
        info!(
            organization_id = %self.organization_id,
            event_id = ?created.id,
            "Calendar event created"
        );
        Ok(created)
    }

    pub async fn update_event(
        &self,
        event_id: &str,
        input: EventInput,
    ) -> Result<CalendarEvent, NexusError> {
        validate(&input)?;
        let calendar_id = calendar_of(&input);
        self.api
            .patch_event(&calendar_id, event_id, &input.into())
            .await
    }

    pub async fn delete_event(&self, calendar_id: Option<&str>, event_id: &str) -> Result<(), NexusError> {
        self.api
            .delete_event(calendar_id.unwrap_or(PRIMARY_CALENDAR), event_id)
            .await
    }
}

fn calendar_of(input: &EventInput) -> String {
    input
        .calendar_id
        .clone()
        .unwrap_or_else(|| PRIMARY_CALENDAR.to_string())
}

fn validate(input: &EventInput) -> Result<(), NexusError> {
    if input.summary.trim().is_empty() {
        return Err(NexusError::BadRequest("summary is required".to_string()));
    }
    if input.start.trim().is_empty() || input.end.trim().is_empty() {
        return Err(NexusError::BadRequest("start and end are required".to_string()));
    }
    Ok(())
}
