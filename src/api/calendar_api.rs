use super::{ensure_success, join_segments};
use crate::error::NexusError;
use crate::google_oauth::AuthenticatedClient;
use crate::types::calendar::{CalendarEvent, EventList, ListEventsQuery};
use reqwest::Method;
use url::Url;

pub const PRIMARY_CALENDAR: &str = "primary";

/// Thin client over `calendar/v3/calendars/{calendarId}/events`.
#[derive(Clone)]
pub struct CalendarApi {
    client: AuthenticatedClient,
    base: Url,
}

impl CalendarApi {
    pub fn new(client: AuthenticatedClient, base: Url) -> Self {
        Self { client, base }
    }

    fn events_url(&self, calendar_id: &str, event_id: Option<&str>) -> Result<Url, NexusError> {
        let calendar_id = if calendar_id.trim().is_empty() {
            PRIMARY_CALENDAR
        } else {
            calendar_id
        };
        match event_id {
            Some(id) => join_segments(&self.base, &["calendars", calendar_id, "events", id]),
            None => join_segments(&self.base, &["calendars", calendar_id, "events"]),
        }
    }

    /// One page of events; `pageToken` is forwarded untouched.
    pub async fn list_events(&self, q: &ListEventsQuery) -> Result<EventList, NexusError> {
        let mut query: Vec<(&str, String)> = vec![
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
            ("maxResults", q.max_results.unwrap_or(250).to_string()),
        ];
        for (key, value) in [
            ("timeMin", &q.time_min),
            ("timeMax", &q.time_max),
            ("pageToken", &q.page_token),
        ] {
            if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
                query.push((key, v.to_string()));
            }
        }
        let url = self.events_url(q.calendar_id.as_deref().unwrap_or(PRIMARY_CALENDAR), None)?;
        let resp = self.client.request(Method::GET, url).query(&query).send().await?;
        Ok(ensure_success(resp).await?.json().await?)
    }

    pub async fn insert_event(
        &self,
        calendar_id: &str,
        event: &CalendarEvent,
    ) -> Result<CalendarEvent, NexusError> {
        let url = self.events_url(calendar_id, None)?;
        let resp = self.client.request(Method::POST, url).json(event).send().await?;
        Ok(ensure_success(resp).await?.json().await?)
    }

    /// Partial update: fields left `None` keep their stored value.
    pub async fn patch_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        event: &CalendarEvent,
    ) -> Result<CalendarEvent, NexusError> {
        let url = self.events_url(calendar_id, Some(event_id))?;
        let resp = self.client.request(Method::PATCH, url).json(event).send().await?;
        Ok(ensure_success(resp).await?.json().await?)
    }

    pub async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), NexusError> {
        let url = self.events_url(calendar_id, Some(event_id))?;
        let resp = self.client.request(Method::DELETE, url).send().await?;
        ensure_success(resp).await?;
        Ok(())
    }
}
