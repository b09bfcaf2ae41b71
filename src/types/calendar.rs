use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TIME_ZONE: &str = "Europe/Brussels";

/// `start` / `end` of a Calendar event: timed events carry `dateTime`, all-day ones `date`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventDateTime {
    /// `2024-05-01` becomes an all-day date, anything else a timed instant.
    pub fn from_input(value: &str, time_zone: &str) -> Self {
        let value = value.trim();
        if NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok() {
            EventDateTime {
                date: Some(value.to_string()),
                ..Default::default()
            }
        } else {
            EventDateTime {
                date_time: Some(value.to_string()),
                time_zone: Some(time_zone.to_string()),
                ..Default::default()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EventAttendee {
    pub email: String,
}

/// Calendar API event resource, restricted to the fields the CRM uses.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<EventDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<EventDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<EventAttendee>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventList {
    #[serde(default)]
    pub items: Vec<CalendarEvent>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    pub events: Vec<CalendarEvent>,
    pub next_page_token: Option<String>,
}

impl From<EventList> for EventPage {
    fn from(list: EventList) -> Self {
        EventPage {
            events: list.items,
            next_page_token: list.next_page_token,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEventsQuery {
    pub calendar_id: Option<String>,
    pub time_min: Option<String>,
    pub time_max: Option<String>,
    pub page_token: Option<String>,
    pub max_results: Option<u32>,
}

/// Event fields accepted from the CRM for create and update.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInput {
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: String,
    pub end: String,
    pub time_zone: Option<String>,
    #[serde(default)]
    pub attendees: Vec<String>,
    pub calendar_id: Option<String>,
}

impl From<EventInput> for CalendarEvent {
    fn from(input: EventInput) -> Self {
        let tz = input.time_zone.as_deref().unwrap_or(DEFAULT_TIME_ZONE);
        CalendarEvent {
            summary: Some(input.summary),
            description: input.description,
            location: input.location,
            start: Some(EventDateTime::from_input(&input.start, tz)),
            end: Some(EventDateTime::from_input(&input.end, tz)),
            attendees: (!input.attendees.is_empty()).then(|| {
                input
                    .attendees
                    .into_iter()
                    .map(|email| EventAttendee { email })
                    .collect()
            }),
            ..Default::default()
        }
    }
}
