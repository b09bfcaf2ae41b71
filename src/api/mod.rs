pub mod calendar_api;
pub mod gmail_api;

use crate::error::NexusError;
use serde_json::Value;
use tracing::debug;
use url::Url;

pub use calendar_api::CalendarApi;
pub use gmail_api::GmailApi;

/// Pass 2xx through; turn anything else into [`NexusError::UpstreamStatus`]
/// carrying Google's own error message when it sent one.
pub async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, NexusError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    debug!(%status, body = %body, "Google API returned an error");
    Err(NexusError::UpstreamStatus {
        status,
        message: google_error_message(&body).unwrap_or_else(|| status.to_string()),
    })
}

/// `{"error":{"message":..}}` (REST APIs) or `{"error":"..","error_description":..}` (OAuth).
fn google_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    if let Some(msg) = error.get("message").and_then(Value::as_str) {
        return Some(msg.to_string());
    }
    value
        .get("error_description")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .map(str::to_string)
}

/// `base` with `segments` appended, each percent-encoded.
pub(crate) fn join_segments(base: &Url, segments: &[&str]) -> Result<Url, NexusError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| NexusError::UrlParse(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_and_oauth_error_bodies_are_understood() {
        assert_eq!(
            google_error_message(r#"{"error":{"code":404,"message":"Requested entity was not found."}}"#)
                .as_deref(),
            Some("Requested entity was not found.")
        );
        assert_eq!(
            google_error_message(r#"{"error":"invalid_grant","error_description":"Bad Request"}"#)
                .as_deref(),
            Some("Bad Request")
        );
        assert_eq!(google_error_message("<html>"), None);
    }

    #[test]
    fn segments_are_escaped() {
        let base = Url::parse("https://www.googleapis.com/calendar/v3/").unwrap();
        let url = join_segments(&base, &["calendars", "team@acme.be", "events", "a/b"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/team@acme.be/events/a%2Fb"
        );
    }
}
