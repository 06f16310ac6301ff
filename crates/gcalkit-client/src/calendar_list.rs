//! The authenticated user's calendar list.

use gcalkit_core::CalendarResult;
use reqwest::Method;
use serde::Deserialize;
use tracing::debug;

use crate::calendar::CalendarResource;
use crate::connection::Connection;
use crate::gateway::{decode_json, path_with_query};

const CALENDAR_LIST_PATH: &str = "users/me/calendarList";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCalendarList {
    #[serde(default)]
    items: Vec<ApiCalendarListEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCalendarListEntry {
    id: String,
    #[serde(default)]
    summary: String,
    description: Option<String>,
    time_zone: Option<String>,
    access_role: Option<String>,
    #[serde(default)]
    primary: bool,
    background_color: Option<String>,
    foreground_color: Option<String>,
}

/// One calendar the user has access to.
#[derive(Debug, Clone)]
pub struct CalendarListEntry {
    pub id: String,
    pub summary: String,
    pub description: Option<String>,
    pub time_zone: Option<String>,
    /// `owner`, `writer`, `reader` or `freeBusyReader`.
    pub access_role: Option<String>,
    pub primary: bool,
    pub background_color: Option<String>,
    pub foreground_color: Option<String>,
    connection: Connection,
}

impl CalendarListEntry {
    /// Returns the resource for this calendar.
    pub fn calendar(&self) -> CalendarResult<CalendarResource> {
        self.connection.calendar(self.id.as_str())
    }

    pub fn can_write(&self) -> bool {
        matches!(self.access_role.as_deref(), Some("owner" | "writer"))
    }
}

/// Reads the calendar list.
#[derive(Debug, Clone)]
pub struct CalendarListResource {
    connection: Connection,
}

impl CalendarListResource {
    pub(crate) fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Returns every entry of the list, following all pages.
    pub async fn fetch_entries(&self) -> CalendarResult<Vec<CalendarListEntry>> {
        self.connection.require_json("the calendar list")?;
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let params: Vec<(&str, String)> = page_token
                .take()
                .map(|token| ("pageToken", token))
                .into_iter()
                .collect();
            let response = self
                .connection
                .gateway()
                .request(
                    Method::GET,
                    &path_with_query(CALENDAR_LIST_PATH, &params),
                    None,
                )
                .await?;
            let list: ApiCalendarList = decode_json(&response.body, "calendar list")?;
            entries.extend(list.items.into_iter().map(|item| self.entry(item)));
            match list.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        debug!(count = entries.len(), "fetched calendar list");
        Ok(entries)
    }

    /// Returns the entry flagged as the user's primary calendar.
    pub async fn primary(&self) -> CalendarResult<Option<CalendarListEntry>> {
        Ok(self
            .fetch_entries()
            .await?
            .into_iter()
            .find(|entry| entry.primary))
    }

    fn entry(&self, item: ApiCalendarListEntry) -> CalendarListEntry {
        CalendarListEntry {
            id: item.id,
            summary: item.summary,
            description: item.description,
            time_zone: item.time_zone,
            access_role: item.access_role,
            primary: item.primary,
            background_color: item.background_color,
            foreground_color: item.foreground_color,
            connection: self.connection.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use gcalkit_core::ErrorKind;
    use serde_json::json;

    use crate::config::{AuthMode, ClientConfig, OAuthCredentials};
    use crate::mock::MockHttpClient;

    fn connection(mock: Arc<MockHttpClient>) -> Connection {
        let credentials = OAuthCredentials::new(
            "client.apps.googleusercontent.com",
            "secret",
            "http://localhost",
        );
        Connection::new(
            ClientConfig::new().with_base_url("https://calendar.example.com"),
            AuthMode::oauth_with_refresh_token(credentials, "1//refresh"),
            mock,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn entries_follow_pages() {
        let mock = Arc::new(MockHttpClient::new());
        mock.push_json(200, json!({"access_token": "ya29.t", "expires_in": 3600}))
            .push_json(
                200,
                json!({
                    "items": [{"id": "me@example.com", "summary": "Me", "primary": true, "accessRole": "owner"}],
                    "nextPageToken": "p2"
                }),
            )
            .push_json(
                200,
                json!({"items": [{
                    "id": "en.usa#holiday@group.v.calendar.google.com",
                    "summary": "Holidays",
                    "accessRole": "reader",
                    "timeZone": "America/New_York"
                }]}),
            );

        let entries = connection(mock.clone()).calendar_list().fetch_entries().await.unwrap();

        assert_eq!(entries.len(), 2);
        assert!(entries[0].primary);
        assert!(entries[0].can_write());
        assert!(!entries[1].can_write());
        assert_eq!(entries[1].time_zone.as_deref(), Some("America/New_York"));
        let requests = mock.requests();
        assert_eq!(requests[1].url.path(), "/users/me/calendarList");
        assert_eq!(requests[1].query_value("pageToken"), None);
        assert_eq!(requests[2].query_value("pageToken").as_deref(), Some("p2"));

        let holidays = entries[1].calendar().unwrap();
        assert_eq!(
            holidays.calendar_id(),
            "en.usa#holiday@group.v.calendar.google.com"
        );
    }

    #[tokio::test]
    async fn primary_entry() {
        let mock = Arc::new(MockHttpClient::new());
        mock.push_json(200, json!({"access_token": "ya29.t", "expires_in": 3600}))
            .push_json(
                200,
                json!({"items": [
                    {"id": "team@group.example.com"},
                    {"id": "me@example.com", "primary": true}
                ]}),
            );
        let primary = connection(mock).calendar_list().primary().await.unwrap();
        assert_eq!(primary.map(|entry| entry.id).as_deref(), Some("me@example.com"));
    }

    #[tokio::test]
    async fn legacy_has_no_calendar_list() {
        let mock = Arc::new(MockHttpClient::new());
        let connection = Connection::new(
            ClientConfig::new().with_base_url("https://calendar.example.com"),
            AuthMode::client_login("user@example.com", "pw", "tests"),
            mock,
        )
        .unwrap();
        let err = connection.calendar_list().fetch_entries().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
