//! Event operations scoped to one calendar.
//!
//! A [`CalendarResource`] is created from a [`Connection`] and owns the
//! calendar id every request is addressed to. Events it returns are bound
//! to that id, and saving or deleting an event bound to another calendar
//! is rejected before any request is sent.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use gcalkit_core::{
    CalendarError, CalendarResult, Event, PersistenceState, TimeWindow, validate_event_id,
};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::codec::EventPage;
use crate::connection::Connection;
use crate::gateway::{ApiGeneration, decode_json, encode_json, path_with_query};

/// Page size used when the caller does not pick one.
pub const DEFAULT_MAX_RESULTS: u32 = 25;

/// Sort order for event listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBy {
    StartTime,
    Updated,
}

impl OrderBy {
    fn wire_value(&self, generation: ApiGeneration) -> &'static str {
        match (self, generation) {
            (Self::StartTime, ApiGeneration::Json) => "startTime",
            (Self::Updated, ApiGeneration::Json) => "updated",
            (Self::StartTime, ApiGeneration::LegacyXml) => "starttime",
            (Self::Updated, ApiGeneration::LegacyXml) => "lastmodified",
        }
    }
}

/// Filters and paging for event listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub max_results: u32,
    pub order_by: Option<OrderBy>,
    /// Expand recurring events into their instances.
    pub single_events: bool,
    pub show_deleted: bool,
    /// Cursor returned by a previous [`CalendarResource::list_events`] call.
    pub page_token: Option<String>,
    pub time_min: Option<DateTime<Utc>>,
    pub time_max: Option<DateTime<Utc>>,
    /// Free-text search.
    pub text: Option<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            order_by: Some(OrderBy::StartTime),
            single_events: true,
            show_deleted: false,
            page_token: None,
            time_min: None,
            time_max: None,
            text: None,
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_order_by(mut self, order_by: Option<OrderBy>) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn with_single_events(mut self, single_events: bool) -> Self {
        self.single_events = single_events;
        self
    }

    pub fn with_show_deleted(mut self, show_deleted: bool) -> Self {
        self.show_deleted = show_deleted;
        self
    }

    pub fn with_page_token(mut self, token: impl Into<String>) -> Self {
        self.page_token = Some(token.into());
        self
    }

    pub fn with_time_min(mut self, time_min: DateTime<Utc>) -> Self {
        self.time_min = Some(time_min);
        self
    }

    pub fn with_time_max(mut self, time_max: DateTime<Utc>) -> Self {
        self.time_max = Some(time_max);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    fn json_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(time_min) = self.time_min {
            params.push(("timeMin", wire_instant(time_min)));
        }
        if let Some(time_max) = self.time_max {
            params.push(("timeMax", wire_instant(time_max)));
        }
        if let Some(text) = &self.text {
            params.push(("q", text.clone()));
        }
        params.push(("maxResults", self.max_results.to_string()));
        if let Some(order_by) = self.order_by {
            params.push(("orderBy", order_by.wire_value(ApiGeneration::Json).into()));
        }
        params.push(("singleEvents", self.single_events.to_string()));
        if self.show_deleted {
            params.push(("showDeleted", "true".into()));
        }
        if let Some(token) = &self.page_token {
            params.push(("pageToken", token.clone()));
        }
        params
    }

    fn legacy_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(time_min) = self.time_min {
            params.push(("start-min", wire_instant(time_min)));
        }
        if let Some(time_max) = self.time_max {
            params.push(("start-max", wire_instant(time_max)));
        }
        if let Some(text) = &self.text {
            params.push(("q", text.clone()));
        }
        params.push(("max-results", self.max_results.to_string()));
        if let Some(order_by) = self.order_by {
            params.push((
                "orderby",
                order_by.wire_value(ApiGeneration::LegacyXml).into(),
            ));
            if order_by == OrderBy::StartTime {
                params.push(("sortorder", "ascending".into()));
            }
        }
        params.push(("singleevents", self.single_events.to_string()));
        if self.show_deleted {
            params.push(("showdeleted", "true".into()));
        }
        params
    }
}

fn wire_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn encode_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

/// Calendar-level properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarMetadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// IANA zone name, e.g. `Europe/Paris`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl CalendarMetadata {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.time_zone = Some(time_zone.into());
        self
    }
}

/// Event and metadata operations for one calendar.
#[derive(Debug, Clone)]
pub struct CalendarResource {
    connection: Connection,
    calendar_id: String,
}

impl CalendarResource {
    pub(crate) fn new(
        connection: Connection,
        calendar_id: impl Into<String>,
    ) -> CalendarResult<Self> {
        let calendar_id = calendar_id.into();
        if calendar_id.is_empty() {
            return Err(CalendarError::calendar_id_missing());
        }
        Ok(Self::bound(connection, calendar_id))
    }

    pub(crate) fn bound(connection: Connection, calendar_id: String) -> Self {
        Self {
            connection,
            calendar_id,
        }
    }

    pub fn calendar_id(&self) -> &str {
        &self.calendar_id
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn events_path(&self) -> String {
        let id = encode_segment(&self.calendar_id);
        match self.connection.generation() {
            ApiGeneration::Json => format!("calendars/{}/events", id),
            ApiGeneration::LegacyXml => format!("{}/private/full", id),
        }
    }

    fn event_path(&self, event_id: &str) -> String {
        format!("{}/{}", self.events_path(), encode_segment(event_id))
    }

    fn metadata_path(&self) -> String {
        format!("calendars/{}", encode_segment(&self.calendar_id))
    }

    fn bind_page(&self, page: &mut EventPage) {
        for event in &mut page.events {
            event.bind_calendar(self.calendar_id.as_str());
        }
    }

    fn check_binding(&self, event: &Event) -> CalendarResult<()> {
        match event.calendar_id() {
            Some(bound) if bound != self.calendar_id => {
                Err(CalendarError::invalid_argument(format!(
                    "event belongs to calendar '{}', not '{}'",
                    bound, self.calendar_id
                )))
            }
            _ => Ok(()),
        }
    }

    /// Fetches one page of events.
    pub async fn list_events(&self, options: &QueryOptions) -> CalendarResult<EventPage> {
        self.list_with(options, Vec::new()).await
    }

    async fn list_with(
        &self,
        options: &QueryOptions,
        extra: Vec<(&'static str, String)>,
    ) -> CalendarResult<EventPage> {
        let location = match self.connection.generation() {
            ApiGeneration::Json => {
                let mut params = options.json_params();
                params.extend(extra);
                path_with_query(&self.events_path(), &params)
            }
            // legacy page tokens are the absolute URL of the next feed page
            ApiGeneration::LegacyXml => match &options.page_token {
                Some(next) => next.clone(),
                None => path_with_query(&self.events_path(), &options.legacy_params()),
            },
        };

        let response = self
            .connection
            .gateway()
            .request(Method::GET, &location, None)
            .await?;
        let mut page = self.connection.codec().decode_page(&response.body)?;
        self.bind_page(&mut page);
        debug!(
            calendar_id = %self.calendar_id,
            count = page.events.len(),
            more = page.next_page_token.is_some(),
            "listed events"
        );
        Ok(page)
    }

    /// Returns events starting in `[start, end)`.
    pub async fn find_events_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        options: &QueryOptions,
    ) -> CalendarResult<Vec<Event>> {
        let window = TimeWindow::new(start, end)?;
        let options = options
            .clone()
            .with_time_min(window.start)
            .with_time_max(window.end);
        Ok(self.list_events(&options).await?.events)
    }

    /// Returns events matching the free-text `query`.
    pub async fn find_events(&self, query: &str) -> CalendarResult<Vec<Event>> {
        let options = QueryOptions::default().with_text(query);
        Ok(self.list_events(&options).await?.events)
    }

    /// Returns events that start from now on.
    pub async fn find_future_events(&self, options: &QueryOptions) -> CalendarResult<Vec<Event>> {
        let options = options.clone().with_time_min(Utc::now());
        Ok(self.list_events(&options).await?.events)
    }

    /// Returns every event of the calendar, following all pages.
    pub async fn all_events(&self) -> CalendarResult<Vec<Event>> {
        let mut options = QueryOptions::default().with_max_results(250);
        let mut events = Vec::new();
        loop {
            let page = self.list_events(&options).await?;
            events.extend(page.events);
            match page.next_page_token {
                Some(token) => options.page_token = Some(token),
                None => return Ok(events),
            }
        }
    }

    /// Returns events whose extended properties contain every given pair.
    pub async fn find_events_by_extended_properties(
        &self,
        shared: &BTreeMap<String, String>,
        private: &BTreeMap<String, String>,
    ) -> CalendarResult<Vec<Event>> {
        self.connection
            .require_json("extended property queries")?;
        let extra = shared
            .iter()
            .map(|(k, v)| ("sharedExtendedProperty", format!("{}={}", k, v)))
            .chain(
                private
                    .iter()
                    .map(|(k, v)| ("privateExtendedProperty", format!("{}={}", k, v))),
            )
            .collect();
        Ok(self.list_with(&QueryOptions::default(), extra).await?.events)
    }

    /// Looks up one event.
    ///
    /// A missing event yields an empty vector rather than an error.
    pub async fn find_event_by_id(&self, event_id: &str) -> CalendarResult<Vec<Event>> {
        if event_id.is_empty() {
            return Err(CalendarError::invalid_argument("event id is empty"));
        }
        let result = self
            .connection
            .gateway()
            .request(Method::GET, &self.event_path(event_id), None)
            .await;
        let response = match result {
            Ok(response) => response,
            Err(e) if e.is_not_found() => {
                debug!(event_id, calendar_id = %self.calendar_id, "event not found");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        let mut event = self.connection.codec().decode(&response.body)?;
        event.bind_calendar(self.calendar_id.as_str());
        Ok(vec![event])
    }

    /// Updates the event `event_id`, or creates it under that id.
    ///
    /// `mutator` runs on the fetched event, or on a fresh one carrying the
    /// id, before the save.
    pub async fn find_or_create_event_by_id<F>(
        &self,
        event_id: &str,
        mutator: F,
    ) -> CalendarResult<Event>
    where
        F: FnOnce(&mut Event),
    {
        validate_event_id(event_id)?;
        let mut event = match self.find_event_by_id(event_id).await?.into_iter().next() {
            Some(existing) => existing,
            None => {
                let mut event = Event::with_asserted_id(event_id)?;
                event.bind_calendar(self.calendar_id.as_str());
                event
            }
        };
        mutator(&mut event);
        self.save_event(&mut event).await?;
        Ok(event)
    }

    /// Builds a new event with `mutator` and saves it.
    pub async fn create_event<F>(&self, mutator: F) -> CalendarResult<Event>
    where
        F: FnOnce(&mut Event),
    {
        let mut event = Event::new();
        event.bind_calendar(self.calendar_id.as_str());
        mutator(&mut event);
        self.save_event(&mut event).await?;
        Ok(event)
    }

    /// Creates or updates `event` and merges the server's copy into it.
    pub async fn save_event(&self, event: &mut Event) -> CalendarResult<()> {
        self.check_binding(event)?;
        let codec = self.connection.codec();
        let gateway = self.connection.gateway();

        let response = if event.is_quick_add() {
            let text = event.title.clone().unwrap_or_default();
            if text.trim().is_empty() {
                return Err(CalendarError::invalid_argument("quick-add text is empty"));
            }
            match codec.encode_quick_add(&text)? {
                None => {
                    let mut params = vec![("text", text)];
                    if event.send_notifications {
                        params.push(("sendNotifications", "true".into()));
                    }
                    let location =
                        path_with_query(&format!("{}/quickAdd", self.events_path()), &params);
                    gateway.request(Method::POST, &location, None).await?
                }
                Some(body) => {
                    gateway
                        .request(Method::POST, &self.events_path(), Some(body))
                        .await?
                }
            }
        } else if event.is_new() {
            let body = codec.encode(event)?;
            let location = path_with_query(&self.events_path(), &self.notify_params(event));
            gateway.request(Method::POST, &location, Some(body)).await?
        } else {
            let body = codec.encode(event)?;
            let location = self.entry_location(event)?;
            gateway.request(Method::PUT, &location, Some(body)).await?
        };

        let mut saved = codec.decode(&response.body)?;
        saved.bind_calendar(self.calendar_id.as_str());
        event.absorb_saved(saved);
        event.bind_calendar(self.calendar_id.as_str());
        info!(
            event_id = event.id().unwrap_or_default(),
            calendar_id = %self.calendar_id,
            "saved event"
        );
        Ok(())
    }

    /// Deletes a saved event and clears its id.
    pub async fn delete_event(&self, event: &mut Event) -> CalendarResult<()> {
        self.check_binding(event)?;
        if event.persistence_state() != PersistenceState::Saved {
            return Err(CalendarError::invalid_argument(
                "only saved events can be deleted",
            ));
        }
        let location = self.entry_location(event)?;
        self.connection
            .gateway()
            .request(Method::DELETE, &location, None)
            .await?;
        info!(
            event_id = event.id().unwrap_or_default(),
            calendar_id = %self.calendar_id,
            "deleted event"
        );
        event.mark_deleted();
        Ok(())
    }

    fn notify_params(&self, event: &Event) -> Vec<(&'static str, String)> {
        match self.connection.generation() {
            ApiGeneration::Json if event.send_notifications => {
                vec![("sendNotifications", "true".into())]
            }
            _ => Vec::new(),
        }
    }

    /// Where updates and deletes of a saved event are sent.
    fn entry_location(&self, event: &Event) -> CalendarResult<String> {
        if self.connection.generation() == ApiGeneration::LegacyXml {
            if let Some(edit) = &event.server_fields().edit_link {
                return Ok(edit.clone());
            }
        }
        let id = event
            .id()
            .ok_or_else(|| CalendarError::invalid_argument("event has no id"))?;
        Ok(path_with_query(
            &self.event_path(id),
            &self.notify_params(event),
        ))
    }

    /// Fetches every change since `sync_token`.
    ///
    /// Without a token this is a full listing. The returned page holds all
    /// events across pages and the token for the next call. An expired
    /// token surfaces as [`gcalkit_core::ErrorKind::Gone`].
    pub async fn sync_events(&self, sync_token: Option<&str>) -> CalendarResult<EventPage> {
        self.connection.require_json("incremental sync")?;
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut params = Vec::new();
            if let Some(token) = sync_token {
                params.push(("syncToken", token.to_string()));
            }
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }
            let location = path_with_query(&self.events_path(), &params);
            let response = self
                .connection
                .gateway()
                .request(Method::GET, &location, None)
                .await?;
            let mut page = self.connection.codec().decode_page(&response.body)?;
            self.bind_page(&mut page);
            events.extend(page.events);

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => {
                    debug!(
                        calendar_id = %self.calendar_id,
                        count = events.len(),
                        "sync complete"
                    );
                    return Ok(EventPage {
                        events,
                        next_page_token: None,
                        next_sync_token: page.next_sync_token,
                    });
                }
            }
        }
    }

    /// Creates a secondary calendar owned by the authenticated user.
    pub async fn create_calendar(
        connection: &Connection,
        metadata: &CalendarMetadata,
    ) -> CalendarResult<Self> {
        connection.require_json("calendar creation")?;
        if metadata.summary.is_empty() {
            return Err(CalendarError::invalid_argument("calendar summary is empty"));
        }
        let body = encode_json(metadata, "calendar metadata")?;
        let response = connection
            .gateway()
            .request(Method::POST, "calendars", Some(body))
            .await?;
        let created: CalendarMetadata = decode_json(&response.body, "calendar")?;
        if created.id.is_empty() {
            return Err(CalendarError::invalid_response(
                "created calendar has no id",
            ));
        }
        info!(calendar_id = %created.id, "created calendar");
        Ok(Self::bound(connection.clone(), created.id))
    }

    pub async fn fetch_metadata(&self) -> CalendarResult<CalendarMetadata> {
        self.connection.require_json("calendar metadata")?;
        let response = self
            .connection
            .gateway()
            .request(Method::GET, &self.metadata_path(), None)
            .await?;
        decode_json(&response.body, "calendar")
    }

    /// Replaces the calendar's metadata and returns the server's copy.
    pub async fn update_metadata(
        &self,
        metadata: &CalendarMetadata,
    ) -> CalendarResult<CalendarMetadata> {
        self.connection.require_json("calendar metadata")?;
        let body = encode_json(metadata, "calendar metadata")?;
        let response = self
            .connection
            .gateway()
            .request(Method::PUT, &self.metadata_path(), Some(body))
            .await?;
        decode_json(&response.body, "calendar")
    }

    /// Deletes the calendar. The primary calendar cannot be deleted.
    pub async fn delete_calendar(self) -> CalendarResult<()> {
        self.connection.require_json("calendar deletion")?;
        self.connection
            .gateway()
            .request(Method::DELETE, &self.metadata_path(), None)
            .await?;
        info!(calendar_id = %self.calendar_id, "deleted calendar");
        Ok(())
    }
}
