//! Google Calendar client.
//!
//! This crate turns the core event model into requests against either the
//! Calendar API v3 (JSON) or the legacy Data API feeds (Atom):
//!
//! - [`Connection`] - An authenticated session; every resource is created from one
//! - [`CalendarResource`] - Event queries, saves and deletes for one calendar
//! - [`CalendarListResource`] / [`FreebusyResource`] - Account-wide lookups
//! - [`EventCodec`] - Converts events to and from one wire format
//! - [`HttpClient`] - The HTTP seam, with [`ReqwestClient`] and [`MockHttpClient`]
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  CalendarResource / CalendarList / Freebusy  │
//! └──────────────────────┬───────────────────────┘
//!                        │ Event ⇄ EventCodec (JSON | Atom)
//!                        ▼
//!               ┌─────────────────┐
//!               │   HttpGateway   │  path resolution, error classification
//!               └────────┬────────┘
//!                        │
//!        ┌───────────────┼────────────────┐
//!        ▼               ▼                ▼
//! ┌─────────────┐ ┌──────────────┐ ┌──────────────┐
//! │JsonTransport│ │ServiceAccount│ │  LegacyXml   │
//! │ OAuth token │ │  assertion   │ │ ClientLogin  │
//! └──────┬──────┘ └──────┬───────┘ └──────┬───────┘
//!        └───────────────┼────────────────┘
//!                        ▼
//!                   HttpClient
//! ```
//!
//! # Example
//!
//! ```ignore
//! use gcalkit_client::{AuthMode, ClientConfig, Connection, OAuthCredentials, QueryOptions};
//!
//! async fn upcoming(credentials: OAuthCredentials) -> gcalkit_core::CalendarResult<()> {
//!     let config = ClientConfig::new().with_default_token_path();
//!     let connection = Connection::with_default_client(config, AuthMode::oauth(credentials))?;
//!     let calendar = connection.primary_calendar();
//!     for event in calendar.find_future_events(&QueryOptions::default()).await? {
//!         println!("{} {}", event.start.to_wire(), event.effective_title());
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod calendar;
pub mod calendar_list;
pub mod codec;
pub mod config;
pub mod connection;
pub mod freebusy;
pub mod gateway;
pub mod http;
pub mod mock;
pub mod transport;

// Re-export main types at crate root
pub use auth::{AssertionSigner, Credential, PkceAuthorization, PkceFlow, StoredToken, TokenStorage};
pub use calendar::{CalendarMetadata, CalendarResource, DEFAULT_MAX_RESULTS, OrderBy, QueryOptions};
pub use calendar_list::{CalendarListEntry, CalendarListResource};
pub use codec::{AtomEventCodec, EventCodec, EventPage, JsonEventCodec, codec_for};
pub use config::{AuthMode, ClientConfig, OAuthCredentials, ServiceAccountKey};
pub use connection::{Connection, LEGACY_DEFAULT_CALENDAR_ID, PRIMARY_CALENDAR_ID};
pub use freebusy::{BusyInterval, FreebusyCalendar, FreebusyResource};
pub use gateway::{ApiGeneration, HttpGateway, MAX_REDIRECTS};
pub use http::{BoxFuture, HttpClient, HttpRequest, HttpResponse, ReqwestClient};
pub use mock::MockHttpClient;
