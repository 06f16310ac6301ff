//! Transport strategies, one per API generation and auth flow.
//!
//! The connection picks exactly one at construction from its
//! [`AuthMode`](crate::AuthMode):
//!
//! - [`JsonTransport`]: bearer token from the three-legged OAuth flow,
//!   refreshed before a request when stale
//! - [`ServiceAccountTransport`]: bearer token minted from a signed assertion
//! - [`LegacyXmlTransport`]: ClientLogin header, redirect following and
//!   `gsessionid` continuation for the Atom feeds

mod json;
mod legacy;
mod service_account;

use std::fmt;

use gcalkit_core::{CalendarError, CalendarResult};
use url::Url;

use crate::auth::{Credential, PkceAuthorization};
use crate::gateway::ApiGeneration;
use crate::http::{BoxFuture, HttpRequest, HttpResponse};

pub use json::JsonTransport;
pub use legacy::{LegacyXmlTransport, SESSION_PARAM};
pub use service_account::ServiceAccountTransport;

/// Authorizes, sends and classifies requests for one API generation.
pub trait Transport: Send + Sync + fmt::Debug {
    fn generation(&self) -> ApiGeneration;

    /// Sends `request` with authorization attached.
    ///
    /// Returns the 2xx response, or the classified error.
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, CalendarResult<HttpResponse>>;

    /// Returns the consent page URL for the three-legged flow.
    fn authorization_url(&self) -> BoxFuture<'_, CalendarResult<Url>> {
        Box::pin(async { Err(unsupported("authorization URL")) })
    }

    /// Returns a PKCE consent page URL and remembers the verifier for the
    /// following code exchange.
    fn authorization_url_with_pkce(&self) -> BoxFuture<'_, CalendarResult<PkceAuthorization>> {
        Box::pin(async { Err(unsupported("PKCE authorization URL")) })
    }

    /// Completes the three-legged flow with the code from the consent page.
    fn exchange_authorization_code(&self, _code: String) -> BoxFuture<'_, CalendarResult<()>> {
        Box::pin(async { Err(unsupported("authorization code exchange")) })
    }

    /// Returns a snapshot of the OAuth credential, if this transport has one.
    fn credential(&self) -> BoxFuture<'_, Option<Credential>> {
        Box::pin(async { None })
    }
}

fn unsupported(operation: &str) -> CalendarError {
    CalendarError::configuration(format!(
        "{} is only available with the OAuth auth mode",
        operation
    ))
}
