//! Transport for the legacy Atom feed API.
//!
//! Feed requests carry a `GoogleLogin` header. The feed servers answer with
//! redirects that add a `gsessionid` query parameter; the first session id
//! seen is kept for the lifetime of the connection and merged into every
//! later request.

use std::sync::Arc;

use gcalkit_core::{CalendarError, CalendarResult};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use super::Transport;
use crate::auth::{ClientLogin, authorization_header};
use crate::gateway::{ApiGeneration, MAX_REDIRECTS, classify};
use crate::http::{BoxFuture, HttpClient, HttpRequest, HttpResponse};

/// Query parameter carrying the feed session id.
pub const SESSION_PARAM: &str = "gsessionid";

/// Protocol version header value for the feeds.
const GDATA_VERSION: &str = "2";

#[derive(Debug)]
pub struct LegacyXmlTransport {
    http: Arc<dyn HttpClient>,
    login: ClientLogin,
    auth_token: RwLock<Option<String>>,
    session_id: RwLock<Option<String>>,
}

impl LegacyXmlTransport {
    pub fn new(http: Arc<dyn HttpClient>, login: ClientLogin) -> Self {
        Self {
            http,
            login,
            auth_token: RwLock::new(None),
            session_id: RwLock::new(None),
        }
    }

    /// Returns the captured session id, if any.
    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    /// Logs in on first use.
    async fn auth_token(&self) -> CalendarResult<String> {
        if let Some(token) = self.auth_token.read().await.as_ref() {
            return Ok(token.clone());
        }
        let mut slot = self.auth_token.write().await;
        if let Some(token) = slot.as_ref() {
            return Ok(token.clone());
        }
        let token = self.login.authenticate().await?;
        *slot = Some(token.clone());
        Ok(token)
    }

    /// Records the session id carried by `url` unless one is already set.
    async fn capture_session(&self, url: &Url) {
        if self.session_id.read().await.is_some() {
            return;
        }
        let Some(id) = session_param(url) else {
            return;
        };
        let mut slot = self.session_id.write().await;
        if slot.is_none() {
            debug!("captured feed session id");
            *slot = Some(id);
        }
    }

    /// Returns `url` with the captured session id in its query.
    async fn merge_session(&self, url: Url) -> Url {
        match self.session_id.read().await.as_deref() {
            Some(id) => with_session_param(url, id),
            None => url,
        }
    }
}

fn session_param(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == SESSION_PARAM)
        .map(|(_, v)| v.into_owned())
}

fn with_session_param(mut url: Url, id: &str) -> Url {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != SESSION_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair(SESSION_PARAM, id);
    url
}

impl Transport for LegacyXmlTransport {
    fn generation(&self) -> ApiGeneration {
        ApiGeneration::LegacyXml
    }

    fn send(&self, mut request: HttpRequest) -> BoxFuture<'_, CalendarResult<HttpResponse>> {
        Box::pin(async move {
            let token = self.auth_token().await?;
            request.set_header("Authorization", authorization_header(&token));
            request.set_header("GData-Version", GDATA_VERSION);

            self.capture_session(&request.url).await;
            request.url = self.merge_session(request.url).await;

            let mut hops = 0;
            loop {
                let response = self.http.execute(request.clone()).await?;
                let location = response
                    .header("Location")
                    .filter(|_| response.is_redirect())
                    .map(str::to_string);
                let Some(location) = location else {
                    return classify(response, ApiGeneration::LegacyXml);
                };

                if hops == MAX_REDIRECTS {
                    return Err(CalendarError::too_many_redirections(format!(
                        "gave up after {} redirects",
                        MAX_REDIRECTS
                    ))
                    .with_status(response.status));
                }
                hops += 1;

                let next = request.url.join(&location).map_err(|e| {
                    CalendarError::invalid_response(format!(
                        "invalid redirect location '{}': {}",
                        location, e
                    ))
                    .with_source(e)
                })?;
                debug!(hop = hops, status = response.status, "following redirect");
                self.capture_session(&next).await;
                request.url = self.merge_session(next).await;
            }
        })
    }
}
