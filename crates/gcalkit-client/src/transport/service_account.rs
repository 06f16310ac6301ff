//! Bearer-token transport for service accounts.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use gcalkit_core::CalendarResult;
use tokio::sync::RwLock;
use tracing::debug;

use super::Transport;
use crate::auth::{EXPIRY_SKEW_SECS, ServiceAccountExchanger};
use crate::gateway::{ApiGeneration, classify};
use crate::http::{BoxFuture, HttpClient, HttpRequest, HttpResponse};

#[derive(Debug, Clone)]
struct MintedToken {
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl MintedToken {
    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| now >= at - Duration::seconds(EXPIRY_SKEW_SECS))
    }
}

/// Sends JSON API requests with a token minted from a signed assertion.
#[derive(Debug)]
pub struct ServiceAccountTransport {
    http: Arc<dyn HttpClient>,
    exchanger: ServiceAccountExchanger,
    token: RwLock<Option<MintedToken>>,
}

impl ServiceAccountTransport {
    pub fn new(http: Arc<dyn HttpClient>, exchanger: ServiceAccountExchanger) -> Self {
        Self {
            http,
            exchanger,
            token: RwLock::new(None),
        }
    }

    async fn access_token(&self) -> CalendarResult<String> {
        let now = Utc::now();
        {
            let token = self.token.read().await;
            if let Some(token) = token.as_ref().filter(|t| !t.is_stale(now)) {
                return Ok(token.access_token.clone());
            }
        }

        let mut token = self.token.write().await;
        if let Some(current) = token.as_ref().filter(|t| !t.is_stale(now)) {
            return Ok(current.access_token.clone());
        }
        debug!("minting service account token");
        let grant = self.exchanger.fetch_token().await?;
        let minted = MintedToken {
            expires_at: grant.expires_at(Utc::now()),
            access_token: grant.access_token,
        };
        let access_token = minted.access_token.clone();
        *token = Some(minted);
        Ok(access_token)
    }
}

impl Transport for ServiceAccountTransport {
    fn generation(&self) -> ApiGeneration {
        ApiGeneration::Json
    }

    fn send(&self, mut request: HttpRequest) -> BoxFuture<'_, CalendarResult<HttpResponse>> {
        Box::pin(async move {
            let token = self.access_token().await?;
            request.set_header("Authorization", format!("Bearer {}", token));
            let response = self.http.execute(request).await?;
            classify(response, ApiGeneration::Json)
        })
    }
}
