//! Two-legged service-account flow.
//!
//! The client signs a JWT assertion with the account's private key and posts
//! it to the token endpoint with the jwt-bearer grant. RSA signing is not done
//! here: it is delegated to an injected [`AssertionSigner`].

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use gcalkit_core::{CalendarError, CalendarResult};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use super::credential::TokenGrant;
use super::oauth::post_token_form;
use crate::config::ServiceAccountKey;
use crate::http::HttpClient;

/// Grant type for JWT assertions.
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime of an assertion in seconds.
pub const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Signs assertion payloads with a service account's private key.
pub trait AssertionSigner: Send + Sync + fmt::Debug {
    /// Returns the RSASSA-PKCS1-v1_5 SHA-256 signature of `message`.
    fn sign_rs256(&self, key: &ServiceAccountKey, message: &[u8]) -> CalendarResult<Vec<u8>>;
}

#[derive(Serialize)]
struct JwtHeader<'a> {
    alg: &'a str,
    typ: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<&'a str>,
}

/// Claims of a service-account assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    /// Impersonated user for domain-wide delegation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

/// Exchanges signed assertions for access tokens.
#[derive(Debug, Clone)]
pub struct ServiceAccountExchanger {
    http: Arc<dyn HttpClient>,
    key: ServiceAccountKey,
    scopes: Vec<String>,
    subject: Option<String>,
    signer: Arc<dyn AssertionSigner>,
    token_url: Url,
}

impl ServiceAccountExchanger {
    pub fn new(
        http: Arc<dyn HttpClient>,
        key: ServiceAccountKey,
        scopes: Vec<String>,
        signer: Arc<dyn AssertionSigner>,
        token_url: Url,
    ) -> Self {
        Self {
            http,
            key,
            scopes,
            subject: None,
            signer,
            token_url,
        }
    }

    pub fn with_subject(mut self, subject: Option<String>) -> Self {
        self.subject = subject;
        self
    }

    pub fn claims(&self, now: DateTime<Utc>) -> AssertionClaims {
        let iat = now.timestamp();
        AssertionClaims {
            iss: self.key.client_email.clone(),
            scope: self.scopes.join(" "),
            aud: self.token_url.to_string(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
            sub: self.subject.clone(),
        }
    }

    /// Builds and signs the `header.claims.signature` assertion.
    pub fn build_assertion(&self, now: DateTime<Utc>) -> CalendarResult<String> {
        let header = JwtHeader {
            alg: "RS256",
            typ: "JWT",
            kid: self.key.private_key_id.as_deref(),
        };
        let header = to_segment(&header)?;
        let claims = to_segment(&self.claims(now))?;
        let signing_input = format!("{}.{}", header, claims);

        let signature = self
            .signer
            .sign_rs256(&self.key, signing_input.as_bytes())?;
        Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Obtains a new access token.
    pub async fn fetch_token(&self) -> CalendarResult<TokenGrant> {
        let assertion = self.build_assertion(Utc::now())?;
        let params = [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())];
        let grant = post_token_form(
            self.http.as_ref(),
            &self.token_url,
            &params,
            "service account token exchange",
        )
        .await?;
        info!(account = %self.key.client_email, "obtained service account token");
        Ok(grant)
    }
}

fn to_segment<T: Serialize>(value: &T) -> CalendarResult<String> {
    let json = serde_json::to_vec(value).map_err(|e| {
        CalendarError::invalid_argument(format!("failed to encode assertion: {}", e)).with_source(e)
    })?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}
