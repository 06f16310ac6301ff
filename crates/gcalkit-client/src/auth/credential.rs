//! The OAuth credential and the grants that update it.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::config::OAuthCredentials;

/// An access token is treated as stale this long before it really expires.
pub const EXPIRY_SKEW_SECS: i64 = 60;

/// A successful token endpoint response.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Space-separated granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl TokenGrant {
    /// Returns when the granted access token expires, if the server said.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in.map(|secs| now + Duration::seconds(secs))
    }
}

/// OAuth client identity plus the tokens obtained for it.
///
/// The refresh token is the durable identity. The access token is derived
/// from exchanges only and is never persisted. An authorization code is held
/// until one successful exchange consumes it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    authorization_code: Option<String>,
    code_verifier: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    scopes: Vec<String>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("has_authorization_code", &self.authorization_code.is_some())
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl Credential {
    pub fn new(credentials: &OAuthCredentials) -> Self {
        Self {
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            redirect_uri: credentials.redirect_uri.clone(),
            authorization_code: None,
            code_verifier: None,
            access_token: None,
            refresh_token: None,
            expires_at: None,
            scopes: Vec::new(),
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Stores the code returned by the consent page.
    pub fn set_authorization_code(&mut self, code: impl Into<String>) {
        self.authorization_code = Some(code.into());
    }

    pub fn authorization_code(&self) -> Option<&str> {
        self.authorization_code.as_deref()
    }

    /// Stores the PKCE verifier matching the challenge sent to the consent page.
    pub fn set_code_verifier(&mut self, verifier: impl Into<String>) {
        self.code_verifier = Some(verifier.into());
    }

    pub fn code_verifier(&self) -> Option<&str> {
        self.code_verifier.as_deref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Scopes granted by the last exchange.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Returns true when a request would need a fresh access token.
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now())
    }

    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_none() {
            return true;
        }
        match self.expires_at {
            Some(expires_at) => now >= expires_at - Duration::seconds(EXPIRY_SKEW_SECS),
            None => false,
        }
    }

    /// Applies a successful exchange.
    ///
    /// The authorization code and verifier are consumed. The refresh token is
    /// only replaced when the server rotated it.
    pub fn apply_grant(&mut self, grant: TokenGrant) {
        let now = Utc::now();
        self.expires_at = grant.expires_at(now);
        self.access_token = Some(grant.access_token);
        if let Some(refresh_token) = grant.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
        if let Some(scope) = grant.scope {
            self.scopes = scope.split_whitespace().map(str::to_string).collect();
        }
        self.authorization_code = None;
        self.code_verifier = None;
    }
}
