//! Three-legged OAuth 2.0: consent URL, code exchange, refresh.
//!
//! # Flow Overview
//!
//! 1. Send the user to [`TokenExchanger::build_authorization_url`]
//! 2. The consent page redirects back with an authorization code
//! 3. [`TokenExchanger::exchange_authorization_code`] trades it for an
//!    access token and a refresh token
//! 4. [`TokenExchanger::refresh_access_token`] mints new access tokens from
//!    the refresh token for as long as the grant lives
//!
//! Nothing here retries. Any non-2xx answer from the token endpoint is an
//! [`ErrorKind::AuthorizationFailed`](gcalkit_core::ErrorKind).

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use gcalkit_core::{CalendarError, CalendarResult};
use rand::Rng as _;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use url::Url;

use super::credential::{Credential, TokenGrant};
use crate::config::{ClientConfig, parse_endpoint};
use crate::gateway::error_message;
use crate::http::{HttpClient, HttpRequest};

/// The PKCE code verifier length (in bytes, before base64 encoding).
const CODE_VERIFIER_LENGTH: usize = 32;

/// Performs token exchanges against the authorization server.
#[derive(Debug, Clone)]
pub struct TokenExchanger {
    http: Arc<dyn HttpClient>,
    auth_url: Url,
    token_url: Url,
    scopes: Vec<String>,
}

impl TokenExchanger {
    pub fn new(http: Arc<dyn HttpClient>, auth_url: Url, token_url: Url, scopes: Vec<String>) -> Self {
        Self {
            http,
            auth_url,
            token_url,
            scopes,
        }
    }

    pub fn from_config(http: Arc<dyn HttpClient>, config: &ClientConfig) -> CalendarResult<Self> {
        Ok(Self::new(
            http,
            parse_endpoint("auth_url", &config.auth_url)?,
            parse_endpoint("token_url", &config.token_url)?,
            config.scopes.clone(),
        ))
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    /// Builds the consent page URL.
    ///
    /// Parameters are emitted in alphabetical order:
    /// `access_type=offline`, `client_id`, `redirect_uri`,
    /// `response_type=code`, `scope`.
    pub fn build_authorization_url(&self, credential: &Credential) -> Url {
        self.authorization_url_with(credential, BTreeMap::new())
    }

    /// Builds the consent page URL with a PKCE challenge and CSRF state.
    pub fn build_authorization_url_with_pkce(&self, credential: &Credential, pkce: &PkceFlow) -> Url {
        let extra = BTreeMap::from([
            ("code_challenge", pkce.challenge.clone()),
            ("code_challenge_method", "S256".to_string()),
            ("state", pkce.state.clone()),
        ]);
        self.authorization_url_with(credential, extra)
    }

    fn authorization_url_with(
        &self,
        credential: &Credential,
        mut params: BTreeMap<&'static str, String>,
    ) -> Url {
        params.insert("access_type", "offline".to_string());
        params.insert("client_id", credential.client_id().to_string());
        params.insert("redirect_uri", credential.redirect_uri().to_string());
        params.insert("response_type", "code".to_string());
        params.insert("scope", self.scopes.join(" "));

        let mut url = self.auth_url.clone();
        url.query_pairs_mut().extend_pairs(params.iter());
        url
    }

    /// Trades the credential's authorization code for tokens.
    ///
    /// On success the code is cleared and the access token, refresh token
    /// and expiry are populated. On failure the credential is untouched.
    pub async fn exchange_authorization_code(&self, credential: &mut Credential) -> CalendarResult<()> {
        let code = credential
            .authorization_code()
            .ok_or_else(|| CalendarError::authorization_failed("no authorization code to exchange"))?
            .to_string();
        let verifier = credential.code_verifier().map(str::to_string);

        let mut params = vec![
            ("client_id", credential.client_id()),
            ("client_secret", credential.client_secret()),
            ("code", code.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", credential.redirect_uri()),
        ];
        if let Some(verifier) = verifier.as_deref() {
            params.push(("code_verifier", verifier));
        }

        info!("exchanging authorization code for tokens");
        let grant = self.request_grant(&params, "authorization code exchange").await?;
        if grant.refresh_token.is_none() {
            warn!("authorization code exchange returned no refresh token");
        }
        let grant = self.with_requested_scope(grant, credential);
        credential.apply_grant(grant);
        info!("successfully obtained tokens");
        Ok(())
    }

    /// Mints a new access token from the credential's refresh token.
    pub async fn refresh_access_token(&self, credential: &mut Credential) -> CalendarResult<()> {
        let refresh_token = credential
            .refresh_token()
            .ok_or_else(|| {
                CalendarError::authorization_failed(
                    "no refresh token; complete the authorization code exchange first",
                )
            })?
            .to_string();

        let params = [
            ("client_id", credential.client_id()),
            ("client_secret", credential.client_secret()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
        ];

        let grant = self.request_grant(&params, "token refresh").await?;
        let grant = self.with_requested_scope(grant, credential);
        credential.apply_grant(grant);
        info!("successfully refreshed access token");
        Ok(())
    }

    /// A response without `scope` means the requested scopes were granted
    /// (RFC 6749 section 5.1), unless the credential already knows its scopes.
    fn with_requested_scope(&self, mut grant: TokenGrant, credential: &Credential) -> TokenGrant {
        if grant.scope.is_none() && credential.scopes().is_empty() {
            grant.scope = Some(self.scopes.join(" "));
        }
        grant
    }

    /// Posts a form to the token endpoint and decodes the grant.
    pub(crate) async fn request_grant(
        &self,
        params: &[(&str, &str)],
        what: &str,
    ) -> CalendarResult<TokenGrant> {
        post_token_form(self.http.as_ref(), &self.token_url, params, what).await
    }
}

/// Posts a token request and decodes the grant.
pub(crate) async fn post_token_form(
    http: &dyn HttpClient,
    token_url: &Url,
    params: &[(&str, &str)],
    what: &str,
) -> CalendarResult<TokenGrant> {
    debug!(url = %token_url, "{} request", what);
    let request = HttpRequest::post(token_url.clone()).with_form(params);
    let response = http.execute(request).await?;

    if !response.is_success() {
        return Err(CalendarError::authorization_failed(format!(
            "{} failed: {}",
            what,
            error_message(&response.body)
        ))
        .with_status(response.status));
    }

    serde_json::from_str::<TokenGrant>(&response.body).map_err(|e| {
        CalendarError::authorization_failed(format!("invalid {} response: {}", what, e))
            .with_source(e)
    })
}

/// PKCE verifier, challenge and state (RFC 7636).
#[derive(Debug, Clone)]
pub struct PkceFlow {
    /// The code verifier (high-entropy random string).
    pub verifier: String,
    /// SHA-256 of the verifier, base64url encoded.
    pub challenge: String,
    /// Random state for CSRF protection.
    pub state: String,
}

impl PkceFlow {
    pub fn new() -> Self {
        let verifier = Self::random_string(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        let state = Self::random_string(16);

        Self {
            verifier,
            challenge,
            state,
        }
    }

    fn random_string(len: usize) -> String {
        let mut rng = rand::rng();
        let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
        URL_SAFE_NO_PAD.encode(&bytes)
    }

    /// Computes the SHA-256 challenge for a code verifier.
    pub fn compute_challenge(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }
}

/// A PKCE consent page URL and the state the redirect must echo back.
#[derive(Debug, Clone)]
pub struct PkceAuthorization {
    pub url: Url,
    pub state: String,
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}
