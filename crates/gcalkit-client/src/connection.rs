//! The connection every resource is created from.
//!
//! A [`Connection`] owns one transport (picked from the [`AuthMode`] at
//! construction) and the matching event codec. It is cheap to clone and is
//! shared by every resource created from it.

use std::sync::Arc;

use gcalkit_core::{CalendarError, CalendarResult};
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::{
    ClientLogin, Credential, PkceAuthorization, ServiceAccountExchanger, TokenExchanger,
    TokenStorage,
};
use crate::calendar::{CalendarMetadata, CalendarResource};
use crate::calendar_list::CalendarListResource;
use crate::codec::{EventCodec, codec_for};
use crate::config::{AuthMode, ClientConfig, DEFAULT_TOKEN_URL, parse_endpoint};
use crate::freebusy::FreebusyResource;
use crate::gateway::{ApiGeneration, HttpGateway};
use crate::http::{HttpClient, ReqwestClient};
use crate::transport::{JsonTransport, LegacyXmlTransport, ServiceAccountTransport, Transport};

/// Calendar id of the authenticated user's main calendar (JSON API).
pub const PRIMARY_CALENDAR_ID: &str = "primary";
/// Calendar id of the authenticated user's main calendar (legacy feeds).
pub const LEGACY_DEFAULT_CALENDAR_ID: &str = "default";

#[derive(Debug)]
struct ConnectionInner {
    gateway: HttpGateway,
    codec: Box<dyn EventCodec>,
}

/// An authenticated session with the calendar service.
#[derive(Debug, Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Creates a connection that sends requests through `http`.
    ///
    /// In OAuth mode a refresh token is taken from `auth`, or else loaded
    /// from `config.token_path` when the stored scopes still cover the
    /// configured ones.
    pub fn new(
        config: ClientConfig,
        auth: AuthMode,
        http: Arc<dyn HttpClient>,
    ) -> CalendarResult<Self> {
        config.validate()?;
        let mode = auth.name();

        let (transport, base): (Box<dyn Transport>, Url) = match auth {
            AuthMode::OAuth {
                credentials,
                refresh_token,
            } => {
                credentials.validate()?;
                let storage = config.token_path.clone().map(TokenStorage::new);
                let refresh_token = match refresh_token {
                    Some(token) => Some(token),
                    None => load_refresh_token(storage.as_ref(), &config)?,
                };

                let mut credential = Credential::new(&credentials);
                if let Some(token) = refresh_token {
                    credential = credential.with_refresh_token(token);
                }
                let exchanger = TokenExchanger::from_config(http.clone(), &config)?;
                (
                    Box::new(JsonTransport::new(http, exchanger, credential, storage)),
                    parse_endpoint("api_base", &config.api_base)?,
                )
            }
            AuthMode::ServiceAccount {
                key,
                subject,
                signer,
            } => {
                // the key's own token endpoint wins unless the config overrides it
                let token_url = match key.token_uri.as_deref() {
                    Some(uri) if config.token_url == DEFAULT_TOKEN_URL => uri.to_string(),
                    _ => config.token_url.clone(),
                };
                let exchanger = ServiceAccountExchanger::new(
                    http.clone(),
                    key,
                    config.scopes.clone(),
                    signer,
                    parse_endpoint("token_url", &token_url)?,
                )
                .with_subject(subject);
                (
                    Box::new(ServiceAccountTransport::new(http, exchanger)),
                    parse_endpoint("api_base", &config.api_base)?,
                )
            }
            AuthMode::ClientLogin {
                email,
                password,
                source,
            } => {
                let login = ClientLogin::new(
                    http.clone(),
                    parse_endpoint("client_login_url", &config.client_login_url)?,
                    email,
                    password,
                    source,
                );
                (
                    Box::new(LegacyXmlTransport::new(http, login)),
                    parse_endpoint("feeds_base", &config.feeds_base)?,
                )
            }
        };

        let generation = transport.generation();
        info!(
            auth_mode = mode,
            generation = generation.as_str(),
            base = %base,
            "calendar connection ready"
        );

        Ok(Self {
            inner: Arc::new(ConnectionInner {
                gateway: HttpGateway::new(transport, base),
                codec: codec_for(generation),
            }),
        })
    }

    /// Creates a connection backed by a `reqwest` client built from `config`.
    pub fn with_default_client(config: ClientConfig, auth: AuthMode) -> CalendarResult<Self> {
        let http = Arc::new(ReqwestClient::new(config.timeout, &config.user_agent)?);
        Self::new(config, auth, http)
    }

    pub fn generation(&self) -> ApiGeneration {
        self.inner.gateway.generation()
    }

    pub(crate) fn gateway(&self) -> &HttpGateway {
        &self.inner.gateway
    }

    pub(crate) fn codec(&self) -> &dyn EventCodec {
        self.inner.codec.as_ref()
    }

    /// Fails with a configuration error on the legacy feeds.
    pub(crate) fn require_json(&self, operation: &str) -> CalendarResult<()> {
        match self.generation() {
            ApiGeneration::Json => Ok(()),
            ApiGeneration::LegacyXml => Err(CalendarError::configuration(format!(
                "{} is not supported by the legacy feed API",
                operation
            ))),
        }
    }

    /// Returns the resource for calendar `calendar_id`.
    pub fn calendar(&self, calendar_id: impl Into<String>) -> CalendarResult<CalendarResource> {
        CalendarResource::new(self.clone(), calendar_id)
    }

    /// Returns the authenticated user's main calendar.
    pub fn primary_calendar(&self) -> CalendarResource {
        let id = match self.generation() {
            ApiGeneration::Json => PRIMARY_CALENDAR_ID,
            ApiGeneration::LegacyXml => LEGACY_DEFAULT_CALENDAR_ID,
        };
        CalendarResource::bound(self.clone(), id.to_string())
    }

    /// Creates a secondary calendar and returns its resource.
    pub async fn create_calendar(
        &self,
        metadata: &CalendarMetadata,
    ) -> CalendarResult<CalendarResource> {
        CalendarResource::create_calendar(self, metadata).await
    }

    pub fn calendar_list(&self) -> CalendarListResource {
        CalendarListResource::new(self.clone())
    }

    pub fn freebusy(&self) -> FreebusyResource {
        FreebusyResource::new(self.clone())
    }

    /// Returns the consent page URL for the three-legged flow.
    pub async fn authorization_url(&self) -> CalendarResult<Url> {
        self.inner.gateway.authorization_url().await
    }

    /// Returns a consent page URL carrying a PKCE challenge.
    ///
    /// The verifier stays with the connection and is sent by the next
    /// [`login_with_authorization_code`](Self::login_with_authorization_code).
    /// Compare the returned `state` with the one on the redirect.
    pub async fn authorization_url_with_pkce(&self) -> CalendarResult<PkceAuthorization> {
        self.inner.gateway.authorization_url_with_pkce().await
    }

    /// Exchanges the code from the consent page for tokens.
    ///
    /// On success the refresh token is persisted when a token path is
    /// configured.
    pub async fn login_with_authorization_code(
        &self,
        code: impl Into<String>,
    ) -> CalendarResult<()> {
        self.inner
            .gateway
            .exchange_authorization_code(code.into())
            .await
    }

    /// Returns a snapshot of the OAuth credential.
    pub async fn credential(&self) -> Option<Credential> {
        self.inner.gateway.credential().await
    }
}

fn load_refresh_token(
    storage: Option<&TokenStorage>,
    config: &ClientConfig,
) -> CalendarResult<Option<String>> {
    let Some(stored) = storage.map(TokenStorage::load).transpose()?.flatten() else {
        return Ok(None);
    };
    if stored.has_scopes(&config.scopes) {
        debug!("loaded stored refresh token");
        Ok(Some(stored.refresh_token))
    } else {
        warn!("stored token does not cover the configured scopes, ignoring it");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AssertionSigner, StoredToken};
    use crate::config::{OAuthCredentials, ServiceAccountKey};
    use crate::mock::MockHttpClient;
    use chrono::Utc;
    use gcalkit_core::ErrorKind;
    use serde_json::json;

    fn credentials() -> OAuthCredentials {
        OAuthCredentials::new(
            "client.apps.googleusercontent.com",
            "secret",
            "http://localhost",
        )
    }

    fn config() -> ClientConfig {
        ClientConfig::new().with_base_url("https://calendar.example.com")
    }

    #[derive(Debug)]
    struct FixedSigner;

    impl AssertionSigner for FixedSigner {
        fn sign_rs256(&self, _: &ServiceAccountKey, _: &[u8]) -> CalendarResult<Vec<u8>> {
            Ok(b"sig".to_vec())
        }
    }

    #[test]
    fn oauth_mode_uses_json_generation() {
        let mock = Arc::new(MockHttpClient::new());
        let connection = Connection::new(config(), AuthMode::oauth(credentials()), mock).unwrap();
        assert_eq!(connection.generation(), ApiGeneration::Json);
        assert_eq!(connection.primary_calendar().calendar_id(), "primary");
    }

    #[test]
    fn client_login_mode_uses_feeds() {
        let mock = Arc::new(MockHttpClient::new());
        let auth = AuthMode::client_login("user@example.com", "pw", "tests");
        let connection = Connection::new(config(), auth, mock).unwrap();
        assert_eq!(connection.generation(), ApiGeneration::LegacyXml);
        assert_eq!(connection.primary_calendar().calendar_id(), "default");
        assert_eq!(
            connection.gateway().base().as_str(),
            "https://calendar.example.com/calendar/feeds"
        );
    }

    #[test]
    fn invalid_client_id_is_rejected() {
        let mock = Arc::new(MockHttpClient::new());
        let auth = AuthMode::oauth(OAuthCredentials::new("not-a-client", "s", "http://localhost"));
        assert!(Connection::new(config(), auth, mock).is_err());
    }

    #[test]
    fn empty_calendar_id_is_missing() {
        let mock = Arc::new(MockHttpClient::new());
        let connection = Connection::new(config(), AuthMode::oauth(credentials()), mock).unwrap();
        let err = connection.calendar("").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CalendarIdMissing);
    }

    #[tokio::test]
    async fn stored_refresh_token_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        TokenStorage::new(&path)
            .save(&StoredToken {
                refresh_token: "1//stored".into(),
                scopes: vec![crate::config::DEFAULT_SCOPE.into()],
                last_refresh: Utc::now(),
            })
            .unwrap();

        let mock = Arc::new(MockHttpClient::new());
        let connection = Connection::new(
            config().with_token_path(&path),
            AuthMode::oauth(credentials()),
            mock,
        )
        .unwrap();
        let credential = connection.credential().await.unwrap();
        assert_eq!(credential.refresh_token(), Some("1//stored"));
    }

    #[tokio::test]
    async fn stored_token_with_narrower_scopes_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        TokenStorage::new(&path)
            .save(&StoredToken {
                refresh_token: "1//readonly".into(),
                scopes: vec!["https://www.googleapis.com/auth/calendar.readonly".into()],
                last_refresh: Utc::now(),
            })
            .unwrap();

        let mock = Arc::new(MockHttpClient::new());
        let connection = Connection::new(
            config().with_token_path(&path),
            AuthMode::oauth(credentials()),
            mock,
        )
        .unwrap();
        assert_eq!(connection.credential().await.unwrap().refresh_token(), None);
    }

    #[tokio::test]
    async fn login_with_authorization_code_populates_tokens() {
        let mock = Arc::new(MockHttpClient::new());
        mock.push_json(
            200,
            json!({"access_token": "ya29.a", "refresh_token": "1//r", "expires_in": 3600}),
        );
        let connection =
            Connection::new(config(), AuthMode::oauth(credentials()), mock.clone()).unwrap();

        connection.login_with_authorization_code("4/code").await.unwrap();

        let credential = connection.credential().await.unwrap();
        assert_eq!(credential.authorization_code(), None);
        assert_eq!(credential.access_token(), Some("ya29.a"));
        assert_eq!(credential.refresh_token(), Some("1//r"));
        let request = mock.last_request().unwrap();
        assert_eq!(request.url.as_str(), "https://calendar.example.com/token");
        assert_eq!(request.form_value("code").as_deref(), Some("4/code"));
    }

    #[tokio::test]
    async fn refresh_token_without_granted_scope_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let mock = Arc::new(MockHttpClient::new());
        mock.push_json(
            200,
            json!({"access_token": "ya29.a", "refresh_token": "1//r", "expires_in": 3600}),
        );
        let first = Connection::new(
            config().with_token_path(&path),
            AuthMode::oauth(credentials()),
            mock.clone(),
        )
        .unwrap();
        first.login_with_authorization_code("4/code").await.unwrap();

        let second = Connection::new(
            config().with_token_path(&path),
            AuthMode::oauth(credentials()),
            mock,
        )
        .unwrap();
        assert_eq!(
            second.credential().await.unwrap().refresh_token(),
            Some("1//r")
        );
    }

    #[tokio::test]
    async fn pkce_login_sends_matching_verifier() {
        let mock = Arc::new(MockHttpClient::new());
        mock.push_json(200, json!({"access_token": "ya29.a", "refresh_token": "1//r"}));
        let connection =
            Connection::new(config(), AuthMode::oauth(credentials()), mock.clone()).unwrap();

        let authorization = connection.authorization_url_with_pkce().await.unwrap();
        let challenge = authorization
            .url
            .query_pairs()
            .find(|(k, _)| k == "code_challenge")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert!(!authorization.state.is_empty());

        connection.login_with_authorization_code("4/code").await.unwrap();

        let verifier = mock.last_request().unwrap().form_value("code_verifier").unwrap();
        assert_eq!(crate::auth::PkceFlow::compute_challenge(&verifier), challenge);
    }

    #[tokio::test]
    async fn service_account_mode_mints_from_configured_endpoint() {
        let mock = Arc::new(MockHttpClient::new());
        mock.push_json(200, json!({"access_token": "ya29.sa", "expires_in": 3600}))
            .push_json(200, json!({"items": []}));
        let key = ServiceAccountKey {
            client_email: "robot@p.iam.gserviceaccount.com".into(),
            private_key: "pem".into(),
            private_key_id: None,
            token_uri: Some("https://oauth2.googleapis.com/token".into()),
        };
        let connection = Connection::new(
            config(),
            AuthMode::service_account(key, Arc::new(FixedSigner)),
            mock.clone(),
        )
        .unwrap();

        connection.calendar_list().fetch_entries().await.unwrap();
        let requests = mock.requests();
        assert_eq!(requests[0].url.as_str(), "https://calendar.example.com/token");
        assert_eq!(requests[1].header("Authorization"), Some("Bearer ya29.sa"));
    }

    #[tokio::test]
    async fn legacy_mode_has_no_oauth_flow() {
        let mock = Arc::new(MockHttpClient::new());
        let auth = AuthMode::client_login("user@example.com", "pw", "tests");
        let connection = Connection::new(config(), auth, mock).unwrap();
        let err = connection.authorization_url().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        let err = connection.authorization_url_with_pkce().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(connection.credential().await.is_none());
    }
}
