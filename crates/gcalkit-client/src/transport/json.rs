//! Bearer-token transport for the three-legged OAuth flow.

use std::sync::Arc;

use gcalkit_core::{CalendarError, CalendarResult};
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

use super::Transport;
use crate::auth::{Credential, PkceAuthorization, PkceFlow, TokenExchanger, TokenStorage};
use crate::gateway::{ApiGeneration, classify};
use crate::http::{BoxFuture, HttpClient, HttpRequest, HttpResponse};

/// Sends JSON API requests with the credential's access token.
///
/// A stale access token is refreshed right before the request that needs
/// it. Refreshes are serialized by the credential lock.
#[derive(Debug)]
pub struct JsonTransport {
    http: Arc<dyn HttpClient>,
    exchanger: TokenExchanger,
    credential: RwLock<Credential>,
    storage: Option<TokenStorage>,
}

impl JsonTransport {
    pub fn new(
        http: Arc<dyn HttpClient>,
        exchanger: TokenExchanger,
        credential: Credential,
        storage: Option<TokenStorage>,
    ) -> Self {
        Self {
            http,
            exchanger,
            credential: RwLock::new(credential),
            storage,
        }
    }

    /// Returns a valid access token, refreshing it first when stale.
    async fn access_token(&self) -> CalendarResult<String> {
        {
            let credential = self.credential.read().await;
            if !credential.is_stale() {
                if let Some(token) = credential.access_token() {
                    return Ok(token.to_string());
                }
            }
        }

        let mut credential = self.credential.write().await;
        if credential.is_stale() {
            debug!("access token is stale, refreshing");
            self.exchanger.refresh_access_token(&mut credential).await?;
            self.persist(&credential)?;
        }
        credential
            .access_token()
            .map(str::to_string)
            .ok_or_else(|| CalendarError::invalid_credentials("no access token available"))
    }

    fn persist(&self, credential: &Credential) -> CalendarResult<()> {
        if let Some(storage) = &self.storage {
            storage.store_credential(credential)?;
        }
        Ok(())
    }
}

impl Transport for JsonTransport {
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

    fn authorization_url(&self) -> BoxFuture<'_, CalendarResult<Url>> {
        Box::pin(async move {
            let credential = self.credential.read().await;
            Ok(self.exchanger.build_authorization_url(&credential))
        })
    }

    fn authorization_url_with_pkce(&self) -> BoxFuture<'_, CalendarResult<PkceAuthorization>> {
        Box::pin(async move {
            let pkce = PkceFlow::new();
            let mut credential = self.credential.write().await;
            let url = self
                .exchanger
                .build_authorization_url_with_pkce(&credential, &pkce);
            credential.set_code_verifier(pkce.verifier);
            debug!("stored PKCE verifier for the next code exchange");
            Ok(PkceAuthorization {
                url,
                state: pkce.state,
            })
        })
    }

    fn exchange_authorization_code(&self, code: String) -> BoxFuture<'_, CalendarResult<()>> {
        Box::pin(async move {
            let mut credential = self.credential.write().await;
            credential.set_authorization_code(code);
            self.exchanger
                .exchange_authorization_code(&mut credential)
                .await?;
            if self.storage.is_some() {
                self.persist(&credential)?;
                info!("persisted refresh token");
            }
            Ok(())
        })
    }

    fn credential(&self) -> BoxFuture<'_, Option<Credential>> {
        Box::pin(async move { Some(self.credential.read().await.clone()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenGrant;
    use crate::config::OAuthCredentials;
    use crate::mock::MockHttpClient;
    use gcalkit_core::ErrorKind;
    use serde_json::json;

    fn transport(mock: Arc<MockHttpClient>, credential: Credential) -> JsonTransport {
        let exchanger = TokenExchanger::new(
            mock.clone(),
            Url::parse("https://accounts.example.com/auth").unwrap(),
            Url::parse("https://accounts.example.com/token").unwrap(),
            vec!["scope".into()],
        );
        JsonTransport::new(mock, exchanger, credential, None)
    }

    fn credential() -> Credential {
        Credential::new(&OAuthCredentials::new(
            "id.apps.googleusercontent.com",
            "secret",
            "http://localhost",
        ))
    }

    fn api_request() -> HttpRequest {
        HttpRequest::get(Url::parse("https://api.example.com/calendars/primary/events").unwrap())
    }

    #[tokio::test]
    async fn stale_token_is_refreshed_before_request() {
        let mock = Arc::new(MockHttpClient::new());
        mock.push_json(200, json!({"access_token": "ya29.new", "expires_in": 3600}))
            .push_json(200, json!({"items": []}));

        let transport = transport(mock.clone(), credential().with_refresh_token("1//r"));
        transport.send(api_request()).await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].url.path(), "/token");
        assert_eq!(requests[1].header("Authorization"), Some("Bearer ya29.new"));
    }

    #[tokio::test]
    async fn fresh_token_is_reused() {
        let mock = Arc::new(MockHttpClient::new());
        let mut cred = credential().with_refresh_token("1//r");
        cred.apply_grant(TokenGrant {
            access_token: "ya29.current".into(),
            refresh_token: None,
            expires_in: Some(3600),
            scope: None,
            token_type: None,
        });
        mock.push_json(200, json!({})).push_json(200, json!({}));

        let transport = transport(mock.clone(), cred);
        transport.send(api_request()).await.unwrap();
        transport.send(api_request()).await.unwrap();

        assert_eq!(mock.request_count(), 2);
        assert!(
            mock.requests()
                .iter()
                .all(|r| r.header("Authorization") == Some("Bearer ya29.current"))
        );
    }

    #[tokio::test]
    async fn unauthorized_is_invalid_credentials() {
        let mock = Arc::new(MockHttpClient::new());
        mock.push_json(200, json!({"access_token": "a", "expires_in": 3600}))
            .push_json(401, json!({"error": {"code": 401, "message": "Invalid Credentials"}}));
        let transport = transport(mock, credential().with_refresh_token("r"));
        let err = transport.send(api_request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
    }

    #[tokio::test]
    async fn failed_refresh_is_authorization_failed() {
        let mock = Arc::new(MockHttpClient::new());
        mock.push_json(400, json!({"error": "invalid_grant"}));
        let transport = transport(mock.clone(), credential().with_refresh_token("revoked"));
        let err = transport.send(api_request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationFailed);
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn code_exchange_persists_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TokenStorage::new(dir.path().join("tokens.json"));
        let mock = Arc::new(MockHttpClient::new());
        mock.push_json(
            200,
            json!({"access_token": "a", "refresh_token": "1//stored", "expires_in": 3600}),
        );

        let exchanger = TokenExchanger::new(
            mock.clone(),
            Url::parse("https://accounts.example.com/auth").unwrap(),
            Url::parse("https://accounts.example.com/token").unwrap(),
            vec!["scope".into()],
        );
        let transport = JsonTransport::new(mock, exchanger, credential(), Some(storage.clone()));
        transport
            .exchange_authorization_code("4/code".into())
            .await
            .unwrap();

        let snapshot = transport.credential().await.unwrap();
        assert!(snapshot.authorization_code().is_none());
        let stored = storage.load().unwrap().unwrap();
        assert_eq!(stored.refresh_token, "1//stored");
        assert_eq!(stored.scopes, ["scope"]);
    }

    #[tokio::test]
    async fn pkce_verifier_is_sent_on_code_exchange() {
        let mock = Arc::new(MockHttpClient::new());
        mock.push_json(200, json!({"access_token": "a", "refresh_token": "1//r"}));
        let transport = transport(mock.clone(), credential());

        let authorization = transport.authorization_url_with_pkce().await.unwrap();
        let query_value = |key: &str| {
            authorization
                .url
                .query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
        };
        assert_eq!(query_value("state"), Some(authorization.state.clone()));
        assert_eq!(query_value("code_challenge_method").as_deref(), Some("S256"));

        transport
            .exchange_authorization_code("4/code".into())
            .await
            .unwrap();

        let verifier = mock.last_request().unwrap().form_value("code_verifier").unwrap();
        assert_eq!(
            query_value("code_challenge"),
            Some(PkceFlow::compute_challenge(&verifier))
        );
        let snapshot = transport.credential().await.unwrap();
        assert!(snapshot.code_verifier().is_none());
    }
}
