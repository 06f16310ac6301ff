//! Legacy ClientLogin for the Atom feed API.
//!
//! A form POST with the account's email and password returns `Key=Value`
//! lines; the `Auth` value authorizes later feed requests through a
//! `GoogleLogin auth=<token>` header.

use std::fmt;
use std::sync::Arc;

use gcalkit_core::{CalendarError, CalendarResult};
use tracing::info;
use url::Url;

use crate::http::{HttpClient, HttpRequest};

/// ClientLogin service name for Calendar.
pub const CALENDAR_SERVICE: &str = "cl";

/// Performs the legacy username/password login.
#[derive(Clone)]
pub struct ClientLogin {
    http: Arc<dyn HttpClient>,
    url: Url,
    email: String,
    password: String,
    source: String,
}

impl fmt::Debug for ClientLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientLogin")
            .field("url", &self.url)
            .field("email", &self.email)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl ClientLogin {
    pub fn new(
        http: Arc<dyn HttpClient>,
        url: Url,
        email: impl Into<String>,
        password: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            http,
            url,
            email: email.into(),
            password: password.into(),
            source: source.into(),
        }
    }

    /// Logs in and returns the `Auth` token.
    pub async fn authenticate(&self) -> CalendarResult<String> {
        let request = HttpRequest::post(self.url.clone()).with_form(&[
            ("accountType", "HOSTED_OR_GOOGLE"),
            ("Email", self.email.as_str()),
            ("Passwd", self.password.as_str()),
            ("service", CALENDAR_SERVICE),
            ("source", self.source.as_str()),
        ]);

        let response = self.http.execute(request).await?;
        if !response.is_success() {
            let reason = parse_field(&response.body, "Error").unwrap_or_else(|| "login rejected".into());
            return Err(CalendarError::authorization_failed(format!(
                "ClientLogin failed: {}",
                reason
            ))
            .with_status(response.status));
        }

        let token = parse_field(&response.body, "Auth").ok_or_else(|| {
            CalendarError::authorization_failed("ClientLogin response carried no Auth token")
        })?;
        info!(email = %self.email, "ClientLogin succeeded");
        Ok(token)
    }
}

/// Reads `key` from a `Key=Value` per line body.
pub fn parse_field(body: &str, key: &str) -> Option<String> {
    body.lines()
        .filter_map(|line| line.trim().split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

/// Formats the header value for a ClientLogin token.
pub fn authorization_header(token: &str) -> String {
    format!("GoogleLogin auth={}", token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHttpClient;
    use gcalkit_core::ErrorKind;

    fn login(mock: Arc<MockHttpClient>) -> ClientLogin {
        ClientLogin::new(
            mock,
            Url::parse("https://www.example.com/accounts/ClientLogin").unwrap(),
            "user@example.com",
            "hunter2",
            "gcalkit-tests",
        )
    }

    #[test]
    fn parses_key_value_trailer() {
        let body = "SID=abc\nLSID=def\nAuth=DQAAAHoAAA-token\n";
        assert_eq!(parse_field(body, "Auth").as_deref(), Some("DQAAAHoAAA-token"));
        assert_eq!(parse_field(body, "SID").as_deref(), Some("abc"));
        assert!(parse_field(body, "Error").is_none());
    }

    #[test]
    fn header_format() {
        assert_eq!(authorization_header("tok"), "GoogleLogin auth=tok");
    }

    #[tokio::test]
    async fn login_posts_form_and_returns_token() {
        let mock = Arc::new(MockHttpClient::new());
        mock.push_status(200, "SID=x\nLSID=y\nAuth=legacy-token\n");

        let token = login(mock.clone()).authenticate().await.unwrap();
        assert_eq!(token, "legacy-token");

        let request = mock.last_request().unwrap();
        assert_eq!(request.form_value("Email").as_deref(), Some("user@example.com"));
        assert_eq!(request.form_value("service").as_deref(), Some("cl"));
        assert_eq!(request.form_value("source").as_deref(), Some("gcalkit-tests"));
    }

    #[tokio::test]
    async fn rejected_login_is_authorization_failed() {
        let mock = Arc::new(MockHttpClient::new());
        mock.push_status(403, "Error=BadAuthentication\n");
        let err = login(mock).authenticate().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationFailed);
        assert!(err.message().contains("BadAuthentication"));
    }

    #[tokio::test]
    async fn missing_auth_line_is_authorization_failed() {
        let mock = Arc::new(MockHttpClient::new());
        mock.push_status(200, "SID=x\n");
        let err = login(mock).authenticate().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationFailed);
    }
}
