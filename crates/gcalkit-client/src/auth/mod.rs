//! Credentials and token exchanges.
//!
//! - [`Credential`] holds the OAuth client identity and its tokens
//! - [`TokenExchanger`] runs the authorization-code and refresh exchanges
//! - [`ServiceAccountExchanger`] runs the signed-assertion exchange
//! - [`ClientLogin`] runs the legacy username/password login
//! - [`TokenStorage`] persists the refresh token between runs

mod client_login;
mod credential;
mod oauth;
mod service_account;
mod tokens;

pub use client_login::{CALENDAR_SERVICE, ClientLogin, authorization_header, parse_field};
pub use credential::{Credential, EXPIRY_SKEW_SECS, TokenGrant};
pub use oauth::{PkceAuthorization, PkceFlow, TokenExchanger};
pub use service_account::{
    ASSERTION_LIFETIME_SECS, AssertionClaims, AssertionSigner, JWT_BEARER_GRANT,
    ServiceAccountExchanger,
};
pub use tokens::{StoredToken, TokenStorage};
