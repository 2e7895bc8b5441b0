//! OAuth authorization provider for br-mcp.
//!
//! Defines the provider interface the HTTP transport authenticates against,
//! an implementation that delegates to Microsoft Entra ID as a public client,
//! and the axum routes exposing it.

pub mod entra;
pub mod flows;
pub mod routes;

use std::error::Error;
use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

pub use entra::{EntraAuthProvider, EntraConfig};
pub use flows::{PendingFlow, PendingFlows, PendingFlowsConfig};

#[derive(Debug)]
pub enum AuthError {
    UnknownClient(String),
    InvalidRequest(String),
    TokenExchange(String),
    CapacityReached { max: usize },
    Http(reqwest::Error),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownClient(client_id) => write!(f, "unknown client: {client_id}"),
            Self::InvalidRequest(message) => write!(f, "invalid request: {message}"),
            Self::TokenExchange(message) => write!(f, "token exchange failed: {message}"),
            Self::CapacityReached { max } => {
                write!(f, "too many pending authorization flows (max {max})")
            }
            Self::Http(err) => write!(f, "identity provider request failed: {err}"),
        }
    }
}

impl Error for AuthError {}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}

/// Registered OAuth client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthClientInformation {
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub scope: Vec<String>,
}

/// Parameters of an `/authorize` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizationParams {
    pub state: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub code_challenge: Option<String>,
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub expires_at: i64,
    /// State of the authorization flow that produced the code, when known.
    pub state: Option<String>,
    /// PKCE verifier presented by the client at the token endpoint.
    #[serde(default, skip_serializing)]
    pub code_verifier: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshToken {
    pub token: String,
    pub client_id: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub client_id: Option<String>,
    pub subject: Option<String>,
    pub scopes: Vec<String>,
    pub expires_at: Option<i64>,
}

impl AccessToken {
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Token response returned to OAuth clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthToken {
    pub access_token: String,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevocableToken {
    Access(AccessToken),
    Refresh(RefreshToken),
}

/// Authorization server operations backing the OAuth routes.
pub trait AuthorizationServerProvider: Send + Sync + 'static {
    fn get_client(
        &self,
        client_id: &str,
    ) -> impl Future<Output = Option<OAuthClientInformation>> + Send;

    fn register_client(
        &self,
        client: OAuthClientInformation,
    ) -> impl Future<Output = Result<(), AuthError>> + Send;

    /// Starts an authorization flow and returns the URL to redirect the user to.
    fn authorize(
        &self,
        client: &OAuthClientInformation,
        params: AuthorizationParams,
    ) -> impl Future<Output = Result<String, AuthError>> + Send;

    fn load_authorization_code(
        &self,
        client: &OAuthClientInformation,
        code: &str,
    ) -> impl Future<Output = Option<AuthorizationCode>> + Send;

    fn exchange_authorization_code(
        &self,
        client: &OAuthClientInformation,
        code: AuthorizationCode,
    ) -> impl Future<Output = Result<OAuthToken, AuthError>> + Send;

    fn load_refresh_token(
        &self,
        client: &OAuthClientInformation,
        token: &str,
    ) -> impl Future<Output = Option<RefreshToken>> + Send;

    fn exchange_refresh_token(
        &self,
        client: &OAuthClientInformation,
        token: RefreshToken,
        scopes: Vec<String>,
    ) -> impl Future<Output = Result<OAuthToken, AuthError>> + Send;

    fn load_access_token(&self, token: &str) -> impl Future<Output = Option<AccessToken>> + Send;

    fn revoke_token(&self, token: RevocableToken) -> impl Future<Output = ()> + Send;
}
