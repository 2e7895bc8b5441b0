use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{DecodingKey, Validation, decode};
use rand::Rng;
use rand::distributions::Alphanumeric;
use reqwest::Url;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::flows::{PendingFlow, PendingFlows, PendingFlowsConfig};
use crate::{
    AccessToken, AuthError, AuthorizationCode, AuthorizationParams, AuthorizationServerProvider,
    OAuthClientInformation, OAuthToken, RefreshToken, RevocableToken,
};

const DEFAULT_SCOPES: [&str; 4] = ["User.Read", "openid", "profile", "email"];
const CODE_LIFETIME_SECS: i64 = 600;
const ESTIMATED_TOKEN_LIFETIME_SECS: i64 = 3600;
const VERIFIER_LEN: usize = 64;

/// Settings for the Entra ID public client.
#[derive(Debug, Clone)]
pub struct EntraConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub authority: Option<String>,
    pub flows: PendingFlowsConfig,
}

impl EntraConfig {
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            scopes: DEFAULT_SCOPES.iter().map(ToString::to_string).collect(),
            authority: None,
            flows: PendingFlowsConfig::default(),
        }
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        if !scopes.is_empty() {
            self.scopes = scopes;
        }
        self
    }

    #[must_use]
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = Some(authority.into());
        self
    }

    #[must_use]
    pub const fn with_flow_ttl(mut self, ttl: Duration) -> Self {
        self.flows.ttl = ttl;
        self
    }

    #[must_use]
    pub const fn with_max_pending_flows(mut self, max: usize) -> Self {
        self.flows.max_entries = Some(max);
        self
    }

    /// Authority URL without a trailing slash.
    #[must_use]
    pub fn authority(&self) -> String {
        self.authority.as_deref().map_or_else(
            || format!("https://login.microsoftonline.com/{}", self.tenant_id),
            |authority| authority.trim_end_matches('/').to_string(),
        )
    }
}

/// Authorization provider backed by Microsoft Entra ID.
///
/// Users sign in against Entra with authorization code + PKCE; tokens issued
/// by Entra are handed to MCP clients unchanged.
#[derive(Clone)]
pub struct EntraAuthProvider {
    config: EntraConfig,
    authority: String,
    http: reqwest::Client,
    flows: PendingFlows,
}

impl EntraAuthProvider {
    #[must_use]
    pub fn new(config: EntraConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    #[must_use]
    pub fn with_client(config: EntraConfig, http: reqwest::Client) -> Self {
        let authority = config.authority();
        let flows = PendingFlows::new(config.flows);
        info!(%authority, "entra auth provider initialized");
        Self {
            config,
            authority,
            http,
            flows,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &EntraConfig {
        &self.config
    }

    #[must_use]
    pub const fn flows(&self) -> &PendingFlows {
        &self.flows
    }

    #[must_use]
    pub fn authorize_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/authorize", self.authority)
    }

    #[must_use]
    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority)
    }

    fn scope_string(&self, scopes: &[String]) -> String {
        if scopes.is_empty() {
            self.config.scopes.join(" ")
        } else {
            scopes.join(" ")
        }
    }

    /// Finds the pending flow a token request belongs to.
    ///
    /// The flow is located by `state` when the client sends it, otherwise by
    /// the S256 challenge of the client's `code_verifier`. A flow started with
    /// a client challenge is only released to the matching verifier.
    async fn pending_flow_for(&self, code: &AuthorizationCode) -> Result<PendingFlow, AuthError> {
        let presented = code.code_verifier.as_deref().map(pkce_challenge);
        let flow = match (code.state.as_deref(), presented.as_deref()) {
            (Some(state), _) => self.flows.take(state).await,
            (None, Some(challenge)) => self
                .flows
                .take_by_challenge(challenge)
                .await
                .map(|(_, flow)| flow),
            (None, None) => {
                return Err(AuthError::InvalidRequest(
                    "code_verifier is required".to_string(),
                ));
            }
        };
        let flow = flow.ok_or_else(|| {
            warn!(client_id = %code.client_id, "no pending authorization flow for token request");
            AuthError::TokenExchange("no pending authorization matches this request".to_string())
        })?;

        if let Some(expected) = flow.client_challenge.as_deref()
            && presented.as_deref() != Some(expected)
        {
            warn!(client_id = %code.client_id, "code_verifier does not match client challenge");
            return Err(AuthError::TokenExchange(
                "code_verifier does not match the authorization request".to_string(),
            ));
        }
        Ok(flow)
    }

    async fn request_token(
        &self,
        form: &[(&str, String)],
    ) -> Result<TokenEndpointResponse, AuthError> {
        let response = self
            .http
            .post(self.token_endpoint())
            .form(form)
            .send()
            .await?;
        Ok(response.json::<TokenEndpointResponse>().await?)
    }
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<u64>,
    refresh_token: Option<String>,
    id_token: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenEndpointResponse {
    fn into_token(self, fallback_refresh: Option<String>) -> Result<OAuthToken, String> {
        match self.access_token {
            Some(access_token) => Ok(OAuthToken {
                access_token,
                token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
                expires_in: self.expires_in,
                refresh_token: self.refresh_token.or(fallback_refresh),
                id_token: self.id_token,
                scope: self.scope,
            }),
            None => Err(self
                .error_description
                .or(self.error)
                .unwrap_or_else(|| "unknown error during token exchange".to_string())),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct UnverifiedClaims {
    exp: Option<i64>,
    sub: Option<String>,
    scp: Option<String>,
    azp: Option<String>,
    appid: Option<String>,
}

/// Reads the JWT payload without checking the signature.
fn peek_claims(token: &str) -> Option<UnverifiedClaims> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    decode::<UnverifiedClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .map(|data| data.claims)
}

fn pkce_verifier() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(VERIFIER_LEN)
        .map(char::from)
        .collect()
}

fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

impl AuthorizationServerProvider for EntraAuthProvider {
    async fn get_client(&self, client_id: &str) -> Option<OAuthClientInformation> {
        (client_id == self.config.client_id).then(|| OAuthClientInformation {
            client_id: self.config.client_id.clone(),
            client_secret: None,
            redirect_uris: vec![self.config.redirect_uri.clone()],
            grant_types: vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
            ],
            response_types: vec!["code".to_string()],
            scope: self.config.scopes.clone(),
        })
    }

    async fn register_client(&self, client: OAuthClientInformation) -> Result<(), AuthError> {
        info!(
            client_id = %client.client_id,
            "client registration is managed in the Entra app registration"
        );
        Ok(())
    }

    async fn authorize(
        &self,
        client: &OAuthClientInformation,
        params: AuthorizationParams,
    ) -> Result<String, AuthError> {
        let state = params
            .state
            .filter(|state| !state.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let scopes = params
            .scopes
            .filter(|scopes| !scopes.is_empty())
            .unwrap_or_else(|| self.config.scopes.clone());
        let verifier = pkce_verifier();
        let challenge = pkce_challenge(&verifier);

        let url = Url::parse_with_params(
            &self.authorize_endpoint(),
            &[
                ("client_id", self.config.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_mode", "query"),
                ("scope", scopes.join(" ").as_str()),
                ("state", state.as_str()),
                ("code_challenge", challenge.as_str()),
                ("code_challenge_method", "S256"),
            ],
        )
        .map_err(|err| AuthError::InvalidRequest(format!("invalid authority url: {err}")))?;

        self.flows
            .insert(
                &state,
                PendingFlow::new(verifier, self.config.redirect_uri.clone(), scopes)
                    .with_client_challenge(params.code_challenge),
            )
            .await?;
        info!(client_id = %client.client_id, %state, "authorization url generated");
        Ok(url.into())
    }

    async fn load_authorization_code(
        &self,
        client: &OAuthClientInformation,
        code: &str,
    ) -> Option<AuthorizationCode> {
        Some(AuthorizationCode {
            code: code.to_string(),
            client_id: client.client_id.clone(),
            redirect_uri: self.config.redirect_uri.clone(),
            scopes: self.config.scopes.clone(),
            expires_at: now_secs() + CODE_LIFETIME_SECS,
            state: None,
            code_verifier: None,
        })
    }

    async fn exchange_authorization_code(
        &self,
        client: &OAuthClientInformation,
        code: AuthorizationCode,
    ) -> Result<OAuthToken, AuthError> {
        let flow = self.pending_flow_for(&code).await?;

        let form = [
            ("grant_type", "authorization_code".to_string()),
            ("client_id", self.config.client_id.clone()),
            ("code", code.code),
            ("redirect_uri", flow.redirect_uri),
            ("scope", self.scope_string(&flow.scopes)),
            ("code_verifier", flow.code_verifier),
        ];

        let response = self.request_token(&form).await.inspect_err(|err| {
            error!(error = %err, "exception during token exchange");
        })?;
        match response.into_token(None) {
            Ok(token) => {
                info!(client_id = %client.client_id, "token exchange successful");
                Ok(token)
            }
            Err(message) => {
                error!(%message, "token exchange failed");
                Err(AuthError::TokenExchange(message))
            }
        }
    }

    async fn load_refresh_token(
        &self,
        client: &OAuthClientInformation,
        token: &str,
    ) -> Option<RefreshToken> {
        Some(RefreshToken {
            token: token.to_string(),
            client_id: client.client_id.clone(),
            scopes: self.config.scopes.clone(),
        })
    }

    async fn exchange_refresh_token(
        &self,
        client: &OAuthClientInformation,
        token: RefreshToken,
        scopes: Vec<String>,
    ) -> Result<OAuthToken, AuthError> {
        let form = [
            ("grant_type", "refresh_token".to_string()),
            ("client_id", self.config.client_id.clone()),
            ("refresh_token", token.token.clone()),
            ("scope", self.scope_string(&scopes)),
        ];
        let response = self.request_token(&form).await.inspect_err(|err| {
            error!(error = %err, "exception during refresh token exchange");
        })?;
        match response.into_token(Some(token.token)) {
            Ok(token) => {
                info!(client_id = %client.client_id, "refresh token exchange successful");
                Ok(token)
            }
            Err(message) => {
                error!(%message, "refresh token exchange failed");
                Err(AuthError::TokenExchange(message))
            }
        }
    }

    async fn load_access_token(&self, token: &str) -> Option<AccessToken> {
        if token.is_empty() {
            return None;
        }
        let claims = peek_claims(token).unwrap_or_default();
        let scopes = claims.scp.map_or_else(
            || self.config.scopes.clone(),
            |scp| scp.split_whitespace().map(ToString::to_string).collect(),
        );
        Some(AccessToken {
            token: token.to_string(),
            client_id: claims.azp.or(claims.appid),
            subject: claims.sub,
            scopes,
            expires_at: Some(
                claims
                    .exp
                    .unwrap_or_else(|| now_secs() + ESTIMATED_TOKEN_LIFETIME_SECS),
            ),
        })
    }

    async fn revoke_token(&self, token: RevocableToken) {
        let kind = match token {
            RevocableToken::Access(_) => "access",
            RevocableToken::Refresh(_) => "refresh",
        };
        info!(kind, "token revocation requested; entra does not revoke public client tokens");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::{Form, Json, Router, routing::post};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    use super::*;

    type SeenForms = Arc<Mutex<Vec<HashMap<String, String>>>>;

    /// Serves an Entra-shaped token endpoint on localhost and records each form.
    async fn token_endpoint() -> (String, SeenForms) {
        let seen = SeenForms::default();
        let recorder = seen.clone();
        let app = Router::new().route(
            "/tenant/oauth2/v2.0/token",
            post(move |Form(form): Form<HashMap<String, String>>| {
                let recorder = recorder.clone();
                async move {
                    let code = form.get("code").cloned().unwrap_or_default();
                    recorder.lock().expect("lock").push(form);
                    Json(json!({ "access_token": format!("access-for-{code}"), "expires_in": 3600 }))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        (format!("http://{addr}/tenant"), seen)
    }

    fn provider() -> EntraAuthProvider {
        EntraAuthProvider::new(EntraConfig::new(
            "contoso",
            "client-123",
            "http://localhost:8000/callback",
        ))
    }

    fn query_value(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.into_owned())
    }

    #[test]
    fn challenge_matches_rfc7636_vector() {
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
        assert_eq!(pkce_verifier().len(), VERIFIER_LEN);
    }

    #[test]
    fn authority_defaults_to_tenant_and_can_be_overridden() {
        let config = EntraConfig::new("contoso", "id", "http://localhost/cb");
        assert_eq!(config.authority(), "https://login.microsoftonline.com/contoso");
        assert_eq!(config.scopes, vec!["User.Read", "openid", "profile", "email"]);

        let custom = config.with_authority("https://login.example.test/tenant/");
        assert_eq!(custom.authority(), "https://login.example.test/tenant");
    }

    #[tokio::test]
    async fn get_client_only_knows_configured_client() {
        let provider = provider();
        let client = provider.get_client("client-123").await.expect("client");
        assert!(client.client_secret.is_none());
        assert_eq!(client.redirect_uris, vec!["http://localhost:8000/callback"]);
        assert!(provider.get_client("other").await.is_none());
    }

    #[tokio::test]
    async fn authorize_builds_pkce_url_and_stores_flow() {
        let provider = provider();
        let client = provider.get_client("client-123").await.expect("client");
        let url = provider
            .authorize(
                &client,
                AuthorizationParams {
                    state: Some("xyz".to_string()),
                    ..AuthorizationParams::default()
                },
            )
            .await
            .expect("authorize");
        let url = Url::parse(&url).expect("valid url");

        assert_eq!(url.path(), "/contoso/oauth2/v2.0/authorize");
        assert_eq!(query_value(&url, "state").as_deref(), Some("xyz"));
        assert_eq!(query_value(&url, "code_challenge_method").as_deref(), Some("S256"));
        assert_eq!(
            query_value(&url, "scope").as_deref(),
            Some("User.Read openid profile email")
        );

        let flow = provider.flows().take("xyz").await.expect("flow stored");
        assert_eq!(
            query_value(&url, "code_challenge"),
            Some(pkce_challenge(&flow.code_verifier))
        );
    }

    #[tokio::test]
    async fn authorize_generates_state_when_missing() {
        let provider = provider();
        let client = provider.get_client("client-123").await.expect("client");
        let url = provider
            .authorize(&client, AuthorizationParams::default())
            .await
            .expect("authorize");
        let url = Url::parse(&url).expect("valid url");
        let state = query_value(&url, "state").expect("state present");

        assert!(Uuid::parse_str(&state).is_ok());
        assert!(provider.flows().take(&state).await.is_some());
    }

    #[tokio::test]
    async fn code_exchange_uses_flow_of_the_presenting_client() {
        let (authority, seen) = token_endpoint().await;
        let provider = EntraAuthProvider::new(
            EntraConfig::new("contoso", "client-123", "http://localhost:8000/callback")
                .with_authority(authority),
        );
        let client = provider.get_client("client-123").await.expect("client");

        let mut upstream_challenges = HashMap::new();
        for user in ["alice", "bob"] {
            let url = provider
                .authorize(
                    &client,
                    AuthorizationParams {
                        state: Some(user.to_string()),
                        code_challenge: Some(pkce_challenge(&format!("{user}-verifier"))),
                        ..AuthorizationParams::default()
                    },
                )
                .await
                .expect("authorize");
            let url = Url::parse(&url).expect("valid url");
            upstream_challenges.insert(user, query_value(&url, "code_challenge").expect("challenge"));
        }

        let mut code = provider
            .load_authorization_code(&client, "bob-code")
            .await
            .expect("code");
        code.code_verifier = Some("bob-verifier".to_string());
        let token = provider
            .exchange_authorization_code(&client, code)
            .await
            .expect("bob's exchange");
        assert_eq!(token.access_token, "access-for-bob-code");

        let sent_verifier = seen.lock().expect("lock")[0]["code_verifier"].clone();
        assert_eq!(Some(&pkce_challenge(&sent_verifier)), upstream_challenges.get("bob"));
        assert_eq!(provider.flows().len().await, 1);

        let mut replay = provider
            .load_authorization_code(&client, "bob-code")
            .await
            .expect("code");
        replay.code_verifier = Some("bob-verifier".to_string());
        assert!(matches!(
            provider.exchange_authorization_code(&client, replay).await,
            Err(AuthError::TokenExchange(_))
        ));
        assert_eq!(provider.flows().len().await, 1);
        assert_eq!(seen.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn code_exchange_rejects_wrong_or_missing_verifier() {
        let provider = provider();
        let client = provider.get_client("client-123").await.expect("client");
        provider
            .authorize(
                &client,
                AuthorizationParams {
                    state: Some("alice".to_string()),
                    code_challenge: Some(pkce_challenge("alice-verifier")),
                    ..AuthorizationParams::default()
                },
            )
            .await
            .expect("authorize");

        let mut code = provider
            .load_authorization_code(&client, "stolen")
            .await
            .expect("code");
        assert!(matches!(
            provider.exchange_authorization_code(&client, code.clone()).await,
            Err(AuthError::InvalidRequest(_))
        ));

        code.state = Some("alice".to_string());
        code.code_verifier = Some("mallory-verifier".to_string());
        assert!(matches!(
            provider.exchange_authorization_code(&client, code).await,
            Err(AuthError::TokenExchange(_))
        ));
        assert!(provider.flows().is_empty().await);
    }

    #[tokio::test]
    async fn authorization_code_is_valid_for_ten_minutes() {
        let provider = provider();
        let client = provider.get_client("client-123").await.expect("client");
        let before = now_secs();
        let code = provider
            .load_authorization_code(&client, "abc")
            .await
            .expect("code");
        assert_eq!(code.code, "abc");
        assert!(code.expires_at >= before + CODE_LIFETIME_SECS);
        assert!(code.expires_at <= now_secs() + CODE_LIFETIME_SECS);
    }

    #[tokio::test]
    async fn access_token_expiry_comes_from_jwt_payload() {
        let claims = json!({ "exp": 1_900_000_000_i64, "sub": "user-1", "scp": "User.Read" });
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"not-checked"),
        )
        .expect("encode");

        let access = provider().load_access_token(&token).await.expect("token");
        assert_eq!(access.expires_at, Some(1_900_000_000));
        assert_eq!(access.subject.as_deref(), Some("user-1"));
        assert_eq!(access.scopes, vec!["User.Read"]);
    }

    #[tokio::test]
    async fn opaque_access_token_gets_estimated_expiry() {
        let before = now_secs();
        let access = provider()
            .load_access_token("opaque-token")
            .await
            .expect("token");
        let expires_at = access.expires_at.expect("expiry");
        assert!(expires_at >= before + ESTIMATED_TOKEN_LIFETIME_SECS);
        assert!(provider().load_access_token("").await.is_none());
    }

    #[test]
    fn token_response_keeps_old_refresh_token() {
        let response: TokenEndpointResponse = serde_json::from_value(json!({
            "access_token": "new-access",
            "expires_in": 3599
        }))
        .expect("response");
        let token = response
            .into_token(Some("old-refresh".to_string()))
            .expect("token");
        assert_eq!(token.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(token.token_type, "Bearer");

        let failure: TokenEndpointResponse = serde_json::from_value(json!({
            "error": "invalid_grant",
            "error_description": "AADSTS70008: code expired"
        }))
        .expect("response");
        assert_eq!(
            failure.into_token(None).unwrap_err(),
            "AADSTS70008: code expired"
        );
    }
}
