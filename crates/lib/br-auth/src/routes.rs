//! OAuth endpoints and the bearer-token guard for the MCP route.

use std::sync::Arc;

use axum::extract::{Form, Json, Query, Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    AccessToken, AuthError, AuthorizationParams, AuthorizationServerProvider,
    OAuthClientInformation, OAuthToken, RefreshToken, RevocableToken,
};

/// Shared state for the OAuth routes and the bearer middleware.
pub struct AuthState<P> {
    provider: Arc<P>,
    issuer_url: String,
}

impl<P> Clone for AuthState<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            issuer_url: self.issuer_url.clone(),
        }
    }
}

impl<P: AuthorizationServerProvider> AuthState<P> {
    /// `issuer_url` is the public base URL the OAuth routes are served under.
    #[must_use]
    pub fn new(provider: Arc<P>, issuer_url: impl Into<String>) -> Self {
        let issuer_url = issuer_url.into().trim_end_matches('/').to_string();
        Self {
            provider,
            issuer_url,
        }
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    #[must_use]
    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    error_description: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    description: String,
}

impl ApiError {
    fn invalid_request(description: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: "invalid_request",
            description: description.into(),
        }
    }

    fn invalid_grant(description: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: "invalid_grant",
            description: description.into(),
        }
    }

    fn invalid_client(description: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            error: "invalid_client",
            description: description.into(),
        }
    }

    fn invalid_token(description: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            error: "invalid_token",
            description: description.into(),
        }
    }

    fn upstream(description: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            error: "server_error",
            description: description.into(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::UnknownClient(_) => Self::invalid_client(err.to_string()),
            AuthError::InvalidRequest(message) => Self::invalid_request(message),
            AuthError::TokenExchange(message) => Self::invalid_grant(message),
            AuthError::CapacityReached { .. } => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                error: "temporarily_unavailable",
                description: err.to_string(),
            },
            AuthError::Http(_) => Self::upstream(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let challenge = self.status == StatusCode::UNAUTHORIZED;
        let error = self.error;
        let payload = Json(ErrorResponse {
            error,
            error_description: self.description,
        });
        let mut response = (self.status, payload).into_response();
        if challenge
            && let Ok(value) = HeaderValue::from_str(&format!("Bearer error=\"{error}\""))
        {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

/// Authorization server metadata (RFC 8414).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub registration_endpoint: String,
    pub revocation_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
}

impl AuthorizationServerMetadata {
    fn for_issuer(issuer: &str) -> Self {
        Self {
            issuer: issuer.to_string(),
            authorization_endpoint: format!("{issuer}/authorize"),
            token_endpoint: format!("{issuer}/token"),
            registration_endpoint: format!("{issuer}/register"),
            revocation_endpoint: format!("{issuer}/revoke"),
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
            ],
            code_challenge_methods_supported: vec!["S256".to_string()],
            token_endpoint_auth_methods_supported: vec!["none".to_string()],
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthorizeQuery {
    client_id: String,
    response_type: Option<String>,
    redirect_uri: Option<String>,
    scope: Option<String>,
    state: Option<String>,
    code_challenge: Option<String>,
    code_challenge_method: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenForm {
    grant_type: String,
    client_id: String,
    code: Option<String>,
    refresh_token: Option<String>,
    scope: Option<String>,
    state: Option<String>,
    code_verifier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RevokeForm {
    token: String,
    token_type_hint: Option<String>,
    client_id: Option<String>,
}

/// Builds the OAuth router: metadata, authorize, token, register and revoke.
pub fn router<P: AuthorizationServerProvider>(state: AuthState<P>) -> Router {
    Router::new()
        .route(
            "/.well-known/oauth-authorization-server",
            get(metadata::<P>),
        )
        .route("/authorize", get(authorize::<P>))
        .route("/token", post(token::<P>))
        .route("/register", post(register::<P>))
        .route("/revoke", post(revoke::<P>))
        .with_state(state)
}

/// Rejects requests without a usable bearer token.
///
/// The loaded `AccessToken` is inserted into the request extensions.
///
/// # Errors
/// Returns a 401 `ApiError` for missing, unknown or expired tokens.
pub async fn require_bearer<P: AuthorizationServerProvider>(
    State(state): State<AuthState<P>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::invalid_token("missing bearer token"))?
        .to_string();

    let access = state
        .provider
        .load_access_token(&token)
        .await
        .ok_or_else(|| ApiError::invalid_token("unknown access token"))?;
    if access.is_expired(chrono::Utc::now().timestamp()) {
        debug!(subject = ?access.subject, "rejected expired access token");
        return Err(ApiError::invalid_token("access token expired"));
    }

    request.extensions_mut().insert(access);
    Ok(next.run(request).await)
}

/// Extracts the credentials of a `Bearer` authorization header.
///
/// The scheme name is matched case-insensitively.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim_start().split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then_some(token.trim())
}

async fn metadata<P: AuthorizationServerProvider>(
    State(state): State<AuthState<P>>,
) -> Json<AuthorizationServerMetadata> {
    Json(AuthorizationServerMetadata::for_issuer(&state.issuer_url))
}

async fn client_for<P: AuthorizationServerProvider>(
    state: &AuthState<P>,
    client_id: &str,
) -> Result<OAuthClientInformation, ApiError> {
    state
        .provider
        .get_client(client_id)
        .await
        .ok_or_else(|| ApiError::from(AuthError::UnknownClient(client_id.to_string())))
}

fn split_scopes(scope: Option<&str>) -> Vec<String> {
    scope
        .map(|scope| scope.split_whitespace().map(ToString::to_string).collect())
        .unwrap_or_default()
}

async fn authorize<P: AuthorizationServerProvider>(
    State(state): State<AuthState<P>>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Redirect, ApiError> {
    if let Some(response_type) = query.response_type.as_deref()
        && response_type != "code"
    {
        return Err(ApiError::invalid_request(format!(
            "unsupported response_type: {response_type}"
        )));
    }
    if let Some(method) = query.code_challenge_method.as_deref()
        && method != "S256"
    {
        return Err(ApiError::invalid_request(format!(
            "unsupported code_challenge_method: {method}"
        )));
    }
    let client = client_for(&state, &query.client_id).await?;
    if let Some(redirect_uri) = query.redirect_uri.as_deref()
        && !client.redirect_uris.iter().any(|uri| uri == redirect_uri)
    {
        return Err(ApiError::invalid_request(format!(
            "redirect_uri is not registered: {redirect_uri}"
        )));
    }

    let scopes = split_scopes(query.scope.as_deref());
    let params = AuthorizationParams {
        state: query.state,
        scopes: (!scopes.is_empty()).then_some(scopes),
        code_challenge: query.code_challenge,
        redirect_uri: query.redirect_uri,
    };
    let url = state.provider.authorize(&client, params).await?;
    Ok(Redirect::to(&url))
}

async fn token<P: AuthorizationServerProvider>(
    State(state): State<AuthState<P>>,
    Form(form): Form<TokenForm>,
) -> Result<Json<OAuthToken>, ApiError> {
    let client = client_for(&state, &form.client_id).await?;
    match form.grant_type.as_str() {
        "authorization_code" => {
            let code = form
                .code
                .as_deref()
                .ok_or_else(|| ApiError::invalid_request("code is required"))?;
            let mut code = state
                .provider
                .load_authorization_code(&client, code)
                .await
                .ok_or_else(|| ApiError::invalid_grant("unknown authorization code"))?;
            if code.expires_at <= chrono::Utc::now().timestamp() {
                return Err(ApiError::invalid_grant("authorization code expired"));
            }
            code.state = form.state.or(code.state);
            code.code_verifier = form.code_verifier.or(code.code_verifier);
            let token = state
                .provider
                .exchange_authorization_code(&client, code)
                .await?;
            Ok(Json(token))
        }
        "refresh_token" => {
            let refresh = form
                .refresh_token
                .as_deref()
                .ok_or_else(|| ApiError::invalid_request("refresh_token is required"))?;
            let refresh = state
                .provider
                .load_refresh_token(&client, refresh)
                .await
                .ok_or_else(|| ApiError::invalid_grant("unknown refresh token"))?;
            let scopes = split_scopes(form.scope.as_deref());
            let token = state
                .provider
                .exchange_refresh_token(&client, refresh, scopes)
                .await?;
            Ok(Json(token))
        }
        other => {
            warn!(grant_type = other, "unsupported grant type");
            Err(ApiError {
                status: StatusCode::BAD_REQUEST,
                error: "unsupported_grant_type",
                description: format!("unsupported grant_type: {other}"),
            })
        }
    }
}

async fn register<P: AuthorizationServerProvider>(
    State(state): State<AuthState<P>>,
    Json(client): Json<OAuthClientInformation>,
) -> Result<(StatusCode, Json<OAuthClientInformation>), ApiError> {
    state.provider.register_client(client.clone()).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

async fn revoke<P: AuthorizationServerProvider>(
    State(state): State<AuthState<P>>,
    Form(form): Form<RevokeForm>,
) -> StatusCode {
    let token = if form.token_type_hint.as_deref() == Some("refresh_token") {
        RevocableToken::Refresh(RefreshToken {
            token: form.token,
            client_id: form.client_id.unwrap_or_default(),
            scopes: Vec::new(),
        })
    } else {
        RevocableToken::Access(AccessToken {
            token: form.token,
            client_id: form.client_id,
            subject: None,
            scopes: Vec::new(),
            expires_at: None,
        })
    };
    state.provider.revoke_token(token).await;
    StatusCode::OK
}
