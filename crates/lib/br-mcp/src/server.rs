//! MCP server runners for br-mcp.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use br_auth::AuthorizationServerProvider;
use br_auth::routes::{self as auth_routes, AuthState};
use br_core::control::BrControlPlane;
use br_core::services::FileContext;
use br_core::store::QueryExecutor;
use rmcp::serve_server;
use rmcp::transport::io::stdio;
use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig,
    StreamableHttpService,
    session::local::LocalSessionManager,
};
use tracing::info;

use crate::BrMcp;

/// Configuration for the MCP streamable HTTP server.
#[derive(Debug, Clone)]
pub struct McpHttpServerConfig {
    pub addr: SocketAddr,
    pub stateful_mode: bool,
    pub sse_keep_alive: Option<Duration>,
    pub sse_retry: Option<Duration>,
}

impl McpHttpServerConfig {
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            stateful_mode: true,
            sse_keep_alive: Some(Duration::from_secs(15)),
            sse_retry: Some(Duration::from_secs(3)),
        }
    }

    #[must_use]
    pub const fn with_stateful_mode(mut self, stateful_mode: bool) -> Self {
        self.stateful_mode = stateful_mode;
        self
    }
}

impl Default for McpHttpServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8000)))
    }
}

/// Serves the MCP server over stdio.
///
/// # Errors
/// Returns any transport or server error.
pub async fn serve_stdio<E: QueryExecutor>(
    control: BrControlPlane<E>,
    files: FileContext,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let service = BrMcp::new(control, files);
    let (stdin, stdout) = stdio();
    let running = serve_server(service, (stdin, stdout)).await?;
    let _ = running.waiting().await?;
    Ok(())
}

/// Builds the HTTP router: `/health`, `/mcp`, and the OAuth routes when `auth` is set.
///
/// Each MCP session gets its own server instance, so the result cache is
/// per session in stateful mode.
pub fn http_router<E, P>(
    control: BrControlPlane<E>,
    files: FileContext,
    config: &McpHttpServerConfig,
    auth: Option<AuthState<P>>,
) -> Router
where
    E: QueryExecutor,
    P: AuthorizationServerProvider,
{
    let service: StreamableHttpService<BrMcp<E>, LocalSessionManager> =
        StreamableHttpService::new(
            move || Ok(BrMcp::new(control.clone(), files.clone())),
            Arc::new(LocalSessionManager::default()),
            StreamableHttpServerConfig {
                sse_keep_alive: config.sse_keep_alive,
                sse_retry: config.sse_retry,
                stateful_mode: config.stateful_mode,
                ..Default::default()
            },
        );

    let mcp = Router::new().nest_service("/mcp", service);
    let app = match auth {
        Some(state) => {
            let guarded = mcp.layer(axum::middleware::from_fn_with_state(
                state.clone(),
                auth_routes::require_bearer::<P>,
            ));
            guarded.merge(auth_routes::router(state))
        }
        None => mcp,
    };
    app.route("/health", get(|| async { "ok" }))
}

/// Serves the MCP server using streamable HTTP transport.
///
/// # Errors
/// Returns any listener or server error.
pub async fn serve_streamable_http<E, P>(
    control: BrControlPlane<E>,
    files: FileContext,
    config: McpHttpServerConfig,
    auth: Option<AuthState<P>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    E: QueryExecutor,
    P: AuthorizationServerProvider,
{
    let secured = auth.is_some();
    let app = http_router(control, files, &config, auth);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, secured, "br-mcp listening on /mcp");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use br_auth::{EntraAuthProvider, EntraConfig};
    use tower::ServiceExt;

    use super::*;
    use crate::testing;

    fn router(auth: Option<AuthState<EntraAuthProvider>>) -> Router {
        let server = testing::server(Vec::new());
        http_router(
            server.control().clone(),
            server.files().clone(),
            &McpHttpServerConfig::default(),
            auth,
        )
    }

    fn entra_state() -> AuthState<EntraAuthProvider> {
        let provider = EntraAuthProvider::new(EntraConfig::new(
            "contoso",
            "client-123",
            "http://localhost:8000/callback",
        ));
        AuthState::new(Arc::new(provider), "http://localhost:8000")
    }

    #[tokio::test]
    async fn health_is_open() {
        let response = router(Some(entra_state()))
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn mcp_requires_bearer_when_auth_enabled() {
        let response = router(Some(entra_state()))
            .oneshot(
                Request::post("/mcp")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn oauth_metadata_is_mounted_with_auth() {
        let request = || {
            Request::get("/.well-known/oauth-authorization-server")
                .body(Body::empty())
                .expect("request")
        };
        let response = router(Some(entra_state()))
            .oneshot(request())
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let response = router(None).oneshot(request()).await.expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
