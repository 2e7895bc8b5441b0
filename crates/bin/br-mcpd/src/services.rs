use std::sync::Arc;

use br_auth::routes::AuthState;
use br_auth::{EntraAuthProvider, EntraConfig};
use br_core::control::BrControlPlane;
use br_core::services::{FileContext, FileContextConfig};
use br_core::store::{MssqlExecutor, StoreError};

use crate::config::{AuthConfig, BrConfig};

pub fn build_control_plane(
    config: &BrConfig,
) -> Result<BrControlPlane<MssqlExecutor>, StoreError> {
    let executor =
        MssqlExecutor::from_ado_string(&config.db_connection_string, config.db_pool_size)?;
    Ok(BrControlPlane::new(executor).with_query_timeout(config.query_timeout))
}

pub fn build_file_context(config: &BrConfig) -> FileContext {
    FileContext::new(
        FileContextConfig::new()
            .with_max_files(config.max_files)
            .with_max_file_bytes(config.max_file_bytes),
    )
}

pub fn build_auth(config: &AuthConfig) -> AuthState<EntraAuthProvider> {
    let mut entra = EntraConfig::new(
        config.tenant_id.clone(),
        config.client_id.clone(),
        config.redirect_uri.clone(),
    )
    .with_scopes(config.scopes.clone())
    .with_flow_ttl(config.flow_ttl)
    .with_max_pending_flows(config.max_flows);
    if let Some(authority) = &config.authority {
        entra = entra.with_authority(authority.clone());
    }
    AuthState::new(
        Arc::new(EntraAuthProvider::new(entra)),
        config.issuer_url.clone(),
    )
}
