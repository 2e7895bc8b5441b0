use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::RwLock;
use tracing::debug;

use crate::AuthError;

/// Configuration for the pending authorization flow store.
#[derive(Debug, Clone, Copy)]
pub struct PendingFlowsConfig {
    pub ttl: Duration,
    pub sweep_interval: Duration,
    pub max_entries: Option<usize>,
}

impl PendingFlowsConfig {
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sweep_interval: Duration::from_secs(60),
            max_entries: None,
        }
    }

    #[must_use]
    pub const fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    #[must_use]
    pub const fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }
}

impl Default for PendingFlowsConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

/// PKCE material for an authorization that has not been exchanged yet.
///
/// `code_verifier` is the verifier sent upstream to Entra; `client_challenge`
/// is the S256 challenge the MCP client sent to `/authorize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFlow {
    pub code_verifier: String,
    pub client_challenge: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    created_ms: u64,
}

impl PendingFlow {
    #[must_use]
    pub fn new(code_verifier: String, redirect_uri: String, scopes: Vec<String>) -> Self {
        Self {
            code_verifier,
            client_challenge: None,
            redirect_uri,
            scopes,
            created_ms: now_ms(),
        }
    }

    #[must_use]
    pub fn with_client_challenge(mut self, client_challenge: Option<String>) -> Self {
        self.client_challenge = client_challenge.filter(|challenge| !challenge.is_empty());
        self
    }

    fn age(&self, now_ms: u64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.created_ms))
    }
}

/// Authorization flows keyed by OAuth `state`, expired after a TTL.
#[derive(Clone)]
pub struct PendingFlows {
    inner: Arc<PendingFlowsInner>,
}

struct PendingFlowsInner {
    entries: RwLock<HashMap<String, PendingFlow>>,
    config: PendingFlowsConfig,
}

impl PendingFlows {
    #[must_use]
    pub fn new(config: PendingFlowsConfig) -> Self {
        Self {
            inner: Arc::new(PendingFlowsInner {
                entries: RwLock::new(HashMap::new()),
                config,
            }),
        }
    }

    /// Records a flow, replacing any flow with the same state.
    ///
    /// # Errors
    /// Returns `AuthError::CapacityReached` when the store is full of live flows.
    pub async fn insert(&self, state: &str, flow: PendingFlow) -> Result<(), AuthError> {
        let ttl = self.inner.config.ttl;
        let now = now_ms();
        let mut map = self.inner.entries.write().await;
        if let Some(max_entries) = self.inner.config.max_entries
            && !map.contains_key(state)
            && map.len() >= max_entries
        {
            map.retain(|_, flow| flow.age(now) <= ttl);
            if map.len() >= max_entries {
                return Err(AuthError::CapacityReached { max: max_entries });
            }
        }
        map.insert(state.to_string(), flow);
        Ok(())
    }

    /// Removes and returns the live flow for `state`.
    pub async fn take(&self, state: &str) -> Option<PendingFlow> {
        let mut map = self.inner.entries.write().await;
        let flow = map.remove(state)?;
        (flow.age(now_ms()) <= self.inner.config.ttl).then_some(flow)
    }

    /// Removes and returns the live flow started with `client_challenge`.
    pub async fn take_by_challenge(&self, client_challenge: &str) -> Option<(String, PendingFlow)> {
        let ttl = self.inner.config.ttl;
        let now = now_ms();
        let mut map = self.inner.entries.write().await;
        map.retain(|_, flow| flow.age(now) <= ttl);
        let state = map
            .iter()
            .find(|(_, flow)| flow.client_challenge.as_deref() == Some(client_challenge))
            .map(|(state, _)| state.clone())?;
        map.remove_entry(&state)
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.entries.read().await.is_empty()
    }

    pub async fn evict_expired(&self) -> usize {
        let ttl = self.inner.config.ttl;
        let now = now_ms();
        let mut map = self.inner.entries.write().await;
        let before = map.len();
        map.retain(|_, flow| flow.age(now) <= ttl);
        before.saturating_sub(map.len())
    }

    pub fn spawn_sweeper(self) -> tokio::task::JoinHandle<()> {
        let interval = self.inner.config.sweep_interval;
        let flows = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let evicted = flows.evict_expired().await;
                if evicted > 0 {
                    debug!(evicted, "evicted expired authorization flows");
                }
            }
        })
    }
}

fn now_ms() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    u64::try_from(elapsed).unwrap_or(u64::MAX)
}
