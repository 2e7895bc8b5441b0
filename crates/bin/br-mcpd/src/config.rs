use clap::{Parser, builder::BoolishValueParser};
use std::error::Error;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_MCP_HTTP_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 60;
const DEFAULT_DB_POOL_SIZE: u32 = 8;
const DEFAULT_MAX_FILES: usize = 32;
const DEFAULT_MAX_FILE_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_AUTH_FLOW_TTL_SECS: u64 = 600;
const DEFAULT_AUTH_MAX_FLOWS: usize = 1024;

#[derive(Parser, Debug)]
#[command(name = "br-mcpd", version, about = "Business request MCP daemon.")]
#[allow(clippy::struct_excessive_bools)]
struct CliArgs {
    /// ADO.NET style SQL Server connection string.
    #[arg(long, env = "BR_DB_CONNECTION_STRING", hide_env_values = true)]
    db_connection_string: Option<String>,

    #[arg(
        long,
        env = "BR_DB_QUERY_TIMEOUT_SECS",
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS
    )]
    db_query_timeout_secs: u64,

    #[arg(long, env = "BR_DB_POOL_SIZE", default_value_t = DEFAULT_DB_POOL_SIZE)]
    db_pool_size: u32,

    #[arg(
        long = "stdio",
        env = "BR_ENABLE_STDIO",
        default_value_t = false,
        value_parser = BoolishValueParser::new()
    )]
    enable_stdio: bool,

    #[arg(
        long,
        env = "BR_MCP_SERVE",
        default_value_t = true,
        value_parser = BoolishValueParser::new()
    )]
    mcp_serve: bool,

    #[arg(long, env = "BR_MCP_HTTP_ADDR", default_value = DEFAULT_MCP_HTTP_ADDR)]
    mcp_http_addr: SocketAddr,

    #[arg(
        long,
        env = "BR_MCP_STATEFUL",
        default_value_t = true,
        value_parser = BoolishValueParser::new()
    )]
    mcp_stateful: bool,

    #[arg(long, env = "BR_MAX_FILES", default_value_t = DEFAULT_MAX_FILES)]
    max_files: usize,

    #[arg(long, env = "BR_MAX_FILE_BYTES", default_value_t = DEFAULT_MAX_FILE_BYTES)]
    max_file_bytes: usize,

    #[arg(
        long,
        env = "BR_AUTH_ENABLED",
        default_value_t = false,
        value_parser = BoolishValueParser::new()
    )]
    auth_enabled: bool,

    #[arg(long, env = "BR_TENANT_ID")]
    tenant_id: Option<String>,

    #[arg(long, env = "BR_CLIENT_ID")]
    client_id: Option<String>,

    #[arg(long, env = "BR_REDIRECT_URI")]
    redirect_uri: Option<String>,

    /// Comma or space separated scopes.
    #[arg(long, env = "BR_AUTH_SCOPES")]
    auth_scopes: Option<String>,

    #[arg(long, env = "BR_AUTH_AUTHORITY")]
    auth_authority: Option<String>,

    /// Public base URL of this server, used as the OAuth issuer.
    #[arg(long, env = "BR_AUTH_ISSUER_URL")]
    auth_issuer_url: Option<String>,

    #[arg(
        long,
        env = "BR_AUTH_FLOW_TTL_SECS",
        default_value_t = DEFAULT_AUTH_FLOW_TTL_SECS
    )]
    auth_flow_ttl_secs: u64,

    #[arg(long, env = "BR_AUTH_MAX_FLOWS", default_value_t = DEFAULT_AUTH_MAX_FLOWS)]
    auth_max_flows: usize,
}

/// Entra ID settings, present when auth is enabled.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub authority: Option<String>,
    pub issuer_url: String,
    pub flow_ttl: Duration,
    pub max_flows: usize,
}

/// Runtime configuration loaded from CLI arguments and environment variables.
#[derive(Clone)]
pub struct BrConfig {
    pub db_connection_string: String,
    pub query_timeout: Duration,
    pub db_pool_size: u32,
    pub enable_stdio: bool,
    pub mcp_serve: bool,
    pub mcp_http_addr: SocketAddr,
    pub mcp_stateful: bool,
    pub max_files: usize,
    pub max_file_bytes: usize,
    pub auth: Option<AuthConfig>,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingSetting(&'static str),
    InvalidSetting { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSetting(name) => write!(f, "missing required setting: {name}"),
            Self::InvalidSetting { name, value } => {
                write!(f, "invalid {name} value: {value}")
            }
        }
    }
}

impl Error for ConfigError {}

impl BrConfig {
    pub fn from_args() -> Result<Self, ConfigError> {
        let args = CliArgs::parse();
        Self::try_from(args)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    non_empty(value).ok_or(ConfigError::MissingSetting(name))
}

fn parse_scopes(value: Option<&str>) -> Vec<String> {
    value
        .map(|scopes| {
            scopes
                .split(|ch: char| ch == ',' || ch.is_whitespace())
                .filter(|scope| !scope.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl TryFrom<CliArgs> for BrConfig {
    type Error = ConfigError;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let db_connection_string = required(args.db_connection_string, "BR_DB_CONNECTION_STRING")?;

        if args.db_query_timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "BR_DB_QUERY_TIMEOUT_SECS",
                value: args.db_query_timeout_secs.to_string(),
            });
        }
        if args.db_pool_size == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "BR_DB_POOL_SIZE",
                value: args.db_pool_size.to_string(),
            });
        }
        if args.max_files == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "BR_MAX_FILES",
                value: args.max_files.to_string(),
            });
        }
        if !args.enable_stdio && !args.mcp_serve {
            return Err(ConfigError::InvalidSetting {
                name: "BR_MCP_SERVE",
                value: "false (and BR_ENABLE_STDIO is false)".to_string(),
            });
        }

        let auth = if args.auth_enabled {
            let issuer_url = non_empty(args.auth_issuer_url)
                .unwrap_or_else(|| format!("http://{}", args.mcp_http_addr));
            Some(AuthConfig {
                tenant_id: required(args.tenant_id, "BR_TENANT_ID")?,
                client_id: required(args.client_id, "BR_CLIENT_ID")?,
                redirect_uri: required(args.redirect_uri, "BR_REDIRECT_URI")?,
                scopes: parse_scopes(args.auth_scopes.as_deref()),
                authority: non_empty(args.auth_authority),
                issuer_url,
                flow_ttl: Duration::from_secs(args.auth_flow_ttl_secs),
                max_flows: args.auth_max_flows,
            })
        } else {
            None
        };

        Ok(Self {
            db_connection_string,
            query_timeout: Duration::from_secs(args.db_query_timeout_secs),
            db_pool_size: args.db_pool_size,
            enable_stdio: args.enable_stdio,
            mcp_serve: args.mcp_serve,
            mcp_http_addr: args.mcp_http_addr,
            mcp_stateful: args.mcp_stateful,
            max_files: args.max_files,
            max_file_bytes: args.max_file_bytes,
            auth,
        })
    }
}
