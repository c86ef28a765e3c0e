//! Gateway configuration.

use clap::{ArgAction, Parser, ValueEnum};
use std::time::Duration;
use thiserror::Error;

/// Default account name for development storage.
pub const DEFAULT_ACCOUNT: &str = "devstoreaccount1";

/// Default account key for development storage (base64 encoded).
pub const DEFAULT_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

/// Blob endpoint of a local storage emulator.
pub const DEFAULT_EMULATOR_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// Default gateway port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default request body limit (256 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("connection string is missing {0}")]
    MissingConnectionStringKey(&'static str),

    #[error("malformed connection string segment '{0}'")]
    InvalidConnectionString(String),
}

/// Which storage backend serves requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Azure Blob Storage (or a compatible emulator) over REST.
    Azure,
    /// Process-local store; contents are lost on exit.
    Memory,
}

/// Command-line arguments for the gateway.
#[derive(Parser, Debug, Clone)]
#[command(name = "blob-gateway")]
#[command(about = "HTTP gateway over Azure Blob Storage")]
#[command(version)]
pub struct Args {
    /// Host address to bind to.
    #[arg(long, env = "GATEWAY_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, env = "GATEWAY_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Storage backend.
    #[arg(long, env = "GATEWAY_BACKEND", value_enum, default_value_t = BackendKind::Azure)]
    pub backend: BackendKind,

    /// Storage account name.
    #[arg(long, env = "BLOB_ACCOUNT_NAME", default_value = DEFAULT_ACCOUNT)]
    pub account_name: String,

    /// Storage account key (base64).
    #[arg(long, env = "BLOB_ACCOUNT_KEY", default_value = DEFAULT_ACCOUNT_KEY, hide_default_value = true)]
    pub account_key: String,

    /// Protocol used when the blob endpoint is derived from the account name.
    #[arg(long, env = "BLOB_PROTOCOL", default_value = "http")]
    pub protocol: String,

    /// Blob service endpoint. Defaults to the local emulator for the development
    /// account and to `{protocol}://{account}.blob.core.windows.net` otherwise.
    #[arg(long, env = "BLOB_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Full connection string; overrides the account, key, protocol and endpoint flags.
    #[arg(long, env = "BLOB_CONNECTION_STRING", hide_env_values = true)]
    pub connection_string: Option<String>,

    /// Include server-side error details in responses.
    #[arg(long, env = "APP_DISPLAY_ERROR_DETAILS", default_value_t = true, action = ArgAction::Set)]
    pub display_error_details: bool,

    /// Largest accepted request body, in bytes.
    #[arg(long, env = "GATEWAY_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Timeout for each backend request, in seconds.
    #[arg(long, env = "BLOB_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    /// Enable debug logging.
    #[arg(long, short = 'd')]
    pub debug: bool,

    /// Enable silent mode (minimal logging).
    #[arg(long, short = 's')]
    pub silent: bool,
}

/// Storage account credentials and endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageAccount {
    pub name: String,
    pub key: String,
    pub blob_endpoint: String,
}

impl std::fmt::Debug for StorageAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAccount")
            .field("name", &self.name)
            .field("key", &"<redacted>")
            .field("blob_endpoint", &self.blob_endpoint)
            .finish()
    }
}

impl StorageAccount {
    /// The well-known development account on a local emulator.
    pub fn development() -> Self {
        Self {
            name: DEFAULT_ACCOUNT.to_string(),
            key: DEFAULT_ACCOUNT_KEY.to_string(),
            blob_endpoint: DEFAULT_EMULATOR_ENDPOINT.to_string(),
        }
    }

    /// Builds an account from separate settings.
    pub fn new(name: &str, key: &str, protocol: &str, endpoint: Option<&str>) -> Self {
        let blob_endpoint = match endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None if name == DEFAULT_ACCOUNT => DEFAULT_EMULATOR_ENDPOINT.to_string(),
            None => format!("{protocol}://{name}.blob.{DEFAULT_ENDPOINT_SUFFIX}"),
        };
        Self {
            name: name.to_string(),
            key: key.to_string(),
            blob_endpoint,
        }
    }

    /// Parses an Azure storage connection string.
    ///
    /// ```
    /// use blob_gateway::config::StorageAccount;
    ///
    /// let account = StorageAccount::from_connection_string(
    ///     "DefaultEndpointsProtocol=https;AccountName=acme;AccountKey=a2V5;EndpointSuffix=core.windows.net",
    /// ).unwrap();
    /// assert_eq!(account.blob_endpoint, "https://acme.blob.core.windows.net");
    /// ```
    pub fn from_connection_string(value: &str) -> Result<Self, ConfigError> {
        let mut protocol = "https".to_string();
        let mut name = None;
        let mut key = None;
        let mut endpoint = None;
        let mut suffix = DEFAULT_ENDPOINT_SUFFIX.to_string();

        for segment in value.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (k, v) = segment
                .split_once('=')
                .ok_or_else(|| ConfigError::InvalidConnectionString(segment.to_string()))?;

            match k {
                "UseDevelopmentStorage" if v.eq_ignore_ascii_case("true") => {
                    return Ok(Self::development());
                }
                "DefaultEndpointsProtocol" => protocol = v.to_string(),
                "AccountName" => name = Some(v.to_string()),
                "AccountKey" => key = Some(v.to_string()),
                "BlobEndpoint" => endpoint = Some(v.trim_end_matches('/').to_string()),
                "EndpointSuffix" => suffix = v.to_string(),
                // Other services' endpoints and SAS settings do not apply here.
                _ => {}
            }
        }

        let name = name.ok_or(ConfigError::MissingConnectionStringKey("AccountName"))?;
        let key = key.ok_or(ConfigError::MissingConnectionStringKey("AccountKey"))?;
        let blob_endpoint = endpoint.unwrap_or_else(|| format!("{protocol}://{name}.blob.{suffix}"));

        Ok(Self {
            name,
            key,
            blob_endpoint,
        })
    }

    /// Renders the account as a connection string.
    pub fn connection_string(&self) -> String {
        let protocol = self
            .blob_endpoint
            .split_once("://")
            .map(|(scheme, _)| scheme)
            .unwrap_or("https");
        format!(
            "DefaultEndpointsProtocol={};AccountName={};AccountKey={};BlobEndpoint={};",
            protocol, self.name, self.key, self.blob_endpoint
        )
    }
}

/// Gateway configuration derived from command-line arguments.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    pub backend: BackendKind,
    pub account: StorageAccount,
    /// Include server-side error details in responses.
    pub display_error_details: bool,
    pub max_upload_bytes: usize,
    /// Timeout for each backend request.
    pub request_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            backend: BackendKind::Azure,
            account: StorageAccount::development(),
            display_error_details: true,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            request_timeout: None,
        }
    }
}

impl TryFrom<Args> for Config {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let account = match args.connection_string {
            Some(ref dsn) => StorageAccount::from_connection_string(dsn)?,
            None => StorageAccount::new(
                &args.account_name,
                &args.account_key,
                &args.protocol,
                args.endpoint.as_deref(),
            ),
        };

        Ok(Self {
            host: args.host,
            port: args.port,
            backend: args.backend,
            account,
            display_error_details: args.display_error_details,
            max_upload_bytes: args.max_upload_bytes,
            request_timeout: args.request_timeout_secs.map(Duration::from_secs),
        })
    }
}

impl Config {
    /// Returns the bind address of the gateway.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("blob-gateway").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flag_overrides() {
        let config = Config::try_from(parse(&[
            "--port",
            "9090",
            "--backend",
            "memory",
            "--display-error-details",
            "false",
            "--request-timeout-secs",
            "30",
        ]))
        .unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.backend, BackendKind::Memory);
        assert!(!config.display_error_details);
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_endpoint_defaults() {
        let dev = StorageAccount::new(DEFAULT_ACCOUNT, DEFAULT_ACCOUNT_KEY, "http", None);
        assert_eq!(dev.blob_endpoint, DEFAULT_EMULATOR_ENDPOINT);

        let prod = StorageAccount::new("acme", "a2V5", "https", None);
        assert_eq!(prod.blob_endpoint, "https://acme.blob.core.windows.net");

        let explicit = StorageAccount::new("acme", "a2V5", "https", Some("http://blob.local:9000/acme/"));
        assert_eq!(explicit.blob_endpoint, "http://blob.local:9000/acme");
    }

    #[test]
    fn test_connection_string() {
        let account = StorageAccount::from_connection_string(&format!(
            "DefaultEndpointsProtocol=http;AccountName=devstoreaccount1;AccountKey={DEFAULT_ACCOUNT_KEY};BlobEndpoint=http://127.0.0.1:10000/devstoreaccount1;"
        ))
        .unwrap();
        assert_eq!(account, StorageAccount::development());
        assert_eq!(
            StorageAccount::from_connection_string(&account.connection_string()).unwrap(),
            account
        );

        assert_eq!(
            StorageAccount::from_connection_string("UseDevelopmentStorage=true").unwrap(),
            StorageAccount::development()
        );
    }

    #[test]
    fn test_connection_string_errors() {
        assert_eq!(
            StorageAccount::from_connection_string("AccountKey=a2V5"),
            Err(ConfigError::MissingConnectionStringKey("AccountName"))
        );
        assert_eq!(
            StorageAccount::from_connection_string("AccountName=acme"),
            Err(ConfigError::MissingConnectionStringKey("AccountKey"))
        );
        assert!(matches!(
            StorageAccount::from_connection_string("AccountName=acme;garbage"),
            Err(ConfigError::InvalidConnectionString(_))
        ));
    }

    #[test]
    fn test_connection_string_overrides_flags() {
        let config = Config::try_from(parse(&[
            "--account-name",
            "ignored",
            "--connection-string",
            "AccountName=acme;AccountKey=a2V5",
        ]))
        .unwrap();
        assert_eq!(config.account.name, "acme");
        assert_eq!(config.account.blob_endpoint, "https://acme.blob.core.windows.net");
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug = format!("{:?}", StorageAccount::development());
        assert!(!debug.contains(DEFAULT_ACCOUNT_KEY));
    }
}
