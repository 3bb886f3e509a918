use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, fmt};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreConfig,
}

/// Connection settings for the object-storage backend.
#[derive(Clone)]
pub struct StoreConfig {
    pub bucket: String,
    pub region: String,
    /// Custom S3-compatible endpoint; `None` means AWS itself.
    pub endpoint: Option<String>,
    pub verify: bool,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl StoreConfig {
    /// Static credentials, only when both halves are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(id), Some(secret)) => Some((id.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("verify", &self.verify)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Submission preview store API")]
pub struct Args {
    /// Host to bind to (overrides PREVIEW_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PREVIEW_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Bucket holding preview content (overrides S3_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Region of the bucket (overrides AWS_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// S3-compatible endpoint URL (overrides S3_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Verify TLS certificates of the endpoint (overrides S3_VERIFY)
    #[arg(long)]
    pub verify: Option<bool>,

    /// Initialize the storage backend and exit
    #[arg(long)]
    pub init_only: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and init-only flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        Self::from_sources(Args::parse(), |name| env::var(name).ok())
    }

    fn from_sources(args: Args, env: impl Fn(&str) -> Option<String>) -> Result<(Self, bool)> {
        let var = |name: &str| env(name).filter(|value| !value.trim().is_empty());

        // --- Environment fallback ---
        let env_host = var("PREVIEW_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = match var("PREVIEW_PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing PREVIEW_PORT value `{}`", value))?,
            None => 8000,
        };
        let env_verify = match var("S3_VERIFY") {
            Some(value) => {
                parse_flag(&value).with_context(|| format!("parsing S3_VERIFY value `{}`", value))?
            }
            None => true,
        };

        // --- Merge ---
        let store = StoreConfig {
            bucket: args
                .bucket
                .or_else(|| var("S3_BUCKET"))
                .unwrap_or_else(|| "submission-preview".into()),
            region: args
                .region
                .or_else(|| var("AWS_REGION"))
                .unwrap_or_else(|| "us-east-1".into()),
            endpoint: args.endpoint.or_else(|| var("S3_ENDPOINT")),
            verify: args.verify.unwrap_or(env_verify),
            access_key_id: var("AWS_ACCESS_KEY_ID"),
            secret_access_key: var("AWS_SECRET_ACCESS_KEY"),
        };
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            store,
        };

        Ok((cfg, args.init_only))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got `{}`", other),
    }
}
