use crate::services::{
    storage_gateway::MAX_PRESIGN_EXPIRY_SECS,
    upload_validator::{DEFAULT_MAX_UPLOAD_BYTES, FileType, UploadPolicy, default_file_types},
};
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, fmt, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreConfig,
    pub identity: IdentityConfig,
    pub max_upload_bytes: u64,
    pub file_types: Vec<FileType>,
    pub presign_expiry_secs: u64,
}

/// Connection settings for the S3-compatible store.
#[derive(Clone)]
pub struct StoreConfig {
    pub bucket: String,
    /// Custom endpoint URL (MinIO, R2, ...). `None` means AWS.
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// Attempts per store request, including the first.
    pub max_attempts: u32,
}

/// Identity provider settings.
#[derive(Clone)]
pub struct IdentityConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "File intake gateway for S3-compatible storage")]
pub struct Args {
    /// Host to bind to (overrides FILE_GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILE_GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Bucket that holds uploaded files (overrides FILE_GATEWAY_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// S3-compatible endpoint URL (overrides FILE_GATEWAY_S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// S3 region (overrides FILE_GATEWAY_S3_REGION)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Maximum upload size in bytes (overrides FILE_GATEWAY_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<u64>,

    /// Allowed types as `ext=mime,...` (overrides FILE_GATEWAY_ALLOWED_TYPES)
    #[arg(long)]
    pub allowed_types: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();

        let host = args
            .host
            .unwrap_or_else(|| env_or("FILE_GATEWAY_HOST", "0.0.0.0"));
        let port = match args.port {
            Some(port) => port,
            None => env_parse("FILE_GATEWAY_PORT", 3000)?,
        };
        let max_upload_bytes = match args.max_upload_bytes {
            Some(bytes) => bytes,
            None => env_parse("FILE_GATEWAY_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
        };
        let file_types = match args
            .allowed_types
            .or_else(|| env::var("FILE_GATEWAY_ALLOWED_TYPES").ok())
        {
            Some(list) => parse_file_types(&list)?,
            None => default_file_types(),
        };

        let store = StoreConfig {
            bucket: args
                .bucket
                .unwrap_or_else(|| env_or("FILE_GATEWAY_BUCKET", "files")),
            endpoint: args
                .s3_endpoint
                .or_else(|| env::var("FILE_GATEWAY_S3_ENDPOINT").ok())
                .filter(|value| !value.trim().is_empty()),
            region: args
                .s3_region
                .unwrap_or_else(|| env_or("FILE_GATEWAY_S3_REGION", "us-east-1")),
            access_key: env_required("FILE_GATEWAY_S3_ACCESS_KEY")?,
            secret_key: env_required("FILE_GATEWAY_S3_SECRET_KEY")?,
            max_attempts: env_parse("FILE_GATEWAY_S3_MAX_ATTEMPTS", 3)?,
        };
        if store.max_attempts == 0 {
            bail!("FILE_GATEWAY_S3_MAX_ATTEMPTS must be at least 1");
        }

        let identity = IdentityConfig {
            supabase_url: env_required("SUPABASE_URL")?,
            supabase_anon_key: env_required("SUPABASE_ANON_KEY")?,
        };

        let cfg = Self {
            host,
            port,
            store,
            identity,
            max_upload_bytes,
            file_types,
            presign_expiry_secs: env_parse("FILE_GATEWAY_PRESIGN_EXPIRY_SECS", 60)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.max_upload_bytes == 0 {
            bail!("maximum upload size must be greater than zero");
        }
        if self.presign_expiry_secs == 0 || self.presign_expiry_secs > MAX_PRESIGN_EXPIRY_SECS {
            bail!(
                "FILE_GATEWAY_PRESIGN_EXPIRY_SECS must be between 1 and {MAX_PRESIGN_EXPIRY_SECS}, got {}",
                self.presign_expiry_secs
            );
        }
        Ok(())
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy::new(self.max_upload_bytes, self.file_types.clone())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("bucket", &self.store.bucket)
            .field("s3_endpoint", &self.store.endpoint)
            .field("s3_region", &self.store.region)
            .field("s3_access_key", &"<redacted>")
            .field("s3_secret_key", &"<redacted>")
            .field("s3_max_attempts", &self.store.max_attempts)
            .field("supabase_url", &self.identity.supabase_url)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field(
                "allowed_extensions",
                &self.file_types.iter().map(|t| t.extension.as_str()).collect::<Vec<_>>(),
            )
            .field("presign_expiry_secs", &self.presign_expiry_secs)
            .finish()
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.into())
}

fn env_required(key: &str) -> Result<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        Ok(_) | Err(env::VarError::NotPresent) => bail!("environment variable {key} is required"),
        Err(err) => Err(err).with_context(|| format!("reading {key}")),
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {key} value `{value}`")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {key}")),
    }
}

/// Parse `jpg=image/jpeg, png=image/png` into an allow-list.
///
/// Extensions are lower-cased and may carry a leading dot.
pub fn parse_file_types(list: &str) -> Result<Vec<FileType>> {
    let mut types: Vec<FileType> = Vec::new();
    for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((ext, mime)) = entry.split_once('=') else {
            bail!("allowed type `{entry}` must look like `ext=mime/type`");
        };
        let extension = ext.trim().trim_start_matches('.').to_lowercase();
        let mime_type = mime.trim().to_lowercase();

        if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            bail!("allowed type `{entry}` has an invalid extension");
        }
        if !mime_type.contains('/') {
            bail!("allowed type `{entry}` has an invalid MIME type");
        }
        if types.iter().any(|t| t.extension == extension) {
            bail!("extension `{extension}` is listed twice");
        }
        types.push(FileType {
            extension,
            mime_type,
        });
    }

    if types.is_empty() {
        bail!("at least one allowed file type is required");
    }
    Ok(types)
}
