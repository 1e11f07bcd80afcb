use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::shared::constants::{
    DEFAULT_ALLOWED_MIME_TYPES, DEFAULT_MAX_FILE_SIZE, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub metadata: MetadataBackend,
    pub storage: StorageBackend,
    pub upload: UploadConfig,
}

/// Deployment environment, controls whether internal error details are exposed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" | "local" | "test" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!(
                "APP_ENV must be 'development' or 'production', got '{}'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

/// Where FileRecords are persisted
#[derive(Debug, Clone)]
pub enum MetadataBackend {
    Postgres(DatabaseConfig),
    /// Process-local store, for development and tests
    Memory,
}

/// Where file content is persisted
#[derive(Debug, Clone)]
pub enum StorageBackend {
    MinIO(MinIOConfig),
    /// Process-local store, for development and tests
    Memory,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

/// MinIO/S3 storage configuration for file uploads
#[derive(Debug, Clone)]
pub struct MinIOConfig {
    /// MinIO/S3 endpoint URL
    pub endpoint: String,
    /// Public (CDN) endpoint used for `secure_url` (defaults to endpoint)
    pub public_endpoint: String,
    /// Access key for authentication
    pub access_key: String,
    /// Secret key for authentication
    pub secret_key: String,
    /// Bucket name for storing files
    pub bucket: String,
    /// AWS region (for S3 compatibility)
    pub region: String,
    /// Prefix every object key starts with (e.g., "files")
    pub key_prefix: String,
}

/// Upload policy and limits shared by the files feature
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_file_size: u64,
    pub allowed_mime_types: Vec<String>,
    pub max_batch_files: usize,
    pub batch_concurrency: usize,
    pub storage_timeout: Duration,
    pub metadata_timeout: Duration,
    pub signed_url_ttl: Duration,
    pub default_page_size: i64,
    pub max_page_size: i64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_mime_types: DEFAULT_ALLOWED_MIME_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_batch_files: UploadConfig::DEFAULT_MAX_BATCH_FILES,
            batch_concurrency: UploadConfig::DEFAULT_BATCH_CONCURRENCY,
            storage_timeout: Duration::from_secs(UploadConfig::DEFAULT_STORAGE_TIMEOUT_SECS),
            metadata_timeout: Duration::from_secs(UploadConfig::DEFAULT_METADATA_TIMEOUT_SECS),
            signed_url_ttl: Duration::from_secs(UploadConfig::DEFAULT_SIGNED_URL_TTL_SECS),
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if exists, ignore if not found (optional for production)
        if let Err(e) = dotenvy::dotenv() {
            if !e.to_string().contains("not found") {
                eprintln!("Warning: Error loading .env file: {}", e);
            }
        }

        Ok(Config {
            app: AppConfig::from_env()?,
            metadata: MetadataBackend::from_env()?,
            storage: StorageBackend::from_env()?,
            upload: UploadConfig::from_env()?,
        })
    }
}

/// Read an env var and parse it, falling back to `default` when unset
fn parse_env<T: FromStr>(name: &str, default: T) -> Result<T, String> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| format!("{} must be a valid number", name)),
        _ => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let environment = env::var("APP_ENV")
            .unwrap_or_else(|_| "production".to_string())
            .parse::<Environment>()?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid PORT: {}", e))?;

        // Parse CORS allowed origins from comma-separated string
        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            environment,
            host,
            port,
            cors_allowed_origins,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl MetadataBackend {
    pub fn from_env() -> Result<Self, String> {
        match env::var("METADATA_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" | "postgresql" => Ok(MetadataBackend::Postgres(DatabaseConfig::from_env()?)),
            "memory" => Ok(MetadataBackend::Memory),
            other => Err(format!(
                "METADATA_BACKEND must be 'postgres' or 'memory', got '{}'",
                other
            )),
        }
    }
}

impl StorageBackend {
    pub fn from_env() -> Result<Self, String> {
        match env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "minio".to_string())
            .to_lowercase()
            .as_str()
        {
            "minio" | "s3" => Ok(StorageBackend::MinIO(MinIOConfig::from_env()?)),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!(
                "STORAGE_BACKEND must be 'minio' or 'memory', got '{}'",
                other
            )),
        }
    }
}

impl DatabaseConfig {
    // Default values for database connection pool (conservative defaults for small-medium apps)
    const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    const DEFAULT_MIN_CONNECTIONS: u32 = 1;
    const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;
    const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600; // 10 minutes
    const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800; // 30 minutes

    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        Ok(Self {
            url,
            max_connections: parse_env("DB_MAX_CONNECTIONS", Self::DEFAULT_MAX_CONNECTIONS)?,
            min_connections: parse_env("DB_MIN_CONNECTIONS", Self::DEFAULT_MIN_CONNECTIONS)?,
            acquire_timeout_secs: parse_env(
                "DB_ACQUIRE_TIMEOUT_SECS",
                Self::DEFAULT_ACQUIRE_TIMEOUT_SECS,
            )?,
            idle_timeout_secs: parse_env("DB_IDLE_TIMEOUT_SECS", Self::DEFAULT_IDLE_TIMEOUT_SECS)?,
            max_lifetime_secs: parse_env("DB_MAX_LIFETIME_SECS", Self::DEFAULT_MAX_LIFETIME_SECS)?,
        })
    }
}

impl MinIOConfig {
    pub fn from_env() -> Result<Self, String> {
        let endpoint =
            env::var("MINIO_ENDPOINT").unwrap_or_else(|_| "http://localhost:9000".to_string());

        // Public endpoint defaults to the main endpoint if not specified
        let public_endpoint =
            env::var("MINIO_PUBLIC_ENDPOINT").unwrap_or_else(|_| endpoint.clone());

        let access_key = env::var("MINIO_ACCESS_KEY").unwrap_or_else(|_| "minioadmin".to_string());

        let secret_key = env::var("MINIO_SECRET_KEY").unwrap_or_else(|_| "minioadmin".to_string());

        let bucket = env::var("MINIO_BUCKET").unwrap_or_else(|_| "filevault-uploads".to_string());

        let region = env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".to_string());

        let key_prefix = env::var("MINIO_KEY_PREFIX")
            .unwrap_or_else(|_| "files".to_string())
            .trim_matches('/')
            .to_string();

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            public_endpoint: public_endpoint.trim_end_matches('/').to_string(),
            access_key,
            secret_key,
            bucket,
            region,
            key_prefix,
        })
    }
}

impl UploadConfig {
    const DEFAULT_MAX_BATCH_FILES: usize = 10;
    const DEFAULT_BATCH_CONCURRENCY: usize = 4;
    const DEFAULT_STORAGE_TIMEOUT_SECS: u64 = 60;
    const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 10;
    const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 3600; // 1 hour

    pub fn from_env() -> Result<Self, String> {
        let allowed_mime_types = match env::var("ALLOWED_MIME_TYPES") {
            Ok(raw) if !raw.trim().is_empty() => raw
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            _ => DEFAULT_ALLOWED_MIME_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };

        let max_batch_files = parse_env("MAX_BATCH_FILES", Self::DEFAULT_MAX_BATCH_FILES)?;
        if max_batch_files == 0 {
            return Err("MAX_BATCH_FILES must be at least 1".to_string());
        }

        let batch_concurrency =
            parse_env("BATCH_CONCURRENCY", Self::DEFAULT_BATCH_CONCURRENCY)?.max(1);

        let max_page_size = parse_env("MAX_PAGE_SIZE", MAX_PAGE_SIZE)?.max(1);
        let default_page_size =
            parse_env("DEFAULT_PAGE_SIZE", DEFAULT_PAGE_SIZE)?.clamp(1, max_page_size);

        Ok(Self {
            max_file_size: parse_env("MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?,
            allowed_mime_types,
            max_batch_files,
            batch_concurrency,
            storage_timeout: Duration::from_secs(parse_env(
                "STORAGE_TIMEOUT_SECS",
                Self::DEFAULT_STORAGE_TIMEOUT_SECS,
            )?),
            metadata_timeout: Duration::from_secs(parse_env(
                "METADATA_TIMEOUT_SECS",
                Self::DEFAULT_METADATA_TIMEOUT_SECS,
            )?),
            signed_url_ttl: Duration::from_secs(parse_env(
                "MINIO_PRESIGNED_URL_EXPIRY_SECS",
                Self::DEFAULT_SIGNED_URL_TTL_SECS,
            )?),
            default_page_size,
            max_page_size,
        })
    }

    /// Body limit for a single-file request (file plus multipart overhead)
    pub fn single_body_limit(&self) -> usize {
        (self.max_file_size as usize).saturating_add(1024 * 1024)
    }

    /// Body limit for a batch request
    pub fn batch_body_limit(&self) -> usize {
        (self.max_file_size as usize)
            .saturating_mul(self.max_batch_files)
            .saturating_add(1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            "development".parse::<Environment>().unwrap(),
            Environment::Development
        );
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Production);
        assert!("staging".parse::<Environment>().is_err());
        assert!(Environment::Production.is_production());
        assert!(!Environment::Development.is_production());
    }

    #[test]
    fn test_upload_config_defaults() {
        let config = UploadConfig::default();
        assert_eq!(config.max_file_size, 50 * 1024 * 1024);
        assert_eq!(config.default_page_size, 10);
        assert!(config
            .allowed_mime_types
            .iter()
            .any(|m| m == "application/pdf"));
        assert!(config.batch_body_limit() > config.single_body_limit());
    }
}
