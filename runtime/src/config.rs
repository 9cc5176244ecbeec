//! Runtime configuration.
//!
//! These structs are built once at process start (see the web crate's `Config::from_env`) and
//! handed to the services that need them. Nothing in this crate reads the environment.

use std::time::Duration;

/// Content types accepted by default.
pub const DEFAULT_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "image/png",
    "image/jpeg",
    "text/plain",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// Attachment staging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingConfig {
    /// How long a presigned upload slot stays valid.
    pub upload_ttl: Duration,
    /// Largest declared size accepted.
    pub max_upload_bytes: u64,
    /// Accepted MIME types (lowercase).
    pub allowed_content_types: Vec<String>,
    /// Prefix of every object key.
    pub key_prefix: String,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            upload_ttl: Duration::from_secs(15 * 60),
            max_upload_bytes: 25 * 1024 * 1024,
            allowed_content_types: DEFAULT_CONTENT_TYPES
                .iter()
                .map(|t| (*t).to_string())
                .collect(),
            key_prefix: "requests".to_string(),
        }
    }
}

impl StagingConfig {
    /// Set the upload TTL.
    #[must_use]
    pub const fn with_upload_ttl(mut self, ttl: Duration) -> Self {
        self.upload_ttl = ttl;
        self
    }

    /// Set the size limit.
    #[must_use]
    pub const fn with_max_upload_bytes(mut self, max: u64) -> Self {
        self.max_upload_bytes = max;
        self
    }

    /// Whether `content_type` is on the allow list (case-insensitive).
    #[must_use]
    pub fn allows(&self, content_type: &str) -> bool {
        self.allowed_content_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(content_type))
    }
}

/// S3-compatible storage gateway settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Base URL of the gateway, without trailing slash.
    pub endpoint: String,
    /// Bucket holding attachments.
    pub bucket: String,
    /// Shared secret used to sign upload URLs.
    pub signing_secret: String,
    /// Timeout for verification requests.
    pub request_timeout: Duration,
    /// Retries for transient verification failures.
    pub max_retries: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            bucket: "request-desk".to_string(),
            signing_secret: String::new(),
            request_timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }
}
