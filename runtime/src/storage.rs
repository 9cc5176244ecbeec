//! HTTP object storage adapter.
//!
//! Talks to an S3-compatible gateway that accepts query-signed URLs:
//!
//! ```text
//! PUT {endpoint}/{bucket}/{key}?expires={unix}&max-size={bytes}&signature={sig}
//! ```
//!
//! `sig` is the URL-safe base64 HMAC-SHA256, under the shared signing secret, of
//!
//! ```text
//! {METHOD}\n{bucket}/{key}\n{content_type}\n{max_size}\n{expires}
//! ```
//!
//! Verification uses a signed `HEAD` on the same key and reads `content-length`,
//! `content-type` and the checksum metadata header.

use crate::config::StorageConfig;
use crate::retry::{RetryPolicy, retry_transient};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use request_desk_core::storage::{
    ObjectStorage, PresignedUpload, StorageError, StorageFuture, StoredObject, UploadSlot,
};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap};
use sha2::Sha256;
use std::collections::BTreeMap;

/// Headers a gateway may use to report an object's SHA-256.
const CHECKSUM_HEADERS: [&str; 2] = ["x-amz-meta-sha256", "x-checksum-sha256"];

/// Lifetime of signed verification (`HEAD`) URLs in seconds.
const HEAD_URL_TTL_SECS: i64 = 60;

type HmacSha256 = Hmac<Sha256>;

/// Builds and checks query signatures for one bucket.
#[derive(Debug, Clone)]
pub struct UrlSigner {
    endpoint: String,
    bucket: String,
    secret: Vec<u8>,
}

impl UrlSigner {
    /// Create a signer.
    #[must_use]
    pub fn new(endpoint: &str, bucket: &str, secret: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            secret: secret.as_bytes().to_vec(),
        }
    }

    /// Signature over one request description.
    ///
    /// # Errors
    ///
    /// [`StorageError::Signing`] if the MAC cannot be keyed with the secret.
    pub fn signature(
        &self,
        method: &str,
        key: &str,
        content_type: &str,
        max_size: u64,
        expires: i64,
    ) -> Result<String, StorageError> {
        let canonical = format!(
            "{method}\n{}/{key}\n{content_type}\n{max_size}\n{expires}",
            self.bucket
        );
        self.sign(canonical.as_bytes())
    }

    fn sign(&self, canonical: &[u8]) -> Result<String, StorageError> {
        let mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| StorageError::Signing(e.to_string()))?
            .chain_update(canonical)
            .finalize()
            .into_bytes();
        Ok(URL_SAFE_NO_PAD.encode(mac))
    }

    /// Signed URL for `method` on `key`.
    ///
    /// # Errors
    ///
    /// [`StorageError::Signing`] if the signature cannot be produced.
    pub fn signed_url(
        &self,
        method: &str,
        key: &str,
        content_type: &str,
        max_size: u64,
        expires_at: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        let expires = expires_at.timestamp();
        let signature = self.signature(method, key, content_type, max_size, expires)?;
        let path = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        Ok(format!(
            "{}/{}/{path}?expires={expires}&max-size={max_size}&signature={}",
            self.endpoint,
            urlencoding::encode(&self.bucket),
            urlencoding::encode(&signature)
        ))
    }
}

/// [`ObjectStorage`] over an S3-compatible HTTP gateway.
#[derive(Clone)]
pub struct HttpObjectStorage {
    client: reqwest::Client,
    signer: UrlSigner,
    retry: RetryPolicy,
}

impl HttpObjectStorage {
    /// Build the adapter from configuration.
    ///
    /// # Errors
    ///
    /// [`StorageError::Unavailable`] if the HTTP client cannot be built, or
    /// [`StorageError::Signing`] if no signing secret is configured.
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        if config.signing_secret.is_empty() {
            return Err(StorageError::Signing("signing secret is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            signer: UrlSigner::new(&config.endpoint, &config.bucket, &config.signing_secret),
            retry: RetryPolicy::builder().max_retries(config.max_retries).build(),
        })
    }

    async fn head_once(&self, key: &str) -> Result<Option<StoredObject>, StorageError> {
        let expires_at = Utc::now() + chrono::Duration::seconds(HEAD_URL_TTL_SECS);
        let url = self.signer.signed_url("HEAD", key, "", 0, expires_at)?;

        let response = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => parse_head(response.headers()).map(Some),
            status if status.is_server_error() => {
                Err(StorageError::Unavailable(format!("gateway returned {status}")))
            }
            status => Err(StorageError::InvalidResponse(format!(
                "gateway returned {status}"
            ))),
        }
    }
}

fn parse_head(headers: &HeaderMap) -> Result<StoredObject, StorageError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let size_bytes = header(CONTENT_LENGTH.as_str())
        .ok_or_else(|| StorageError::InvalidResponse("missing content-length".to_string()))?
        .parse::<u64>()
        .map_err(|e| StorageError::InvalidResponse(format!("bad content-length: {e}")))?;

    Ok(StoredObject {
        size_bytes,
        content_type: header(CONTENT_TYPE.as_str()),
        checksum_sha256: CHECKSUM_HEADERS.iter().find_map(|name| header(name)),
    })
}

impl ObjectStorage for HttpObjectStorage {
    fn presign_upload(&self, slot: UploadSlot) -> StorageFuture<'_, PresignedUpload> {
        Box::pin(async move {
            let url = self.signer.signed_url(
                "PUT",
                &slot.key,
                &slot.content_type,
                slot.max_size_bytes,
                slot.expires_at,
            )?;

            let mut headers = BTreeMap::new();
            headers.insert(CONTENT_TYPE.as_str().to_string(), slot.content_type);

            Ok(PresignedUpload { url, headers })
        })
    }

    fn head(&self, key: String) -> StorageFuture<'_, Option<StoredObject>> {
        Box::pin(async move {
            retry_transient(
                &self.retry,
                || self.head_once(&key),
                |e| matches!(e, StorageError::Unavailable(_)),
            )
            .await
        })
    }
}
