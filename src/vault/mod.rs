//! S3-compatible blob storage for prompt/response content.
//!
//! Content is stored externally so traces and AIR records contain only
//! references, never raw data. The client speaks the S3 REST API directly
//! (path-style requests with SigV4 signing); MinIO and AWS S3 both accept
//! this subset.

pub mod sigv4;

use bytes::Bytes;
use chrono::Utc;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// S3-compatible storage configuration.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Host or host:port of the store, without scheme (e.g. `localhost:9000`).
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub use_ssl: bool,
}

/// A vault reference returned after storing content. An empty `uri`
/// signals "vault disabled" and is never a verification failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultRef {
    /// `vault://<bucket>/<key>`
    pub uri: String,
    /// `sha256:<hex>`
    pub checksum: String,
    pub size: u64,
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault: connect: {0}")]
    Connect(String),

    #[error("vault: check bucket {bucket}: {detail}")]
    CheckBucket { bucket: String, detail: String },

    #[error("vault: create bucket {bucket}: {detail}")]
    CreateBucket { bucket: String, detail: String },

    #[error("vault: store {key}: {detail}")]
    Store { key: String, detail: String },

    #[error("vault: fetch {key}: {detail}")]
    Fetch { key: String, detail: String },
}

/// Client for one bucket of an S3-compatible object store.
#[derive(Debug)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    host: String,
    bucket: String,
    creds: sigv4::Credentials,
    region: String,
}

impl Client {
    /// Connect to the store and ensure the bucket exists, creating it if
    /// missing.
    pub async fn connect(cfg: VaultConfig) -> Result<Self, VaultError> {
        let scheme = if cfg.use_ssl { "https" } else { "http" };
        let client = Client {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .connect_timeout(Duration::from_secs(5))
                .build()
                .map_err(|e| VaultError::Connect(e.to_string()))?,
            base_url: format!("{scheme}://{}", cfg.endpoint),
            host: cfg.endpoint.clone(),
            bucket: cfg.bucket,
            creds: sigv4::Credentials {
                access_key: cfg.access_key,
                secret_key: cfg.secret_key,
            },
            region: "us-east-1".to_string(),
        };

        client.ensure_bucket().await?;
        Ok(client)
    }

    /// The configured bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Store data under `key` and return a reference with checksum.
    pub async fn store(&self, key: &str, data: &[u8]) -> Result<VaultRef, VaultError> {
        let checksum = checksum(data);
        let path = sigv4::uri_encode(&format!("/{}/{}", self.bucket, key));
        let hash = sigv4::payload_hash(data);
        let signed = sigv4::sign_request(
            &self.creds, "PUT", &self.host, &path, "", &hash, &self.region, Utc::now(),
        );

        let resp = self
            .http
            .put(format!("{}{path}", self.base_url))
            .header("authorization", &signed.authorization)
            .header("x-amz-date", &signed.amz_date)
            .header("x-amz-content-sha256", &signed.content_sha256)
            .header("content-type", "application/json")
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| VaultError::Store {
                key: key.to_string(),
                detail: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(VaultError::Store {
                key: key.to_string(),
                detail: format!("unexpected status {}", resp.status()),
            });
        }

        Ok(VaultRef {
            uri: format!("vault://{}/{key}", self.bucket),
            checksum,
            size: data.len() as u64,
        })
    }

    /// Fetch content by key. Used only by the replay engine.
    pub async fn fetch(&self, key: &str) -> Result<Bytes, VaultError> {
        let path = sigv4::uri_encode(&format!("/{}/{}", self.bucket, key));
        let hash = sigv4::payload_hash(b"");
        let signed = sigv4::sign_request(
            &self.creds, "GET", &self.host, &path, "", &hash, &self.region, Utc::now(),
        );

        let resp = self
            .http
            .get(format!("{}{path}", self.base_url))
            .header("authorization", &signed.authorization)
            .header("x-amz-date", &signed.amz_date)
            .header("x-amz-content-sha256", &signed.content_sha256)
            .send()
            .await
            .map_err(|e| VaultError::Fetch {
                key: key.to_string(),
                detail: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(VaultError::Fetch {
                key: key.to_string(),
                detail: format!("unexpected status {}", resp.status()),
            });
        }

        resp.bytes().await.map_err(|e| VaultError::Fetch {
            key: key.to_string(),
            detail: e.to_string(),
        })
    }

    async fn ensure_bucket(&self) -> Result<(), VaultError> {
        let path = sigv4::uri_encode(&format!("/{}", self.bucket));
        let hash = sigv4::payload_hash(b"");
        let signed = sigv4::sign_request(
            &self.creds, "HEAD", &self.host, &path, "", &hash, &self.region, Utc::now(),
        );

        let resp = self
            .http
            .head(format!("{}{path}", self.base_url))
            .header("authorization", &signed.authorization)
            .header("x-amz-date", &signed.amz_date)
            .header("x-amz-content-sha256", &signed.content_sha256)
            .send()
            .await
            .map_err(|e| VaultError::Connect(e.to_string()))?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => self.create_bucket().await,
            s => Err(VaultError::CheckBucket {
                bucket: self.bucket.clone(),
                detail: format!("unexpected status {s}"),
            }),
        }
    }

    async fn create_bucket(&self) -> Result<(), VaultError> {
        let path = sigv4::uri_encode(&format!("/{}", self.bucket));
        let hash = sigv4::payload_hash(b"");
        let signed = sigv4::sign_request(
            &self.creds, "PUT", &self.host, &path, "", &hash, &self.region, Utc::now(),
        );

        let resp = self
            .http
            .put(format!("{}{path}", self.base_url))
            .header("authorization", &signed.authorization)
            .header("x-amz-date", &signed.amz_date)
            .header("x-amz-content-sha256", &signed.content_sha256)
            .send()
            .await
            .map_err(|e| VaultError::CreateBucket {
                bucket: self.bucket.clone(),
                detail: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(VaultError::CreateBucket {
                bucket: self.bucket.clone(),
                detail: format!("unexpected status {}", resp.status()),
            });
        }

        info!(bucket = %self.bucket, "vault bucket created");
        Ok(())
    }
}

/// `sha256:<hex>` of data.
pub fn checksum(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

/// Re-compute the checksum of data and compare against an expected
/// `sha256:<hex>` value.
pub fn verify_checksum(data: &[u8], expected: &str) -> bool {
    checksum(data) == expected
}
