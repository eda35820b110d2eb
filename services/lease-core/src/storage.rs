use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::Credentials, config::Region, presigning::PresigningConfig, primitives::ByteStream,
    Client,
};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

/// Bucket-scoped object operations. Keys passed here are already stripped of
/// their bucket prefix, see [`object_key`].
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, String>;
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), String>;
    async fn presign_get(&self, bucket: &str, key: &str, ttl_secs: u64) -> Result<String, String>;
}

/// Stored paths look like `audit-pdfs/abc123.pdf`; bucket-scoped calls want
/// `abc123.pdf`. Paths without the prefix pass through unchanged.
pub fn object_key<'a>(bucket: &str, path: &'a str) -> &'a str {
    let path = path.trim_start_matches('/');
    path.strip_prefix(bucket)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(path)
}

pub fn object_path(bucket: &str, key: &str) -> String {
    format!("{}/{}", bucket.trim_end_matches('/'), key.trim_start_matches('/'))
}

#[derive(Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub force_path_style: bool,
}

/// S3-compatible storage (Supabase Storage, MinIO, S3).
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
}

impl S3Storage {
    pub async fn new(config: StorageConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key,
            config.secret_key,
            None,
            None,
            "leaseaudit",
        );
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .endpoint_url(config.endpoint)
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.force_path_style)
            .build();
        Self {
            client: Client::from_conf(s3_config),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, String> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| format!("get object {bucket}/{key} failed: {err}"))?;
        let body = output
            .body
            .collect()
            .await
            .map_err(|err| format!("read object {bucket}/{key} failed: {err}"))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), String> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| format!("put object {bucket}/{key} failed: {err}"))?;
        Ok(())
    }

    async fn presign_get(&self, bucket: &str, key: &str, ttl_secs: u64) -> Result<String, String> {
        let presigning = PresigningConfig::expires_in(Duration::from_secs(ttl_secs))
            .map_err(|err| format!("presign config failed: {err}"))?;
        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|err| format!("presign {bucket}/{key} failed: {err}"))?;
        Ok(presigned.uri().to_string())
    }
}

/// In-process object storage for development and tests.
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    presigned: Mutex<Vec<(String, String, u64)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, bucket: &str, key: &str, body: Vec<u8>) {
        self.objects
            .lock()
            .await
            .insert((bucket.to_string(), key.to_string()), body);
    }

    pub async fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .await
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    /// Every `(bucket, key, ttl)` a signed URL was issued for.
    pub async fn presigned(&self) -> Vec<(String, String, u64)> {
        self.presigned.lock().await.clone()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, String> {
        self.objects
            .lock()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| format!("get object {bucket}/{key} failed: no such key"))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), String> {
        self.insert(bucket, key, body).await;
        Ok(())
    }

    async fn presign_get(&self, bucket: &str, key: &str, ttl_secs: u64) -> Result<String, String> {
        if !self.contains(bucket, key).await {
            return Err(format!("presign {bucket}/{key} failed: no such key"));
        }
        self.presigned
            .lock()
            .await
            .push((bucket.to_string(), key.to_string(), ttl_secs));
        Ok(format!("memory://{bucket}/{key}?expires_in={ttl_secs}"))
    }
}
