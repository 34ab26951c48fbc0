//! S3-compatible object storage.
//!
//! Uploads never overwrite: small bodies go out as one conditional
//! `PutObject`, larger ones as a multipart upload onto a key claimed the same
//! way. Downloads are served by redirecting the client to a presigned
//! `GetObject` URL.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream as S3ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::StreamExt;
use tracing::{debug, instrument, warn};

use super::{
    content_disposition, generate_storage_key, Fetched, StorageBackend, StoredBlob, UploadStream,
    MAX_KEY_ATTEMPTS,
};
use crate::config::ObjectStoreConfig;
use crate::file::error::{StorageError, StorageResult};
use crate::file::record::FileRecord;

const DEFAULT_REGION: &str = "us-east-1";

/// Multipart part size. S3 needs at least 5 MiB for every part but the last,
/// and this also caps how much of an upload is held in memory.
const PART_SIZE: usize = 8 * 1024 * 1024;

/// Object store that hands out presigned URLs instead of streaming bytes.
pub struct ObjectStorage {
    client: Client,
    bucket: String,
    prefix: Option<String>,
    max_size: u64,
    url_ttl: Duration,
}

impl std::fmt::Debug for ObjectStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStorage")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("max_size", &self.max_size)
            .field("url_ttl", &self.url_ttl)
            .finish_non_exhaustive()
    }
}

impl ObjectStorage {
    /// Build a client for the configured bucket.
    ///
    /// Without explicit keys the ambient AWS credential chain is used.
    pub async fn new(
        config: &ObjectStoreConfig,
        max_size: u64,
        url_ttl: Duration,
    ) -> StorageResult<Self> {
        if config.bucket.is_empty() {
            return Err(StorageError::Config("bucket name is required".to_string()));
        }

        let region = aws_sdk_s3::config::Region::new(
            config
                .region
                .clone()
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
        );

        let mut builder = match (&config.access_key_id, &config.secret_access_key) {
            (Some(key_id), Some(secret)) => aws_sdk_s3::config::Builder::new()
                .behavior_version(BehaviorVersion::latest())
                .region(region)
                .credentials_provider(aws_sdk_s3::config::Credentials::new(
                    key_id.clone(),
                    secret.clone(),
                    None,
                    None,
                    "linkshare-config",
                )),
            (None, None) => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
            _ => {
                return Err(StorageError::Config(
                    "access_key_id and secret_access_key must be set together".to_string(),
                ))
            }
        };

        if let Some(endpoint) = &config.endpoint {
            let endpoint = if endpoint.to_ascii_lowercase().starts_with("http://")
                || endpoint.to_ascii_lowercase().starts_with("https://")
            {
                endpoint.clone()
            } else {
                format!("http://{endpoint}")
            };
            builder = builder.endpoint_url(endpoint);
        }

        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        let prefix = config
            .prefix
            .as_ref()
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty());

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            prefix,
            max_size,
            url_ttl,
        })
    }

    /// Bucket this storage writes to.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key.to_string(),
        }
    }

    /// Whether an object exists for `key`.
    #[instrument(skip(self), fields(backend = "object_store"))]
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if status_of(&err) == Some(404) => Ok(false),
            Err(err) => Err(StorageError::ObjectStore(err.to_string())),
        }
    }

    /// Produce a presigned GET URL valid for the configured TTL.
    ///
    /// The response headers the client will see are baked into the
    /// signature, so the download keeps its type and name.
    pub async fn signed_url(
        &self,
        key: &str,
        filename: &str,
        mime_type: &str,
    ) -> StorageResult<String> {
        let presigning = PresigningConfig::expires_in(self.url_ttl)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .response_content_type(mime_type)
            .response_content_disposition(content_disposition("inline", filename))
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::ObjectStore(e.to_string()))?;

        Ok(request.uri().to_string())
    }
}

/// HTTP status of a service error, if the request got that far.
fn status_of<E>(err: &SdkError<E>) -> Option<u16> {
    match err {
        SdkError::ServiceError(service_err) => Some(service_err.raw().status().as_u16()),
        _ => None,
    }
}

impl ObjectStorage {
    /// Store `body` under a fresh key without overwriting anything.
    ///
    /// `If-None-Match: *` makes the put fail with 412 when the key is taken;
    /// the next millisecond is tried instead.
    async fn put_new(
        &self,
        declared_name: &str,
        content_type: &str,
        body: Bytes,
    ) -> StorageResult<String> {
        let base = Utc::now();
        for attempt in 0..MAX_KEY_ATTEMPTS {
            let key = generate_storage_key(
                base + chrono::Duration::milliseconds(i64::from(attempt)),
                declared_name,
            );

            let result = self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(self.full_key(&key))
                .if_none_match("*")
                .content_type(content_type)
                .content_length(body.len() as i64)
                .body(S3ByteStream::from(body.clone()))
                .send()
                .await;

            match result {
                Ok(_) => return Ok(key),
                Err(err) if status_of(&err) == Some(412) => {
                    debug!(key = %key, "Object key taken, retrying");
                }
                Err(err) => return Err(StorageError::ObjectStore(err.to_string())),
            }
        }

        Err(StorageError::ObjectStore(format!(
            "no free object key after {MAX_KEY_ATTEMPTS} attempts"
        )))
    }

    /// Claim a key with an empty object, then open a multipart upload on it.
    async fn start_multipart(
        &self,
        declared_name: &str,
        content_type: &str,
    ) -> StorageResult<MultipartWrite> {
        let key = self.put_new(declared_name, content_type, Bytes::new()).await?;
        let full_key = self.full_key(&key);

        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&full_key)
            .content_type(content_type)
            .send()
            .await;

        let upload_id = match created.map(|out| out.upload_id().map(str::to_string)) {
            Ok(Some(id)) => id,
            Ok(None) => {
                self.discard(&full_key).await;
                return Err(StorageError::ObjectStore(
                    "object store did not return an upload id".to_string(),
                ));
            }
            Err(err) => {
                self.discard(&full_key).await;
                return Err(StorageError::ObjectStore(err.to_string()));
            }
        };

        debug!(key = %key, upload_id = %upload_id, "Started multipart upload");
        Ok(MultipartWrite {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key,
            full_key,
            upload_id,
            parts: Vec::new(),
            completed: false,
        })
    }

    /// Best-effort removal of an object nobody will reference.
    async fn discard(&self, full_key: &str) {
        if let Err(err) = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(full_key)
            .send()
            .await
        {
            warn!(key = %full_key, error = %err, "Failed to remove claimed object key");
        }
    }
}

/// An in-progress multipart upload onto a claimed key.
///
/// Unless completed, dropping it aborts the upload and deletes the claimed
/// key in the background. That covers errors, the size limit and the client
/// going away mid-stream alike.
struct MultipartWrite {
    client: Client,
    bucket: String,
    key: String,
    full_key: String,
    upload_id: String,
    parts: Vec<CompletedPart>,
    completed: bool,
}

impl MultipartWrite {
    async fn send_part(&mut self, data: Bytes) -> StorageResult<()> {
        let part_number = i32::try_from(self.parts.len() + 1)
            .map_err(|_| StorageError::ObjectStore("too many parts".to_string()))?;

        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.full_key)
            .upload_id(&self.upload_id)
            .part_number(part_number)
            .content_length(data.len() as i64)
            .body(S3ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::ObjectStore(e.to_string()))?;

        self.parts.push(
            CompletedPart::builder()
                .e_tag(output.e_tag().unwrap_or_default())
                .part_number(part_number)
                .build(),
        );
        Ok(())
    }

    /// Complete the upload, replacing the empty placeholder, and return the key.
    async fn complete(mut self) -> StorageResult<String> {
        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(self.parts.clone()))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.full_key)
            .upload_id(&self.upload_id)
            .multipart_upload(upload)
            .send()
            .await
            .map_err(|e| StorageError::ObjectStore(e.to_string()))?;

        self.completed = true;
        Ok(std::mem::take(&mut self.key))
    }
}

impl Drop for MultipartWrite {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(key = %self.full_key, "No runtime to abort multipart upload");
            return;
        };

        let client = self.client.clone();
        let bucket = std::mem::take(&mut self.bucket);
        let full_key = std::mem::take(&mut self.full_key);
        let upload_id = std::mem::take(&mut self.upload_id);
        handle.spawn(async move {
            if let Err(err) = client
                .abort_multipart_upload()
                .bucket(&bucket)
                .key(&full_key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                warn!(key = %full_key, error = %err, "Failed to abort multipart upload");
            }
            if let Err(err) = client
                .delete_object()
                .bucket(&bucket)
                .key(&full_key)
                .send()
                .await
            {
                warn!(key = %full_key, error = %err, "Failed to remove claimed object key");
            }
            debug!(key = %full_key, "Aborted multipart upload");
        });
    }
}

#[async_trait]
impl StorageBackend for ObjectStorage {
    /// Small uploads go out as one conditional put once the body is complete.
    /// Anything reaching `PART_SIZE` switches to a multipart upload so at most
    /// one part is held in memory.
    #[instrument(skip(self, stream), fields(backend = "object_store"))]
    async fn write<'a>(
        &self,
        mut stream: UploadStream<'a>,
        declared_name: &str,
    ) -> StorageResult<StoredBlob> {
        let content_type = mime_guess::from_path(declared_name).first_or_octet_stream();
        let content_type = content_type.essence_str();

        let mut buffer = BytesMut::new();
        let mut received: u64 = 0;
        let mut multipart: Option<MultipartWrite> = None;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StorageError::Interrupted(e.to_string()))?;
            received += chunk.len() as u64;
            if received > self.max_size {
                return Err(StorageError::SizeLimitExceeded {
                    limit: self.max_size,
                });
            }
            buffer.extend_from_slice(&chunk);

            while buffer.len() >= PART_SIZE {
                if multipart.is_none() {
                    multipart = Some(self.start_multipart(declared_name, content_type).await?);
                }
                let part = buffer.split_to(PART_SIZE).freeze();
                if let Some(upload) = multipart.as_mut() {
                    upload.send_part(part).await?;
                }
            }
        }

        let key = match multipart {
            None => self.put_new(declared_name, content_type, buffer.freeze()).await?,
            Some(mut upload) => {
                if !buffer.is_empty() {
                    upload.send_part(buffer.freeze()).await?;
                }
                upload.complete().await?
            }
        };

        debug!(key = %key, size = received, "Stored object");
        Ok(StoredBlob {
            key,
            size_bytes: received,
        })
    }

    #[instrument(skip(self, record), fields(backend = "object_store", key = %record.storage_key))]
    async fn fetch(&self, record: &FileRecord) -> StorageResult<Fetched> {
        if !self.exists(&record.storage_key).await? {
            return Err(StorageError::NotFound(record.storage_key.clone()));
        }

        let url = self
            .signed_url(&record.storage_key, &record.original_name, &record.mime_type)
            .await?;
        Ok(Fetched::Redirect(url))
    }

    fn backend_name(&self) -> &'static str {
        "object_store"
    }
}
