use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::{debug, info};

use crate::config::StoreConfig;

use super::{ArtifactStore, StoreError};

/// Artifact store backed by S3 or an S3-compatible service (MinIO, R2).
#[derive(Clone)]
pub struct S3ArtifactStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ArtifactStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Constructs a client configured for a custom endpoint (local) or AWS.
    pub async fn from_config(config: &StoreConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "vellum-static",
        );

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        info!(
            "S3 artifact store ready (bucket: {}, path-style: {})",
            config.bucket, config.force_path_style
        );
        Self::new(aws_sdk_s3::Client::from_conf(s3_config), config.bucket.clone())
    }
}

fn unavailable<E: std::fmt::Display>(key: &str, err: E) -> StoreError {
    StoreError::Unavailable {
        key: key.to_string(),
        message: err.to_string(),
    }
}

/// 4xx responses are the caller's problem and will not fix themselves,
/// except timeouts and throttling.
fn is_rejection(status: u16) -> bool {
    (400..500).contains(&status) && status != 408 && status != 429
}

fn classify<E>(key: &str, err: SdkError<E>) -> StoreError
where
    E: std::error::Error + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let message = DisplayErrorContext(&err).to_string();
    match status {
        Some(status) if is_rejection(status) => StoreError::Rejected {
            key: key.to_string(),
            status,
            message,
        },
        _ => unavailable(key, message),
    }
}

fn classify_get_error(key: &str, err: SdkError<GetObjectError>) -> StoreError {
    match err.as_service_error() {
        Some(service) if service.is_no_such_key() => StoreError::NotFound {
            key: key.to_string(),
        },
        _ => classify(key, err),
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), StoreError> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| classify(key, e))?;

        debug!("Uploaded {size} bytes to s3://{}/{}", self.bucket, key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_get_error(key, e))?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| unavailable(key, e))?;
        Ok(data.into_bytes())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| classify(prefix, e))?;

            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match page.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_rejections() {
        for status in [400, 403, 404, 409] {
            assert!(is_rejection(status), "{status}");
        }
    }

    #[test]
    fn test_throttling_and_server_errors_stay_transient() {
        for status in [408, 429, 500, 503] {
            assert!(!is_rejection(status), "{status}");
        }
    }
}
