//! S3-compatible object storage backend (Cloudflare R2 and friends).

use std::env;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::{primitives::ByteStream, Client};
use aws_types::region::Region;

use crate::error::{Error, Result};

use super::ObjectStore;

const ENV_ACCOUNT_ID: &str = "KEEPSAKE_STORAGE_ACCOUNT_ID";
const ENV_BUCKET: &str = "KEEPSAKE_STORAGE_BUCKET";
const ENV_ACCESS_KEY_ID: &str = "KEEPSAKE_STORAGE_ACCESS_KEY_ID";
const ENV_SECRET_ACCESS_KEY: &str = "KEEPSAKE_STORAGE_SECRET_ACCESS_KEY";
const ENV_PUBLIC_BASE_URL: &str = "KEEPSAKE_STORAGE_PUBLIC_BASE_URL";

/// S3-compatible blob storage configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectStoreConfig {
    /// Account identifier used to derive the endpoint URL.
    pub account_id: String,
    /// Bucket name.
    pub bucket: String,
    /// Access key id for S3-compatible auth.
    pub access_key_id: String,
    /// Secret access key for S3-compatible auth.
    pub secret_access_key: String,
    /// Optional public URL base for serving media.
    pub public_base_url: Option<String>,
}

impl ObjectStoreConfig {
    /// Load object storage configuration from environment variables.
    ///
    /// Returns `Ok(None)` when no storage variables are set.
    /// Returns an error when only a partial configuration is provided.
    pub fn from_env() -> Result<Option<Self>> {
        parse_config(|key| env::var(key).ok())
    }

    /// S3-compatible endpoint URL for the account.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        format!("https://{}.r2.cloudflarestorage.com", self.account_id)
    }
}

/// [`ObjectStore`] backed by an S3-compatible bucket.
#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    config: ObjectStoreConfig,
    client: Client,
}

impl S3ObjectStore {
    #[must_use]
    pub fn new(config: ObjectStoreConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "keepsake-object-store",
        );
        let s3_config = aws_sdk_s3::config::Builder::new()
            .region(Region::new("auto"))
            .credentials_provider(credentials)
            .endpoint_url(config.endpoint_url())
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(s3_config),
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ObjectStoreConfig {
        &self.config
    }

    /// Check that the configured bucket is reachable with current credentials.
    pub async fn bucket_is_reachable(&self) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(&self.config.bucket)
            .send()
            .await
            .map_err(|error| storage_error("head_bucket", &self.config.bucket, None, error))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(
        &self,
        object_key: &str,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> Result<()> {
        let object_key = normalize_object_key(object_key)?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&object_key)
            .body(ByteStream::from(bytes.to_vec()));

        if let Some(content_type) = normalize_content_type(content_type) {
            request = request.content_type(content_type);
        }

        request.send().await.map_err(|error| {
            storage_error("put_object", &self.config.bucket, Some(&object_key), error)
        })?;

        Ok(())
    }

    async fn download(&self, object_key: &str) -> Result<Vec<u8>> {
        let object_key = normalize_object_key(object_key)?;

        let response = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(&object_key)
            .send()
            .await
            .map_err(|error| {
                storage_error("get_object", &self.config.bucket, Some(&object_key), error)
            })?;

        let payload = response.body.collect().await.map_err(|error| {
            storage_error(
                "get_object_body",
                &self.config.bucket,
                Some(&object_key),
                error,
            )
        })?;

        Ok(payload.into_bytes().to_vec())
    }

    async fn delete(&self, object_keys: &[String]) -> Result<()> {
        let mut first_error = None;

        for object_key in object_keys {
            let object_key = normalize_object_key(object_key)?;
            let result = self
                .client
                .delete_object()
                .bucket(&self.config.bucket)
                .key(&object_key)
                .send()
                .await;

            if let Err(error) = result {
                let error =
                    storage_error("delete_object", &self.config.bucket, Some(&object_key), error);
                tracing::warn!("{error}");
                first_error.get_or_insert(error);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    fn public_url(&self, object_key: &str) -> Option<String> {
        let base = self.config.public_base_url.as_ref()?;
        let key = object_key.trim().trim_matches('/');
        if key.is_empty() {
            return None;
        }

        Some(format!("{base}/{key}"))
    }
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<ObjectStoreConfig>> {
    let fetch = |key: &str| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let account_id = fetch(ENV_ACCOUNT_ID);
    let bucket = fetch(ENV_BUCKET);
    let access_key_id = fetch(ENV_ACCESS_KEY_ID);
    let secret_access_key = fetch(ENV_SECRET_ACCESS_KEY);
    let public_base_url = fetch(ENV_PUBLIC_BASE_URL);

    let required = [
        (ENV_ACCOUNT_ID, account_id.is_some()),
        (ENV_BUCKET, bucket.is_some()),
        (ENV_ACCESS_KEY_ID, access_key_id.is_some()),
        (ENV_SECRET_ACCESS_KEY, secret_access_key.is_some()),
    ];

    // Storage is optional as a whole, but never half-configured.
    if required.iter().all(|(_, present)| !present) && public_base_url.is_none() {
        return Ok(None);
    }
    let missing: Vec<&str> = required
        .iter()
        .filter(|(_, present)| !present)
        .map(|(key, _)| *key)
        .collect();
    if !missing.is_empty() {
        return Err(Error::InvalidInput(format!(
            "Object storage configuration is incomplete. Missing: {}",
            missing.join(", ")
        )));
    }

    let (Some(account_id), Some(bucket), Some(access_key_id), Some(secret_access_key)) =
        (account_id, bucket, access_key_id, secret_access_key)
    else {
        return Err(Error::InvalidInput(
            "Object storage configuration is incomplete".to_string(),
        ));
    };

    Ok(Some(ObjectStoreConfig {
        account_id,
        bucket,
        access_key_id,
        secret_access_key,
        public_base_url: normalize_public_base_url(public_base_url)?,
    }))
}

fn storage_error(
    operation: &str,
    bucket: &str,
    object_key: Option<&str>,
    error: impl std::fmt::Display,
) -> Error {
    match object_key {
        Some(key) => Error::Storage(format!("{operation} on {bucket}/{key}: {error}")),
        None => Error::Storage(format!("{operation} on {bucket}: {error}")),
    }
}

fn normalize_object_key(object_key: &str) -> Result<String> {
    let trimmed = object_key.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("object key is empty".to_string()));
    }
    Ok(trimmed.to_string())
}

fn normalize_content_type(content_type: Option<&str>) -> Option<String> {
    content_type
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn normalize_public_base_url(public_base_url: Option<String>) -> Result<Option<String>> {
    let Some(value) = public_base_url else {
        return Ok(None);
    };

    if !crate::util::is_http_url(&value) {
        return Err(Error::InvalidInput(format!(
            "{ENV_PUBLIC_BASE_URL} must start with http:// or https://"
        )));
    }

    Ok(Some(value.trim_end_matches('/').to_string()))
}
