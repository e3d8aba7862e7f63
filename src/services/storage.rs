use async_trait::async_trait;
use image::ImageFormat;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use uuid::Uuid;

use crate::error::ValidationError;

/// Pet photo received from a client, with its sniffed format.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl ImageUpload {
    /// Accept only the formats the image stack is built with.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ValidationError> {
        let format = image::guess_format(&bytes).map_err(|_| ValidationError::UnsupportedImage)?;
        match format {
            ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP => Ok(Self { bytes, format }),
            _ => Err(ValidationError::UnsupportedImage),
        }
    }

    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("bin")
    }

    pub fn content_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

/// Object storage for analysis images. Returns the URL the worker downloads from.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn store(&self, image: &ImageUpload) -> Result<String, StorageError>;
}

/// Client for Cloudflare R2 object storage (S3-compatible).
pub struct R2Client {
    bucket: Box<Bucket>,
    public_url: String,
}

impl R2Client {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        public_url: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            bucket,
            public_url: public_url.trim_end_matches('/').to_string(),
        })
    }
}

pub fn object_key(image: &ImageUpload) -> String {
    format!("analyses/{}.{}", Uuid::new_v4(), image.extension())
}

#[async_trait]
impl ImageStore for R2Client {
    async fn store(&self, image: &ImageUpload) -> Result<String, StorageError> {
        let key = object_key(image);
        let response = self
            .bucket
            .put_object_with_content_type(&key, &image.bytes, image.content_type())
            .await
            .map_err(StorageError::S3)?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(StorageError::Status(status));
        }

        Ok(format!("{}/{}", self.public_url, key))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Upload rejected with status {0}")]
    Status(u16),

    #[error("Storage configuration error: {0}")]
    Config(String),
}
