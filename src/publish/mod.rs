//! Remote publishing of the packaged artifact.
//!
//! Publishing is optional: with no bucket it is a successful no-op. With a
//! bucket, the archive is uploaded to `{prefix}/igris_artifacts.zip`, so
//! every ingestion into the same bucket and prefix overwrites the previous
//! object.
//!
//! The upload client is resolved once, when the pipeline is constructed.
//! If it cannot be built (the `s3` feature is compiled out, or credentials
//! are missing) it is recorded as [`UploadClient::Unavailable`] and any
//! publish that names a bucket fails instead of silently skipping.

#[cfg(feature = "s3")]
mod s3;

#[cfg(feature = "s3")]
pub use s3::S3Uploader;

use anyhow::{bail, Result};
use std::path::Path;
use tracing::info;

use crate::config::PublishConfig;
use crate::package::ARCHIVE_NAME;

/// Something that can put a local file into object storage.
pub trait Uploader: Send + Sync {
    /// Scheme used in returned locations (e.g. `"s3"`).
    fn scheme(&self) -> &str;
    /// Upload `local` to `bucket` under `key`, replacing any existing object.
    fn upload(&self, local: &Path, bucket: &str, key: &str) -> Result<()>;
}

pub enum UploadClient {
    Available(Box<dyn Uploader>),
    /// Why no client could be built.
    Unavailable(String),
}

impl UploadClient {
    /// Build the S3 client from environment credentials.
    #[cfg(feature = "s3")]
    pub fn from_env(config: &PublishConfig) -> Self {
        match S3Uploader::from_env(config) {
            Ok(uploader) => UploadClient::Available(Box::new(uploader)),
            Err(e) => UploadClient::Unavailable(format!("{:#}", e)),
        }
    }

    #[cfg(not(feature = "s3"))]
    pub fn from_env(_config: &PublishConfig) -> Self {
        UploadClient::Unavailable("igris was built without the `s3` feature".to_string())
    }
}

/// Object key for the archive under `prefix`.
pub fn object_key(prefix: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        ARCHIVE_NAME.to_string()
    } else {
        format!("{}/{}", prefix, ARCHIVE_NAME)
    }
}

/// Upload `archive` if a bucket was requested.
///
/// Returns the fully qualified location (e.g. `s3://bucket/igris/igris_artifacts.zip`),
/// or `None` when no bucket was given. Upload failures are not retried.
pub fn publish(
    client: &UploadClient,
    archive: &Path,
    bucket: Option<&str>,
    prefix: &str,
) -> Result<Option<String>> {
    let bucket = match bucket {
        Some(b) if !b.is_empty() => b,
        _ => return Ok(None),
    };

    let uploader = match client {
        UploadClient::Available(uploader) => uploader,
        UploadClient::Unavailable(reason) => {
            bail!("S3 upload requested but client unavailable: {}", reason)
        }
    };

    let key = object_key(prefix);
    uploader
        .upload(archive, bucket, &key)
        .map_err(|e| anyhow::anyhow!("S3 upload failed: {:#}", e))?;

    let location = format!("{}://{}/{}", uploader.scheme(), bucket, key);
    info!(location = %location, "artifact published");
    Ok(Some(location))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingUploader {
        calls: Mutex<Vec<(String, String)>>,
    }

    impl Uploader for RecordingUploader {
        fn scheme(&self) -> &str {
            "s3"
        }
        fn upload(&self, _local: &Path, bucket: &str, key: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((bucket.to_string(), key.to_string()));
            Ok(())
        }
    }

    struct FailingUploader;

    impl Uploader for FailingUploader {
        fn scheme(&self) -> &str {
            "s3"
        }
        fn upload(&self, _local: &Path, _bucket: &str, _key: &str) -> Result<()> {
            bail!("403 Forbidden")
        }
    }

    #[test]
    fn object_key_strips_trailing_slash() {
        assert_eq!(object_key("igris"), "igris/igris_artifacts.zip");
        assert_eq!(object_key("team/docs/"), "team/docs/igris_artifacts.zip");
        assert_eq!(object_key(""), "igris_artifacts.zip");
    }

    #[test]
    fn no_bucket_is_noop_even_without_client() {
        let client = UploadClient::Unavailable("no creds".to_string());
        let location = publish(&client, Path::new("/tmp/a.zip"), None, "igris").unwrap();
        assert_eq!(location, None);
    }

    #[test]
    fn bucket_without_client_errors() {
        let client = UploadClient::Unavailable("AWS_ACCESS_KEY_ID not set".to_string());
        let err = publish(&client, Path::new("/tmp/a.zip"), Some("bucket"), "igris").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("client unavailable"));
        assert!(msg.contains("AWS_ACCESS_KEY_ID"));
    }

    #[test]
    fn upload_returns_location() {
        let client = UploadClient::Available(Box::new(RecordingUploader {
            calls: Mutex::new(Vec::new()),
        }));
        let location = publish(&client, Path::new("/tmp/a.zip"), Some("docs"), "kb/").unwrap();
        assert_eq!(
            location.as_deref(),
            Some("s3://docs/kb/igris_artifacts.zip")
        );
    }

    #[test]
    fn upload_failure_surfaces() {
        let client = UploadClient::Available(Box::new(FailingUploader));
        let err = publish(&client, Path::new("/tmp/a.zip"), Some("docs"), "igris").unwrap_err();
        assert!(err.to_string().contains("403 Forbidden"));
    }
}
