//! S3 uploads over the REST API with AWS Signature V4.
//!
//! Uses only pure-Rust dependencies (`hmac`, `sha2`) for signing and a
//! blocking `reqwest` client for the `PutObject` request. Works against AWS
//! and S3-compatible services (MinIO, LocalStack) via `publish.endpoint_url`.
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID`: required
//! - `AWS_SECRET_ACCESS_KEY`: required
//! - `AWS_SESSION_TOKEN`: optional (for temporary credentials / IAM roles)

use anyhow::{bail, Context, Result};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::debug;

use super::Uploader;
use crate::config::PublishConfig;

type HmacSha256 = Hmac<Sha256>;

/// AWS credentials loaded from environment variables.
struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

pub struct S3Uploader {
    region: String,
    endpoint_url: Option<String>,
    creds: AwsCredentials,
    client: reqwest::blocking::Client,
}

impl S3Uploader {
    pub fn from_env(config: &PublishConfig) -> Result<Self> {
        let creds = AwsCredentials::from_env()?;
        let client = reqwest::blocking::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            region: config.region.clone(),
            endpoint_url: config.endpoint_url.clone(),
            creds,
            client,
        })
    }
}

impl Uploader for S3Uploader {
    fn scheme(&self) -> &str {
        "s3"
    }

    fn upload(&self, local: &Path, bucket: &str, key: &str) -> Result<()> {
        let body = std::fs::read(local)
            .with_context(|| format!("Failed to read artifact {}", local.display()))?;
        let target = object_target(self.endpoint_url.as_deref(), &self.region, bucket, key);

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hex_sha256(&body);

        let mut headers = vec![
            ("host".to_string(), target.host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = self.creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "PUT\n{}\n\n{}\n{}\n{}",
            target.canonical_uri, canonical_headers, signed_headers, payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key =
            derive_signing_key(&self.creds.secret_access_key, &date_stamp, &self.region, "s3");
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        debug!(url = %target.url, bytes = body.len(), "PUT object");
        let mut req_builder = self
            .client
            .put(&target.url)
            .header("Authorization", &authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date);

        if let Some(ref token) = self.creds.session_token {
            req_builder = req_builder.header("x-amz-security-token", token);
        }

        let resp = req_builder
            .body(body)
            .send()
            .map_err(|e| anyhow::anyhow!("Failed to put s3://{}/{}: {}", bucket, key, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().unwrap_or_default();
            bail!(
                "S3 PutObject failed (HTTP {}) for s3://{}/{}: {}",
                status,
                bucket,
                key,
                text.chars().take(500).collect::<String>()
            );
        }
        Ok(())
    }
}

// ============ AWS SigV4 Helpers ============

/// Where a PUT goes and what gets signed for it.
#[derive(Debug, PartialEq, Eq)]
struct ObjectTarget {
    url: String,
    host: String,
    canonical_uri: String,
}

/// Resolve the request target for `bucket`/`key`.
///
/// AWS uses virtual-hosted style (`<bucket>.s3.<region>.amazonaws.com`).
/// A custom endpoint uses path style (`<endpoint>/<bucket>/<key>`), which is
/// what MinIO and LocalStack expect.
fn object_target(endpoint_url: Option<&str>, region: &str, bucket: &str, key: &str) -> ObjectTarget {
    let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
    match endpoint_url {
        Some(endpoint) => {
            let (scheme, rest) = match endpoint.split_once("://") {
                Some((scheme, rest)) => (scheme, rest),
                None => ("https", endpoint),
            };
            let host = rest.trim_end_matches('/').to_string();
            let canonical_uri = format!("/{}/{}", uri_encode(bucket), encoded_key);
            ObjectTarget {
                url: format!("{}://{}{}", scheme, host, canonical_uri),
                host,
                canonical_uri,
            }
        }
        None => {
            let host = format!("{}.s3.{}.amazonaws.com", bucket, region);
            let canonical_uri = format!("/{}", encoded_key);
            ObjectTarget {
                url: format!("https://{}{}", host, canonical_uri),
                host,
                canonical_uri,
            }
        }
    }
}

/// Compute the hex-encoded SHA-256 hash of data.
fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute HMAC-SHA256 of data with the given key.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986, keeping only `A-Z a-z 0-9 - _ . ~`.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_key_matches_aws_reference() {
        // Reference values from the AWS SigV4 documentation.
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn uri_encode_reserved_characters() {
        assert_eq!(uri_encode("a b+c"), "a%20b%2Bc");
        assert_eq!(uri_encode("safe-_.~"), "safe-_.~");
    }

    #[test]
    fn aws_target_is_virtual_hosted() {
        let target = object_target(None, "eu-west-1", "docs", "igris/igris_artifacts.zip");
        assert_eq!(target.host, "docs.s3.eu-west-1.amazonaws.com");
        assert_eq!(target.canonical_uri, "/igris/igris_artifacts.zip");
        assert_eq!(
            target.url,
            "https://docs.s3.eu-west-1.amazonaws.com/igris/igris_artifacts.zip"
        );
    }

    #[test]
    fn custom_endpoint_is_path_style_and_keeps_scheme() {
        let target = object_target(
            Some("http://localhost:9000/"),
            "us-east-1",
            "docs",
            "my kb/igris_artifacts.zip",
        );
        assert_eq!(target.host, "localhost:9000");
        assert_eq!(target.canonical_uri, "/docs/my%20kb/igris_artifacts.zip");
        assert_eq!(
            target.url,
            "http://localhost:9000/docs/my%20kb/igris_artifacts.zip"
        );
    }
}
