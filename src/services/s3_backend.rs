//! `ObjectBackend` over S3 (or any S3-compatible endpoint) via `aws-sdk-s3`.
//!
//! All knowledge of S3 error codes and ETag formats lives in this module:
//! `translate_error` is the only place backend error codes are inspected, and
//! `normalize_etag` rewrites S3's quoted-hex MD5 ETags to the base64 checksum
//! the store hands out.

use crate::{
    config::StoreConfig,
    services::backend::{
        BackendError, BackendResult, ClientOptions, ObjectBackend, ObjectBody, ObjectHead,
        PutObject,
    },
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{
        BehaviorVersion, Credentials, Region, http::HttpResponse, retry::RetryConfig,
        timeout::TimeoutConfig,
    },
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::{ByteStream, DateTime as SmithyDateTime},
    types::{BucketLocationConstraint, CreateBucketConfiguration},
};
use aws_smithy_runtime::client::http::hyper_014::HyperClientBuilder;
use aws_smithy_runtime_api::client::http::SharedHttpClient;
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use rustls::{
    Certificate, ClientConfig, ServerName,
    client::{ServerCertVerified, ServerCertVerifier},
};
use std::{sync::Arc, time::SystemTime};
use tracing::{debug, error, warn};

/// Region in which buckets are created without a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

#[derive(Clone, Debug)]
pub struct S3Backend {
    client: Client,
    bucket: String,
    region: String,
}

impl S3Backend {
    /// Build a client from the store configuration.
    ///
    /// Static credentials are used only when both the key id and secret are
    /// configured; otherwise the default AWS provider chain applies. A custom
    /// endpoint switches to path-style addressing.
    pub async fn connect(cfg: &StoreConfig) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(cfg.region.clone()));
        if let Some((key_id, secret)) = cfg.credentials() {
            loader = loader.credentials_provider(Credentials::new(
                key_id,
                secret,
                None,
                None,
                "preview-store",
            ));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &cfg.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        if skips_tls_verification(cfg) {
            warn!(
                "TLS certificate verification is disabled for endpoint {:?}",
                cfg.endpoint
            );
            builder = builder.http_client(unverified_http_client());
        } else if !cfg.verify {
            warn!("S3_VERIFY=false only applies to a custom endpoint; ignoring it for AWS");
        }
        debug!(
            "new S3 client for bucket {} (region {}, endpoint {:?})",
            cfg.bucket, cfg.region, cfg.endpoint
        );

        Self {
            client: Client::from_conf(builder.build()),
            bucket: cfg.bucket.clone(),
            region: cfg.region.clone(),
        }
    }

    fn translate<E>(&self, err: SdkError<E, HttpResponse>, key: &str) -> BackendError
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
    {
        let status = err.raw_response().map(|resp| resp.status().as_u16());
        let code = err
            .as_service_error()
            .and_then(|service_err| service_err.code())
            .map(str::to_owned);
        let message = DisplayErrorContext(&err).to_string();
        let translated = translate_error(&self.bucket, key, code.as_deref(), status, message);
        if let BackendError::Other(detail) = &translated {
            error!("Unhandled S3 error for bucket {}: {}", self.bucket, detail);
        }
        translated
    }
}

/// Certificate checks are only ever turned off for a custom endpoint.
fn skips_tls_verification(cfg: &StoreConfig) -> bool {
    !cfg.verify && cfg.endpoint.is_some()
}

/// Accepts any server certificate. Used for self-signed local endpoints.
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

/// HTTP client for the SDK whose TLS layer skips certificate verification.
/// Plain `http://` endpoints keep working through it.
fn unverified_http_client() -> SharedHttpClient {
    let tls = ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
        .with_no_client_auth();
    let connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_tls_config(tls)
        .https_or_http()
        .enable_http1()
        .build();
    HyperClientBuilder::new().build(connector)
}

/// Classify an S3 failure by its error code, falling back to the HTTP status
/// for responses without a body (HEAD requests).
pub(crate) fn translate_error(
    bucket: &str,
    key: &str,
    code: Option<&str>,
    status: Option<u16>,
    message: String,
) -> BackendError {
    match (code, status) {
        (Some("NoSuchBucket"), _) => BackendError::NoSuchBucket(bucket.to_string()),
        (Some("NoSuchKey" | "NotFound"), _) | (None, Some(404)) => {
            BackendError::NoSuchKey(key.to_string())
        }
        (Some("PreconditionFailed" | "ConditionalRequestConflict"), _) | (None, Some(412)) => {
            BackendError::PreconditionFailed(key.to_string())
        }
        (Some("BucketAlreadyOwnedByYou"), _) => {
            BackendError::BucketAlreadyOwned(bucket.to_string())
        }
        _ => BackendError::Other(message),
    }
}

/// Convert an S3 ETag to the store's checksum format.
///
/// Single-part uploads carry the hex MD5 of the body in quotes; those become
/// base64. Anything else (multipart ETags) is passed through unquoted.
///
/// Objects encrypted with SSE-KMS or SSE-C also get 32-hex ETags that are not
/// the MD5 of the body. The bucket is expected to use no encryption or SSE-S3;
/// otherwise reads report a tag that differs from the deposit checksum.
pub(crate) fn normalize_etag(raw: &str) -> String {
    let unquoted = raw.trim().trim_matches('"');
    match hex::decode(unquoted) {
        Ok(digest) if digest.len() == 16 => general_purpose::STANDARD.encode(digest),
        _ => unquoted.to_string(),
    }
}

fn object_head(
    key: &str,
    e_tag: Option<&str>,
    last_modified: Option<&SmithyDateTime>,
    content_length: Option<i64>,
) -> BackendResult<ObjectHead> {
    let checksum = e_tag
        .map(normalize_etag)
        .ok_or_else(|| BackendError::Other(format!("no ETag returned for `{}`", key)))?;
    let last_modified = last_modified
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts.secs(), ts.subsec_nanos()))
        .ok_or_else(|| BackendError::Other(format!("no Last-Modified returned for `{}`", key)))?;

    Ok(ObjectHead {
        checksum,
        last_modified,
        size_bytes: content_length.unwrap_or_default(),
    })
}

#[async_trait]
impl ObjectBackend for S3Backend {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn with_options(&self, options: ClientOptions) -> Arc<dyn ObjectBackend> {
        let config = self
            .client
            .config()
            .to_builder()
            .timeout_config(
                TimeoutConfig::builder()
                    .connect_timeout(options.connect_timeout)
                    .read_timeout(options.read_timeout)
                    .build(),
            )
            .retry_config(RetryConfig::standard().with_max_attempts(options.retries.saturating_add(1)))
            .build();

        Arc::new(Self {
            client: Client::from_conf(config),
            bucket: self.bucket.clone(),
            region: self.region.clone(),
        })
    }

    async fn put_object(&self, request: PutObject) -> BackendResult<()> {
        let mut call = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&request.key)
            .content_type(request.content_type)
            .body(ByteStream::from(request.body));
        if let Some(content_md5) = request.content_md5 {
            call = call.content_md5(content_md5);
        }
        if request.if_absent {
            call = call.if_none_match("*");
        }

        call.send()
            .await
            .map(|_| ())
            .map_err(|err| self.translate(err, &request.key))
    }

    async fn head_object(&self, key: &str) -> BackendResult<ObjectHead> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| self.translate(err, key))?;

        object_head(
            key,
            output.e_tag(),
            output.last_modified(),
            output.content_length(),
        )
    }

    async fn get_object(&self, key: &str) -> BackendResult<ObjectBody> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| self.translate(err, key))?;

        let head = object_head(
            key,
            output.e_tag(),
            output.last_modified(),
            output.content_length(),
        )?;
        Ok(ObjectBody {
            head,
            body: Box::pin(output.body.into_async_read()),
        })
    }

    async fn bucket_exists(&self) -> BackendResult<bool> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => match self.translate(err, "") {
                BackendError::NoSuchBucket(_) | BackendError::NoSuchKey(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn create_bucket(&self) -> BackendResult<()> {
        let mut call = self.client.create_bucket().bucket(&self.bucket);
        if self.region != DEFAULT_REGION {
            call = call.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        call.send()
            .await
            .map(|_| ())
            .map_err(|err| self.translate(err, ""))
    }
}
