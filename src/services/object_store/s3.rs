//! S3-compatible backend.
//!
//! Works against AWS S3 and any compatible server (MinIO, R2, B2). A custom
//! endpoint switches the client to path-style addressing.

use super::{CannedAcl, ObjectHead, ObjectStore, ObjectStream, PutObject, StoreError, StoreResult};
use crate::config::StoreConfig;
use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::{
    Client,
    config::{Credentials, SharedCredentialsProvider, http::HttpResponse, retry::RetryConfig},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    operation::create_bucket::CreateBucketError,
    presigning::PresigningConfig,
    primitives::ByteStream,
    types::{BucketLocationConstraint, CreateBucketConfiguration, ObjectCannedAcl},
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::info;

/// Region that must not be sent as a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Object store backed by an `aws-sdk-s3` client bound to one bucket.
///
/// The client is cheap to clone and holds no per-request state.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    region: String,
}

impl S3ObjectStore {
    pub fn new(config: &StoreConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "file-gateway",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .region(Region::new(config.region.clone()))
            .credentials_provider(SharedCredentialsProvider::new(credentials))
            .retry_config(RetryConfig::standard().with_max_attempts(config.max_attempts));

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let client = Client::from_conf(builder.build());

        info!(
            bucket = %config.bucket,
            endpoint = ?config.endpoint,
            region = %config.region,
            "S3 client initialized"
        );

        Self {
            client,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
        }
    }
}

/// Map an SDK failure onto the not-found / backend split.
fn classify<E>(err: SdkError<E, HttpResponse>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let status = err.raw_response().map(|resp| resp.status().as_u16());
    let code = err.code().map(str::to_owned);
    let message = err.message().unwrap_or_default().to_owned();
    StoreError::classify(
        code.as_deref(),
        status,
        &message,
        DisplayErrorContext(&err).to_string(),
    )
}

/// A missing bucket is an answer to "does it exist", not a failure.
fn missing_bucket(err: StoreError) -> StoreResult<bool> {
    match err {
        StoreError::NotFound => Ok(false),
        other => Err(other),
    }
}

fn bucket_already_present(err: &CreateBucketError) -> bool {
    err.is_bucket_already_owned_by_you() || err.is_bucket_already_exists()
}

fn to_chrono(value: &aws_smithy_types::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(value.secs(), value.subsec_nanos())
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn bucket_exists(&self) -> StoreResult<bool> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => missing_bucket(classify(err)),
        }
    }

    async fn create_bucket(&self) -> StoreResult<()> {
        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if !self.region.eq_ignore_ascii_case(DEFAULT_REGION) {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(err) if err.as_service_error().is_some_and(bucket_already_present) => Ok(()),
            Err(err) => Err(StoreError::Backend(DisplayErrorContext(&err).to_string())),
        }
    }

    async fn put_object(&self, object: PutObject) -> StoreResult<()> {
        let acl = match object.acl {
            CannedAcl::Private => ObjectCannedAcl::Private,
        };
        let length = object.body.len() as i64;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object.key)
            .body(ByteStream::from(object.body))
            .content_length(length)
            .content_type(object.content_type)
            .content_md5(object.content_md5)
            .set_metadata(Some(object.metadata))
            .acl(acl)
            .send()
            .await
            .map_err(classify)?;

        Ok(())
    }

    async fn head_object(&self, key: &str) -> StoreResult<ObjectHead> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(classify)?;

        Ok(ObjectHead {
            content_type: output.content_type().map(str::to_owned),
            content_length: output.content_length().unwrap_or(0).max(0) as u64,
            etag: output.e_tag().map(|tag| tag.trim_matches('"').to_owned()),
            last_modified: output.last_modified().and_then(to_chrono),
            metadata: output.metadata().cloned().unwrap_or_default(),
        })
    }

    async fn get_object(&self, key: &str) -> StoreResult<ObjectStream> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(classify)?;

        Ok(ReaderStream::new(output.body.into_async_read()).boxed())
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> StoreResult<String> {
        let presign_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(classify)?;

        Ok(presigned.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::{
        error::ErrorMetadata,
        operation::{get_object::GetObjectError, head_bucket::HeadBucketError},
        types::error::{BucketAlreadyExists, BucketAlreadyOwnedByYou, NotFound},
    };
    use aws_smithy_types::body::SdkBody;
    use axum::{
        Router,
        extract::Path,
        http::{HeaderMap, StatusCode, header},
        response::{IntoResponse, Response},
        routing::{get, head},
    };
    use base64::{Engine as _, engine::general_purpose};
    use bytes::Bytes;
    use futures::TryStreamExt;
    use tokio::net::TcpListener;

    fn raw(status: u16) -> HttpResponse {
        HttpResponse::new(status.try_into().unwrap(), SdkBody::empty())
    }

    fn s3_error(status: StatusCode, code: &str) -> Response {
        let body = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Error><Code>{code}</Code><Message>{code}</Message><RequestId>req-1</RequestId></Error>"
        );
        (status, [(header::CONTENT_TYPE, "application/xml")], body).into_response()
    }

    async fn head_bucket_route(Path(bucket): Path<String>) -> StatusCode {
        if bucket == "present" {
            StatusCode::OK
        } else {
            StatusCode::NOT_FOUND
        }
    }

    async fn create_bucket_route(Path(bucket): Path<String>) -> Response {
        match bucket.as_str() {
            "owned" => s3_error(StatusCode::CONFLICT, "BucketAlreadyOwnedByYou"),
            "taken" => s3_error(StatusCode::CONFLICT, "BucketAlreadyExists"),
            "denied" => s3_error(StatusCode::FORBIDDEN, "AccessDenied"),
            _ => StatusCode::OK.into_response(),
        }
    }

    async fn put_object_route(headers: HeaderMap) -> Response {
        let required = ["content-md5", "x-amz-meta-original-name", "x-amz-acl"];
        if required.iter().all(|name| headers.contains_key(*name))
            && headers["x-amz-acl"] == "private"
        {
            (StatusCode::OK, [(header::ETAG, "\"abc\"")]).into_response()
        } else {
            s3_error(StatusCode::BAD_REQUEST, "InvalidRequest")
        }
    }

    async fn head_object_route(Path((_, key)): Path<(String, String)>) -> Response {
        if key != "k.png" {
            return StatusCode::NOT_FOUND.into_response();
        }
        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "image/png"),
                (header::ETAG, "\"abc\""),
                (header::LAST_MODIFIED, "Tue, 14 Nov 2023 22:13:20 GMT"),
            ],
            [("x-amz-meta-original-name", "caf%C3%A9.png")],
        )
            .into_response()
    }

    async fn get_object_route(Path((_, key)): Path<(String, String)>) -> Response {
        if key != "k.png" {
            return s3_error(StatusCode::NOT_FOUND, "NoSuchKey");
        }
        (StatusCode::OK, [(header::CONTENT_TYPE, "image/png")], "hello gateway").into_response()
    }

    /// Minimal path-style S3 endpoint on a random local port.
    async fn fake_s3() -> String {
        let app = Router::new()
            .route("/{bucket}", head(head_bucket_route).put(create_bucket_route))
            .route("/{bucket}/", head(head_bucket_route).put(create_bucket_route))
            .route(
                "/{bucket}/{key}",
                get(get_object_route)
                    .head(head_object_route)
                    .put(put_object_route),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn store(endpoint: &str, bucket: &str) -> S3ObjectStore {
        S3ObjectStore::new(&StoreConfig {
            bucket: bucket.into(),
            endpoint: Some(endpoint.into()),
            region: "us-east-1".into(),
            access_key: "test-access".into(),
            secret_key: "test-secret".into(),
            max_attempts: 1,
        })
    }

    #[test]
    fn converts_smithy_timestamps() {
        let ts = aws_smithy_types::DateTime::from_secs_and_nanos(1_700_000_000, 250_000_000);
        let converted = to_chrono(&ts).unwrap();
        assert_eq!(converted.timestamp(), 1_700_000_000);
        assert_eq!(converted.timestamp_subsec_nanos(), 250_000_000);
    }

    #[test]
    fn classifies_sdk_errors() {
        let not_found = SdkError::service_error(
            HeadBucketError::NotFound(NotFound::builder().build()),
            raw(404),
        );
        assert!(matches!(classify(not_found), StoreError::NotFound));

        let no_such_key = SdkError::service_error(
            GetObjectError::generic(ErrorMetadata::builder().code("NoSuchKey").build()),
            raw(500),
        );
        assert!(matches!(classify(no_such_key), StoreError::NotFound));

        let denied = SdkError::service_error(
            GetObjectError::generic(
                ErrorMetadata::builder()
                    .code("AccessDenied")
                    .message("Access Denied")
                    .build(),
            ),
            raw(403),
        );
        assert!(matches!(classify(denied), StoreError::Backend(_)));
    }

    #[test]
    fn existing_bucket_errors_count_as_success() {
        assert!(bucket_already_present(&CreateBucketError::BucketAlreadyOwnedByYou(
            BucketAlreadyOwnedByYou::builder().build()
        )));
        assert!(bucket_already_present(&CreateBucketError::BucketAlreadyExists(
            BucketAlreadyExists::builder().build()
        )));
        assert!(!bucket_already_present(&CreateBucketError::generic(
            ErrorMetadata::builder().code("AccessDenied").build()
        )));
    }

    #[test]
    fn missing_bucket_is_not_an_error() {
        assert!(matches!(missing_bucket(StoreError::NotFound), Ok(false)));
        assert!(missing_bucket(StoreError::Backend("timeout".into())).is_err());
    }

    #[tokio::test]
    async fn head_bucket_reports_presence() {
        let endpoint = fake_s3().await;
        assert!(store(&endpoint, "present").bucket_exists().await.unwrap());
        assert!(!store(&endpoint, "absent").bucket_exists().await.unwrap());
    }

    #[tokio::test]
    async fn create_bucket_tolerates_existing_bucket() {
        let endpoint = fake_s3().await;
        store(&endpoint, "fresh").create_bucket().await.unwrap();
        store(&endpoint, "owned").create_bucket().await.unwrap();
        store(&endpoint, "taken").create_bucket().await.unwrap();

        let err = store(&endpoint, "denied").create_bucket().await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[tokio::test]
    async fn put_sends_digest_metadata_and_acl() {
        let endpoint = fake_s3().await;
        let body = Bytes::from_static(b"png");
        let object = PutObject {
            key: "k.png".into(),
            content_md5: general_purpose::STANDARD.encode(md5::compute(&body).0),
            body,
            content_type: "image/png".into(),
            metadata: [("original-name".to_string(), "k.png".to_string())].into(),
            acl: CannedAcl::Private,
        };
        store(&endpoint, "present").put_object(object).await.unwrap();
    }

    #[tokio::test]
    async fn head_object_maps_headers() {
        let endpoint = fake_s3().await;
        let store = store(&endpoint, "present");

        let head = store.head_object("k.png").await.unwrap();
        assert_eq!(head.content_type.as_deref(), Some("image/png"));
        assert_eq!(head.etag.as_deref(), Some("abc"));
        assert_eq!(head.last_modified.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(head.metadata["original-name"], "caf%C3%A9.png");

        assert!(matches!(
            store.head_object("missing.png").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn get_object_streams_body() {
        let endpoint = fake_s3().await;
        let store = store(&endpoint, "present");

        let chunks: Vec<Bytes> = store.get_object("k.png").await.unwrap().try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"hello gateway");

        assert!(matches!(
            store.get_object("missing.png").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn presigned_urls_are_path_style_and_expire() {
        let store = store("http://127.0.0.1:9", "present");
        let url = store
            .presign_get("k.png", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(url.starts_with("http://127.0.0.1:9/present/k.png?"));
        assert!(url.contains("X-Amz-Expires=60"));
        assert!(url.contains("X-Amz-Signature="));
    }
}
