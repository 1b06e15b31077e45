//! 🪣📡 S3 Store: the cloud-to-ground data paratrooper.
//!
//! INT. AWS CONSOLE. NIGHT. A lone bucket sits in us-east-1, full of CSV exports
//! someone scheduled in 2019 and never looked at again. Tonight, they get indexed.
//!
//! 🧠 Knowledge graph:
//! - Listing: `ListObjectsV2` through the SDK paginator, every page, not just the first 1000
//! - Reading: `GetObject` → `ByteStream::into_async_read()` → boxed `AsyncRead`
//! - Credentials: the usual AWS chain (env vars → ~/.aws/config → IAM role → hope)
//! - `endpoint` lets you point at MinIO/LocalStack; it also flips on path-style addressing

use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::backends::{ObjectReader, ObjectStore, SourceObject, normalize_prefix};
use crate::errors::{PipelineError, PipelineResult};

/// 🔧 Where the CSV objects live.
///
/// `bucket` and `prefix` keep the names the legacy settings file used.
#[derive(Debug, Deserialize, Clone)]
pub struct S3StoreConfig {
    /// 🪣 The bucket name.
    pub bucket: String,
    /// 🗂️ Key prefix. Normalized to end with `/`.
    #[serde(default)]
    pub prefix: String,
    /// 🌎 AWS region. Defaults to us-east-1, the Florida of AWS regions.
    #[serde(default = "default_s3_region")]
    pub region: String,
    /// 🧪 Custom endpoint (MinIO, LocalStack). `None` means real AWS.
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

/// 🪣 An S3 bucket + prefix, ready to be listed and read.
pub(crate) struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

// 🐛 the SDK client's Debug output is a novel; nobody needs it in a log line
impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl S3Store {
    /// 🚀 Build the AWS config from the environment and wrap a client around it.
    ///
    /// No network calls happen here. The first sign of bad credentials is `list()`.
    pub(crate) async fn new(config: S3StoreConfig) -> Self {
        let the_aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut the_s3_config = aws_sdk_s3::config::Builder::from(&the_aws_config);
        if let Some(endpoint) = &config.endpoint {
            debug!("🧪 S3 endpoint override: {}", endpoint);
            the_s3_config = the_s3_config.endpoint_url(endpoint).force_path_style(true);
        }

        Self::with_client(aws_sdk_s3::Client::from_conf(the_s3_config.build()), config)
    }

    fn with_client(client: aws_sdk_s3::Client, config: S3StoreConfig) -> Self {
        Self {
            client,
            prefix: normalize_prefix(&config.prefix),
            bucket: config.bucket,
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list(&self) -> PipelineResult<Vec<SourceObject>> {
        let mut the_objects = Vec::new();
        let mut the_pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&self.prefix)
            .into_paginator()
            .send();

        while let Some(page) = the_pages.next().await {
            let page = page.map_err(|err| PipelineError::StoreAccess {
                location: self.location(),
                source: Box::new(err),
            })?;

            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                // 📁 console "folders" are zero-byte keys ending in `/`. No rows in there.
                if key.ends_with('/') {
                    trace!("📁 skipping directory marker s3://{}/{}", self.bucket, key);
                    continue;
                }
                the_objects.push(SourceObject {
                    key: key.to_string(),
                    size: object.size().and_then(|size| u64::try_from(size).ok()),
                });
            }
        }

        debug!("📋 {} listed {} objects", self.location(), the_objects.len());
        Ok(the_objects)
    }

    async fn open(&self, object: &SourceObject) -> PipelineResult<ObjectReader> {
        let the_response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object.key)
            .send()
            .await
            .map_err(|err| PipelineError::StoreAccess {
                location: format!("s3://{}/{}", self.bucket, object.key),
                source: Box::new(err),
            })?;

        // 🔗 ByteStream → AsyncRead, boxed for type erasure. The vtable hop is nothing
        // next to an S3 round trip.
        Ok(Box::new(the_response.body.into_async_read()))
    }

    fn location(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::config::retry::RetryConfig;
    use aws_sdk_s3::config::{BehaviorVersion, Credentials};
    use tokio::io::AsyncReadExt;
    use wiremock::matchers::{method, path, path_regex, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BUCKET_PATH: &str = r"^/exports-bucket/?$";

    // 🧪 static creds and no retries, pointed at the mock server in path style
    fn store_for(server: &MockServer, prefix: &str) -> S3Store {
        let the_s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("AKIDTEST", "not-a-secret", None, None, "test"))
            .retry_config(RetryConfig::disabled())
            .endpoint_url(server.uri())
            .force_path_style(true)
            .build();

        S3Store::with_client(
            aws_sdk_s3::Client::from_conf(the_s3_config),
            S3StoreConfig {
                bucket: "exports-bucket".to_string(),
                prefix: prefix.to_string(),
                region: "us-east-1".to_string(),
                endpoint: Some(server.uri()),
            },
        )
    }

    fn listing_page(keys: &[(&str, u64)], next_token: Option<&str>) -> String {
        let the_contents: String = keys
            .iter()
            .map(|(key, size)| format!("<Contents><Key>{key}</Key><Size>{size}</Size></Contents>"))
            .collect();
        let the_paging = match next_token {
            Some(token) => format!(
                "<IsTruncated>true</IsTruncated>\
                 <NextContinuationToken>{token}</NextContinuationToken>"
            ),
            None => "<IsTruncated>false</IsTruncated>".to_string(),
        };
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <ListBucketResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
             <Name>exports-bucket</Name><Prefix>exports/</Prefix>\
             <KeyCount>{}</KeyCount><MaxKeys>1000</MaxKeys>{}{}</ListBucketResult>",
            keys.len(),
            the_paging,
            the_contents
        )
    }

    #[test]
    fn the_one_where_the_legacy_settings_shape_deserializes() {
        let the_config: S3StoreConfig =
            serde_json::from_str(r#"{ "bucket": "exports-bucket", "prefix": "daily" }"#)
                .expect("💀 the old shape should still parse");

        assert_eq!(the_config.bucket, "exports-bucket");
        assert_eq!(the_config.prefix, "daily");
        assert_eq!(the_config.region, "us-east-1");
        assert!(the_config.endpoint.is_none());
    }

    #[tokio::test]
    async fn the_one_where_the_prefix_is_normalized_at_construction() {
        let the_store = S3Store::new(S3StoreConfig {
            bucket: "b".to_string(),
            prefix: "exports".to_string(),
            region: "eu-west-1".to_string(),
            endpoint: Some("http://localhost:9000".to_string()),
        })
        .await;

        assert_eq!(the_store.location(), "s3://b/exports/");
    }

    #[tokio::test]
    async fn the_one_where_every_page_is_read_and_the_folder_marker_is_not() -> PipelineResult<()> {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(BUCKET_PATH))
            .and(query_param("list-type", "2"))
            .and(query_param("prefix", "exports/"))
            .and(query_param_is_missing("continuation-token"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                listing_page(&[("exports/", 0), ("exports/a.csv", 12)], Some("page-2")),
                "application/xml",
            ))
            .expect(1)
            .mount(&the_server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(BUCKET_PATH))
            .and(query_param("continuation-token", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                listing_page(&[("exports/b.csv", 34), ("exports/c.csv", 56)], None),
                "application/xml",
            ))
            .expect(1)
            .mount(&the_server)
            .await;

        let the_objects = store_for(&the_server, "exports").list().await?;

        let the_keys: Vec<&str> = the_objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(the_keys, vec!["exports/a.csv", "exports/b.csv", "exports/c.csv"]);
        assert_eq!(the_objects[0].size, Some(12));
        assert_eq!(the_objects[2].size, Some(56));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_bucket_says_403() {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(BUCKET_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_raw(
                "<Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>",
                "application/xml",
            ))
            .mount(&the_server)
            .await;

        let the_result = store_for(&the_server, "exports").list().await;

        match the_result {
            Err(PipelineError::StoreAccess { location, .. }) => {
                assert_eq!(location, "s3://exports-bucket/exports/");
            }
            honestly_who_knows => {
                panic!("💀 expected StoreAccess, got {:?}", honestly_who_knows)
            }
        }
    }

    #[tokio::test]
    async fn the_one_where_open_streams_the_object_body() -> PipelineResult<()> {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/exports-bucket/exports/a.csv"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("id,name\n1,alice\n", "text/csv"),
            )
            .expect(1)
            .mount(&the_server)
            .await;

        let mut the_reader = store_for(&the_server, "exports")
            .open(&SourceObject::new("exports/a.csv"))
            .await?;
        let mut the_contents = String::new();
        the_reader
            .read_to_string(&mut the_contents)
            .await
            .expect("💀 read");

        assert_eq!(the_contents, "id,name\n1,alice\n");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_missing_key_is_a_store_access_error() {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/exports-bucket/exports/gone.csv"))
            .respond_with(ResponseTemplate::new(404).set_body_raw(
                "<Error><Code>NoSuchKey</Code><Message>nope</Message></Error>",
                "application/xml",
            ))
            .mount(&the_server)
            .await;

        let the_result = store_for(&the_server, "exports")
            .open(&SourceObject::new("exports/gone.csv"))
            .await;

        assert!(matches!(the_result, Err(PipelineError::StoreAccess { .. })));
    }
}
