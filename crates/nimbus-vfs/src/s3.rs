use std::io::Write;
use std::path::Path;

use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use crate::error::{Result, VfsError};
use crate::store::{ObjectEntry, ObjectMetadata, ObjectStore};

/// Connection settings for [`S3ObjectStore`]. Anything left unset falls back to the AWS
/// default provider chain (environment, profile files, instance metadata).
#[derive(Clone, Debug, Default)]
pub struct S3Settings {
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores such as MinIO or Ceph.
    pub endpoint: Option<String>,
    pub force_path_style: bool,
}

/// [`ObjectStore`] backed by the AWS SDK.
///
/// The SDK is async; every call blocks on a private current-thread runtime, so this type
/// must not be used from inside another Tokio runtime.
#[derive(Debug)]
pub struct S3ObjectStore {
    runtime: tokio::runtime::Runtime,
    client: Client,
}

impl S3ObjectStore {
    pub fn from_env() -> Result<Self> {
        Self::new(&S3Settings::default())
    }

    pub fn new(settings: &S3Settings) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| VfsError::Backend {
                message: format!("failed to start S3 runtime: {err}"),
            })?;

        let client = runtime.block_on(async {
            let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
            if let Some(region) = &settings.region {
                loader = loader.region(aws_sdk_s3::config::Region::new(region.clone()));
            }
            if let Some(endpoint) = &settings.endpoint {
                loader = loader.endpoint_url(endpoint.clone());
            }
            let sdk_config = loader.load().await;
            let config = aws_sdk_s3::config::Builder::from(&sdk_config)
                .force_path_style(settings.force_path_style)
                .build();
            Client::from_conf(config)
        });

        Ok(Self { runtime, client })
    }
}

fn backend_error<E, R>(op: &str, err: SdkError<E, R>) -> VfsError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    VfsError::Backend {
        message: format!("{op}: {}", aws_sdk_s3::error::DisplayErrorContext(&err)),
    }
}

fn service_code<E, R>(err: &SdkError<E, R>) -> Option<&str>
where
    E: ProvideErrorMetadata,
{
    err.as_service_error().and_then(ProvideErrorMetadata::code)
}

fn millis(time: Option<&aws_sdk_s3::primitives::DateTime>) -> u64 {
    time.and_then(|t| t.to_millis().ok())
        .and_then(|ms| u64::try_from(ms).ok())
        .unwrap_or(0)
}

impl ObjectStore for S3ObjectStore {
    fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>> {
        let result = self
            .runtime
            .block_on(self.client.head_object().bucket(bucket).key(key).send());
        match result {
            Ok(out) => Ok(Some(ObjectMetadata {
                length: out
                    .content_length()
                    .and_then(|len| u64::try_from(len).ok())
                    .unwrap_or(0),
                last_modified_millis: millis(out.last_modified()),
            })),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(None),
            Err(err) => Err(backend_error("head_object", err)),
        }
    }

    fn get_range(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        len: Option<u64>,
        out: &mut dyn Write,
    ) -> Result<u64> {
        let range = match len {
            Some(0) => return Ok(0),
            Some(len) => format!("bytes={offset}-{}", offset + len - 1),
            None => format!("bytes={offset}-"),
        };
        let bytes = self.runtime.block_on(async {
            let object = self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .range(range)
                .send()
                .await
                .map_err(|err| {
                    if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                        VfsError::NotFound {
                            path: format!("{bucket}/{key}"),
                        }
                    } else {
                        backend_error("get_object", err)
                    }
                })?;
            object
                .body
                .collect()
                .await
                .map(|data| data.into_bytes())
                .map_err(|err| VfsError::Backend {
                    message: format!("get_object body: {err}"),
                })
        })?;

        out.write_all(&bytes)
            .map_err(|err| VfsError::from_io(format!("{bucket}/{key}"), err))?;
        Ok(bytes.len() as u64)
    }

    fn put_file(&self, bucket: &str, key: &str, source: &Path) -> Result<()> {
        self.runtime.block_on(async {
            let body = ByteStream::from_path(source)
                .await
                .map_err(|err| VfsError::Backend {
                    message: format!("reading {}: {err}", source.display()),
                })?;
            let result = self
                .client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(body)
                .send()
                .await;
            match result {
                Ok(_) => Ok(()),
                Err(err) => Err(match service_code(&err) {
                    Some("NoSuchBucket") => VfsError::NamespaceNotFound {
                        bucket: bucket.to_owned(),
                    },
                    Some("AccessDenied") => VfsError::PermissionDenied {
                        path: format!("{bucket}/{key}"),
                    },
                    _ => backend_error("put_object", err),
                }),
            }
        })
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let result = self
            .runtime
            .block_on(self.client.delete_object().bucket(bucket).key(key).send());
        match result {
            Ok(_) => Ok(()),
            Err(err) if service_code(&err) == Some("NoSuchKey") => Ok(()),
            Err(err) if service_code(&err) == Some("AccessDenied") => {
                Err(VfsError::PermissionDenied {
                    path: format!("{bucket}/{key}"),
                })
            }
            Err(err) => Err(backend_error("delete_object", err)),
        }
    }

    fn list(&self, bucket: &str, prefix: &str, delimiter: Option<&str>) -> Result<Vec<ObjectEntry>> {
        self.runtime.block_on(async {
            let mut entries = Vec::new();
            let mut continuation: Option<String> = None;
            loop {
                let result = self
                    .client
                    .list_objects_v2()
                    .bucket(bucket)
                    .prefix(prefix)
                    .set_delimiter(delimiter.map(str::to_owned))
                    .set_continuation_token(continuation.take())
                    .send()
                    .await;
                let page = match result {
                    Ok(page) => page,
                    Err(err) if service_code(&err) == Some("NoSuchBucket") => {
                        return Err(VfsError::NamespaceNotFound {
                            bucket: bucket.to_owned(),
                        })
                    }
                    Err(err) => return Err(backend_error("list_objects_v2", err)),
                };

                for prefix in page.common_prefixes() {
                    if let Some(prefix) = prefix.prefix() {
                        entries.push(ObjectEntry::Prefix {
                            prefix: prefix.to_owned(),
                        });
                    }
                }
                for object in page.contents() {
                    let Some(key) = object.key() else { continue };
                    entries.push(ObjectEntry::Object {
                        key: key.to_owned(),
                        metadata: ObjectMetadata {
                            length: object
                                .size()
                                .and_then(|len| u64::try_from(len).ok())
                                .unwrap_or(0),
                            last_modified_millis: millis(object.last_modified()),
                        },
                    });
                }

                match page.next_continuation_token() {
                    Some(token) if page.is_truncated().unwrap_or(false) => {
                        continuation = Some(token.to_owned());
                    }
                    _ => break,
                }
            }
            entries.sort_by(|a, b| a.key().cmp(b.key()));
            Ok(entries)
        })
    }
}
