//! Object-storage client: URL construction and signed requests

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, HOST};
use reqwest::Url;
use std::time::Duration;

use crate::config::S3Config;
use crate::error::{AppError, Result};
use crate::storage::encode_key;
use crate::storage::s3::request::{self, Method, Response};
use crate::storage::s3::signer::{amz_date, Credentials, Signer, UNSIGNED_PAYLOAD};

const X_AMZ_DATE: HeaderName = HeaderName::from_static("x-amz-date");
const X_AMZ_CONTENT_SHA256: HeaderName = HeaderName::from_static("x-amz-content-sha256");
const X_AMZ_ACL: HeaderName = HeaderName::from_static("x-amz-acl");

/// Path-style S3-compatible client (`{endpoint}/{bucket}/{key}`), so any
/// provider with a custom endpoint works.
#[derive(Debug, Clone)]
pub struct Client {
    endpoint: Url,
    region: String,
    bucket: String,
    acl: Option<String>,
    credentials: Credentials,
    http: reqwest::Client,
}

impl Client {
    pub fn new(config: &S3Config) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| AppError::Validation(format!("Invalid S3 endpoint {:?}: {}", config.endpoint, e)))?;
        if endpoint.host_str().is_none() {
            return Err(AppError::Validation(format!(
                "S3 endpoint {:?} has no host",
                config.endpoint
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            endpoint,
            region: config.region.clone(),
            bucket: config.bucket.clone(),
            acl: config.acl.clone(),
            credentials: Credentials {
                access_key_id: config.access_key_id.clone(),
                secret_access_key: config.secret_access_key.clone(),
            },
            http,
        })
    }

    /// Host header value, with the port when it is not the scheme default
    pub fn get_host(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Encoded request path for an object key
    pub fn get_path_from_object_key(&self, key: &str) -> String {
        let base = self.endpoint.path().trim_end_matches('/');
        format!("{}/{}/{}", base, encode_key(&self.bucket), encode_key(key))
    }

    pub fn get_full_url_from_path(&self, path: &str) -> String {
        format!("{}://{}{}", self.endpoint.scheme(), self.get_host(), path)
    }

    /// Headers for `method` on `url_path`, signed at `now`
    pub fn get_headers_with_auth(
        &self,
        method: Method,
        url_path: &str,
        mut headers: HeaderMap,
        now: &DateTime<Utc>,
    ) -> Result<HeaderMap> {
        headers.insert(HOST, header_value(&self.get_host())?);
        headers.insert(X_AMZ_DATE, header_value(&amz_date(now))?);
        headers.insert(X_AMZ_CONTENT_SHA256, HeaderValue::from_static(UNSIGNED_PAYLOAD));

        let authorization = Signer::new(method.as_str(), url_path, &headers, UNSIGNED_PAYLOAD)
            .authorization(&self.credentials, now, &self.region);

        headers.insert(AUTHORIZATION, header_value(&authorization)?);
        Ok(headers)
    }

    /// PUT an object
    pub async fn put_object(&self, key: &str, content_type: &str, body: Bytes) -> Result<Response> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, header_value(content_type)?);
        if let Some(acl) = &self.acl {
            headers.insert(X_AMZ_ACL, header_value(acl)?);
        }

        let url_path = self.get_path_from_object_key(key);
        let headers = self.get_headers_with_auth(Method::Put, &url_path, headers, &Utc::now())?;
        request::send(
            &self.http,
            Method::Put,
            &self.get_full_url_from_path(&url_path),
            headers,
            Some(body),
        )
        .await
    }

    /// DELETE an object
    pub async fn delete_object(&self, key: &str) -> Result<Response> {
        let url_path = self.get_path_from_object_key(key);
        let headers = self.get_headers_with_auth(Method::Delete, &url_path, HeaderMap::new(), &Utc::now())?;
        request::send(
            &self.http,
            Method::Delete,
            &self.get_full_url_from_path(&url_path),
            headers,
            None,
        )
        .await
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| AppError::Validation(format!("Invalid header value: {:?}", value)))
}
