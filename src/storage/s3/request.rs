//! HTTP plumbing for object-storage calls

use bytes::Bytes;
use reqwest::header::HeaderMap;
use std::fmt::Display;

use crate::error::{AppError, Result};

/// Request method
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Method {
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// Raw backend answer, kept whole for diagnostics
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            r#"{{"status": {},"body": "{}"}}"#,
            self.status,
            String::from_utf8_lossy(&self.body)
        )
    }
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// 404 or an S3 `NoSuchKey` error document
    pub fn is_not_found(&self) -> bool {
        self.status == 404 || self.body_text().contains("<Code>NoSuchKey</Code>")
    }

    pub fn into_error(self) -> AppError {
        AppError::Backend {
            status: self.status,
            body: self.body_text(),
        }
    }
}

/// Send one request. Transport failures become `AppError::Request`; any HTTP
/// answer, successful or not, comes back as a `Response`.
pub async fn send(
    http: &reqwest::Client,
    method: Method,
    url: &str,
    headers: HeaderMap,
    body: Option<Bytes>,
) -> Result<Response> {
    let mut req = match method {
        Method::Put => http.put(url),
        Method::Delete => http.delete(url),
    }
    .headers(headers);

    if let Some(body) = body {
        req = req.body(body);
    }

    let resp = req.send().await?;
    let status = resp.status().as_u16();

    Ok(Response {
        status,
        body: resp.bytes().await?.to_vec(),
    })
}
