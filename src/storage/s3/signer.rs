//! AWS Signature Version 4 request signing.
//! Reference: https://docs.aws.amazon.com/IAM/latest/UserGuide/reference_sigv-create-signed-request.html

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::HeaderMap;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const SERVICE: &str = "s3";
/// Payload hash placeholder for bodies that are not hashed up front.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// `x-amz-date` format
pub fn amz_date(now: &DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}

fn short_date(now: &DateTime<Utc>) -> String {
    now.format("%Y%m%d").to_string()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac(key: &[u8], data: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Access key pair
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// SigV4 signer for a single request
pub struct Signer<'a> {
    method: &'a str,
    canonical_uri: &'a str,
    headers: &'a HeaderMap,
    payload_hash: &'a str,
}

impl<'a> Signer<'a> {
    /// `canonical_uri` must already be percent-encoded; it is used verbatim.
    pub fn new(
        method: &'a str,
        canonical_uri: &'a str,
        headers: &'a HeaderMap,
        payload_hash: &'a str,
    ) -> Self {
        Self {
            method,
            canonical_uri,
            headers,
            payload_hash,
        }
    }

    /// Lowercased, sorted header names with trimmed, space-collapsed values.
    fn header_entries(&self) -> BTreeMap<String, String> {
        let mut entries: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in self.headers.iter() {
            let value = String::from_utf8_lossy(value.as_bytes());
            let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
            entries
                .entry(name.as_str().to_lowercase())
                .and_modify(|existing| {
                    existing.push(',');
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        entries
    }

    pub fn signed_headers(&self) -> String {
        self.header_entries()
            .into_keys()
            .collect::<Vec<_>>()
            .join(";")
    }

    fn canonical_headers(&self) -> String {
        self.header_entries()
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect()
    }

    pub fn canonical_request(&self) -> String {
        [
            self.method.to_uppercase(),
            self.canonical_uri.to_string(),
            // Object PUT and DELETE carry no query string
            String::new(),
            self.canonical_headers(),
            self.signed_headers(),
            self.payload_hash.to_string(),
        ]
        .join("\n")
    }

    fn credential_scope(now: &DateTime<Utc>, region: &str) -> String {
        format!("{}/{}/{}/aws4_request", short_date(now), region, SERVICE)
    }

    pub fn string_to_sign(&self, now: &DateTime<Utc>, region: &str) -> String {
        [
            ALGORITHM.to_string(),
            amz_date(now),
            Self::credential_scope(now, region),
            sha256_hex(self.canonical_request().as_bytes()),
        ]
        .join("\n")
    }

    fn signing_key(secret_access_key: &str, now: &DateTime<Utc>, region: &str) -> Vec<u8> {
        let k_date = hmac(format!("AWS4{}", secret_access_key).as_bytes(), &short_date(now));
        let k_region = hmac(&k_date, region);
        let k_service = hmac(&k_region, SERVICE);
        hmac(&k_service, "aws4_request")
    }

    pub fn signature(&self, credentials: &Credentials, now: &DateTime<Utc>, region: &str) -> String {
        let key = Self::signing_key(&credentials.secret_access_key, now, region);
        hex::encode(hmac(&key, &self.string_to_sign(now, region)))
    }

    /// Value for the `Authorization` header
    pub fn authorization(&self, credentials: &Credentials, now: &DateTime<Utc>, region: &str) -> String {
        format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM,
            credentials.access_key_id,
            Self::credential_scope(now, region),
            self.signed_headers(),
            self.signature(credentials, now, region)
        )
    }
}
