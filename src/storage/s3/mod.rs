//! S3-compatible object storage
//!
//! Requests are signed with AWS Signature Version 4, implemented in
//! `signer`, against a configurable endpoint, region and bucket.

pub mod client;
pub mod provider;
pub mod request;
pub mod signer;

pub use client::Client;
pub use provider::S3Storage;
pub use request::Response;
pub use signer::{Credentials, Signer};
