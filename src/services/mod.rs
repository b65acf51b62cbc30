pub mod asset;
pub mod auth;
pub mod content_store;
pub mod gc;
pub mod registry;
#[cfg(test)]
pub mod testing;

pub use asset::{AssetContext, AssetService};
pub use auth::{AuthService, OwnerAuthorizer, ProjectAuthorizer};
pub use content_store::{content_key, validate_payload, ContentStore, UploadConfig, UploadPayload};
pub use gc::{DeleteReport, GarbageCollector, KeyReclaim, ReclaimOutcome};
pub use registry::AssetRegistry;
