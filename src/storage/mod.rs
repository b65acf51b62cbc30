pub mod keys;
pub mod local;
pub mod provider;
pub mod s3;

pub use keys::*;
pub use local::*;
pub use provider::*;
pub use s3::S3Storage;

use std::sync::Arc;

use crate::config::{BackendConfig, StorageConfig};
use crate::error::Result;

/// Build the asset client selected by configuration
pub fn create_asset_client(config: &StorageConfig) -> Result<Arc<dyn AssetClient>> {
    let client: Arc<dyn AssetClient> = match config.backend() {
        BackendConfig::ObjectStorage(s3) => {
            tracing::info!(
                "Using S3 storage: endpoint={} region={} bucket={}",
                s3.endpoint,
                s3.region,
                s3.bucket
            );
            Arc::new(S3Storage::new(&s3, config.max_upload_size)?)
        }
        BackendConfig::Filesystem { root } => {
            tracing::info!("Using local storage at {}", root);
            Arc::new(LocalStorage::new(root, config.max_upload_size))
        }
    };
    Ok(client)
}
