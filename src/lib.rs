pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod storage;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::Database;
use crate::handlers::asset::MAX_FILES_PER_UPLOAD;
use crate::services::{AssetService, OwnerAuthorizer, ProjectAuthorizer};
use crate::storage::AssetClient;

/// Multipart framing allowance on top of the file bytes
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub client: Arc<dyn AssetClient>,
    pub assets: Arc<AssetService>,
    pub authorizer: Arc<dyn ProjectAuthorizer>,
}

impl AppState {
    /// Wire services over `db` and `client`, with project owners as editors
    pub fn new(db: Database, config: Arc<Config>, client: Arc<dyn AssetClient>) -> Self {
        let assets = Arc::new(AssetService::new(db.clone(), client.clone(), &config.storage));
        let authorizer: Arc<dyn ProjectAuthorizer> = Arc::new(OwnerAuthorizer::new(db.clone()));
        Self {
            db,
            config,
            client,
            assets,
            authorizer,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state
        .config
        .storage
        .max_upload_size
        .saturating_mul(MAX_FILES_PER_UPLOAD as u64)
        .saturating_add(MULTIPART_OVERHEAD);

    let public_routes = Router::new().route("/health", get(handlers::health::health));

    let protected_routes = Router::new()
        .route(
            "/projects/:project_id/assets",
            get(handlers::asset::list_assets)
                .post(handlers::asset::upload_assets)
                .delete(handlers::asset::delete_assets),
        )
        .route(
            "/projects/:project_id/preview-image",
            put(handlers::asset::set_preview_image),
        )
        .layer(DefaultBodyLimit::max(usize::try_from(body_limit).unwrap_or(usize::MAX)))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        .nest("/api/v1", public_routes.merge(protected_routes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
