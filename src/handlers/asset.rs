use axum::{
    extract::{multipart::Field, Multipart, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use bytes::BytesMut;

use crate::error::{ApiResponse, AppError, Result};
use crate::models::{
    AssetKind, AssetResponse, CurrentUser, DeleteAssetsRequest, PreviewImageRequest, UploadQuery, UploadedAsset,
};
use crate::services::{AssetContext, DeleteReport, UploadPayload};
use crate::AppState;

/// Upper bound on files accepted in one upload request
pub const MAX_FILES_PER_UPLOAD: usize = 20;

fn context(state: &AppState, user: CurrentUser) -> AssetContext {
    AssetContext::new(user, state.authorizer.clone())
}

fn multipart_error(e: axum::extract::multipart::MultipartError, limit: u64) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::UploadTooLarge { limit }
    } else {
        AppError::Validation(format!("Failed to process multipart: {}", e))
    }
}

/// Buffer one file field, failing as soon as it passes `limit`
async fn read_field(field: &mut Field<'_>, limit: u64) -> Result<bytes::Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, limit))? {
        if (buf.len() + chunk.len()) as u64 > limit {
            return Err(AppError::UploadTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

/// List a project's assets
/// GET /api/v1/projects/:project_id/assets
pub async fn list_assets(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(project_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<AssetResponse>>>> {
    let ctx = context(&state, current_user);
    let assets = state.assets.list_assets(&project_id, &ctx).await?;
    Ok(Json(ApiResponse::success(assets)))
}

/// Upload one or more files
/// POST /api/v1/projects/:project_id/assets?kind=image
pub async fn upload_assets(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(project_id): Path<String>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<Vec<UploadedAsset>>>> {
    let kind = match query.kind.as_deref() {
        None => AssetKind::File,
        Some(kind) => kind.parse::<AssetKind>()?,
    };
    let limit = state.config.storage.max_upload_size;

    // Refuse before buffering any file bytes
    let ctx = context(&state, current_user);
    ctx.require_edit(&project_id).await?;

    let mut files = Vec::new();
    while let Some(mut field) = multipart.next_field().await.map_err(|e| multipart_error(e, limit))? {
        if field.name() != Some("file") {
            continue;
        }
        if files.len() == MAX_FILES_PER_UPLOAD {
            return Err(AppError::Validation(format!(
                "At most {} files per upload",
                MAX_FILES_PER_UPLOAD
            )));
        }

        let name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::Validation("No file name provided".to_string()))?;
        let content_type = field.content_type().map(str::to_string);
        let data = read_field(&mut field, limit).await?;
        files.push(UploadPayload::from_bytes(name, content_type.as_deref(), data));
    }

    let uploaded = state.assets.upload_assets(kind, &project_id, files, &ctx).await?;
    Ok(Json(ApiResponse::success(uploaded)))
}

/// Delete assets of a project
/// DELETE /api/v1/projects/:project_id/assets
pub async fn delete_assets(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(project_id): Path<String>,
    Json(mut req): Json<DeleteAssetsRequest>,
) -> Result<Json<ApiResponse<DeleteReport>>> {
    if !req.project_id.is_empty() && req.project_id != project_id {
        return Err(AppError::Validation("Project id does not match the path".to_string()));
    }
    req.project_id = project_id;

    let ctx = context(&state, current_user);
    let report = state.assets.delete_assets(req, &ctx).await?;
    Ok(Json(ApiResponse::success(report)))
}

/// Set or clear the project preview image
/// PUT /api/v1/projects/:project_id/preview-image
pub async fn set_preview_image(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(project_id): Path<String>,
    Json(req): Json<PreviewImageRequest>,
) -> Result<Json<ApiResponse<()>>> {
    let ctx = context(&state, current_user);
    state
        .assets
        .set_preview_image(&project_id, req.asset_id.as_deref(), &ctx)
        .await?;
    Ok(Json(ApiResponse::success(())))
}
