use axum::{
    Extension,
    extract::{Multipart, Path},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::CallerId,
    errors::AppError,
    ingest::ActivityService,
    models::{Activity, ActivityListing, ActivityStats, RawFilePayload},
};

pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Every `file` or `files` part of the form is one activity file.
pub async fn create_activities(
    Extension(service): Extension<ActivityService>,
    CallerId(user_id): CallerId,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Vec<Activity>>), AppError> {
    let mut payloads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to process multipart data: {e}")))?
    {
        if !matches!(field.name(), Some("file" | "files")) {
            tracing::warn!("Unexpected field: {:?}", field.name());
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::Validation("File part without a filename".to_string()))?;
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read {filename}: {e}")))?;

        payloads.push(RawFilePayload {
            filename,
            content_type,
            data,
            last_modified: None,
        });
    }

    let activities = service.create_activities(user_id, payloads).await?;
    Ok((StatusCode::CREATED, Json(activities)))
}

pub async fn list_activities(
    Extension(service): Extension<ActivityService>,
    CallerId(user_id): CallerId,
) -> Result<Json<Vec<ActivityListing>>, AppError> {
    Ok(Json(service.list_activities(user_id).await?))
}

pub async fn get_stats(
    Extension(service): Extension<ActivityService>,
    CallerId(user_id): CallerId,
) -> Result<Json<ActivityStats>, AppError> {
    Ok(Json(service.activity_stats(user_id).await?))
}

pub async fn get_activity(
    Extension(service): Extension<ActivityService>,
    CallerId(user_id): CallerId,
    Path(id): Path<Uuid>,
) -> Result<Json<Activity>, AppError> {
    Ok(Json(service.get_activity(id, user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateActivityRequest {
    pub name: Option<String>,
    pub ride_type: Option<String>,
}

pub async fn update_activity(
    Extension(service): Extension<ActivityService>,
    CallerId(user_id): CallerId,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateActivityRequest>,
) -> Result<Json<Activity>, AppError> {
    let activity = service
        .update_activity(id, user_id, req.name, req.ride_type)
        .await?;
    Ok(Json(activity))
}
