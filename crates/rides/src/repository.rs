//! Persistence seams used by the ingestion service.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    errors::AppError,
    models::{ActivityListing, ActivityStats, ActivitySummary, ActivityWithRecords, RideType, TelemetryRow},
};

#[async_trait]
pub trait ActivityRepository: Send + Sync {
    /// Insert a new activity row and return its id.
    async fn create(
        &self,
        user_id: Uuid,
        summary: &ActivitySummary,
        name: &str,
        ride_type: RideType,
    ) -> Result<Uuid, AppError>;

    async fn get_with_records(&self, id: Uuid) -> Result<ActivityWithRecords, AppError>;

    /// Apply the supplied fields to an activity owned by `user_id`.
    /// Fails with [`AppError::NotFound`] when the pair does not match a row.
    async fn update(
        &self,
        id: Uuid,
        user_id: Uuid,
        name: Option<&str>,
        ride_type: Option<RideType>,
    ) -> Result<ActivityWithRecords, AppError>;

    async fn get_summary_stats(&self, user_id: Uuid) -> Result<ActivityStats, AppError>;

    /// Newest first.
    async fn list_summaries(&self, user_id: Uuid) -> Result<Vec<ActivityListing>, AppError>;

    /// Remove an activity and any records already written for it.
    async fn delete(&self, id: Uuid) -> Result<(), AppError>;
}

#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Insert all rows in one call. Every row must carry its `activity_id`.
    async fn bulk_insert(&self, rows: &[TelemetryRow]) -> Result<u64, AppError>;
}
