//! Ingestion coordinator: a batch of uploaded files for one user becomes a
//! batch of persisted activities, or the first error.
//!
//! Each file runs as its own Tokio task. The number of files in flight is
//! bounded by a semaphore; decoding and aggregation run on a rayon pool so the
//! async workers only wait on persistence. Every task is joined before the
//! outcome is decided, and activities already written by sibling files are
//! kept when another file fails. Dropping the returned future drops the
//! [`JoinSet`], which aborts whatever is still running.

use std::{path::Path, sync::Arc};

use tokio::{
    sync::{Semaphore, oneshot},
    task::JoinSet,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    config::Config,
    errors::AppError,
    fit_decoder::{Decoder, FitDecoder, has_fit_signature},
    models::{
        Activity, ActivityListing, ActivityStats, ActivitySummary, RawFilePayload, RideType,
        TelemetryRow, activity_name_for_hour,
    },
    repository::{ActivityRepository, RecordRepository},
    telemetry,
};

#[derive(Clone)]
pub struct ActivityService {
    activities: Arc<dyn ActivityRepository>,
    records: Arc<dyn RecordRepository>,
    decoder: Arc<dyn Decoder>,
    pool: Arc<rayon::ThreadPool>,
    uploads: Arc<Semaphore>,
}

impl ActivityService {
    pub fn new(
        activities: Arc<dyn ActivityRepository>,
        records: Arc<dyn RecordRepository>,
        decoder: Arc<dyn Decoder>,
        max_concurrent_uploads: usize,
    ) -> Result<Self, AppError> {
        let workers = max_concurrent_uploads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("rides-decode-{i}"))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to start decode pool: {e}")))?;

        Ok(Self {
            activities,
            records,
            decoder,
            pool: Arc::new(pool),
            uploads: Arc::new(Semaphore::new(workers)),
        })
    }

    /// Service over a single store that implements both repositories, using
    /// the FIT decoder.
    pub fn with_store<S>(store: S, config: &Config) -> Result<Self, AppError>
    where
        S: ActivityRepository + RecordRepository + Clone + 'static,
    {
        Self::new(
            Arc::new(store.clone()),
            Arc::new(store),
            Arc::new(FitDecoder),
            config.max_concurrent_uploads,
        )
    }

    pub async fn create_activities(
        &self,
        user_id: Uuid,
        payloads: Vec<RawFilePayload>,
    ) -> Result<Vec<Activity>, AppError> {
        if payloads.is_empty() {
            return Err(AppError::Validation("no files uploaded".to_string()));
        }

        let file_count = payloads.len();
        info!(%user_id, files = file_count, "ingesting activity batch");

        let mut tasks = JoinSet::new();
        for (index, payload) in payloads.into_iter().enumerate() {
            let service = self.clone();
            tasks.spawn(async move {
                let _permit = service
                    .uploads
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| AppError::Internal("upload limiter closed".to_string()))?;
                let activity = service.ingest_file(user_id, payload).await?;
                Ok::<_, AppError>((index, activity))
            });
        }

        let mut created = Vec::with_capacity(file_count);
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined.map_err(AppError::from).and_then(|outcome| outcome) {
                Ok(entry) => created.push(entry),
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(e) => debug!(error = %e, "additional failure in batch"),
            }
        }

        if let Some(e) = first_error {
            warn!(
                %user_id,
                persisted = created.len(),
                files = file_count,
                error = %e,
                "activity batch failed"
            );
            return Err(e);
        }

        created.sort_by_key(|(index, _)| *index);
        info!(%user_id, activities = created.len(), "activity batch ingested");
        Ok(created.into_iter().map(|(_, activity)| activity).collect())
    }

    async fn ingest_file(&self, user_id: Uuid, payload: RawFilePayload) -> Result<Activity, AppError> {
        validate_payload(&payload)?;

        let filename = payload.filename.clone();
        debug!(
            %filename,
            bytes = payload.data.len(),
            content_type = ?payload.content_type,
            last_modified = ?payload.last_modified,
            "decoding activity file"
        );
        let (mut rows, summary) = self.decode_and_aggregate(payload).await?;

        let name = activity_name_for_hour(summary.local_started_at.hour());
        let id = self
            .activities
            .create(user_id, &summary, name, RideType::default())
            .await?;

        for row in &mut rows {
            row.activity_id = Some(id);
        }

        if let Err(e) = self.records.bulk_insert(&rows).await {
            warn!(%id, %filename, error = %e, "record insert failed, removing activity");
            if let Err(cleanup) = self.activities.delete(id).await {
                error!(%id, error = %cleanup, "failed to remove activity after record insert failure");
            }
            return Err(e);
        }

        debug!(%id, %filename, records = rows.len(), "activity persisted");
        let view = self.activities.get_with_records(id).await?;
        Ok(view.into())
    }

    async fn decode_and_aggregate(
        &self,
        payload: RawFilePayload,
    ) -> Result<(Vec<TelemetryRow>, ActivitySummary), AppError> {
        let (tx, rx) = oneshot::channel();
        let decoder = self.decoder.clone();

        self.pool.spawn(move || {
            let outcome = decoder.decode(&payload.data).map(|decoded| {
                let (rows, totals) = telemetry::aggregate(&decoded.samples);
                (rows, totals.into_summary(&decoded.session))
            });
            // receiver is gone when the batch was cancelled
            let _ = tx.send(outcome);
        });

        let outcome = rx
            .await
            .map_err(|_| AppError::Internal("decode worker exited without a result".to_string()))?;
        Ok(outcome?)
    }

    pub async fn update_activity(
        &self,
        id: Uuid,
        user_id: Uuid,
        name: Option<String>,
        ride_type: Option<String>,
    ) -> Result<Activity, AppError> {
        if name.is_none() && ride_type.is_none() {
            return Err(AppError::Validation(
                "either name or ride_type must be provided".to_string(),
            ));
        }

        let name = name.map(|n| n.trim().to_string());
        if name.as_deref().is_some_and(str::is_empty) {
            return Err(AppError::Validation("name must not be blank".to_string()));
        }
        let ride_type = ride_type
            .as_deref()
            .map(str::parse::<RideType>)
            .transpose()?;

        let view = self
            .activities
            .update(id, user_id, name.as_deref(), ride_type)
            .await?;
        info!(%id, %user_id, "activity updated");
        Ok(view.into())
    }

    pub async fn get_activity(&self, id: Uuid, user_id: Uuid) -> Result<Activity, AppError> {
        let view = self.activities.get_with_records(id).await?;
        if view.user_id != user_id {
            return Err(AppError::NotFound);
        }
        Ok(view.into())
    }

    pub async fn list_activities(&self, user_id: Uuid) -> Result<Vec<ActivityListing>, AppError> {
        self.activities.list_summaries(user_id).await
    }

    pub async fn activity_stats(&self, user_id: Uuid) -> Result<ActivityStats, AppError> {
        self.activities.get_summary_stats(user_id).await
    }
}

fn validate_payload(payload: &RawFilePayload) -> Result<(), AppError> {
    let is_fit = Path::new(&payload.filename)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("fit"));
    if !is_fit {
        return Err(AppError::Validation(format!(
            "{}: only .fit files are supported",
            payload.filename
        )));
    }
    if payload.data.is_empty() {
        return Err(AppError::Validation(format!("{}: file is empty", payload.filename)));
    }
    if !has_fit_signature(&payload.data) {
        return Err(AppError::Validation(format!(
            "{}: not a FIT file",
            payload.filename
        )));
    }
    Ok(())
}
