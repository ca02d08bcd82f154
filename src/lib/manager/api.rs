use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::registry::JobRegistry;
use crate::error::{ArrebolError, Result};
use crate::resource::pool::ResourcePool;
use crate::resource::types::ResourceStatus;
use crate::tasks::types::{Job, JobId, JobRequest, TaskId, TaskState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub id: JobId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStateResponse {
    pub id: TaskId,
    pub state: TaskState,
}

/// HTTP front of the job registry.
#[derive(Clone)]
pub struct JobServer {
    registry: Arc<JobRegistry>,
    pool: Arc<dyn ResourcePool>,
}

struct ApiError(ArrebolError);

impl From<ArrebolError> for ApiError {
    fn from(err: ArrebolError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ArrebolError::JobNotFound(_) | ArrebolError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            ArrebolError::InvalidSubmission(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl JobServer {
    pub fn new(registry: Arc<JobRegistry>, pool: Arc<dyn ResourcePool>) -> Self {
        JobServer { registry, pool }
    }

    async fn submit_job(
        State(server): State<JobServer>,
        Json(request): Json<JobRequest>,
    ) -> std::result::Result<(StatusCode, Json<SubmitResponse>), ApiError> {
        let id = server.registry.submit(request).await?;
        Ok((StatusCode::CREATED, Json(SubmitResponse { id })))
    }

    async fn get_job(
        State(server): State<JobServer>,
        Path(id): Path<JobId>,
    ) -> std::result::Result<Json<Job>, ApiError> {
        Ok(Json(server.registry.job(id).await?))
    }

    async fn get_jobs(State(server): State<JobServer>) -> Json<Vec<Job>> {
        Json(server.registry.jobs().await)
    }

    async fn cancel_job(
        State(server): State<JobServer>,
        Path(id): Path<JobId>,
    ) -> std::result::Result<StatusCode, ApiError> {
        server.registry.cancel_job(id).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    async fn get_task_state(
        State(server): State<JobServer>,
        Path(id): Path<TaskId>,
    ) -> std::result::Result<Json<TaskStateResponse>, ApiError> {
        let state = server.registry.query_task_state(id).await?;
        Ok(Json(TaskStateResponse { id, state }))
    }

    async fn get_resources(State(server): State<JobServer>) -> Json<Vec<ResourceStatus>> {
        Json(server.pool.all())
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/jobs", post(JobServer::submit_job).get(JobServer::get_jobs))
            .route(
                "/jobs/{id}",
                get(JobServer::get_job).delete(JobServer::cancel_job),
            )
            .route("/tasks/{id}/state", get(JobServer::get_task_state))
            .route("/resources", get(JobServer::get_resources))
            .with_state(self)
    }

    /// Serves until `shutdown` is cancelled.
    pub async fn start_server(self, address: &str, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(address).await?;
        tracing::info!(address, "Job API listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        tracing::info!("Job API stopped");
        Ok(())
    }
}
