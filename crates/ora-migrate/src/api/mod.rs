//! HTTP control surface.
//!
//! | method | path                              | action                       |
//! |--------|-----------------------------------|------------------------------|
//! | GET    | `/api/database/test-connections`  | probe both databases         |
//! | GET    | `/api/database/test-source`       | probe the source             |
//! | GET    | `/api/database/test-target`       | probe the target             |
//! | POST   | `/api/migration/config`           | replace the mapping set      |
//! | POST   | `/api/migration/tables`           | run every table mapping      |
//! | POST   | `/api/migration/partitions`       | run every partition mapping  |
//! | POST   | `/api/migration/all`              | run tables, then partitions  |
//!
//! Migration runs are synchronous: the response is sent when the run ends.
//! Each run executes on its own task, so a client that disconnects or times
//! out does not abandon the mappings still to be copied.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::health::{ConnectionReport, ConnectionTester};
use crate::mapping::{MappingRequest, MappingStore};
use crate::orchestrator::{Coordinator, MappingOutcome, RunReport};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub tester: ConnectionTester,
}

impl AppState {
    pub fn new(coordinator: Coordinator, tester: ConnectionTester) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            tester,
        }
    }

    fn store(&self) -> &MappingStore {
        self.coordinator.store()
    }
}

/// Response envelope for configuration and migration calls.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<MappingOutcome>>,
}

impl ApiResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: message.into(),
            results: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
            results: None,
        }
    }
}

type Reply = (StatusCode, Json<ApiResponse>);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/database/test-connections", get(test_connections))
        .route("/api/database/test-source", get(test_source))
        .route("/api/database/test-target", get(test_target))
        .route("/api/migration/config", post(update_config))
        .route("/api/migration/tables", post(migrate_tables))
        .route("/api/migration/partitions", post(migrate_partitions))
        .route("/api/migration/all", post(migrate_all))
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(addr: SocketAddr, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Control surface listening on {}", addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("Control surface stopped");
    Ok(())
}

pub async fn test_connections(State(state): State<AppState>) -> Json<ConnectionReport> {
    Json(state.tester.test_all().await)
}

pub async fn test_source(State(state): State<AppState>) -> Json<bool> {
    Json(state.tester.test_source().await)
}

pub async fn test_target(State(state): State<AppState>) -> Json<bool> {
    Json(state.tester.test_target().await)
}

pub async fn update_config(
    State(state): State<AppState>,
    payload: std::result::Result<Json<MappingRequest>, JsonRejection>,
) -> Reply {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Rejected mapping update: {}", rejection.body_text());
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error(rejection.body_text())),
            );
        }
    };

    match request.into_config() {
        Ok(config) => {
            state.store().replace(config).await;
            (
                StatusCode::OK,
                Json(ApiResponse::success("Migration configuration updated")),
            )
        }
        Err(e) => {
            warn!("Rejected mapping update: {}", e);
            (StatusCode::BAD_REQUEST, Json(ApiResponse::error(e.to_string())))
        }
    }
}

pub async fn migrate_tables(State(state): State<AppState>) -> Reply {
    let coordinator = state.coordinator.clone();
    run_detached(
        async move { coordinator.migrate_all_tables().await },
        "Tables migration completed",
    )
    .await
}

pub async fn migrate_partitions(State(state): State<AppState>) -> Reply {
    let coordinator = state.coordinator.clone();
    run_detached(
        async move { coordinator.migrate_all_partitions().await },
        "Partitions migration completed",
    )
    .await
}

pub async fn migrate_all(State(state): State<AppState>) -> Reply {
    let coordinator = state.coordinator.clone();
    run_detached(
        async move { coordinator.migrate_all().await },
        "All migrations completed",
    )
    .await
}

/// Spawn the run and wait for it. Dropping the waiting future leaves the
/// run going.
async fn run_detached<F>(run: F, done: &str) -> Reply
where
    F: Future<Output = RunReport> + Send + 'static,
{
    match tokio::spawn(run).await {
        Ok(report) => run_reply(report, done),
        Err(e) => {
            error!("Migration run aborted: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(format!("Migration run aborted: {}", e))),
            )
        }
    }
}

/// 200 when every mapping succeeded, 207 otherwise.
fn run_reply(report: RunReport, done: &str) -> Reply {
    let (code, status, message) = if report.all_succeeded() {
        (StatusCode::OK, "success", done.to_string())
    } else {
        (
            StatusCode::MULTI_STATUS,
            "partial",
            format!(
                "{} with {} of {} mappings failed",
                done,
                report.failed(),
                report.outcomes.len()
            ),
        )
    };
    (
        code,
        Json(ApiResponse {
            status,
            message,
            results: Some(report.outcomes),
        }),
    )
}
