// Rust guideline compliant 2026-10-13

//! HTTP API of the transactions service (axum).
//!
//! | Route | Handler |
//! |---|---|
//! | `GET /health` | connection state of the broker |
//! | `POST /transactions` | create, then publish for analysis |
//! | `GET /transactions/pending` | PENDING transactions older than N seconds |
//! | `GET /transactions/:id` | fetch one transaction |
//! | `PATCH /transactions/:id/status` | status callback target |
//! | `POST /transactions/:id/republish` | re-emit the analysis event |
//!
//! Errors are returned as `{"detail": "..."}`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use domain::{
    ConnectionState, Connector, NewTransaction, StoreError, Transaction, TransactionId,
    TransactionRepository, TransactionStatus,
};
use producer::{Producer, ProducerError};
use serde::{Deserialize, Serialize};
use store::TransactionService;
use tracing::Instrument as _;

/// Default age for `GET /transactions/pending`.
const DEFAULT_PENDING_AGE_SECS: u64 = 60;

// ----- State -----

/// Shared handler state.
#[derive(Debug)]
pub struct AppState<R, C: Connector> {
    service: Arc<TransactionService<R>>,
    producer: Producer<C>,
}

impl<R, C: Connector> Clone for AppState<R, C> {
    fn clone(&self) -> Self {
        Self { service: Arc::clone(&self.service), producer: self.producer.clone() }
    }
}

impl<R, C: Connector> AppState<R, C> {
    /// Bundle the service and the producer.
    #[must_use]
    pub fn new(service: Arc<TransactionService<R>>, producer: Producer<C>) -> Self {
        Self { service, producer }
    }
}

/// Build the router over `state`.
pub fn router<R, C>(state: AppState<R, C>) -> Router
where
    R: TransactionRepository + 'static,
    C: Connector + 'static,
{
    Router::new()
        .route("/health", get(health::<R, C>))
        .route("/transactions", post(create::<R, C>))
        .route("/transactions/pending", get(pending::<R, C>))
        .route("/transactions/:id", get(find::<R, C>))
        .route("/transactions/:id/status", patch(update_status::<R, C>))
        .route("/transactions/:id/republish", post(republish::<R, C>))
        .with_state(state)
        .layer(middleware::from_fn(trace_request))
}

/// Runs each request inside an `http` span and logs its outcome.
async fn trace_request(request: Request, next: Next) -> Response {
    let span = tracing::info_span!(
        "http",
        method = %request.method(),
        path = %request.uri().path(),
    );
    let started = Instant::now();
    async move {
        let response = next.run(request).await;
        tracing::info!(
            status = response.status().as_u16(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "http.request.completed"
        );
        response
    }
    .instrument(span)
    .await
}

// ----- Errors -----

/// Handler error mapped to a status code and a `detail` body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Publish failure.
    #[error(transparent)]
    Producer(#[from] ProducerError),
    /// Unreadable request body.
    #[error("{0}")]
    Body(#[from] JsonRejection),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::InvalidTransition { .. })
            | Self::Producer(ProducerError::NotPending { .. }) => StatusCode::CONFLICT,
            Self::Store(StoreError::Invalid { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Store(StoreError::Backend { .. })
            | Self::Producer(ProducerError::Serialization(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Producer(ProducerError::Broker { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Body(rejection) => rejection.status(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "http.request.failed");
        }
        (status, Json(ErrorBody { detail: self.to_string() })).into_response()
    }
}

// ----- Handlers -----

#[derive(Serialize)]
struct Health {
    status: &'static str,
    broker: ConnectionState,
}

async fn health<R, C>(State(state): State<AppState<R, C>>) -> Json<Health>
where
    R: TransactionRepository,
    C: Connector,
{
    Json(Health { status: "ok", broker: state.producer.broker().state() })
}

async fn create<R, C>(
    State(state): State<AppState<R, C>>,
    body: Result<Json<NewTransaction>, JsonRejection>,
) -> Result<(StatusCode, Json<Transaction>), ApiError>
where
    R: TransactionRepository,
    C: Connector,
{
    let Json(new) = body?;
    let tx = state.service.create(new).await?;
    if let Err(error) = state.producer.publish(&tx).await {
        // The row is committed; reconciliation picks it up later.
        tracing::warn!(id = tx.id, %error, "http.create.unpublished");
        return Err(error.into());
    }
    Ok((StatusCode::CREATED, Json(tx)))
}

async fn find<R, C>(
    State(state): State<AppState<R, C>>,
    Path(id): Path<TransactionId>,
) -> Result<Json<Transaction>, ApiError>
where
    R: TransactionRepository,
    C: Connector,
{
    Ok(Json(state.service.find(id).await?))
}

#[derive(Deserialize)]
struct StatusUpdate {
    status: String,
}

async fn update_status<R, C>(
    State(state): State<AppState<R, C>>,
    Path(id): Path<TransactionId>,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<Transaction>, ApiError>
where
    R: TransactionRepository,
    C: Connector,
{
    let Json(update) = body?;
    let status: TransactionStatus = update.status.parse()?;
    Ok(Json(state.service.update_status(id, status).await?))
}

#[derive(Deserialize)]
struct PendingQuery {
    older_than_secs: Option<u64>,
}

async fn pending<R, C>(
    State(state): State<AppState<R, C>>,
    Query(query): Query<PendingQuery>,
) -> Result<Json<Vec<Transaction>>, ApiError>
where
    R: TransactionRepository,
    C: Connector,
{
    let age = Duration::from_secs(query.older_than_secs.unwrap_or(DEFAULT_PENDING_AGE_SECS));
    Ok(Json(state.service.pending_older_than(age).await?))
}

async fn republish<R, C>(
    State(state): State<AppState<R, C>>,
    Path(id): Path<TransactionId>,
) -> Result<(StatusCode, Json<Transaction>), ApiError>
where
    R: TransactionRepository,
    C: Connector,
{
    let tx = state.service.find(id).await?;
    state.producer.publish(&tx).await?;
    tracing::info!(id, "http.transaction.republished");
    Ok((StatusCode::ACCEPTED, Json(tx)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
