//! JSON/REST transport over [`ContactsPort`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use crate::error::Error;
use crate::model::{Contact, Friend, UserId};
use crate::service::ContactsPort;

#[derive(Clone)]
pub struct AppState {
    contacts: Arc<dyn ContactsPort>,
    request_timeout: Duration,
}

impl AppState {
    pub fn new(contacts: Arc<dyn ContactsPort>, request_timeout: Duration) -> Self {
        Self {
            contacts,
            request_timeout,
        }
    }

    /// Run a core call under the request deadline. Dropping the call on
    /// expiry cancels it and rolls back any open transaction.
    async fn within_deadline<T, F>(&self, call: F) -> ApiResult<T>
    where
        F: Future<Output = Result<T, Error>>,
    {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(Error::store_unavailable(format!(
                "request deadline of {:?} exceeded",
                self.request_timeout
            ))
            .into()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/user/:user_id/contact", post(add_contacts))
        .route("/user/:user_id/friends", get(friends))
        .route("/user/:user_id/contact/name", get(name))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Deserialize)]
pub struct AddContactsRequest {
    #[serde(default)]
    pub contacts: Vec<Contact>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NameResponse {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Core error rendered as an HTTP response.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            Error::InvalidInput { message } => {
                debug!(%message, "rejected request");
                (StatusCode::BAD_REQUEST, self.0.to_string())
            }
            Error::NotFound { .. } => (StatusCode::NOT_FOUND, self.0.to_string()),
            other => {
                error!(error = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn parse_user_id(raw: &str) -> ApiResult<UserId> {
    Ok(raw.parse()?)
}

async fn add_contacts(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    payload: Result<Json<AddContactsRequest>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let owner = parse_user_id(&user_id)?;
    let Json(request) = payload.map_err(|rejection| {
        Error::invalid_input(format!("malformed contact list: {}", rejection.body_text()))
    })?;

    state
        .within_deadline(state.contacts.save_contacts(owner, request.contacts))
        .await?;
    Ok(StatusCode::OK)
}

async fn friends(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<Friend>>> {
    let owner = parse_user_id(&user_id)?;
    let friends = state
        .within_deadline(state.contacts.list_friends(owner))
        .await?;
    Ok(Json(friends))
}

async fn name(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<NameResponse>> {
    let user_id = parse_user_id(&user_id)?;
    let name = state
        .within_deadline(state.contacts.get_name(user_id))
        .await?;
    Ok(Json(NameResponse { name }))
}

async fn health(State(state): State<AppState>) -> Response {
    match state.within_deadline(state.contacts.health()).await {
        Ok(()) => Json(serde_json::json!({ "status": "ok" })).into_response(),
        Err(ApiError(err)) => {
            warn!(error = %err, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "unavailable" })),
            )
                .into_response()
        }
    }
}
