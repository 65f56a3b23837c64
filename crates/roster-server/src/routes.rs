//! HTTP surface
//!
//! - `GET /`, `GET /health`: liveness, 503 until stored panels are loaded
//! - `POST /actions`: apply an action envelope
//! - `POST /panels`: create a panel
//! - `GET /panels/{id}`: rendered panel, by panel id or message id

use crate::app::AppState;
use chrono::Utc;
use roster_core::{ActionEnvelope, NewPanel, RosterError};
use serde_json::json;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

const BODY_LIMIT: u64 = 256 * 1024;

pub(crate) fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let health = warp::get()
        .and(warp::path::end().or(warp::path!("health")).unify())
        .and(with_state(state.clone()))
        .map(health);

    let actions = warp::post()
        .and(warp::path!("actions"))
        .and(warp::body::content_length_limit(BODY_LIMIT))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(dispatch);

    let create = warp::post()
        .and(warp::path!("panels"))
        .and(warp::body::content_length_limit(BODY_LIMIT))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(create_panel);

    let show = warp::get()
        .and(warp::path!("panels" / String))
        .and(with_state(state))
        .map(show_panel);

    health
        .or(actions)
        .unify()
        .or(create)
        .unify()
        .or(show)
        .unify()
        .with(warp::trace::request())
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn health(state: AppState) -> Response {
    let ready = state.is_ready();
    let body = json!({
        "status": if ready { "ok" } else { "starting" },
        "ready": ready,
        "panels": state.store.len(),
        "timestamp": Utc::now().to_rfc3339(),
    });
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

fn not_ready() -> Response {
    let body = json!({ "error": "starting", "message": "stored panels are still loading" });
    warp::reply::with_status(warp::reply::json(&body), StatusCode::SERVICE_UNAVAILABLE).into_response()
}

fn status_for(err: &RosterError) -> StatusCode {
    match err {
        RosterError::Validation(_) => StatusCode::BAD_REQUEST,
        RosterError::CapacityLimit { .. } | RosterError::PanelClosed(_) => StatusCode::CONFLICT,
        RosterError::PanelNotFound(_) | RosterError::NotInWaitlist(_) | RosterError::NotInActive(_) => {
            StatusCode::NOT_FOUND
        }
        RosterError::NotRecoverable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        RosterError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
    }
}

fn error_reply(err: &RosterError) -> Response {
    let body = json!({ "error": err.kind(), "message": err.to_string() });
    warp::reply::with_status(warp::reply::json(&body), status_for(err)).into_response()
}

async fn dispatch(envelope: ActionEnvelope, state: AppState) -> Result<Response, Infallible> {
    if !state.is_ready() {
        return Ok(not_ready());
    }
    Ok(match state.service.dispatch(envelope).await {
        Ok(reply) => warp::reply::json(&reply).into_response(),
        Err(e) => error_reply(&e),
    })
}

async fn create_panel(request: NewPanel, state: AppState) -> Result<Response, Infallible> {
    if !state.is_ready() {
        return Ok(not_ready());
    }
    Ok(match state.service.create_panel(request).await {
        Ok(created) => {
            warp::reply::with_status(warp::reply::json(&created), StatusCode::CREATED).into_response()
        }
        Err(e) => error_reply(&e),
    })
}

fn show_panel(reference: String, state: AppState) -> Response {
    let rendered = state
        .store
        .resolve(&reference)
        .and_then(|id| state.service.engine().render(&id));
    match rendered {
        Some(rendered) => warp::reply::json(&rendered).into_response(),
        None => error_reply(&RosterError::PanelNotFound(reference)),
    }
}
