//! HTTP API over the application facade.
//!
//! Thin translation layer: parse and validate the request, call one
//! application method, shape the JSON answer. Failure bodies are always
//! `{"code", "message"}` and every response carries `Cache-Control:
//! no-cache`.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use game::WorldError;

use crate::app::{parse_move, Application};
use crate::db::Db;

const MAX_RECORD_ITEMS: i64 = 100;

#[derive(Clone)]
pub struct ApiState {
    pub app: Arc<Application>,
    pub db: Db,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/maps", get(list_maps))
        .route("/api/v1/maps/{id}", get(map_detail))
        .route("/api/v1/game/join", post(join))
        .route("/api/v1/game/players", get(players))
        .route("/api/v1/game/state", get(game_state))
        .route("/api/v1/game/player/action", post(action))
        .route("/api/v1/game/tick", post(tick))
        .route("/api/v1/game/records", get(records))
        .fallback(unknown_path)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        ))
        .with_state(state)
}

#[derive(Debug)]
enum ApiError {
    InvalidArgument(&'static str),
    BadRequest(&'static str),
    MapNotFound,
    InvalidToken,
    UnknownToken,
    InvalidMethod(&'static str),
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let allow = match self {
            ApiError::InvalidMethod(allow) => Some(allow),
            _ => None,
        };
        let (status, code, message) = match self {
            ApiError::InvalidArgument(message) => {
                (StatusCode::BAD_REQUEST, "invalidArgument", message)
            }
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, "badRequest", message),
            ApiError::MapNotFound => (StatusCode::NOT_FOUND, "mapNotFound", "Map not found"),
            ApiError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "invalidToken",
                "Authorization header is missing or malformed",
            ),
            ApiError::UnknownToken => (
                StatusCode::UNAUTHORIZED,
                "unknownToken",
                "Player token has not been found",
            ),
            ApiError::InvalidMethod(_) => {
                (StatusCode::METHOD_NOT_ALLOWED, "invalidMethod", "Invalid method")
            }
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internalError",
                "Internal server error",
            ),
        };
        let mut response =
            (status, Json(json!({ "code": code, "message": message }))).into_response();
        if let Some(allow) = allow {
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static(allow));
        }
        response
    }
}

/// Bearer token extractor: 32 hex characters or 401.
struct Bearer(String);

impl<S: Send + Sync> FromRequestParts<S> for Bearer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::InvalidToken)?;
        let token = header.strip_prefix("Bearer ").ok_or(ApiError::InvalidToken)?;
        if token.len() != 32 || !token.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ApiError::InvalidToken);
        }
        Ok(Bearer(token.to_string()))
    }
}

async fn list_maps(State(state): State<ApiState>) -> Json<Value> {
    Json(state.app.maps_json())
}

async fn map_detail(
    State(state): State<ApiState>,
    Path(map_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.app.map_json(&map_id).map(Json).ok_or(ApiError::MapNotFound)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinRequest {
    user_name: String,
    map_id: String,
}

async fn join(
    State(state): State<ApiState>,
    payload: Result<Json<JoinRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) =
        payload.map_err(|_| ApiError::InvalidArgument("Join game request parse error"))?;
    if request.user_name.is_empty() {
        return Err(ApiError::InvalidArgument("Invalid name"));
    }
    let info = state
        .app
        .join(&request.user_name, &request.map_id)
        .map_err(|err| match err {
            WorldError::UnknownMap(_) => ApiError::MapNotFound,
            _ => ApiError::Internal,
        })?;
    Ok(Json(json!({ "authToken": info.token, "playerId": info.player_id })))
}

async fn players(
    State(state): State<ApiState>,
    Bearer(token): Bearer,
) -> Result<Json<Value>, ApiError> {
    state
        .app
        .players_json(&token)
        .map(Json)
        .ok_or(ApiError::UnknownToken)
}

async fn game_state(
    State(state): State<ApiState>,
    Bearer(token): Bearer,
) -> Result<Json<Value>, ApiError> {
    state
        .app
        .state_json(&token)
        .map(Json)
        .ok_or(ApiError::UnknownToken)
}

#[derive(Debug, Deserialize)]
struct ActionRequest {
    #[serde(rename = "move")]
    command: String,
}

async fn action(
    State(state): State<ApiState>,
    Bearer(token): Bearer,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) =
        payload.map_err(|_| ApiError::InvalidArgument("Failed to parse action"))?;
    let command = parse_move(&request.command)
        .ok_or(ApiError::InvalidArgument("Failed to parse action"))?;
    state
        .app
        .move_player(&token, command)
        .map_err(|_| ApiError::UnknownToken)?;
    Ok(Json(json!({})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickRequest {
    time_delta: i64,
}

async fn tick(
    State(state): State<ApiState>,
    payload: Result<Json<TickRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    if !state.app.manual_tick() {
        return Err(ApiError::BadRequest("Tick is driven by the server"));
    }
    let Json(request) =
        payload.map_err(|_| ApiError::InvalidArgument("Failed to parse tick request"))?;
    if request.time_delta < 0 {
        return Err(ApiError::InvalidArgument("timeDelta must not be negative"));
    }
    state.app.tick(request.time_delta as f64);
    Ok(Json(json!({})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordsQuery {
    start: Option<i64>,
    max_items: Option<i64>,
}

async fn records(
    State(state): State<ApiState>,
    query: Result<Query<RecordsQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) =
        query.map_err(|_| ApiError::InvalidArgument("Failed to parse query parameters"))?;
    let start = query.start.unwrap_or(0).max(0);
    let max_items = query.max_items.unwrap_or(MAX_RECORD_ITEMS);
    if max_items > MAX_RECORD_ITEMS {
        return Err(ApiError::InvalidArgument("maxItems must not exceed 100"));
    }
    let rows = state
        .db
        .records(start, max_items.max(0))
        .await
        .map_err(|_| ApiError::Internal)?;
    let records: Vec<Value> = rows
        .into_iter()
        .map(|row| {
            json!({ "name": row.name, "score": row.score, "playTime": row.total_time })
        })
        .collect();
    Ok(Json(Value::Array(records)))
}

async fn unknown_path(uri: Uri) -> Response {
    if uri.path().starts_with("/api/") {
        ApiError::BadRequest("Bad request").into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn method_not_allowed(uri: Uri) -> ApiError {
    let allow = match uri.path() {
        "/api/v1/game/join" | "/api/v1/game/player/action" | "/api/v1/game/tick" => "POST",
        _ => "GET, HEAD",
    };
    ApiError::InvalidMethod(allow)
}
