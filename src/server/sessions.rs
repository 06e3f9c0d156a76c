//! `/sessions`: connection CRUD on behalf of the `Guacamole-Token` holder.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use super::{guacamole_token, json_body, ApiResponse, AppState};
use crate::error::AppError;
use crate::gateway::model::ALL_PROTOCOLS;
use crate::gateway::{ConnectionCreated, ConnectionRequest, ConnectionSummary};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub protocol: Option<String>,
}

pub async fn index(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<ConnectionSummary>>>, AppError> {
    let token = guacamole_token(&headers)?;
    let protocol = q.protocol.unwrap_or_else(|| ALL_PROTOCOLS.to_string());
    let items = state.connections.list(&token, &protocol).await?;
    Ok(Json(ApiResponse::data(items)))
}

pub async fn edit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ConnectionRequest>>, AppError> {
    let token = guacamole_token(&headers)?;
    let conn = state.connections.get(&token, &id).await?;
    Ok(Json(ApiResponse::data(conn)))
}

pub async fn store(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ConnectionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<ConnectionCreated>>), AppError> {
    let token = guacamole_token(&headers)?;
    let req = json_body(payload)?;
    let created = state.connections.create(&token, &req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::data(created))))
}

pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<ConnectionRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let token = guacamole_token(&headers)?;
    let req = json_body(payload)?;
    state.connections.update(&token, &id, &req).await?;
    Ok(Json(ApiResponse::message("connection updated")))
}

pub async fn destroy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let token = guacamole_token(&headers)?;
    state.connections.delete(&token, &id).await?;
    Ok(Json(ApiResponse::message("connection deleted")))
}
