use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};

use super::{json_body, ApiResponse, AppState};
use crate::error::AppError;
use crate::identity::{Claims, SignInRequest, SignUpRequest, TokenPair, UserProfile};

pub async fn sign_in(
    State(state): State<AppState>,
    payload: Result<Json<SignInRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<TokenPair>>, AppError> {
    let req = json_body(payload)?;
    let tokens = state.auth.sign_in(&req).await?;
    Ok(Json(ApiResponse::data(tokens)))
}

pub async fn sign_up(
    State(state): State<AppState>,
    payload: Result<Json<SignUpRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<UserProfile>>), AppError> {
    let req = json_body(payload)?;
    let user = state.auth.sign_up(&req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::data(UserProfile::from(&user)))))
}

pub async fn current_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<UserProfile>>, AppError> {
    let profile = state.auth.current_user(&claims.sub.email).await?;
    Ok(Json(ApiResponse::data(profile)))
}
