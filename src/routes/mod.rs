pub mod group;
pub mod post;
pub mod user;

use std::collections::HashMap;

use axum::{
    extract::{FromRequest, FromRequestParts},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::AppState;
use crate::error::AppError;
use crate::operations::UserOperation;
use crate::utils::success_to_api_response;
use user::model::UserSummary;

/// JSON 请求体，解析失败时返回统一的错误结构
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub timestamp: DateTime<Utc>,
}

pub async fn health() -> impl IntoResponse {
    success_to_api_response(HealthResponse {
        status: "OK",
        message: "UniLink API is running",
        timestamp: Utc::now(),
    })
}

/// 批量读取视图中引用到的用户摘要
pub(crate) async fn user_summaries(
    state: &AppState,
    ids: impl IntoIterator<Item = Uuid>,
) -> Result<HashMap<Uuid, UserSummary>, AppError> {
    let mut ids: Vec<Uuid> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();

    let users = UserOperation::new(
        state.stores.clone(),
        state.config.clone(),
        state.media.clone(),
    )
    .find_by_ids(&ids)
    .await?;
    Ok(users
        .iter()
        .map(|user| (user.id, UserSummary::from(user)))
        .collect())
}
