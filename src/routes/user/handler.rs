use axum::{
    extract::{Extension, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    AppState,
    common::PageQuery,
    error::AppError,
    media::MediaUpload,
    middleware::CurrentUser,
    operations::UserOperation,
    routes::{AppJson, AppPath, AppQuery},
    utils::success_to_api_response,
};

use super::model::{
    AuthResponse, ChangePasswordRequest, GroupSummary, LoginRequest, MeResponse, MessageResponse,
    RegisterRequest, SetUserStatusRequest, UpdateProfileRequest, UserListResponse, UserProfile,
};

const DIRECTORY_PAGE_SIZE: u32 = 20;
const ADMIN_PAGE_SIZE: u32 = 50;

fn operation(state: &AppState) -> UserOperation {
    UserOperation::new(
        state.stores.clone(),
        state.config.clone(),
        state.media.clone(),
    )
}

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::debug!("Registering {}", req.email);
    let session = operation(&state).register(req.into()).await?;

    Ok((
        StatusCode::CREATED,
        success_to_api_response(AuthResponse::from(session)),
    ))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.password.is_empty() {
        return Err(AppError::validation("Password is required"));
    }
    let session = operation(&state).login(&req.email, &req.password).await?;

    Ok(success_to_api_response(AuthResponse::from(session)))
}

#[axum::debug_handler]
pub async fn me(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let (user, groups) = operation(&state).me(&current.actor()).await?;

    Ok(success_to_api_response(MeResponse {
        user: user.into(),
        groups: groups.into_iter().map(GroupSummary::from).collect(),
    }))
}

#[axum::debug_handler]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppJson(req): AppJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = operation(&state)
        .update_profile(&current.actor(), req.into())
        .await?;

    Ok(success_to_api_response(UserProfile::from(user)))
}

#[axum::debug_handler]
pub async fn change_password(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppJson(req): AppJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    operation(&state)
        .change_password(&current.actor(), &req.current_password, &req.new_password)
        .await?;

    Ok(success_to_api_response(MessageResponse::new(
        "Password changed successfully",
    )))
}

/// 头像通过 multipart 的 `avatar` 字段上传
#[axum::debug_handler]
pub async fn upload_avatar(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("avatar") {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        upload = Some(MediaUpload {
            filename,
            content_type,
            bytes: field.bytes().await?,
        });
        break;
    }

    let upload = upload.ok_or_else(|| AppError::validation("No file uploaded"))?;
    let user = operation(&state)
        .upload_avatar(&current.actor(), upload)
        .await?;

    Ok(success_to_api_response(UserProfile::from(user)))
}

#[axum::debug_handler]
pub async fn deactivate_account(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    operation(&state)
        .deactivate_account(&current.actor())
        .await?;

    Ok(success_to_api_response(MessageResponse::new(
        "Account deactivated successfully",
    )))
}

#[axum::debug_handler]
pub async fn directory(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = operation(&state)
        .directory(query.resolve(DIRECTORY_PAGE_SIZE))
        .await?;

    let page = page.map(UserProfile::from);
    Ok(success_to_api_response(UserListResponse {
        users: page.items,
        pagination: page.pagination,
    }))
}

#[axum::debug_handler]
pub async fn list_users(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppQuery(query): AppQuery<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = operation(&state)
        .list_users(
            &current.actor(),
            query.resolve(ADMIN_PAGE_SIZE),
            query.search_term(),
        )
        .await?;

    let page = page.map(UserProfile::from);
    Ok(success_to_api_response(UserListResponse {
        users: page.items,
        pagination: page.pagination,
    }))
}

#[axum::debug_handler]
pub async fn set_user_status(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppPath(user_id): AppPath<Uuid>,
    AppJson(req): AppJson<SetUserStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = operation(&state)
        .set_user_active(&current.actor(), user_id, req.is_active)
        .await?;

    Ok(success_to_api_response(UserProfile::from(user)))
}
