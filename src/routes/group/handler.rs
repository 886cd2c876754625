use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    AppState,
    common::PageQuery,
    error::AppError,
    middleware::CurrentUser,
    models::{Actor, Group, MemberRole},
    operations::GroupOperation,
    routes::{AppJson, AppPath, AppQuery, user::model::MessageResponse, user_summaries},
    utils::success_to_api_response,
};

use super::model::{
    AddMemberRequest, CreateGroupRequest, DeleteGroupResponse, GroupListResponse, GroupView,
    JoinRequestView, JoinResponse, UpdateGroupRequest, UpdateRoleRequest,
};

const GROUP_PAGE_SIZE: u32 = 12;

fn operation(state: &AppState) -> GroupOperation {
    GroupOperation::new(state.stores.clone())
}

/// 填充成员和创建者信息后生成视图
async fn group_views(
    state: &AppState,
    viewer: &Actor,
    groups: Vec<Group>,
) -> Result<Vec<GroupView>, AppError> {
    let ids = groups
        .iter()
        .flat_map(|group| GroupView::referenced_users(group, viewer));
    let users = user_summaries(state, ids).await?;

    Ok(groups
        .into_iter()
        .map(|group| GroupView::new(group, viewer, &users))
        .collect())
}

async fn group_view(state: &AppState, viewer: &Actor, group: Group) -> Result<GroupView, AppError> {
    let ids = GroupView::referenced_users(&group, viewer);
    let users = user_summaries(state, ids).await?;
    Ok(GroupView::new(group, viewer, &users))
}

#[axum::debug_handler]
pub async fn create_group(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppJson(req): AppJson<CreateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let actor = current.actor();
    let group = operation(&state).create_group(&actor, req.into()).await?;
    let view = group_view(&state, &actor, group).await?;

    Ok((StatusCode::CREATED, success_to_api_response(view)))
}

#[axum::debug_handler]
pub async fn list_groups(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppQuery(query): AppQuery<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let actor = current.actor();
    let page = operation(&state)
        .list_groups(query.resolve(GROUP_PAGE_SIZE), query.search_term())
        .await?;

    Ok(success_to_api_response(GroupListResponse {
        groups: group_views(&state, &actor, page.items).await?,
        pagination: page.pagination,
    }))
}

#[axum::debug_handler]
pub async fn get_group(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppPath(group_id): AppPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let actor = current.actor();
    let group = operation(&state).get_group(group_id).await?;

    Ok(success_to_api_response(
        group_view(&state, &actor, group).await?,
    ))
}

#[axum::debug_handler]
pub async fn update_group(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppPath(group_id): AppPath<Uuid>,
    AppJson(req): AppJson<UpdateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let actor = current.actor();
    let group = operation(&state)
        .update_group(&actor, group_id, req.into())
        .await?;

    Ok(success_to_api_response(
        group_view(&state, &actor, group).await?,
    ))
}

#[axum::debug_handler]
pub async fn delete_group(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppPath(group_id): AppPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let deactivated_posts = operation(&state)
        .delete_group(&current.actor(), group_id)
        .await?;

    Ok(success_to_api_response(DeleteGroupResponse {
        message: "Group deleted successfully",
        deactivated_posts,
    }))
}

#[axum::debug_handler]
pub async fn join_group(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppPath(group_id): AppPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let actor = current.actor();
    let (outcome, group) = operation(&state).request_join(&actor, group_id).await?;
    let view = group_view(&state, &actor, group).await?;

    Ok(success_to_api_response(JoinResponse::new(outcome, view)))
}

#[axum::debug_handler]
pub async fn leave_group(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppPath(group_id): AppPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    operation(&state)
        .leave_group(&current.actor(), group_id)
        .await?;

    Ok(success_to_api_response(MessageResponse::new(
        "Successfully left the group",
    )))
}

#[axum::debug_handler]
pub async fn list_join_requests(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppPath(group_id): AppPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let requests = operation(&state)
        .list_join_requests(&current.actor(), group_id)
        .await?;
    let users = user_summaries(&state, requests.iter().map(|request| request.user)).await?;

    Ok(success_to_api_response(
        requests
            .iter()
            .map(|request| JoinRequestView::new(request, &users))
            .collect::<Vec<_>>(),
    ))
}

#[axum::debug_handler]
pub async fn approve_request(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppPath((group_id, user_id)): AppPath<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let actor = current.actor();
    let group = operation(&state)
        .approve_request(&actor, group_id, user_id)
        .await?;

    Ok(success_to_api_response(
        group_view(&state, &actor, group).await?,
    ))
}

#[axum::debug_handler]
pub async fn reject_request(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppPath((group_id, user_id)): AppPath<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let actor = current.actor();
    let group = operation(&state)
        .reject_request(&actor, group_id, user_id)
        .await?;

    Ok(success_to_api_response(
        group_view(&state, &actor, group).await?,
    ))
}

#[axum::debug_handler]
pub async fn add_member(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppPath(group_id): AppPath<Uuid>,
    AppJson(req): AppJson<AddMemberRequest>,
) -> Result<impl IntoResponse, AppError> {
    let actor = current.actor();
    let role = match req.role.as_deref() {
        Some(role) => role.parse::<MemberRole>()?,
        None => MemberRole::Member,
    };
    let group = operation(&state)
        .add_member(&actor, group_id, req.user_id, role)
        .await?;

    Ok(success_to_api_response(
        group_view(&state, &actor, group).await?,
    ))
}

#[axum::debug_handler]
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppPath((group_id, user_id)): AppPath<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let actor = current.actor();
    let group = operation(&state)
        .remove_member(&actor, group_id, user_id)
        .await?;

    Ok(success_to_api_response(
        group_view(&state, &actor, group).await?,
    ))
}

#[axum::debug_handler]
pub async fn update_member_role(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppPath((group_id, user_id)): AppPath<(Uuid, Uuid)>,
    AppJson(req): AppJson<UpdateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let actor = current.actor();
    let role = req.role.parse::<MemberRole>()?;
    let group = operation(&state)
        .update_member_role(&actor, group_id, user_id, role)
        .await?;

    Ok(success_to_api_response(
        group_view(&state, &actor, group).await?,
    ))
}
