use axum::{
    extract::{Extension, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    AppState,
    common::{DEFAULT_PAGE_SIZE, PageQuery},
    error::AppError,
    media::{MAX_FILES_PER_POST, MediaError, MediaUpload},
    middleware::CurrentUser,
    models::{Actor, MediaRef, Post, Visibility},
    operations::{NewPost, PostFilter, PostOperation},
    routes::{AppJson, AppPath, AppQuery, user::model::MessageResponse, user_summaries},
    utils::success_to_api_response,
};

use super::model::{
    CommentCreatedResponse, CommentLikeResponse, CommentRequest, PostListQuery, PostListResponse,
    PostView, UpdatePostRequest,
};

fn operation(state: &AppState) -> PostOperation {
    PostOperation::new(state.stores.clone())
}

async fn post_views(
    state: &AppState,
    viewer: &Actor,
    posts: Vec<Post>,
) -> Result<Vec<PostView>, AppError> {
    let users = user_summaries(state, posts.iter().flat_map(PostView::referenced_users)).await?;

    Ok(posts
        .into_iter()
        .map(|post| PostView::new(post, viewer, &users))
        .collect())
}

async fn post_view(state: &AppState, viewer: &Actor, post: Post) -> Result<PostView, AppError> {
    let users = user_summaries(state, PostView::referenced_users(&post)).await?;
    Ok(PostView::new(post, viewer, &users))
}

/// 发帖表单中的字段
#[derive(Debug, Default)]
struct PostForm {
    content: String,
    group: Option<String>,
    visibility: Option<String>,
    tags: Option<String>,
    files: Vec<MediaUpload>,
}

async fn read_post_form(mut multipart: Multipart) -> Result<PostForm, AppError> {
    let mut form = PostForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "media" => {
                if form.files.len() == MAX_FILES_PER_POST {
                    return Err(MediaError::TooManyFiles(MAX_FILES_PER_POST).into());
                }
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                form.files.push(MediaUpload {
                    filename,
                    content_type,
                    bytes: field.bytes().await?,
                });
            }
            "content" => form.content = field.text().await?,
            "groupId" => form.group = Some(field.text().await?),
            "visibility" => form.visibility = Some(field.text().await?),
            "tags" => form.tags = Some(field.text().await?),
            other => tracing::debug!("Ignoring multipart field {}", other),
        }
    }
    Ok(form)
}

/// 标签可以是 JSON 数组，也可以是逗号分隔的字符串
fn parse_tags(raw: &str) -> Result<Vec<String>, AppError> {
    let raw = raw.trim();
    if raw.starts_with('[') {
        return serde_json::from_str(raw).map_err(|_| {
            AppError::validation("Tags must be a JSON array or a comma-separated list")
        });
    }
    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect())
}

/// 尽力删除已保存的媒体文件
async fn discard_media(state: &AppState, media: &[MediaRef]) {
    for item in media {
        if let Err(err) = state.media.delete(&item.public_id).await {
            tracing::warn!("Failed to clean up media {}: {}", item.public_id, err);
        }
    }
}

async fn store_media(state: &AppState, files: Vec<MediaUpload>) -> Result<Vec<MediaRef>, AppError> {
    // 先全部校验，避免保存到一半才失败
    for file in &files {
        file.inspect()?;
    }

    let mut stored = Vec::with_capacity(files.len());
    for file in files {
        match state.media.store(file).await {
            Ok(media) => stored.push(media),
            Err(err) => {
                discard_media(state, &stored).await;
                return Err(err.into());
            }
        }
    }
    Ok(stored)
}

#[axum::debug_handler]
pub async fn create_post(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let actor = current.actor();
    let form = read_post_form(multipart).await?;

    let group = form
        .group
        .as_deref()
        .map(str::trim)
        .filter(|group| !group.is_empty())
        .ok_or_else(|| AppError::validation("Group ID is required"))?
        .parse::<Uuid>()
        .map_err(|_| AppError::validation("Invalid group ID"))?;
    let visibility = match form.visibility.as_deref() {
        Some(value) if !value.trim().is_empty() => value.parse::<Visibility>()?,
        _ => Visibility::default(),
    };
    let tags = match form.tags.as_deref() {
        Some(raw) => parse_tags(raw)?,
        None => Vec::new(),
    };

    let media = store_media(&state, form.files).await?;
    let input = NewPost {
        group,
        content: form.content,
        media: media.clone(),
        tags,
        visibility,
    };
    let post = match operation(&state).create_post(&actor, input).await {
        Ok(post) => post,
        Err(err) => {
            discard_media(&state, &media).await;
            return Err(err);
        }
    };

    let view = post_view(&state, &actor, post).await?;
    Ok((StatusCode::CREATED, success_to_api_response(view)))
}

#[axum::debug_handler]
pub async fn list_posts(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppQuery(query): AppQuery<PostListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let actor = current.actor();
    let page_query = query.page_query();
    let filter = PostFilter {
        group: query.group_id,
        author: query.user_id,
        search: page_query.search_term(),
        sort: query.sort,
        page: page_query.resolve(DEFAULT_PAGE_SIZE),
    };
    let page = operation(&state).list_posts(&filter).await?;

    Ok(success_to_api_response(PostListResponse {
        posts: post_views(&state, &actor, page.items).await?,
        pagination: page.pagination,
    }))
}

#[axum::debug_handler]
pub async fn list_group_posts(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppPath(group_id): AppPath<Uuid>,
    AppQuery(query): AppQuery<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let actor = current.actor();
    let page = operation(&state)
        .list_group_posts(&actor, group_id, query.resolve(DEFAULT_PAGE_SIZE))
        .await?;

    Ok(success_to_api_response(PostListResponse {
        posts: post_views(&state, &actor, page.items).await?,
        pagination: page.pagination,
    }))
}

#[axum::debug_handler]
pub async fn list_user_posts(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppPath(user_id): AppPath<Uuid>,
    AppQuery(query): AppQuery<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let actor = current.actor();
    let page = operation(&state)
        .list_user_posts(user_id, query.resolve(DEFAULT_PAGE_SIZE))
        .await?;

    Ok(success_to_api_response(PostListResponse {
        posts: post_views(&state, &actor, page.items).await?,
        pagination: page.pagination,
    }))
}

#[axum::debug_handler]
pub async fn get_post(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppPath(post_id): AppPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let actor = current.actor();
    let post = operation(&state).get_post(post_id).await?;

    Ok(success_to_api_response(
        post_view(&state, &actor, post).await?,
    ))
}

#[axum::debug_handler]
pub async fn update_post(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppPath(post_id): AppPath<Uuid>,
    AppJson(req): AppJson<UpdatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    let actor = current.actor();
    let post = operation(&state)
        .update_post(&actor, post_id, req.into())
        .await?;

    Ok(success_to_api_response(
        post_view(&state, &actor, post).await?,
    ))
}

#[axum::debug_handler]
pub async fn delete_post(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppPath(post_id): AppPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    operation(&state)
        .delete_post(&current.actor(), post_id)
        .await?;

    Ok(success_to_api_response(MessageResponse::new(
        "Post deleted successfully",
    )))
}

#[axum::debug_handler]
pub async fn toggle_like(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppPath(post_id): AppPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let actor = current.actor();
    let post = operation(&state).toggle_like(&actor, post_id).await?;

    Ok(success_to_api_response(
        post_view(&state, &actor, post).await?,
    ))
}

#[axum::debug_handler]
pub async fn add_comment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppPath(post_id): AppPath<Uuid>,
    AppJson(req): AppJson<CommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let actor = current.actor();
    let (post, comment_id) = operation(&state)
        .add_comment(&actor, post_id, &req.content)
        .await?;

    Ok((
        StatusCode::CREATED,
        success_to_api_response(CommentCreatedResponse {
            comment_id,
            post: post_view(&state, &actor, post).await?,
        }),
    ))
}

#[axum::debug_handler]
pub async fn remove_comment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppPath((post_id, comment_id)): AppPath<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let actor = current.actor();
    let post = operation(&state)
        .remove_comment(&actor, post_id, comment_id)
        .await?;

    Ok(success_to_api_response(
        post_view(&state, &actor, post).await?,
    ))
}

#[axum::debug_handler]
pub async fn toggle_comment_like(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    AppPath((post_id, comment_id)): AppPath<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let (is_liked, like_count) = operation(&state)
        .toggle_comment_like(&current.actor(), post_id, comment_id)
        .await?;

    Ok(success_to_api_response(CommentLikeResponse {
        is_liked,
        like_count,
    }))
}
