use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::{PageQuery, Pagination};
use crate::models::access::can_modify_post;
use crate::models::post::Engagement;
use crate::models::{Actor, Comment, MediaRef, Post, PostUpdate, Visibility};
use crate::operations::PostSort;
use crate::routes::user::model::UserSummary;

/// 帖子列表的查询参数
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub group_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub sort: PostSort,
}

impl PostListQuery {
    pub fn page_query(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            limit: self.limit,
            search: self.search.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub visibility: Option<Visibility>,
}

impl From<UpdatePostRequest> for PostUpdate {
    fn from(req: UpdatePostRequest) -> Self {
        Self {
            content: req.content,
            tags: req.tags,
            visibility: req.visibility,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author: Option<UserSummary>,
    pub content: String,
    pub like_count: usize,
    pub is_liked: bool,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommentView {
    fn new(comment: Comment, viewer: &Actor, users: &HashMap<Uuid, UserSummary>) -> Self {
        Self {
            id: comment.id,
            author_id: comment.author,
            author: users.get(&comment.author).cloned(),
            like_count: comment.likes.len(),
            is_liked: comment.likes.contains(&viewer.id),
            content: comment.content,
            is_edited: comment.is_edited,
            edited_at: comment.edited_at,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        }
    }
}

/// 返回给客户端的帖子视图
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author: Option<UserSummary>,
    pub group_id: Uuid,
    pub content: String,
    pub media: Vec<MediaRef>,
    pub comments: Vec<CommentView>,
    pub tags: Vec<String>,
    pub visibility: Visibility,
    pub engagement: Engagement,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_liked: bool,
    pub user_can_edit: bool,
    pub user_can_delete: bool,
}

impl PostView {
    pub fn new(post: Post, viewer: &Actor, users: &HashMap<Uuid, UserSummary>) -> Self {
        let can_modify = can_modify_post(viewer, &post);
        Self {
            id: post.id,
            author_id: post.author,
            author: users.get(&post.author).cloned(),
            group_id: post.group,
            is_liked: post.is_liked_by(viewer.id),
            user_can_edit: can_modify,
            user_can_delete: can_modify,
            content: post.content,
            media: post.media,
            comments: post
                .comments
                .into_iter()
                .map(|comment| CommentView::new(comment, viewer, users))
                .collect(),
            tags: post.tags,
            visibility: post.visibility,
            engagement: post.engagement,
            is_edited: post.is_edited,
            edited_at: post.edited_at,
            created_at: post.created_at,
            updated_at: post.updated_at,
        }
    }

    /// 帖子作者和评论作者
    pub fn referenced_users(post: &Post) -> impl Iterator<Item = Uuid> + '_ {
        std::iter::once(post.author).chain(post.comments.iter().map(|comment| comment.author))
    }
}

#[derive(Debug, Serialize)]
pub struct PostListResponse {
    pub posts: Vec<PostView>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentCreatedResponse {
    pub comment_id: Uuid,
    pub post: PostView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentLikeResponse {
    pub is_liked: bool,
    pub like_count: usize,
}
