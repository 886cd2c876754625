// 帖子实体
// 点赞、评论以及评论点赞都是帖子内嵌的列表，计数在保存前从列表长度重新计算

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::normalize_tags;

pub const CONTENT_MAX_CHARS: usize = 2000;
pub const COMMENT_MAX_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// 媒体存储返回的引用，核心逻辑只记录不解析
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub url: String,
    pub public_id: String,
    pub filename: Option<String>,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub user: Uuid,
    pub liked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub author: Uuid,
    pub content: String,
    /// 点赞该评论的用户，数量即列表长度
    pub likes: Vec<Uuid>,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 可见性只做存储，读取时不据此过滤
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Group,
    Private,
}

impl FromStr for Visibility {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "group" => Ok(Self::Group),
            "private" => Ok(Self::Private),
            _ => Err(AppError::validation(
                "Visibility must be public, group, or private",
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Engagement {
    pub like_count: u32,
    pub comment_count: u32,
    pub share_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub author: Uuid,
    pub group: Uuid,
    pub content: String,
    pub media: Vec<MediaRef>,
    pub likes: Vec<Like>,
    pub comments: Vec<Comment>,
    pub tags: Vec<String>,
    pub visibility: Visibility,
    pub engagement: Engagement,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 帖子的部分更新
#[derive(Debug, Clone, Default)]
pub struct PostUpdate {
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub visibility: Option<Visibility>,
}

impl Post {
    pub fn new(
        author: Uuid,
        group: Uuid,
        content: &str,
        media: Vec<MediaRef>,
        tags: Vec<String>,
        visibility: Visibility,
    ) -> Result<Self, AppError> {
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            author,
            group,
            content: validate_content(content)?,
            media,
            likes: Vec::new(),
            comments: Vec::new(),
            tags: normalize_tags(tags)?,
            visibility,
            engagement: Engagement::default(),
            is_edited: false,
            edited_at: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_liked_by(&self, user: Uuid) -> bool {
        self.likes.iter().any(|like| like.user == user)
    }

    /// 点赞开关，返回操作后是否处于已点赞状态
    pub fn toggle_like(&mut self, user: Uuid) -> bool {
        let liked = if let Some(index) = self.likes.iter().position(|like| like.user == user) {
            self.likes.remove(index);
            false
        } else {
            self.likes.push(Like {
                user,
                liked_at: Utc::now(),
            });
            true
        };
        self.sync_engagement();
        liked
    }

    pub fn comment(&self, comment_id: Uuid) -> Option<&Comment> {
        self.comments.iter().find(|comment| comment.id == comment_id)
    }

    pub fn add_comment(&mut self, author: Uuid, content: &str) -> Result<&Comment, AppError> {
        let content = validate_comment(content)?;
        let now = Utc::now();
        self.comments.push(Comment {
            id: Uuid::new_v4(),
            author,
            content,
            likes: Vec::new(),
            is_edited: false,
            edited_at: None,
            created_at: now,
            updated_at: now,
        });
        self.sync_engagement();

        self.comments
            .last()
            .ok_or_else(|| AppError::Internal("comment list empty after push".into()))
    }

    /// 删除评论，仅评论作者或帖子作者可操作
    pub fn remove_comment(&mut self, comment_id: Uuid, actor: Uuid) -> Result<Comment, AppError> {
        let index = self
            .comments
            .iter()
            .position(|comment| comment.id == comment_id)
            .ok_or_else(|| AppError::not_found("Comment not found"))?;

        let comment_author = self.comments[index].author;
        if !super::access::can_remove_comment(actor, comment_author, self.author) {
            return Err(AppError::forbidden("Not authorized to delete this comment"));
        }

        let removed = self.comments.remove(index);
        self.sync_engagement();
        Ok(removed)
    }

    /// 评论点赞开关，返回操作后是否处于已点赞状态
    pub fn toggle_comment_like(&mut self, comment_id: Uuid, user: Uuid) -> Result<bool, AppError> {
        let comment = self
            .comments
            .iter_mut()
            .find(|comment| comment.id == comment_id)
            .ok_or_else(|| AppError::not_found("Comment not found"))?;

        if let Some(index) = comment.likes.iter().position(|id| *id == user) {
            comment.likes.remove(index);
            Ok(false)
        } else {
            comment.likes.push(user);
            Ok(true)
        }
    }

    pub fn apply_update(&mut self, update: PostUpdate) -> Result<(), AppError> {
        let content = update.content.as_deref().map(validate_content).transpose()?;
        let tags = update.tags.map(normalize_tags).transpose()?;

        if let Some(content) = content {
            self.content = content;
        }
        if let Some(tags) = tags {
            self.tags = tags;
        }
        if let Some(visibility) = update.visibility {
            self.visibility = visibility;
        }
        self.is_edited = true;
        self.edited_at = Some(Utc::now());
        Ok(())
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    /// 计数从列表长度推导，保存前必须调用
    pub fn sync_engagement(&mut self) {
        self.engagement.like_count = u32::try_from(self.likes.len()).unwrap_or(u32::MAX);
        self.engagement.comment_count = u32::try_from(self.comments.len()).unwrap_or(u32::MAX);
    }
}

fn validate_content(content: &str) -> Result<String, AppError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::validation("Post content is required"));
    }
    if content.chars().count() > CONTENT_MAX_CHARS {
        return Err(AppError::validation(format!(
            "Post content cannot exceed {CONTENT_MAX_CHARS} characters"
        )));
    }
    Ok(content.to_string())
}

fn validate_comment(content: &str) -> Result<String, AppError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::validation("Comment content is required"));
    }
    if content.chars().count() > COMMENT_MAX_CHARS {
        return Err(AppError::validation(format!(
            "Comment cannot exceed {COMMENT_MAX_CHARS} characters"
        )));
    }
    Ok(content.to_string())
}
