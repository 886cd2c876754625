// 帖子操作

use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::common::{Page, PageRequest, Pagination};
use crate::database::{DocQuery, SearchField, Sort, Stores};
use crate::error::AppError;
use crate::models::access::{can_modify_post, can_participate};
use crate::models::{Actor, Group, MediaRef, Post, PostUpdate, Visibility};

const POST_SEARCH_FIELDS: &[SearchField] =
    &[SearchField::Text("content"), SearchField::TextArray("tags")];

/// 发帖输入，媒体已由存储层保存
#[derive(Debug, Clone)]
pub struct NewPost {
    pub group: Uuid,
    pub content: String,
    pub media: Vec<MediaRef>,
    pub tags: Vec<String>,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PostSort {
    #[default]
    Newest,
    Oldest,
    MostLiked,
}

impl From<PostSort> for Sort {
    fn from(sort: PostSort) -> Self {
        match sort {
            PostSort::Newest => Sort::Newest,
            PostSort::Oldest => Sort::Oldest,
            PostSort::MostLiked => Sort::FieldDesc(&["engagement", "likeCount"]),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub group: Option<Uuid>,
    pub author: Option<Uuid>,
    pub search: Option<String>,
    pub sort: PostSort,
    pub page: PageRequest,
}

impl PostFilter {
    fn query(&self) -> DocQuery {
        let mut filter = Map::new();
        if let Some(group) = self.group {
            filter.insert("group".into(), Value::String(group.to_string()));
        }
        if let Some(author) = self.author {
            filter.insert("author".into(), Value::String(author.to_string()));
        }

        let mut query = DocQuery::active()
            .search(self.search.clone(), POST_SEARCH_FIELDS)
            .sort(self.sort.into());
        if !filter.is_empty() {
            query = query.filter(Value::Object(filter));
        }
        query
    }
}

pub struct PostOperation {
    stores: Stores,
}

impl PostOperation {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    pub async fn load_active(&self, post_id: Uuid) -> Result<Post, AppError> {
        self.stores
            .posts
            .find_active(post_id)
            .await?
            .ok_or_else(|| AppError::not_found("Post not found"))
    }

    async fn load_active_group(&self, group_id: Uuid) -> Result<Group, AppError> {
        self.stores
            .groups
            .find_active(group_id)
            .await?
            .ok_or_else(|| AppError::not_found("Group not found"))
    }

    async fn save(&self, post: &mut Post) -> Result<(), AppError> {
        self.stores.posts.save(post).await?;
        Ok(())
    }

    /// 群组发帖计数的调整不影响帖子本身的结果
    async fn adjust_post_count(&self, group_id: Uuid, created: bool) {
        let mut group = match self.stores.groups.find_by_id(group_id).await {
            Ok(Some(group)) => group,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!("Failed to load group {} for post count: {}", group_id, err);
                return;
            }
        };

        if created {
            group.record_post_created();
        } else {
            group.record_post_removed();
        }
        if let Err(err) = self.stores.groups.save(&mut group).await {
            tracing::warn!("Failed to update post count of group {}: {}", group_id, err);
        }
    }

    /// 发帖：群组必须存在且未停用，发帖人必须是成员或系统管理员
    pub async fn create_post(&self, actor: &Actor, input: NewPost) -> Result<Post, AppError> {
        tracing::debug!("User {} is posting to group {}", actor.id, input.group);

        let group = self.load_active_group(input.group).await?;
        if !can_participate(actor, &group) {
            return Err(AppError::forbidden(
                "You must be a member of the group to post",
            ));
        }

        let mut post = Post::new(
            actor.id,
            group.id,
            &input.content,
            input.media,
            input.tags,
            input.visibility,
        )?;
        self.stores.posts.create(&mut post).await?;
        self.adjust_post_count(group.id, true).await;

        tracing::info!("User {} created post {} in group {}", actor.id, post.id, group.id);
        Ok(post)
    }

    pub async fn get_post(&self, post_id: Uuid) -> Result<Post, AppError> {
        self.load_active(post_id).await
    }

    pub async fn list_posts(&self, filter: &PostFilter) -> Result<Page<Post>, AppError> {
        let query = filter.query();
        let total = self.stores.posts.count(&query).await?;
        let items = self
            .stores
            .posts
            .find(&query.page(filter.page.skip(), filter.page.limit))
            .await?;

        Ok(Page {
            items,
            pagination: Pagination::new(filter.page, total),
        })
    }

    /// 群内帖子只对成员和系统管理员可见
    pub async fn list_group_posts(
        &self,
        actor: &Actor,
        group_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Post>, AppError> {
        let group = self.load_active_group(group_id).await?;
        if !can_participate(actor, &group) {
            return Err(AppError::forbidden(
                "You must be a member of the group to view posts",
            ));
        }

        self.list_posts(&PostFilter {
            group: Some(group_id),
            page,
            ..PostFilter::default()
        })
        .await
    }

    pub async fn list_user_posts(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Post>, AppError> {
        self.list_posts(&PostFilter {
            author: Some(user_id),
            page,
            ..PostFilter::default()
        })
        .await
    }

    pub async fn update_post(
        &self,
        actor: &Actor,
        post_id: Uuid,
        update: PostUpdate,
    ) -> Result<Post, AppError> {
        let mut post = self.load_active(post_id).await?;
        if !can_modify_post(actor, &post) {
            return Err(AppError::forbidden("Not authorized to edit this post"));
        }

        post.apply_update(update)?;
        self.save(&mut post).await?;

        tracing::info!("User {} edited post {}", actor.id, post_id);
        Ok(post)
    }

    /// 软删除帖子并减少群组的发帖计数
    pub async fn delete_post(&self, actor: &Actor, post_id: Uuid) -> Result<Post, AppError> {
        let mut post = self.load_active(post_id).await?;
        if !can_modify_post(actor, &post) {
            return Err(AppError::forbidden("Not authorized to delete this post"));
        }

        post.deactivate();
        self.save(&mut post).await?;
        self.adjust_post_count(post.group, false).await;

        tracing::info!("User {} deleted post {}", actor.id, post_id);
        Ok(post)
    }

    pub async fn toggle_like(&self, actor: &Actor, post_id: Uuid) -> Result<Post, AppError> {
        let mut post = self.load_active(post_id).await?;
        let liked = post.toggle_like(actor.id);
        self.save(&mut post).await?;

        tracing::debug!("User {} like on post {}: {}", actor.id, post_id, liked);
        Ok(post)
    }

    /// 添加评论，返回更新后的帖子和新评论的 id
    pub async fn add_comment(
        &self,
        actor: &Actor,
        post_id: Uuid,
        content: &str,
    ) -> Result<(Post, Uuid), AppError> {
        let mut post = self.load_active(post_id).await?;
        let comment_id = post.add_comment(actor.id, content)?.id;
        self.save(&mut post).await?;

        tracing::info!("User {} commented on post {}", actor.id, post_id);
        Ok((post, comment_id))
    }

    pub async fn remove_comment(
        &self,
        actor: &Actor,
        post_id: Uuid,
        comment_id: Uuid,
    ) -> Result<Post, AppError> {
        let mut post = self.load_active(post_id).await?;
        post.remove_comment(comment_id, actor.id)?;
        self.save(&mut post).await?;

        tracing::info!(
            "User {} removed comment {} from post {}",
            actor.id,
            comment_id,
            post_id
        );
        Ok(post)
    }

    /// 评论点赞开关，返回是否已点赞和点赞数
    pub async fn toggle_comment_like(
        &self,
        actor: &Actor,
        post_id: Uuid,
        comment_id: Uuid,
    ) -> Result<(bool, usize), AppError> {
        let mut post = self.load_active(post_id).await?;
        let liked = post.toggle_comment_like(comment_id, actor.id)?;
        let like_count = post
            .comment(comment_id)
            .map(|comment| comment.likes.len())
            .unwrap_or_default();
        self.save(&mut post).await?;

        Ok((liked, like_count))
    }
}
