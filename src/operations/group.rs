// 群组操作
// 成员关系的每次变化都先保存群组，再尽力同步用户的反向引用

use serde_json::json;
use uuid::Uuid;

use super::sync_user_groups;
use crate::common::{Page, PageRequest, Pagination};
use crate::database::{DocQuery, SearchField, Stores};
use crate::error::AppError;
use crate::models::access::{can_delete_group, is_group_privileged};
use crate::models::group::JoinRequest;
use crate::models::{Actor, Group, GroupUpdate, JoinOutcome, MemberRole};

const GROUP_SEARCH_FIELDS: &[SearchField] = &[
    SearchField::Text("name"),
    SearchField::Text("description"),
    SearchField::TextArray("tags"),
];

/// 创建群组的输入
#[derive(Debug, Clone, Default)]
pub struct NewGroup {
    pub name: String,
    pub description: String,
    pub is_private: bool,
    pub tags: Vec<String>,
    pub cover_image: Option<String>,
}

pub struct GroupOperation {
    stores: Stores,
}

impl GroupOperation {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// 读取未停用的群组
    pub async fn load_active(&self, group_id: Uuid) -> Result<Group, AppError> {
        self.stores
            .groups
            .find_active(group_id)
            .await?
            .ok_or_else(|| AppError::not_found("Group not found"))
    }

    async fn load_privileged(&self, actor: &Actor, group_id: Uuid) -> Result<Group, AppError> {
        let group = self.load_active(group_id).await?;
        if !is_group_privileged(actor, &group) {
            tracing::warn!(
                "User {} lacks privileges on group {}",
                actor.id,
                group_id
            );
            return Err(AppError::forbidden("Not authorized to manage this group"));
        }
        Ok(group)
    }

    async fn save(&self, group: &mut Group) -> Result<(), AppError> {
        self.stores.groups.save(group).await?;
        Ok(())
    }

    pub async fn create_group(&self, actor: &Actor, input: NewGroup) -> Result<Group, AppError> {
        tracing::debug!("User {} is creating group: {}", actor.id, input.name);

        let mut group = Group::new(
            actor.id,
            &input.name,
            &input.description,
            input.is_private,
            input.tags,
        )?;
        if let Some(cover_image) = input.cover_image {
            group.apply_update(GroupUpdate {
                cover_image: Some(cover_image),
                ..GroupUpdate::default()
            })?;
        }
        self.stores.groups.create(&mut group).await?;
        sync_user_groups(self.stores.users.as_ref(), actor.id, group.id, true).await;

        tracing::info!("User {} created group {} ({})", actor.id, group.id, group.name);
        Ok(group)
    }

    /// 申请加入：公开群直接加入，私密群等待审核
    pub async fn request_join(
        &self,
        actor: &Actor,
        group_id: Uuid,
    ) -> Result<(JoinOutcome, Group), AppError> {
        tracing::debug!("User {} requests to join group {}", actor.id, group_id);

        let mut group = self.load_active(group_id).await?;
        let outcome = group.request_join(actor.id)?;
        self.save(&mut group).await?;

        if outcome == JoinOutcome::Joined {
            sync_user_groups(self.stores.users.as_ref(), actor.id, group.id, true).await;
        }
        tracing::info!(
            "User {} join request on group {}: {:?}",
            actor.id,
            group_id,
            outcome
        );
        Ok((outcome, group))
    }

    pub async fn approve_request(
        &self,
        actor: &Actor,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Group, AppError> {
        let mut group = self.load_privileged(actor, group_id).await?;
        group.approve_join_request(user_id)?;
        self.save(&mut group).await?;
        sync_user_groups(self.stores.users.as_ref(), user_id, group.id, true).await;

        tracing::info!(
            "User {} approved {} into group {}",
            actor.id,
            user_id,
            group_id
        );
        Ok(group)
    }

    pub async fn reject_request(
        &self,
        actor: &Actor,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Group, AppError> {
        let mut group = self.load_privileged(actor, group_id).await?;
        group.reject_join_request(user_id)?;
        self.save(&mut group).await?;

        tracing::info!(
            "User {} rejected the request of {} for group {}",
            actor.id,
            user_id,
            group_id
        );
        Ok(group)
    }

    pub async fn list_join_requests(
        &self,
        actor: &Actor,
        group_id: Uuid,
    ) -> Result<Vec<JoinRequest>, AppError> {
        let group = self.load_privileged(actor, group_id).await?;
        Ok(group.pending_requests)
    }

    pub async fn leave_group(&self, actor: &Actor, group_id: Uuid) -> Result<Group, AppError> {
        let mut group = self.load_active(group_id).await?;
        group.remove_member(actor.id)?;
        self.save(&mut group).await?;
        sync_user_groups(self.stores.users.as_ref(), actor.id, group.id, false).await;

        tracing::info!("User {} left group {}", actor.id, group_id);
        Ok(group)
    }

    /// 直接添加成员，只能授予 member 或 moderator 角色
    pub async fn add_member(
        &self,
        actor: &Actor,
        group_id: Uuid,
        user_id: Uuid,
        role: MemberRole,
    ) -> Result<Group, AppError> {
        if role == MemberRole::Admin {
            return Err(AppError::validation(
                "Members can only be added as member or moderator",
            ));
        }

        let mut group = self.load_privileged(actor, group_id).await?;
        self.stores
            .users
            .find_active(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        group.add_member(user_id, role)?;
        self.save(&mut group).await?;
        sync_user_groups(self.stores.users.as_ref(), user_id, group.id, true).await;

        tracing::info!(
            "User {} added {} to group {} as {}",
            actor.id,
            user_id,
            group_id,
            role
        );
        Ok(group)
    }

    pub async fn remove_member(
        &self,
        actor: &Actor,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Group, AppError> {
        let mut group = self.load_active(group_id).await?;
        // 创建者不可移除，这一条优先于权限判断
        if user_id == group.creator {
            return Err(AppError::forbidden("Cannot remove the group creator"));
        }
        if !is_group_privileged(actor, &group) {
            return Err(AppError::forbidden(
                "Not authorized to remove members from this group",
            ));
        }

        group.remove_member(user_id)?;
        self.save(&mut group).await?;
        sync_user_groups(self.stores.users.as_ref(), user_id, group.id, false).await;

        tracing::info!(
            "User {} removed {} from group {}",
            actor.id,
            user_id,
            group_id
        );
        Ok(group)
    }

    pub async fn update_member_role(
        &self,
        actor: &Actor,
        group_id: Uuid,
        user_id: Uuid,
        role: MemberRole,
    ) -> Result<Group, AppError> {
        let mut group = self.load_privileged(actor, group_id).await?;
        group.update_member_role(user_id, role)?;
        self.save(&mut group).await?;

        tracing::info!(
            "User {} set role of {} in group {} to {}",
            actor.id,
            user_id,
            group_id,
            role
        );
        Ok(group)
    }

    pub async fn get_group(&self, group_id: Uuid) -> Result<Group, AppError> {
        self.load_active(group_id).await
    }

    /// 分页列出未停用的群组，按创建时间倒序
    pub async fn list_groups(
        &self,
        page: PageRequest,
        search: Option<String>,
    ) -> Result<Page<Group>, AppError> {
        let query = DocQuery::active().search(search, GROUP_SEARCH_FIELDS);
        let total = self.stores.groups.count(&query).await?;
        let items = self
            .stores
            .groups
            .find(&query.page(page.skip(), page.limit))
            .await?;

        Ok(Page {
            items,
            pagination: Pagination::new(page, total),
        })
    }

    /// 按 id 批量读取未停用的群组，用于用户资料中的群组摘要
    pub async fn find_active_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Group>, AppError> {
        let groups = self.stores.groups.find_by_ids(ids).await?;
        Ok(groups.into_iter().filter(|group| group.is_active).collect())
    }

    pub async fn update_group(
        &self,
        actor: &Actor,
        group_id: Uuid,
        update: GroupUpdate,
    ) -> Result<Group, AppError> {
        let mut group = self.load_privileged(actor, group_id).await?;
        group.apply_update(update)?;
        self.save(&mut group).await?;

        tracing::info!("User {} updated group {}", actor.id, group_id);
        Ok(group)
    }

    /// 软删除群组，然后显式停用群内所有帖子，返回被停用的帖子数
    pub async fn delete_group(&self, actor: &Actor, group_id: Uuid) -> Result<u64, AppError> {
        let mut group = self.load_active(group_id).await?;
        if !can_delete_group(actor, &group) {
            return Err(AppError::forbidden("Not authorized to delete this group"));
        }

        group.deactivate();
        self.save(&mut group).await?;

        let deactivated = self
            .stores
            .posts
            .deactivate_matching(&json!({ "group": group.id }))
            .await?;

        tracing::info!(
            "User {} deleted group {}, {} posts deactivated",
            actor.id,
            group_id,
            deactivated
        );
        Ok(deactivated)
    }
}
