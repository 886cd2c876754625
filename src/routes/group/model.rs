use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::Pagination;
use crate::models::access::is_group_privileged;
use crate::models::group::{GroupSettings, GroupSettingsPatch, JoinRequest, Member};
use crate::models::{Actor, Group, GroupUpdate, JoinOutcome, MemberRole};
use crate::operations::NewGroup;
use crate::routes::user::model::UserSummary;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    pub cover_image: Option<String>,
}

impl From<CreateGroupRequest> for NewGroup {
    fn from(req: CreateGroupRequest) -> Self {
        Self {
            name: req.name,
            description: req.description,
            is_private: req.is_private,
            tags: req.tags,
            cover_image: req.cover_image,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroupRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_private: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub cover_image: Option<String>,
    pub settings: Option<GroupSettingsPatch>,
}

impl From<UpdateGroupRequest> for GroupUpdate {
    fn from(req: UpdateGroupRequest) -> Self {
        Self {
            name: req.name,
            description: req.description,
            is_private: req.is_private,
            tags: req.tags,
            cover_image: req.cover_image,
            settings: req.settings,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

/// 成员条目，`user` 为填充后的用户摘要，用户已不存在时为空
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub user_id: Uuid,
    pub user: Option<UserSummary>,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

impl MemberView {
    fn new(member: &Member, users: &HashMap<Uuid, UserSummary>) -> Self {
        Self {
            user_id: member.user,
            user: users.get(&member.user).cloned(),
            role: member.role,
            joined_at: member.joined_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequestView {
    pub user_id: Uuid,
    pub user: Option<UserSummary>,
    pub requested_at: DateTime<Utc>,
}

impl JoinRequestView {
    pub fn new(request: &JoinRequest, users: &HashMap<Uuid, UserSummary>) -> Self {
        Self {
            user_id: request.user,
            user: users.get(&request.user).cloned(),
            requested_at: request.requested_at,
        }
    }
}

/// 返回给客户端的群组视图，附带当前用户与群组的关系
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupView {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub creator_id: Uuid,
    pub creator: Option<UserSummary>,
    pub members: Vec<MemberView>,
    /// 只有群组管理者能看到待审核申请
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_requests: Option<Vec<JoinRequestView>>,
    pub cover_image: Option<String>,
    pub is_private: bool,
    pub tags: Vec<String>,
    pub member_count: u32,
    pub post_count: u32,
    pub settings: GroupSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_member: bool,
    pub member_role: Option<MemberRole>,
    pub is_admin: bool,
    pub is_creator: bool,
    pub has_pending_request: bool,
}

impl GroupView {
    pub fn new(group: Group, viewer: &Actor, users: &HashMap<Uuid, UserSummary>) -> Self {
        let privileged = is_group_privileged(viewer, &group);
        let pending_requests = privileged.then(|| {
            group
                .pending_requests
                .iter()
                .map(|request| JoinRequestView::new(request, users))
                .collect()
        });

        Self {
            id: group.id,
            creator_id: group.creator,
            creator: users.get(&group.creator).cloned(),
            members: group
                .members
                .iter()
                .map(|member| MemberView::new(member, users))
                .collect(),
            pending_requests,
            is_member: group.is_member(viewer.id),
            member_role: group.member_role(viewer.id),
            is_admin: privileged,
            is_creator: group.creator == viewer.id,
            has_pending_request: group.has_pending_request(viewer.id),
            name: group.name,
            description: group.description,
            cover_image: group.cover_image,
            is_private: group.is_private,
            tags: group.tags,
            member_count: group.member_count,
            post_count: group.post_count,
            settings: group.settings,
            created_at: group.created_at,
            updated_at: group.updated_at,
        }
    }

    /// 构造视图需要填充的用户 id
    pub fn referenced_users(group: &Group, viewer: &Actor) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = group.members.iter().map(|member| member.user).collect();
        ids.push(group.creator);
        if is_group_privileged(viewer, group) {
            ids.extend(group.pending_requests.iter().map(|request| request.user));
        }
        ids
    }
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub status: JoinOutcome,
    pub message: &'static str,
    pub group: GroupView,
}

impl JoinResponse {
    pub fn new(status: JoinOutcome, group: GroupView) -> Self {
        let message = match status {
            JoinOutcome::Joined => "Successfully joined the group",
            JoinOutcome::Pending => "Join request sent to group admins",
        };
        Self {
            status,
            message,
            group,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GroupListResponse {
    pub groups: Vec<GroupView>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteGroupResponse {
    pub message: &'static str,
    pub deactivated_posts: u64,
}
