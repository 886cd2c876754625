// 群组实体
// 成员列表和入群申请列表归群组所有，所有修改都经过下面的命名方法，保证不变量只在一处维护

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::normalize_tags;

pub const NAME_MIN_CHARS: usize = 2;
pub const NAME_MAX_CHARS: usize = 100;
pub const DESCRIPTION_MAX_CHARS: usize = 500;

/// 群内角色
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    #[default]
    Member,
    Moderator,
    Admin,
}

impl FromStr for MemberRole {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "member" => Ok(Self::Member),
            "moderator" => Ok(Self::Moderator),
            "admin" => Ok(Self::Admin),
            _ => Err(AppError::validation(
                "Role must be member, moderator, or admin",
            )),
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Member => "member",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub user: Uuid,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub user: Uuid,
    pub requested_at: DateTime<Utc>,
}

/// 群组设置，目前只做展示用途
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSettings {
    pub allow_member_posts: bool,
    pub require_approval: bool,
    pub allow_comments: bool,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            allow_member_posts: true,
            require_approval: false,
            allow_comments: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSettingsPatch {
    pub allow_member_posts: Option<bool>,
    pub require_approval: Option<bool>,
    pub allow_comments: Option<bool>,
}

/// 群组资料的部分更新
#[derive(Debug, Clone, Default)]
pub struct GroupUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_private: Option<bool>,
    pub tags: Option<Vec<String>>,
    /// 空字符串表示清除封面
    pub cover_image: Option<String>,
    pub settings: Option<GroupSettingsPatch>,
}

/// 群组文档
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// 创建者，永远是角色为 admin 的成员
    pub creator: Uuid,
    pub members: Vec<Member>,
    pub pending_requests: Vec<JoinRequest>,
    pub cover_image: Option<String>,
    pub is_private: bool,
    pub is_active: bool,
    pub tags: Vec<String>,
    /// 由成员列表长度推导
    pub member_count: u32,
    pub post_count: u32,
    pub settings: GroupSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 申请加入的结果：公开群直接加入，私密群进入待审核
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinOutcome {
    Joined,
    Pending,
}

/// 用户与群组之间的关系状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipState {
    None,
    Pending,
    Member,
}

impl Group {
    /// 创建群组，创建者自动成为第一个成员（admin）
    pub fn new(
        creator: Uuid,
        name: &str,
        description: &str,
        is_private: bool,
        tags: Vec<String>,
    ) -> Result<Self, AppError> {
        let now = Utc::now();
        let mut group = Self {
            id: Uuid::new_v4(),
            name: validate_name(name)?,
            description: validate_description(description)?,
            creator,
            members: vec![Member {
                user: creator,
                role: MemberRole::Admin,
                joined_at: now,
            }],
            pending_requests: Vec::new(),
            cover_image: None,
            is_private,
            is_active: true,
            tags: normalize_tags(tags)?,
            member_count: 0,
            post_count: 0,
            settings: GroupSettings::default(),
            created_at: now,
            updated_at: now,
        };
        group.refresh_member_count();
        Ok(group)
    }

    pub fn member(&self, user: Uuid) -> Option<&Member> {
        self.members.iter().find(|member| member.user == user)
    }

    pub fn member_role(&self, user: Uuid) -> Option<MemberRole> {
        self.member(user).map(|member| member.role)
    }

    pub fn is_member(&self, user: Uuid) -> bool {
        self.member(user).is_some()
    }

    pub fn has_pending_request(&self, user: Uuid) -> bool {
        self.pending_requests.iter().any(|request| request.user == user)
    }

    pub fn membership_state(&self, user: Uuid) -> MembershipState {
        if self.is_member(user) {
            MembershipState::Member
        } else if self.has_pending_request(user) {
            MembershipState::Pending
        } else {
            MembershipState::None
        }
    }

    /// 用户申请加入：公开群直接成为成员，私密群登记待审核申请
    pub fn request_join(&mut self, user: Uuid) -> Result<JoinOutcome, AppError> {
        if self.is_private {
            self.add_join_request(user)?;
            Ok(JoinOutcome::Pending)
        } else {
            self.add_member(user, MemberRole::Member)?;
            Ok(JoinOutcome::Joined)
        }
    }

    /// 直接添加成员，同一用户的待审核申请会被一并移除
    pub fn add_member(&mut self, user: Uuid, role: MemberRole) -> Result<(), AppError> {
        if self.is_member(user) {
            return Err(AppError::conflict(
                "User is already a member of this group",
            ));
        }

        self.pending_requests.retain(|request| request.user != user);
        self.members.push(Member {
            user,
            role,
            joined_at: Utc::now(),
        });
        self.refresh_member_count();
        Ok(())
    }

    pub fn add_join_request(&mut self, user: Uuid) -> Result<(), AppError> {
        match self.membership_state(user) {
            MembershipState::Member => Err(AppError::conflict(
                "User is already a member of this group",
            )),
            MembershipState::Pending => Err(AppError::conflict("Join request already pending")),
            MembershipState::None => {
                self.pending_requests.push(JoinRequest {
                    user,
                    requested_at: Utc::now(),
                });
                Ok(())
            }
        }
    }

    /// 通过申请：移出待审核列表并以 member 角色加入
    pub fn approve_join_request(&mut self, user: Uuid) -> Result<(), AppError> {
        self.take_join_request(user)?;
        if !self.is_member(user) {
            self.members.push(Member {
                user,
                role: MemberRole::Member,
                joined_at: Utc::now(),
            });
            self.refresh_member_count();
        }
        Ok(())
    }

    pub fn reject_join_request(&mut self, user: Uuid) -> Result<(), AppError> {
        self.take_join_request(user).map(|_| ())
    }

    /// 移除成员，创建者永远不能被移除
    pub fn remove_member(&mut self, user: Uuid) -> Result<(), AppError> {
        if user == self.creator {
            return Err(AppError::forbidden("Cannot remove the group creator"));
        }

        let index = self
            .members
            .iter()
            .position(|member| member.user == user)
            .ok_or_else(|| AppError::not_found("User is not a member of this group"))?;
        self.members.remove(index);
        self.refresh_member_count();
        Ok(())
    }

    /// 修改成员角色，创建者的 admin 角色不可变更
    pub fn update_member_role(&mut self, user: Uuid, role: MemberRole) -> Result<(), AppError> {
        if user == self.creator && role != MemberRole::Admin {
            return Err(AppError::forbidden("Cannot change the group creator's role"));
        }

        let member = self
            .members
            .iter_mut()
            .find(|member| member.user == user)
            .ok_or_else(|| AppError::not_found("User is not a member of this group"))?;
        member.role = role;
        Ok(())
    }

    pub fn apply_update(&mut self, update: GroupUpdate) -> Result<(), AppError> {
        // 先全部校验，避免部分字段已修改后才报错
        let name = update.name.as_deref().map(validate_name).transpose()?;
        let description = update
            .description
            .as_deref()
            .map(validate_description)
            .transpose()?;
        let tags = update.tags.map(normalize_tags).transpose()?;

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(description) = description {
            self.description = description;
        }
        if let Some(tags) = tags {
            self.tags = tags;
        }
        if let Some(is_private) = update.is_private {
            self.is_private = is_private;
        }
        if let Some(cover_image) = update.cover_image {
            let cover_image = cover_image.trim();
            self.cover_image = (!cover_image.is_empty()).then(|| cover_image.to_string());
        }
        if let Some(patch) = update.settings {
            if let Some(value) = patch.allow_member_posts {
                self.settings.allow_member_posts = value;
            }
            if let Some(value) = patch.require_approval {
                self.settings.require_approval = value;
            }
            if let Some(value) = patch.allow_comments {
                self.settings.allow_comments = value;
            }
        }
        Ok(())
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    pub fn record_post_created(&mut self) {
        self.post_count = self.post_count.saturating_add(1);
    }

    pub fn record_post_removed(&mut self) {
        self.post_count = self.post_count.saturating_sub(1);
    }

    /// 成员数永远从列表长度重新计算，不做增量维护
    pub fn refresh_member_count(&mut self) {
        self.member_count = u32::try_from(self.members.len()).unwrap_or(u32::MAX);
    }

    fn take_join_request(&mut self, user: Uuid) -> Result<JoinRequest, AppError> {
        let index = self
            .pending_requests
            .iter()
            .position(|request| request.user == user)
            .ok_or_else(|| AppError::not_found("No pending request for this user"))?;
        Ok(self.pending_requests.remove(index))
    }
}

fn validate_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    let chars = name.chars().count();
    if !(NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&chars) {
        return Err(AppError::validation(format!(
            "Group name must be between {NAME_MIN_CHARS} and {NAME_MAX_CHARS} characters"
        )));
    }
    Ok(name.to_string())
}

fn validate_description(description: &str) -> Result<String, AppError> {
    let description = description.trim();
    if description.chars().count() > DESCRIPTION_MAX_CHARS {
        return Err(AppError::validation(format!(
            "Description cannot be more than {DESCRIPTION_MAX_CHARS} characters"
        )));
    }
    Ok(description.to_string())
}
