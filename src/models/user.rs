// 用户实体
// 定义用户文档以及注册、资料相关的校验规则

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::post::MediaRef;

pub const NAME_MIN_CHARS: usize = 2;
pub const NAME_MAX_CHARS: usize = 50;
pub const BIO_MAX_CHARS: usize = 500;
pub const PASSWORD_MIN_CHARS: usize = 6;
pub const GRADUATION_YEARS: std::ops::RangeInclusive<i32> = 2020..=2030;

/// 系统级角色
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemRole {
    #[default]
    User,
    Admin,
}

/// 用户文档
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    /// 小写、唯一，且属于学校邮箱域名
    pub email: String,
    pub password_hash: String,
    pub role: SystemRole,
    pub is_active: bool,
    /// 所在群组的反向引用，以 `Group.members` 为准
    pub groups: Vec<Uuid>,
    pub bio: String,
    pub graduation_year: Option<i32>,
    pub avatar: Option<MediaRef>,
    pub joined_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 操作者身份，授权判断只依赖这两项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: SystemRole,
}

impl Actor {
    pub fn is_system_admin(&self) -> bool {
        self.role == SystemRole::Admin
    }
}

impl User {
    /// 创建新用户，字段需已通过校验，密码需已哈希
    pub fn new(
        name: String,
        email: String,
        password_hash: String,
        graduation_year: Option<i32>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            password_hash,
            role: SystemRole::User,
            is_active: true,
            groups: Vec::new(),
            bio: String::new(),
            graduation_year,
            avatar: None,
            joined_at: now,
            last_active: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            role: self.role,
        }
    }

    /// 记录群组反向引用（集合语义，重复添加无效果）
    pub fn add_group(&mut self, group_id: Uuid) -> bool {
        if self.groups.contains(&group_id) {
            return false;
        }
        self.groups.push(group_id);
        true
    }

    pub fn remove_group(&mut self, group_id: Uuid) -> bool {
        let before = self.groups.len();
        self.groups.retain(|id| *id != group_id);
        before != self.groups.len()
    }

    pub fn touch_last_active(&mut self) {
        self.last_active = Utc::now();
    }
}

pub fn validate_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    let chars = name.chars().count();
    if !(NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&chars) {
        return Err(AppError::validation(format!(
            "Name must be between {NAME_MIN_CHARS} and {NAME_MAX_CHARS} characters"
        )));
    }
    Ok(name.to_string())
}

/// 规范化并校验邮箱：去空白、转小写、格式检查、域名限制
pub fn normalize_email(email: &str, allowed_domain: &str) -> Result<String, AppError> {
    let email = email.trim().to_lowercase();

    let Some((local, domain)) = email.split_once('@') else {
        return Err(AppError::validation("Please provide a valid email address"));
    };
    let local_ok = !local.is_empty()
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._%+-".contains(c));
    let domain_ok = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if !local_ok || !domain_ok {
        return Err(AppError::validation("Please provide a valid email address"));
    }

    if domain != allowed_domain {
        return Err(AppError::validation(format!(
            "Only @{allowed_domain} email addresses are allowed"
        )));
    }

    Ok(email)
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < PASSWORD_MIN_CHARS {
        return Err(AppError::validation(format!(
            "Password must be at least {PASSWORD_MIN_CHARS} characters long"
        )));
    }
    Ok(())
}

pub fn validate_bio(bio: &str) -> Result<String, AppError> {
    let bio = bio.trim();
    if bio.chars().count() > BIO_MAX_CHARS {
        return Err(AppError::validation(format!(
            "Bio cannot be more than {BIO_MAX_CHARS} characters"
        )));
    }
    Ok(bio.to_string())
}

pub fn validate_graduation_year(year: i32) -> Result<i32, AppError> {
    if !GRADUATION_YEARS.contains(&year) {
        return Err(AppError::validation(format!(
            "Graduation year must be between {} and {}",
            GRADUATION_YEARS.start(),
            GRADUATION_YEARS.end()
        )));
    }
    Ok(year)
}
