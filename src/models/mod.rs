pub mod access;
pub mod group;
pub mod post;
pub mod user;

pub use group::{Group, GroupUpdate, JoinOutcome, MemberRole, MembershipState};
pub use post::{Comment, MediaKind, MediaRef, Post, PostUpdate, Visibility};
pub use user::{Actor, SystemRole, User};

use crate::error::AppError;

pub const TAG_MAX_CHARS: usize = 30;

/// 标签去除首尾空白，丢弃空标签，单个标签不超过 30 个字符
pub fn normalize_tags(tags: Vec<String>) -> Result<Vec<String>, AppError> {
    let mut normalized = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() {
            continue;
        }
        if tag.chars().count() > TAG_MAX_CHARS {
            return Err(AppError::validation(format!(
                "Tag cannot be more than {TAG_MAX_CHARS} characters"
            )));
        }
        normalized.push(tag.to_string());
    }
    Ok(normalized)
}
