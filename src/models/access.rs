// 授权判断
// 所有判断都是只依赖数据的纯函数，不涉及存储和 HTTP

use uuid::Uuid;

use crate::models::group::{Group, MemberRole};
use crate::models::post::Post;
use crate::models::user::{Actor, SystemRole};

/// 群组特权判断：群内管理员/版主、群组创建者或系统管理员
pub fn is_privileged(
    member_role: Option<MemberRole>,
    is_creator: bool,
    system_role: SystemRole,
) -> bool {
    matches!(member_role, Some(MemberRole::Admin | MemberRole::Moderator))
        || is_creator
        || system_role == SystemRole::Admin
}

pub fn is_group_privileged(actor: &Actor, group: &Group) -> bool {
    is_privileged(
        group.member_role(actor.id),
        group.creator == actor.id,
        actor.role,
    )
}

/// 发帖和浏览群内帖子：群成员或系统管理员
pub fn can_participate(actor: &Actor, group: &Group) -> bool {
    group.is_member(actor.id) || actor.is_system_admin()
}

/// 删除群组：仅创建者或系统管理员
pub fn can_delete_group(actor: &Actor, group: &Group) -> bool {
    group.creator == actor.id || actor.is_system_admin()
}

/// 编辑、删除帖子：作者或系统管理员
pub fn can_modify_post(actor: &Actor, post: &Post) -> bool {
    post.author == actor.id || actor.is_system_admin()
}

/// 删除评论：评论作者或帖子作者
pub fn can_remove_comment(actor_id: Uuid, comment_author: Uuid, post_author: Uuid) -> bool {
    actor_id == comment_author || actor_id == post_author
}
