// 业务操作层
// 每个操作：读取文档 -> 校验权限 -> 调用实体上的命名方法 -> 保存

pub mod group;
pub mod post;
pub mod user;

pub use group::{GroupOperation, NewGroup};
pub use post::{NewPost, PostFilter, PostOperation, PostSort};
pub use user::{Registration, UserOperation};

use uuid::Uuid;

use crate::database::Collection;
use crate::models::User;

/// 成员关系变化后同步用户的群组反向引用
///
/// 以群组成员列表为准，这里失败只记录警告，不影响本次请求的结果。
pub(crate) async fn sync_user_groups(
    users: &dyn Collection<User>,
    user_id: Uuid,
    group_id: Uuid,
    joined: bool,
) {
    let mut user = match users.find_by_id(user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::warn!(
                "Skipping group back-reference sync: user {} does not exist",
                user_id
            );
            return;
        }
        Err(err) => {
            tracing::warn!("Failed to load user {} for group sync: {}", user_id, err);
            return;
        }
    };

    let changed = if joined {
        user.add_group(group_id)
    } else {
        user.remove_group(group_id)
    };
    if !changed {
        return;
    }

    if let Err(err) = users.save(&mut user).await {
        tracing::warn!(
            "Failed to sync group {} on user {}: {}",
            group_id,
            user_id,
            err
        );
    }
}
