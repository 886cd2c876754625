// 用户操作
// 注册、登录、资料维护以及管理员对账号的启用/停用

use std::sync::Arc;

use uuid::Uuid;

use super::GroupOperation;
use crate::common::{Page, PageRequest, Pagination};
use crate::config::Config;
use crate::database::{DocQuery, SearchField, Stores};
use crate::error::AppError;
use crate::media::{MediaStorage, MediaUpload};
use crate::models::user::{
    normalize_email, validate_bio, validate_graduation_year, validate_name, validate_password,
};
use crate::models::{Actor, Group, MediaKind, User};
use crate::utils::{generate_token, hash_password, verify_password, verify_token};

/// 注册输入
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub graduation_year: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub graduation_year: Option<i32>,
}

/// 登录或注册成功后的会话
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub token: String,
    pub expires_at: i64,
}

pub struct UserOperation {
    stores: Stores,
    config: Arc<Config>,
    media: Arc<dyn MediaStorage>,
}

impl UserOperation {
    pub fn new(stores: Stores, config: Arc<Config>, media: Arc<dyn MediaStorage>) -> Self {
        Self {
            stores,
            config,
            media,
        }
    }

    async fn load(&self, user_id: Uuid) -> Result<User, AppError> {
        self.stores
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let query = DocQuery::default()
            .filter(serde_json::json!({ "email": email }))
            .page(0, 1);
        Ok(self.stores.users.find(&query).await?.into_iter().next())
    }

    fn session(&self, user: User) -> Result<Session, AppError> {
        let (token, expires_at) = generate_token(user.id, &self.config)?;
        Ok(Session {
            user,
            token,
            expires_at,
        })
    }

    pub async fn register(&self, input: Registration) -> Result<Session, AppError> {
        let name = validate_name(&input.name)?;
        let email = normalize_email(&input.email, &self.config.allowed_email_domain)?;
        validate_password(&input.password)?;
        let graduation_year = input
            .graduation_year
            .map(validate_graduation_year)
            .transpose()?;

        if self.find_by_email(&email).await?.is_some() {
            return Err(AppError::conflict("User already exists with this email"));
        }

        let password_hash = hash_password(&input.password, self.config.bcrypt_cost)?;
        let mut user = User::new(name, email, password_hash, graduation_year);
        self.stores.users.create(&mut user).await?;

        tracing::info!("Registered user {} ({})", user.id, user.email);
        self.session(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let email = email.trim().to_lowercase();
        let Some(mut user) = self.find_by_email(&email).await? else {
            tracing::warn!("Login attempt for unknown email {}", email);
            return Err(AppError::unauthorized("Invalid credentials"));
        };

        if !user.is_active {
            return Err(AppError::unauthorized(
                "Account is deactivated. Please contact support.",
            ));
        }
        if !verify_password(password, &user.password_hash)? {
            tracing::warn!("Wrong password for user {}", user.id);
            return Err(AppError::unauthorized("Invalid credentials"));
        }

        user.touch_last_active();
        self.stores.users.save(&mut user).await?;

        tracing::info!("User {} logged in", user.id);
        self.session(user)
    }

    /// 校验令牌并读取对应的活跃用户
    pub async fn authenticate(&self, token: &str) -> Result<User, AppError> {
        let claims = verify_token(token, &self.config).map_err(|err| {
            tracing::debug!("Rejected token: {}", err);
            AppError::unauthorized("Not authorized, token failed")
        })?;
        let user_id = claims
            .user_id()
            .ok_or_else(|| AppError::unauthorized("Not authorized, token failed"))?;

        match self.stores.users.find_by_id(user_id).await? {
            Some(user) if user.is_active => Ok(user),
            Some(_) => Err(AppError::unauthorized("Account is deactivated")),
            None => Err(AppError::unauthorized("User not found")),
        }
    }

    /// 当前用户资料及其所在群组（只包含未停用的群组）
    pub async fn me(&self, actor: &Actor) -> Result<(User, Vec<Group>), AppError> {
        let user = self.load(actor.id).await?;
        let groups = GroupOperation::new(self.stores.clone())
            .find_active_by_ids(&user.groups)
            .await?;
        Ok((user, groups))
    }

    pub async fn update_profile(
        &self,
        actor: &Actor,
        update: ProfileUpdate,
    ) -> Result<User, AppError> {
        let name = update.name.as_deref().map(validate_name).transpose()?;
        let bio = update.bio.as_deref().map(validate_bio).transpose()?;
        let graduation_year = update
            .graduation_year
            .map(validate_graduation_year)
            .transpose()?;

        let mut user = self.load(actor.id).await?;
        if let Some(name) = name {
            user.name = name;
        }
        if let Some(bio) = bio {
            user.bio = bio;
        }
        if let Some(year) = graduation_year {
            user.graduation_year = Some(year);
        }
        self.stores.users.save(&mut user).await?;

        tracing::info!("User {} updated profile", user.id);
        Ok(user)
    }

    pub async fn change_password(
        &self,
        actor: &Actor,
        current: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        if current.is_empty() {
            return Err(AppError::validation("Current password is required"));
        }
        validate_password(new_password)?;

        let mut user = self.load(actor.id).await?;
        if !verify_password(current, &user.password_hash)? {
            return Err(AppError::validation("Current password is incorrect"));
        }

        user.password_hash = hash_password(new_password, self.config.bcrypt_cost)?;
        self.stores.users.save(&mut user).await?;

        tracing::info!("User {} changed password", user.id);
        Ok(())
    }

    /// 上传头像，旧头像尽力删除
    pub async fn upload_avatar(&self, actor: &Actor, upload: MediaUpload) -> Result<User, AppError> {
        let (kind, _) = upload.inspect()?;
        if kind != MediaKind::Image {
            return Err(AppError::validation("Avatar must be an image"));
        }

        let mut user = self.load(actor.id).await?;
        let avatar = self.media.store(upload).await?;
        let previous = user.avatar.replace(avatar.clone());

        if let Err(err) = self.stores.users.save(&mut user).await {
            if let Err(cleanup) = self.media.delete(&avatar.public_id).await {
                tracing::warn!("Failed to clean up avatar {}: {}", avatar.public_id, cleanup);
            }
            return Err(err.into());
        }

        if let Some(previous) = previous {
            if let Err(err) = self.media.delete(&previous.public_id).await {
                tracing::warn!(
                    "Failed to delete previous avatar {}: {}",
                    previous.public_id,
                    err
                );
            }
        }

        tracing::info!("User {} uploaded avatar {}", user.id, avatar.public_id);
        Ok(user)
    }

    pub async fn deactivate_account(&self, actor: &Actor) -> Result<(), AppError> {
        let mut user = self.load(actor.id).await?;
        user.is_active = false;
        self.stores.users.save(&mut user).await?;

        tracing::info!("User {} deactivated their account", user.id);
        Ok(())
    }

    /// 活跃用户目录，按注册时间倒序
    pub async fn directory(&self, page: PageRequest) -> Result<Page<User>, AppError> {
        self.page_users(DocQuery::active(), page).await
    }

    pub async fn list_users(
        &self,
        actor: &Actor,
        page: PageRequest,
        search: Option<String>,
    ) -> Result<Page<User>, AppError> {
        if !actor.is_system_admin() {
            return Err(AppError::forbidden("Admin access required"));
        }

        // 管理员列表包含已停用的账号
        let query = DocQuery::default().search(
            search,
            &[SearchField::Text("name"), SearchField::Text("email")],
        );
        self.page_users(query, page).await
    }

    pub async fn set_user_active(
        &self,
        actor: &Actor,
        user_id: Uuid,
        is_active: bool,
    ) -> Result<User, AppError> {
        if !actor.is_system_admin() {
            return Err(AppError::forbidden("Admin access required"));
        }
        if actor.id == user_id && !is_active {
            return Err(AppError::validation("You cannot deactivate your own account"));
        }

        let mut user = self.load(user_id).await?;
        user.is_active = is_active;
        self.stores.users.save(&mut user).await?;

        tracing::info!(
            "Admin {} set user {} active = {}",
            actor.id,
            user_id,
            is_active
        );
        Ok(user)
    }

    /// 按 id 批量读取用户，用于视图中展示作者和成员信息
    pub async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>, AppError> {
        Ok(self.stores.users.find_by_ids(ids).await?)
    }

    async fn page_users(&self, query: DocQuery, page: PageRequest) -> Result<Page<User>, AppError> {
        let total = self.stores.users.count(&query).await?;
        let items = self
            .stores
            .users
            .find(&query.page(page.skip(), page.limit))
            .await?;
        Ok(Page {
            items,
            pagination: Pagination::new(page, total),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::LocalMediaStorage;
    use crate::models::SystemRole;
    use crate::operations::NewGroup;
    use axum::body::Bytes;

    struct Harness {
        stores: Stores,
        ops: UserOperation,
        uploads: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let uploads = tempfile::tempdir().unwrap();
        let config = Arc::new(Config {
            bcrypt_cost: 4,
            ..Config::default()
        });
        let stores = Stores::memory();
        let media = Arc::new(LocalMediaStorage::new(uploads.path(), "/uploads"));
        Harness {
            ops: UserOperation::new(stores.clone(), config, media),
            stores,
            uploads,
        }
    }

    fn registration(email: &str) -> Registration {
        Registration {
            name: "Asha Kumar".into(),
            email: email.into(),
            password: "secret1".into(),
            graduation_year: Some(2026),
        }
    }

    fn png(len: usize) -> MediaUpload {
        MediaUpload {
            filename: Some("me.png".into()),
            content_type: Some("image/png".into()),
            bytes: Bytes::from(vec![1u8; len]),
        }
    }

    #[tokio::test]
    async fn register_then_login() {
        let h = harness();
        let session = h
            .ops
            .register(registration(" Asha@Srishakthi.ac.in "))
            .await
            .unwrap();
        assert_eq!(session.user.email, "asha@srishakthi.ac.in");
        assert_ne!(session.user.password_hash, "secret1");

        let user = h.ops.authenticate(&session.token).await.unwrap();
        assert_eq!(user.id, session.user.id);

        let login = h
            .ops
            .login("ASHA@srishakthi.ac.in", "secret1")
            .await
            .unwrap();
        assert_eq!(login.user.id, session.user.id);

        assert!(matches!(
            h.ops.login("asha@srishakthi.ac.in", "wrong-pass").await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            h.ops.login("nobody@srishakthi.ac.in", "secret1").await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let h = harness();
        h.ops
            .register(registration("asha@srishakthi.ac.in"))
            .await
            .unwrap();
        assert!(matches!(
            h.ops.register(registration("ASHA@srishakthi.ac.in")).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn registration_validates_fields() {
        let h = harness();
        assert!(matches!(
            h.ops.register(registration("asha@gmail.com")).await,
            Err(AppError::Validation(_))
        ));

        let mut short_password = registration("asha@srishakthi.ac.in");
        short_password.password = "12345".into();
        assert!(matches!(
            h.ops.register(short_password).await,
            Err(AppError::Validation(_))
        ));

        let mut bad_year = registration("asha@srishakthi.ac.in");
        bad_year.graduation_year = Some(1999);
        assert!(matches!(
            h.ops.register(bad_year).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn deactivated_accounts_cannot_log_in_or_authenticate() {
        let h = harness();
        let session = h
            .ops
            .register(registration("asha@srishakthi.ac.in"))
            .await
            .unwrap();
        h.ops
            .deactivate_account(&session.user.actor())
            .await
            .unwrap();

        assert!(matches!(
            h.ops.login("asha@srishakthi.ac.in", "secret1").await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            h.ops.authenticate(&session.token).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn change_password_checks_current() {
        let h = harness();
        let session = h
            .ops
            .register(registration("asha@srishakthi.ac.in"))
            .await
            .unwrap();
        let actor = session.user.actor();

        assert!(matches!(
            h.ops.change_password(&actor, "nope", "newsecret").await,
            Err(AppError::Validation(_))
        ));
        h.ops
            .change_password(&actor, "secret1", "newsecret")
            .await
            .unwrap();
        h.ops
            .login("asha@srishakthi.ac.in", "newsecret")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn profile_update_is_validated() {
        let h = harness();
        let session = h
            .ops
            .register(registration("asha@srishakthi.ac.in"))
            .await
            .unwrap();
        let actor = session.user.actor();

        assert!(matches!(
            h.ops
                .update_profile(
                    &actor,
                    ProfileUpdate {
                        bio: Some("x".repeat(501)),
                        ..ProfileUpdate::default()
                    },
                )
                .await,
            Err(AppError::Validation(_))
        ));

        let user = h
            .ops
            .update_profile(
                &actor,
                ProfileUpdate {
                    name: Some(" Asha K ".into()),
                    bio: Some("Robotics and chess".into()),
                    graduation_year: Some(2027),
                },
            )
            .await
            .unwrap();
        assert_eq!(user.name, "Asha K");
        assert_eq!(user.bio, "Robotics and chess");
        assert_eq!(user.graduation_year, Some(2027));
    }

    #[tokio::test]
    async fn avatar_replaces_previous_file() {
        let h = harness();
        let session = h
            .ops
            .register(registration("asha@srishakthi.ac.in"))
            .await
            .unwrap();
        let actor = session.user.actor();

        let first = h.ops.upload_avatar(&actor, png(8)).await.unwrap();
        let first_id = first.avatar.unwrap().public_id;
        let first_path = h.uploads.path().join(&first_id);
        assert!(first_path.exists());

        let second = h.ops.upload_avatar(&actor, png(12)).await.unwrap();
        let second_avatar = second.avatar.unwrap();
        assert_eq!(second_avatar.size, 12);
        assert!(!first_path.exists());

        let video = MediaUpload {
            filename: Some("clip.mp4".into()),
            content_type: Some("video/mp4".into()),
            bytes: Bytes::from_static(b"mp4"),
        };
        assert!(matches!(
            h.ops.upload_avatar(&actor, video).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn admin_moderation_of_accounts() {
        let h = harness();
        let admin_session = h
            .ops
            .register(registration("root@srishakthi.ac.in"))
            .await
            .unwrap();
        let mut admin = admin_session.user;
        admin.role = SystemRole::Admin;
        h.stores.users.save(&mut admin).await.unwrap();
        let student = h
            .ops
            .register(registration("asha@srishakthi.ac.in"))
            .await
            .unwrap()
            .user;

        assert!(matches!(
            h.ops
                .list_users(&student.actor(), PageRequest::default(), None)
                .await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            h.ops
                .set_user_active(&admin.actor(), admin.id, false)
                .await,
            Err(AppError::Validation(_))
        ));

        let found = h
            .ops
            .list_users(&admin.actor(), PageRequest::default(), Some("asha@".into()))
            .await
            .unwrap();
        assert_eq!(found.pagination.total, 1);

        let disabled = h
            .ops
            .set_user_active(&admin.actor(), student.id, false)
            .await
            .unwrap();
        assert!(!disabled.is_active);
        let directory = h.ops.directory(PageRequest::default()).await.unwrap();
        assert_eq!(directory.pagination.total, 1);
    }

    #[tokio::test]
    async fn me_lists_only_active_groups() {
        let h = harness();
        let user = h
            .ops
            .register(registration("asha@srishakthi.ac.in"))
            .await
            .unwrap()
            .user;
        let groups = GroupOperation::new(h.stores.clone());
        let club = groups
            .create_group(
                &user.actor(),
                NewGroup {
                    name: "CS Club".into(),
                    ..NewGroup::default()
                },
            )
            .await
            .unwrap();
        let choir = groups
            .create_group(
                &user.actor(),
                NewGroup {
                    name: "Choir".into(),
                    ..NewGroup::default()
                },
            )
            .await
            .unwrap();
        groups.delete_group(&user.actor(), choir.id).await.unwrap();

        let (me, listed) = h.ops.me(&user.actor()).await.unwrap();
        assert!(me.groups.contains(&choir.id));
        assert_eq!(
            listed.iter().map(|group| group.id).collect::<Vec<_>>(),
            vec![club.id]
        );
    }

    #[tokio::test]
    async fn find_by_ids_skips_unknown_ids() {
        let h = harness();
        let asha = h
            .ops
            .register(registration("asha@srishakthi.ac.in"))
            .await
            .unwrap()
            .user;

        let found = h.ops.find_by_ids(&[asha.id, Uuid::new_v4()]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, asha.id);
        assert!(h.ops.find_by_ids(&[]).await.unwrap().is_empty());
    }
}
