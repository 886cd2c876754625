use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::AppState;
use crate::error::AppError;
use crate::models::{Actor, User};
use crate::operations::UserOperation;

/// 认证中间件解析出的当前用户
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn actor(&self) -> Actor {
        self.0.actor()
    }
}

/// 校验 Bearer 令牌，拒绝不存在或已停用的用户
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(TypedHeader(Authorization(bearer))) = bearer else {
        return Err(AppError::unauthorized("Not authorized, no token"));
    };

    let user = UserOperation::new(
        state.stores.clone(),
        state.config.clone(),
        state.media.clone(),
    )
    .authenticate(bearer.token())
    .await?;

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

/// 仅允许系统管理员，需放在认证中间件之后
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let is_admin = request
        .extensions()
        .get::<CurrentUser>()
        .is_some_and(|current| current.actor().is_system_admin());

    if !is_admin {
        return Err(AppError::forbidden("Admin access required"));
    }
    Ok(next.run(request).await)
}
