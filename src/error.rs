use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::database::StoreError;
use crate::media::MediaError;
use crate::utils::{error_codes, error_to_api_response};

/// 应用统一错误类型
///
/// 业务操作只产生 `Validation`、`NotFound`、`Forbidden`、`Conflict` 四类可预期错误，
/// 其余变体对应认证失败、上传超限以及内部故障。
#[derive(Error, Debug)]
pub enum AppError {
    /// 输入缺失或格式错误
    #[error("{0}")]
    Validation(String),
    /// 引用的用户、群组、帖子或评论不存在或已停用
    #[error("{0}")]
    NotFound(String),
    /// 操作者没有执行该操作的权限
    #[error("{0}")]
    Forbidden(String),
    /// 违反状态机约束，例如重复加入或重复申请
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("storage failure: {0}")]
    Store(#[source] StoreError),
    #[error("media storage failure: {0}")]
    Media(#[source] MediaError),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Store(_) | Self::Media(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Validation(_) => error_codes::VALIDATION_ERROR,
            Self::NotFound(_) => error_codes::NOT_FOUND,
            Self::Forbidden(_) => error_codes::PERMISSION_DENIED,
            Self::Conflict(_) => error_codes::CONFLICT,
            Self::Unauthorized(_) => error_codes::AUTH_FAILED,
            Self::PayloadTooLarge(_) => error_codes::PAYLOAD_TOO_LARGE,
            Self::Store(_) | Self::Media(_) | Self::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            // 内部错误只记录日志，不向客户端暴露细节
            tracing::error!("Internal error: {}", self);
            "Internal server error".to_string()
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
            self.to_string()
        };

        (status, error_to_api_response::<()>(self.code(), message)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(field) => {
                Self::Conflict(format!("A record with this {field} already exists"))
            }
            StoreError::Missing { collection, .. } => {
                Self::NotFound(format!("Referenced {collection} record no longer exists"))
            }
            other => Self::Store(other),
        }
    }
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::UnsupportedType(_) => Self::Validation(err.to_string()),
            MediaError::TooLarge { .. } | MediaError::TooManyFiles(_) => {
                Self::PayloadTooLarge(err.to_string())
            }
            MediaError::Io(_) => Self::Media(err),
        }
    }
}

/// 提取器拒绝请求时按状态码归类
fn rejection(status: StatusCode, body: String) -> AppError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(body)
    } else {
        AppError::Validation(body)
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        rejection(err.status(), err.body_text())
    }
}

impl From<JsonRejection> for AppError {
    fn from(err: JsonRejection) -> Self {
        rejection(err.status(), err.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(err: QueryRejection) -> Self {
        rejection(err.status(), err.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(err: PathRejection) -> Self {
        rejection(err.status(), err.body_text())
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        Self::Internal(format!("password hashing failed: {err}"))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Internal(format!("token signing failed: {err}"))
    }
}
