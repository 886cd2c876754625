use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::{
    AppState,
    media::{MAX_FILE_BYTES, MAX_FILES_PER_POST},
    middleware::{RateLimiter, auth_middleware, log_errors, rate_limit, require_admin},
    routes,
};

/// multipart 请求体中除文件外的其余字段留出的余量
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

// 认证相关的路由
fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(routes::user::me))
        .route("/auth/profile", put(routes::user::update_profile))
        .route("/auth/change-password", put(routes::user::change_password))
        .route(
            "/auth/upload-avatar",
            post(routes::user::upload_avatar)
                .layer(DefaultBodyLimit::max(MAX_FILE_BYTES + MULTIPART_OVERHEAD)),
        )
        .route("/auth/deactivate", delete(routes::user::deactivate_account))
        .route("/auth/directory", get(routes::user::directory))
}

// 系统管理员路由
fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/users", get(routes::user::list_users))
        .route("/auth/users/{id}/status", put(routes::user::set_user_status))
        .route_layer(from_fn(require_admin))
}

// 群组相关的路由
fn group_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/groups",
            get(routes::group::list_groups).post(routes::group::create_group),
        )
        .route(
            "/groups/{id}",
            get(routes::group::get_group)
                .put(routes::group::update_group)
                .delete(routes::group::delete_group),
        )
        .route("/groups/{id}/join", post(routes::group::join_group))
        .route("/groups/{id}/leave", post(routes::group::leave_group))
        .route("/groups/{id}/requests", get(routes::group::list_join_requests))
        .route(
            "/groups/{id}/requests/{user_id}/approve",
            post(routes::group::approve_request),
        )
        .route(
            "/groups/{id}/requests/{user_id}/reject",
            post(routes::group::reject_request),
        )
        .route("/groups/{id}/members", post(routes::group::add_member))
        .route(
            "/groups/{id}/members/{user_id}",
            delete(routes::group::remove_member),
        )
        .route(
            "/groups/{id}/members/{user_id}/role",
            put(routes::group::update_member_role),
        )
}

// 帖子相关的路由
fn post_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/posts",
            get(routes::post::list_posts).post(routes::post::create_post).layer(
                DefaultBodyLimit::max(MAX_FILE_BYTES * MAX_FILES_PER_POST + MULTIPART_OVERHEAD),
            ),
        )
        .route(
            "/posts/{id}",
            get(routes::post::get_post)
                .put(routes::post::update_post)
                .delete(routes::post::delete_post),
        )
        .route("/posts/{id}/like", post(routes::post::toggle_like))
        .route("/posts/{id}/comments", post(routes::post::add_comment))
        .route(
            "/posts/{id}/comments/{comment_id}",
            delete(routes::post::remove_comment),
        )
        .route(
            "/posts/{id}/comments/{comment_id}/like",
            post(routes::post::toggle_comment_like),
        )
        .route("/posts/user/{user_id}", get(routes::post::list_user_posts))
        .route("/posts/group/{group_id}", get(routes::post::list_group_posts))
}

fn cors_layer(client_urls: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = client_urls
        .iter()
        .filter_map(|url| match HeaderValue::from_str(url) {
            Ok(origin) => Some(origin),
            Err(_) => {
                tracing::warn!("Ignoring invalid client url: {}", url);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// 创建主路由
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    // 将路由分为公开路由和受保护路由
    let public_routes = Router::new()
        .route("/health", get(routes::health))
        .route("/auth/register", post(routes::user::register))
        .route("/auth/login", post(routes::user::login));

    let protected_routes = Router::new()
        .merge(auth_routes())
        .merge(admin_routes())
        .merge(group_routes())
        .merge(post_routes())
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    let api = Router::new().merge(public_routes).merge(protected_routes);
    let base = config.api_base_uri.trim_end_matches('/');
    let mut router = if base.is_empty() {
        api
    } else {
        Router::new().nest(base, api)
    };

    router = router.layer(from_fn(log_errors));
    if let Some(redis) = state.redis.clone() {
        let limiter = Arc::new(RateLimiter::new(redis, config.clone()));
        router = router.layer(from_fn_with_state(limiter, rate_limit));
    } else {
        tracing::warn!("REDIS_URL not set, rate limiting is disabled");
    }

    let mut router = router
        .with_state(state)
        .nest_service(&config.upload_base_url, ServeDir::new(&config.upload_dir));

    // 前端构建产物，找不到的路径回退到 index.html
    if let Some(dist) = &config.client_dist_dir {
        tracing::info!("Serving client from {}", dist.display());
        router = router.fallback_service(
            ServeDir::new(dist).fallback(ServeFile::new(dist.join("index.html"))),
        );
    }

    router
        .layer(cors_layer(&config.client_urls))
        .layer(TraceLayer::new_for_http())
}
