#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use unilink::{
    AppState,
    config::Config,
    database::{Collection, Stores},
    media::LocalMediaStorage,
    models::SystemRole,
    router::build_router,
};
use uuid::Uuid;

pub const BOUNDARY: &str = "unilink-test-boundary";

/// 基于内存存储和临时上传目录的完整应用
pub struct TestApp {
    pub router: Router,
    pub stores: Stores,
    pub uploads: TempDir,
}

pub struct TestUser {
    pub id: Uuid,
    pub token: String,
}

/// multipart 表单中的一个部分
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        filename: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
}

impl TestApp {
    pub fn new() -> Self {
        let uploads = tempfile::tempdir().unwrap();
        let config = Arc::new(Config {
            bcrypt_cost: 4,
            upload_dir: uploads.path().to_path_buf(),
            ..Config::default()
        });
        let stores = Stores::memory();
        let state = AppState {
            stores: stores.clone(),
            config: config.clone(),
            redis: None,
            media: Arc::new(LocalMediaStorage::from_config(&config)),
        };

        Self {
            router: build_router(state),
            stores,
            uploads,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn multipart(
        &self,
        uri: &str,
        token: &str,
        parts: &[Part<'_>],
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        self.send(request).await
    }

    pub async fn register(&self, name: &str) -> TestUser {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(serde_json::json!({
                    "name": name,
                    "email": format!("{}@srishakthi.ac.in", name.to_lowercase()),
                    "password": "secret123",
                    "graduationYear": 2026,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");

        TestUser {
            id: body["resp_data"]["user"]["id"]
                .as_str()
                .unwrap()
                .parse()
                .unwrap(),
            token: body["resp_data"]["token"].as_str().unwrap().to_string(),
        }
    }

    pub async fn register_admin(&self, name: &str) -> TestUser {
        let user = self.register(name).await;
        let mut stored = self.stores.users.find_by_id(user.id).await.unwrap().unwrap();
        stored.role = SystemRole::Admin;
        self.stores.users.save(&mut stored).await.unwrap();
        user
    }

    /// 创建群组并返回其 id
    pub async fn create_group(&self, owner: &TestUser, name: &str, is_private: bool) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/groups",
                Some(&owner.token),
                Some(serde_json::json!({
                    "name": name,
                    "description": format!("{name} at campus"),
                    "isPrivate": is_private,
                    "tags": ["campus"],
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["resp_data"]["id"].as_str().unwrap().to_string()
    }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File {
                name,
                filename,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}
