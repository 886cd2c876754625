mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use serde_json::json;
use unilink::utils::error_codes;

use common::{Part, TestApp};

#[tokio::test]
async fn health_uses_the_envelope() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::GET, "/api/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["resp_data"]["status"], "OK");
}

#[tokio::test]
async fn register_login_and_me() {
    let app = TestApp::new();
    let asha = app.register("Asha").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "ASHA@srishakthi.ac.in", "password": "secret123" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["resp_data"]["user"].get("passwordHash").is_none());

    let (status, body) = app
        .call(Method::GET, "/api/auth/me", Some(&asha.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"]["user"]["name"], "Asha");
    assert_eq!(body["resp_data"]["groups"], json!([]));

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "asha@srishakthi.ac.in", "password": "wrong-pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], error_codes::AUTH_FAILED);
}

#[tokio::test]
async fn registration_rejects_duplicates_and_foreign_domains() {
    let app = TestApp::new();
    app.register("Asha").await;

    let register = |email: &str| {
        json!({ "name": "Someone", "email": email, "password": "secret123" })
    };
    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/register",
            None,
            Some(register("asha@srishakthi.ac.in")),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], error_codes::CONFLICT);

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/register",
            None,
            Some(register("asha@gmail.com")),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], error_codes::VALIDATION_ERROR);
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let app = TestApp::new();

    let (status, body) = app.call(Method::GET, "/api/groups", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], error_codes::AUTH_FAILED);

    let (status, _) = app
        .call(Method::GET, "/api/groups", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let asha = app.register("Asha").await;
    let (status, _) = app
        .call(Method::DELETE, "/api/auth/deactivate", Some(&asha.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .call(Method::GET, "/api/auth/me", Some(&asha.token), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let app = TestApp::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header("content-type", "application/json")
        .body(Body::from("{ not json"))
        .unwrap();

    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], error_codes::VALIDATION_ERROR);
}

#[tokio::test]
async fn private_group_join_flow() {
    let app = TestApp::new();
    let asha = app.register("Asha").await;
    let bala = app.register("Bala").await;
    let group = app.create_group(&asha, "CS Club", true).await;
    let group_uri = format!("/api/groups/{group}");

    let (status, body) = app
        .call(
            Method::POST,
            &format!("{group_uri}/join"),
            Some(&bala.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"]["status"], "pending");

    let (_, body) = app.call(Method::GET, &group_uri, Some(&bala.token), None).await;
    assert_eq!(body["resp_data"]["isMember"], false);
    assert_eq!(body["resp_data"]["hasPendingRequest"], true);
    assert!(body["resp_data"].get("pendingRequests").is_none());

    let (status, body) = app
        .call(
            Method::GET,
            &format!("{group_uri}/requests"),
            Some(&bala.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], error_codes::PERMISSION_DENIED);

    let (status, body) = app
        .call(
            Method::GET,
            &format!("{group_uri}/requests"),
            Some(&asha.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"][0]["user"]["name"], "Bala");

    let (status, body) = app
        .call(
            Method::POST,
            &format!("{group_uri}/requests/{}/approve", bala.id),
            Some(&asha.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"]["memberCount"], 2);
    assert_eq!(body["resp_data"]["pendingRequests"], json!([]));

    let (_, body) = app
        .call(Method::GET, "/api/auth/me", Some(&bala.token), None)
        .await;
    assert_eq!(body["resp_data"]["groups"][0]["name"], "CS Club");

    let (status, _) = app
        .call(
            Method::DELETE,
            &format!("{group_uri}/members/{}", asha.id),
            Some(&asha.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(
            Method::POST,
            &format!("{group_uri}/leave"),
            Some(&bala.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn member_roles_are_managed_by_privileged_members() {
    let app = TestApp::new();
    let asha = app.register("Asha").await;
    let bala = app.register("Bala").await;
    let chitra = app.register("Chitra").await;
    let group = app.create_group(&asha, "Debate", false).await;
    let members_uri = format!("/api/groups/{group}/members");

    let (status, body) = app
        .call(
            Method::POST,
            &members_uri,
            Some(&asha.token),
            Some(json!({ "userId": bala.id, "role": "moderator" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, _) = app
        .call(
            Method::POST,
            &members_uri,
            Some(&asha.token),
            Some(json!({ "userId": chitra.id, "role": "owner" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/groups/{group}/join"),
            Some(&chitra.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // 版主可以调整其他成员的角色
    let (status, body) = app
        .call(
            Method::PUT,
            &format!("{members_uri}/{}/role", chitra.id),
            Some(&bala.token),
            Some(json!({ "role": "moderator" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"]["members"][2]["role"], "moderator");

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("{members_uri}/{}/role", asha.id),
            Some(&bala.token),
            Some(json!({ "role": "member" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_resources_return_not_found() {
    let app = TestApp::new();
    let asha = app.register("Asha").await;
    let missing = uuid::Uuid::new_v4();

    for uri in [
        format!("/api/groups/{missing}"),
        format!("/api/posts/{missing}"),
    ] {
        let (status, body) = app.call(Method::GET, &uri, Some(&asha.token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], error_codes::NOT_FOUND);
    }

    let (status, body) = app
        .call(Method::GET, "/api/groups/not-a-uuid", Some(&asha.token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], error_codes::VALIDATION_ERROR);
}

#[tokio::test]
async fn posts_with_media_likes_and_comments() {
    let app = TestApp::new();
    let asha = app.register("Asha").await;
    let bala = app.register("Bala").await;
    let outsider = app.register("Chitra").await;
    let group = app.create_group(&asha, "Photography", false).await;
    app.call(
        Method::POST,
        &format!("/api/groups/{group}/join"),
        Some(&bala.token),
        None,
    )
    .await;

    let (status, body) = app
        .multipart(
            "/api/posts",
            &outsider.token,
            &[
                Part::Text("content", "Can I post?"),
                Part::Text("groupId", &group),
            ],
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");

    let (status, body) = app
        .multipart(
            "/api/posts",
            &bala.token,
            &[
                Part::Text("content", "Sunset from the library roof"),
                Part::Text("groupId", &group),
                Part::Text("tags", "sunset, campus"),
                Part::File {
                    name: "media",
                    filename: "sunset.png",
                    content_type: "image/png",
                    bytes: b"\x89PNG fake image",
                },
            ],
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let post = &body["resp_data"];
    let post_id = post["id"].as_str().unwrap().to_string();
    assert_eq!(post["tags"], json!(["sunset", "campus"]));
    assert_eq!(post["media"][0]["type"], "image");
    assert_eq!(post["author"]["name"], "Bala");
    assert_eq!(post["userCanEdit"], true);

    let media_url = post["media"][0]["url"].as_str().unwrap().to_string();
    let (status, _) = app.call(Method::GET, &media_url, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(std::fs::read_dir(app.uploads.path()).unwrap().count(), 1);

    let like_uri = format!("/api/posts/{post_id}/like");
    let (_, body) = app.call(Method::POST, &like_uri, Some(&asha.token), None).await;
    assert_eq!(body["resp_data"]["engagement"]["likeCount"], 1);
    assert_eq!(body["resp_data"]["isLiked"], true);
    let (_, body) = app
        .call(Method::POST, &like_uri, Some(&outsider.token), None)
        .await;
    assert_eq!(body["resp_data"]["engagement"]["likeCount"], 2);
    let (_, body) = app.call(Method::POST, &like_uri, Some(&asha.token), None).await;
    assert_eq!(body["resp_data"]["engagement"]["likeCount"], 1);
    assert_eq!(body["resp_data"]["isLiked"], false);

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/posts/{post_id}/comments"),
            Some(&asha.token),
            Some(json!({ "content": "Beautiful shot!" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let comment_id = body["resp_data"]["commentId"].as_str().unwrap().to_string();
    assert_eq!(body["resp_data"]["post"]["engagement"]["commentCount"], 1);
    assert_eq!(
        body["resp_data"]["post"]["comments"][0]["author"]["name"],
        "Asha"
    );

    let (_, body) = app
        .call(
            Method::POST,
            &format!("/api/posts/{post_id}/comments/{comment_id}/like"),
            Some(&bala.token),
            None,
        )
        .await;
    assert_eq!(body["resp_data"], json!({ "isLiked": true, "likeCount": 1 }));

    let comment_uri = format!("/api/posts/{post_id}/comments/{comment_id}");
    let (status, _) = app
        .call(Method::DELETE, &comment_uri, Some(&outsider.token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    // 帖子作者可以删除别人的评论
    let (status, body) = app
        .call(Method::DELETE, &comment_uri, Some(&bala.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"]["engagement"]["commentCount"], 0);

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/posts?groupId={group}&search=SUNSET"),
            Some(&asha.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"]["pagination"]["total"], 1);
}

#[tokio::test]
async fn rejected_uploads_are_not_stored() {
    let app = TestApp::new();
    let asha = app.register("Asha").await;
    let group = app.create_group(&asha, "Film Society", false).await;

    let (status, body) = app
        .multipart(
            "/api/posts",
            &asha.token,
            &[
                Part::Text("content", "Notes"),
                Part::Text("groupId", &group),
                Part::File {
                    name: "media",
                    filename: "notes.pdf",
                    content_type: "application/pdf",
                    bytes: b"%PDF",
                },
            ],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], error_codes::VALIDATION_ERROR);

    let mut parts = vec![Part::Text("content", "Stills"), Part::Text("groupId", &group)];
    for _ in 0..6 {
        parts.push(Part::File {
            name: "media",
            filename: "still.jpg",
            content_type: "image/jpeg",
            bytes: b"jpeg",
        });
    }
    let (status, body) = app.multipart("/api/posts", &asha.token, &parts).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["code"], error_codes::PAYLOAD_TOO_LARGE);

    // 帖子内容为空时已保存的文件会被清理
    let (status, _) = app
        .multipart(
            "/api/posts",
            &asha.token,
            &[
                Part::Text("content", "   "),
                Part::Text("groupId", &group),
                Part::File {
                    name: "media",
                    filename: "still.jpg",
                    content_type: "image/jpeg",
                    bytes: b"jpeg",
                },
            ],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(std::fs::read_dir(app.uploads.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn deleting_a_group_hides_its_posts() {
    let app = TestApp::new();
    let asha = app.register("Asha").await;
    let bala = app.register("Bala").await;
    let group = app.create_group(&asha, "Robotics", false).await;

    let (_, body) = app
        .multipart(
            "/api/posts",
            &asha.token,
            &[
                Part::Text("content", "Build night on Friday"),
                Part::Text("groupId", &group),
            ],
        )
        .await;
    let post_id = body["resp_data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .call(
            Method::DELETE,
            &format!("/api/groups/{group}"),
            Some(&bala.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(
            Method::DELETE,
            &format!("/api/groups/{group}"),
            Some(&asha.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"]["deactivatedPosts"], 1);

    let (status, _) = app
        .call(
            Method::GET,
            &format!("/api/posts/{post_id}"),
            Some(&asha.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_routes_require_system_admin() {
    let app = TestApp::new();
    let asha = app.register("Asha").await;
    let admin = app.register_admin("Root").await;

    let (status, _) = app
        .call(Method::GET, "/api/auth/users", Some(&asha.token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(
            Method::GET,
            "/api/auth/users?search=asha",
            Some(&admin.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"]["pagination"]["total"], 1);

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/api/auth/users/{}/status", admin.id),
            Some(&admin.token),
            Some(json!({ "isActive": false })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/auth/users/{}/status", asha.id),
            Some(&admin.token),
            Some(json!({ "isActive": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"]["isActive"], false);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "asha@srishakthi.ac.in", "password": "secret123" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
