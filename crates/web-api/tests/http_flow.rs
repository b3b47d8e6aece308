mod support;

use serde_json::{json, Value};

use support::TestServer;

#[tokio::test]
async fn health_endpoint_is_open() {
    let server = TestServer::start().await;
    let response = server
        .http
        .get(server.url("/health"))
        .send()
        .await
        .expect("health");
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn register_validates_and_rejects_duplicates() {
    let server = TestServer::start().await;

    let response = server.register("alice").await;
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["username"], "alice");
    assert_eq!(body["status"], "OFFLINE");
    assert!(body.get("password").is_none());

    let duplicate = server.register("alice").await;
    assert_eq!(duplicate.status(), 409);

    let bad_email = server
        .http
        .post(server.url("/api/auth/register"))
        .json(&json!({"username": "bob", "email": "not-an-email", "password": "secret123"}))
        .send()
        .await
        .expect("register");
    assert_eq!(bad_email.status(), 400);

    let short_password = server
        .http
        .post(server.url("/api/auth/register"))
        .json(&json!({"username": "bob", "email": "bob@example.com", "password": "123"}))
        .send()
        .await
        .expect("register");
    assert_eq!(short_password.status(), 400);
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let server = TestServer::start().await;
    assert_eq!(server.register("alice").await.status(), 201);

    let mut bodies = Vec::new();
    for (username, password) in [("alice", "wrong-password"), ("nobody", "secret123")] {
        let response = server
            .http
            .post(server.url("/api/auth/login"))
            .json(&json!({"username": username, "password": password}))
            .send()
            .await
            .expect("login");
        assert_eq!(response.status(), 401);
        bodies.push(response.json::<Value>().await.expect("json"));
    }
    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(bodies[0]["message"], "Authentication failed");
}

#[tokio::test]
async fn chat_routes_require_a_valid_bearer_token() {
    let server = TestServer::start().await;

    let missing = server
        .http
        .get(server.url("/api/chat/history"))
        .send()
        .await
        .expect("history");
    assert_eq!(missing.status(), 401);

    let bogus = server.get_authed("/api/chat/history", "not-a-token").await;
    assert_eq!(bogus.status(), 401);
    let body: Value = bogus.json().await.expect("json");
    assert_eq!(body["message"], "Authentication failed");

    let (_, token) = server.login_new_user("alice").await;
    let ok = server.get_authed("/api/chat/history", &token).await;
    assert_eq!(ok.status(), 200);
    let history: Value = ok.json().await.expect("json");
    assert_eq!(history, json!([]));
}

#[tokio::test]
async fn logout_invalidates_the_token() {
    let server = TestServer::start().await;
    let (_, token) = server.login_new_user("alice").await;

    let response = server
        .http
        .post(server.url("/api/auth/logout"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("logout");
    assert_eq!(response.status(), 204);

    let after = server.get_authed("/api/chat/users", &token).await;
    assert_eq!(after.status(), 401);

    let again = server
        .http
        .post(server.url("/api/auth/logout"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("logout");
    assert_eq!(again.status(), 401);
}

#[tokio::test]
async fn block_and_unblock_round_trip() {
    let server = TestServer::start().await;
    let (alice_id, token) = server.login_new_user("alice").await;
    let (bob_id, _) = server.login_new_user("bob").await;

    let block = |user_id: i64| {
        server
            .http
            .post(server.url("/api/chat/block"))
            .bearer_auth(&token)
            .json(&json!({ "user_id": user_id }))
            .send()
    };

    let first: Value = block(bob_id).await.expect("block").json().await.expect("json");
    assert_eq!(first["changed"], true);
    let second: Value = block(bob_id).await.expect("block").json().await.expect("json");
    assert_eq!(second["changed"], false);

    assert_eq!(block(alice_id).await.expect("block self").status(), 400);
    assert_eq!(block(9_999).await.expect("block unknown").status(), 404);

    let blocked: Value = server
        .get_authed("/api/chat/blocked", &token)
        .await
        .json()
        .await
        .expect("json");
    assert_eq!(blocked["blocked_user_ids"], json!([bob_id]));

    let unblocked: Value = server
        .http
        .post(server.url("/api/chat/unblock"))
        .bearer_auth(&token)
        .json(&json!({ "user_id": bob_id }))
        .send()
        .await
        .expect("unblock")
        .json()
        .await
        .expect("json");
    assert_eq!(unblocked["changed"], true);

    let blocked: Value = server
        .get_authed("/api/chat/blocked", &token)
        .await
        .json()
        .await
        .expect("json");
    assert_eq!(blocked["blocked_user_ids"], json!([]));
}
