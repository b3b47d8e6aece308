mod support;

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;

use support::{assert_silent, next_json, next_of_type, send_json, send_text, TestServer};

#[tokio::test]
async fn events_before_auth_are_rejected_but_connection_stays_open() {
    let server = TestServer::start().await;
    let (_, token) = server.login_new_user("alice").await;
    let mut ws = server.connect().await;

    send_json(&mut ws, json!({"type": "chat", "content": "sneaky"})).await;
    let frame = next_json(&mut ws).await;
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["message"], "authentication required");

    send_json(&mut ws, json!({"type": "auth", "token": token})).await;
    let frame = next_json(&mut ws).await;
    assert_eq!(frame["type"], "auth_success");
    assert_eq!(frame["username"], "alice");
}

#[tokio::test]
async fn invalid_token_gets_an_error_then_the_socket_closes() {
    let server = TestServer::start().await;
    let mut ws = server.connect().await;

    send_json(&mut ws, json!({"type": "auth", "token": "bogus"})).await;
    let frame = next_json(&mut ws).await;
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["message"], "Authentication failed");

    match ws.next().await {
        Some(Ok(TungsteniteMessage::Close(_))) | None | Some(Err(_)) => {}
        other => panic!("expected close, got {other:?}"),
    }
}

#[tokio::test]
async fn token_in_query_authenticates_on_connect() {
    let server = TestServer::start().await;
    let (user_id, token) = server.login_new_user("alice").await;

    let url = format!("{}?token={}", server.ws_url(), token);
    let (mut ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("connect");
    let frame = next_json(&mut ws).await;
    assert_eq!(frame["type"], "auth_success");
    assert_eq!(frame["user_id"], user_id);
}

#[tokio::test]
async fn public_chat_is_filtered_broadcast_and_persisted() {
    let server = TestServer::start().await;
    let (_, alice_token) = server.login_new_user("alice").await;
    let (_, bob_token) = server.login_new_user("bob").await;

    let mut alice = server.connect_authenticated(&alice_token).await;
    let mut bob = server.connect_authenticated(&bob_token).await;

    let joined = next_of_type(&mut alice, "user_joined").await;
    assert_eq!(joined["username"], "bob");
    assert_eq!(joined["online_count"], 2);

    send_json(&mut alice, json!({"type": "chat", "content": "you are stupid"})).await;
    let frame = next_json(&mut bob).await;
    assert_eq!(frame["type"], "message");
    assert_eq!(frame["message"]["content"], "you are ******");
    assert_eq!(frame["message"]["sender_username"], "alice");
    assert_eq!(frame["message"]["type"], "PUBLIC");
    assert_silent(&mut alice).await;

    send_json(&mut alice, json!({"type": "chat", "content": "call 13800138000"})).await;
    let frame = next_json(&mut bob).await;
    assert_eq!(frame["message"]["content"], "call [已过滤]");

    let history: Value = server
        .get_authed("/api/chat/history", &bob_token)
        .await
        .json()
        .await
        .expect("history json");
    let contents: Vec<&str> = history
        .as_array()
        .expect("array")
        .iter()
        .map(|m| m["content"].as_str().expect("content"))
        .collect();
    assert_eq!(contents, vec!["you are ******", "call [已过滤]"]);
}

#[tokio::test]
async fn private_messages_reach_only_both_parties() {
    let server = TestServer::start().await;
    let (alice_id, alice_token) = server.login_new_user("alice").await;
    let (bob_id, bob_token) = server.login_new_user("bob").await;
    let (_, carol_token) = server.login_new_user("carol").await;

    let mut alice = server.connect_authenticated(&alice_token).await;
    let mut bob = server.connect_authenticated(&bob_token).await;
    let mut carol = server.connect_authenticated(&carol_token).await;
    next_of_type(&mut alice, "user_joined").await;
    next_of_type(&mut alice, "user_joined").await;
    next_of_type(&mut bob, "user_joined").await;

    send_json(
        &mut alice,
        json!({"type": "private", "receiver_id": bob_id, "content": "just for you"}),
    )
    .await;

    for ws in [&mut bob, &mut alice] {
        let frame = next_of_type(ws, "private_message").await;
        assert_eq!(frame["message"]["content"], "just for you");
        assert_eq!(frame["message"]["sender_id"], alice_id);
        assert_eq!(frame["message"]["receiver_id"], bob_id);
    }
    assert_silent(&mut carol).await;

    let conversation: Value = server
        .get_authed(&format!("/api/chat/private/{alice_id}"), &bob_token)
        .await
        .json()
        .await
        .expect("private json");
    assert_eq!(conversation.as_array().expect("array").len(), 1);

    send_json(
        &mut alice,
        json!({"type": "private", "receiver_id": 9_999, "content": "anyone there"}),
    )
    .await;
    let frame = next_of_type(&mut alice, "error").await;
    assert_eq!(frame["message"], "user not found");
}

#[tokio::test]
async fn sender_can_recall_within_the_window() {
    let server = TestServer::start().await;
    let (_, alice_token) = server.login_new_user("alice").await;
    let (_, bob_token) = server.login_new_user("bob").await;

    let mut alice = server.connect_authenticated(&alice_token).await;
    let mut bob = server.connect_authenticated(&bob_token).await;
    next_of_type(&mut alice, "user_joined").await;

    send_json(&mut alice, json!({"type": "chat", "content": "oops wrong window"})).await;
    let frame = next_of_type(&mut bob, "message").await;
    let message_id = frame["message"]["id"].as_i64().expect("message id");

    send_json(&mut bob, json!({"type": "recall", "message_id": message_id})).await;
    let frame = next_of_type(&mut bob, "error").await;
    assert_eq!(frame["message"], "only the sender may recall this message");

    send_json(&mut alice, json!({"type": "recall", "message_id": message_id})).await;
    let frame = next_of_type(&mut bob, "message_recalled").await;
    assert_eq!(frame["message_id"], message_id);

    let history: Value = server
        .get_authed("/api/chat/history", &bob_token)
        .await
        .json()
        .await
        .expect("history json");
    assert_eq!(history, json!([]));
}

#[tokio::test]
async fn status_changes_and_disconnects_are_announced() {
    let server = TestServer::start().await;
    let (alice_id, alice_token) = server.login_new_user("alice").await;
    let (_, bob_token) = server.login_new_user("bob").await;

    let mut alice = server.connect_authenticated(&alice_token).await;
    let mut bob = server.connect_authenticated(&bob_token).await;
    next_of_type(&mut alice, "user_joined").await;

    send_json(&mut alice, json!({"type": "status", "status": "BUSY"})).await;
    let frame = next_of_type(&mut bob, "status_update").await;
    assert_eq!(frame["user_id"], alice_id);
    assert_eq!(frame["status"], "BUSY");

    let users: Value = server
        .get_authed("/api/chat/users", &bob_token)
        .await
        .json()
        .await
        .expect("users json");
    assert_eq!(users[0]["username"], "alice");
    assert_eq!(users[0]["status"], "BUSY");
    assert_eq!(users[1]["username"], "bob");

    bob.close(None).await.expect("close");
    let frame = next_of_type(&mut alice, "user_left").await;
    assert_eq!(frame["username"], "bob");
    assert_eq!(frame["online_count"], 1);
}

#[tokio::test]
async fn malformed_frames_get_a_generic_error() {
    let server = TestServer::start().await;
    let (_, token) = server.login_new_user("alice").await;
    let mut ws = server.connect_authenticated(&token).await;

    send_text(&mut ws, "{not json").await;
    let frame = next_json(&mut ws).await;
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["message"], "invalid message format");

    send_json(&mut ws, json!({"type": "teleport"})).await;
    let frame = next_json(&mut ws).await;
    assert_eq!(frame["message"], "invalid message format");

    send_json(&mut ws, json!({"type": "auth", "token": token})).await;
    let frame = next_json(&mut ws).await;
    assert_eq!(frame["message"], "already authenticated");
}
