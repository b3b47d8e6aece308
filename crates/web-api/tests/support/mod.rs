#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    memory::{InMemoryBlockRepository, InMemoryMessageRepository, InMemoryUserRepository},
    BroadcastHub, ChatContext, ChatService, ChatServiceDependencies, ChatSettings, Clock,
    PresenceRegistry, SessionStore, SharedContentFilter, SystemClock, UserService,
    UserServiceDependencies,
};
use domain::ContentFilter;
use futures_util::{SinkExt, StreamExt};
use infrastructure::BcryptPasswordHasher;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot, time::timeout};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const FRAME_TIMEOUT: Duration = Duration::from_secs(3);

/// 内存仓储上启动的完整 HTTP/WebSocket 服务
pub struct TestServer {
    pub addr: SocketAddr,
    pub http: Client,
    pub context: Arc<ChatContext>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(ChatSettings::default()).await
    }

    pub async fn start_with(settings: ChatSettings) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let users = Arc::new(InMemoryUserRepository::new());
        let sessions = Arc::new(SessionStore::new(clock.clone(), chrono::Duration::minutes(60)));
        let hub = Arc::new(BroadcastHub::new(
            Arc::new(PresenceRegistry::new()),
            clock.clone(),
        ));

        let user_service = Arc::new(UserService::new(UserServiceDependencies {
            user_repository: users.clone(),
            password_hasher: Arc::new(BcryptPasswordHasher::new(4)),
            clock: clock.clone(),
            sessions: sessions.clone(),
        }));
        let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
            message_repository: Arc::new(InMemoryMessageRepository::new()),
            block_repository: Arc::new(InMemoryBlockRepository::new()),
            user_repository: users,
            filter: Arc::new(SharedContentFilter::new(ContentFilter::with_defaults())),
            clock: clock.clone(),
            settings,
        }));

        let context = Arc::new(ChatContext {
            sessions,
            hub,
            chat: chat_service,
            users: user_service,
            clock,
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(AppState::new(context.clone()));

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            http: Client::new(),
            context,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub async fn register(&self, username: &str) -> reqwest::Response {
        self.http
            .post(self.url("/api/auth/register"))
            .json(&json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": "secret123",
            }))
            .send()
            .await
            .expect("register request")
    }

    /// 注册并登录，返回 `(user_id, token)`
    pub async fn login_new_user(&self, username: &str) -> (i64, String) {
        let response = self.register(username).await;
        assert_eq!(response.status(), 201, "register {username}");

        let body: Value = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&json!({ "username": username, "password": "secret123" }))
            .send()
            .await
            .expect("login request")
            .json()
            .await
            .expect("login json");
        let user_id = body["user"]["id"].as_i64().expect("user id");
        let token = body["token"].as_str().expect("token").to_string();
        (user_id, token)
    }

    pub async fn get_authed(&self, path: &str, token: &str) -> reqwest::Response {
        self.http
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("get request")
    }

    pub async fn connect(&self) -> WsClient {
        let (ws, _) = connect_async(self.ws_url()).await.expect("websocket connect");
        ws
    }

    /// 连接并完成认证，消费掉 `auth_success` 与随后的 `user_list`
    pub async fn connect_authenticated(&self, token: &str) -> WsClient {
        let mut ws = self.connect().await;
        send_json(&mut ws, json!({ "type": "auth", "token": token })).await;
        let auth = next_json(&mut ws).await;
        assert_eq!(auth["type"], "auth_success", "unexpected frame: {auth}");
        let list = next_json(&mut ws).await;
        assert_eq!(list["type"], "user_list", "unexpected frame: {list}");
        ws
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn send_json(ws: &mut WsClient, value: Value) {
    send_text(ws, &value.to_string()).await;
}

pub async fn send_text(ws: &mut WsClient, text: &str) {
    ws.send(TungsteniteMessage::Text(text.to_owned().into()))
        .await
        .expect("send frame");
}

/// 读取下一条文本帧并解析为 JSON，跳过控制帧
pub async fn next_json(ws: &mut WsClient) -> Value {
    loop {
        let frame = timeout(FRAME_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        match frame {
            TungsteniteMessage::Text(text) => {
                return serde_json::from_str(text.as_str()).expect("frame json")
            }
            TungsteniteMessage::Ping(_) | TungsteniteMessage::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// 读取帧直到出现指定类型
pub async fn next_of_type(ws: &mut WsClient, kind: &str) -> Value {
    loop {
        let value = next_json(ws).await;
        if value["type"] == kind {
            return value;
        }
    }
}

/// 在短时间内没有任何文本帧到达
pub async fn assert_silent(ws: &mut WsClient) {
    match timeout(Duration::from_millis(300), ws.next()).await {
        Err(_) => {}
        Ok(Some(Ok(TungsteniteMessage::Text(text)))) => panic!("unexpected frame: {text}"),
        Ok(other) => panic!("unexpected stream state: {other:?}"),
    }
}
