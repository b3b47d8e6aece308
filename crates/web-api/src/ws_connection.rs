use application::{ChatSessionPipeline, ClientEvent, Flow, Outbound};
use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage, WebSocket};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::state::AppState;

/// 驱动单个 WebSocket 连接
///
/// 写方向由独立任务串行消费连接的出站队列，读方向把帧交给会话管线。
/// 任一方向结束后关闭管线，完成在线状态清理。
pub async fn run(socket: WebSocket, state: AppState, token: Option<String>) {
    let (sender, mut incoming) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let mut pipeline = ChatSessionPipeline::open(state.chat_context.clone(), outbound_tx);
    let connection_id = pipeline.connection_id();
    let mut writer = tokio::spawn(write_outbound(sender, outbound_rx));
    let mut writer_finished = false;

    let mut flow = Flow::Continue;
    if let Some(token) = token {
        flow = pipeline.handle_event(ClientEvent::Auth { token }).await;
    }

    while matches!(flow, Flow::Continue) {
        tokio::select! {
            frame = incoming.next() => {
                flow = match frame {
                    Some(Ok(WsMessage::Text(text))) => pipeline.handle_text(text.as_str()).await,
                    Some(Ok(WsMessage::Binary(_))) => pipeline.handle_binary(),
                    Some(Ok(WsMessage::Ping(payload))) => {
                        pipeline.handle_ping(payload.to_vec());
                        Flow::Continue
                    }
                    Some(Ok(WsMessage::Pong(_))) => Flow::Continue,
                    Some(Ok(WsMessage::Close(_))) | None => Flow::Close,
                    Some(Err(err)) => {
                        tracing::debug!(connection_id = %connection_id, error = %err, "websocket read failed");
                        Flow::Close
                    }
                };
            }
            _ = &mut writer => {
                writer_finished = true;
                flow = Flow::Close;
            }
        }
    }

    // 注销后出站队列的发送端被释放，写任务排空剩余消息后退出
    pipeline.close().await;
    if !writer_finished {
        if let Err(err) = writer.await {
            tracing::warn!(connection_id = %connection_id, error = %err, "websocket writer task failed");
        }
    }
}

async fn write_outbound(
    mut sender: SplitSink<WebSocket, WsMessage>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(message) = outbound.recv().await {
        let frame = match message {
            Outbound::Text(text) => WsMessage::Text(text.as_ref().into()),
            Outbound::Pong(payload) => WsMessage::Pong(payload.into()),
            Outbound::Close(reason) => {
                let _ = sender
                    .send(WsMessage::Close(Some(CloseFrame {
                        code: close_code::POLICY,
                        reason: reason.into(),
                    })))
                    .await;
                break;
            }
        };
        if sender.send(frame).await.is_err() {
            tracing::debug!("websocket write failed");
            break;
        }
    }
    let _ = sender.close().await;
}
