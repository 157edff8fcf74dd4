//! Socket bridge: turns server-pushed events into store-update commands and
//! carries this client's outgoing events.
//!
//! [`LiveBridge::spawn`] owns one connection at a time and reconnects with
//! exponential backoff until [`LiveHandle::shutdown`] is called. After
//! shutdown returns, no further events reach the store.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_util::sync::CancellationToken;

use crate::api::events::{LiveEvent, OutgoingEvent};
use crate::api::models::{Conversation, TeammatePatch};
use crate::store::{Command, Store};

#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub url: String,
    /// Room joined after every (re)connect.
    pub project_id: Option<String>,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
}

impl LiveConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            project_id: None,
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
        }
    }
}

/// Maps one live event onto the commands it implies.
pub fn translate(event: LiveEvent) -> Vec<Command> {
    match event {
        LiveEvent::SetActiveTeammateStatus(teammate) => vec![Command::UpdateTeammate(TeammatePatch {
            old_email: teammate.email,
            username: Some(teammate.username),
            status: Some("active".to_string()),
            ..TeammatePatch::default()
        })],
        LiveEvent::UpdateTeammateOnlineStatus(presence) => vec![Command::UpdateTeammate(TeammatePatch {
            old_email: presence.email,
            is_online: Some(presence.is_online),
            ..TeammatePatch::default()
        })],
        LiveEvent::AddIncomingMessage(incoming) => {
            let conversation = Conversation::incoming(
                &incoming.client_id,
                incoming.message.clone(),
                &incoming.avatar_name,
                &incoming.avatar_color,
            );
            vec![
                Command::AppendSelectedClientMessage {
                    client_id: incoming.client_id,
                    message: incoming.message,
                },
                Command::AddIncomingConversation(conversation),
            ]
        }
        LiveEvent::MsgToClient(payload) => {
            log::debug!("msgToClient: {payload}");
            Vec::new()
        }
    }
}

fn handle_frame(text: &str, store: &Store) {
    match LiveEvent::parse(text) {
        Ok(event) => {
            let commands = translate(event);
            if !commands.is_empty() {
                store.dispatch_all(commands);
            }
        }
        Err(e) => log::warn!("skipping socket frame: {e}"),
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ServeEnd {
    Shutdown,
    Disconnected,
}

/// Pumps one connection until it drops or `token` is cancelled.
pub(crate) async fn serve<S, K>(
    mut stream: S,
    mut sink: K,
    store: &Store,
    outgoing: &mut mpsc::UnboundedReceiver<OutgoingEvent>,
    token: &CancellationToken,
) -> ServeEnd
where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
    K: Sink<WsMessage> + Unpin,
    K::Error: Display,
{
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                let _ = sink.send(WsMessage::Close(None)).await;
                return ServeEnd::Shutdown;
            }
            Some(event) = outgoing.recv() => {
                match event.to_frame() {
                    Ok(frame) => {
                        if let Err(e) = sink.send(WsMessage::Text(frame)).await {
                            log::warn!("failed to send {}: {e}", event.name());
                            return ServeEnd::Disconnected;
                        }
                    }
                    Err(e) => log::error!("failed to encode {}: {e}", event.name()),
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => handle_frame(&text, store),
                Some(Ok(WsMessage::Close(_))) | None => return ServeEnd::Disconnected,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    log::warn!("socket read failed: {e}");
                    return ServeEnd::Disconnected;
                }
            },
        }
    }
}

async fn run(
    config: LiveConfig,
    store: Store,
    mut outgoing: mpsc::UnboundedReceiver<OutgoingEvent>,
    token: CancellationToken,
) {
    let mut delay = config.reconnect_base_delay;
    while !token.is_cancelled() {
        let connected = tokio::select! {
            _ = token.cancelled() => break,
            connected = connect_async(config.url.as_str()) => connected,
        };
        match connected {
            Ok((ws, _)) => {
                log::info!("socket connected to {}", config.url);
                delay = config.reconnect_base_delay;
                let (mut sink, stream) = ws.split();
                if let Some(project_id) = &config.project_id {
                    let join = OutgoingEvent::JoinRoom(project_id.clone());
                    match join.to_frame() {
                        Ok(frame) => {
                            if let Err(e) = sink.send(WsMessage::Text(frame)).await {
                                log::warn!("failed to join room {project_id}: {e}");
                            }
                        }
                        Err(e) => log::error!("failed to encode joinRoom: {e}"),
                    }
                }
                if serve(stream, sink, &store, &mut outgoing, &token).await == ServeEnd::Shutdown {
                    break;
                }
                log::warn!("socket disconnected, reconnecting in {:?}", delay);
            }
            Err(e) => log::warn!("socket connect to {} failed: {e}; retrying in {:?}", config.url, delay),
        }
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        delay = (delay * 2).min(config.reconnect_max_delay);
    }
    log::info!("socket bridge stopped");
}

/// Handle to a running bridge. Clones share the same connection.
#[derive(Clone)]
pub struct LiveHandle {
    outgoing: mpsc::UnboundedSender<OutgoingEvent>,
    shutdown: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl LiveHandle {
    /// Queues an event; it is sent once a connection is up. Returns `false`
    /// after shutdown.
    pub fn emit(&self, event: OutgoingEvent) -> bool {
        self.outgoing.send(event).is_ok()
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Stops the bridge and waits for it to exit. Safe to call twice.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                log::error!("socket bridge task failed: {e}");
            }
        }
    }
}

pub struct LiveBridge;

impl LiveBridge {
    pub fn spawn(config: LiveConfig, store: Store) -> LiveHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run(config, store, rx, shutdown.clone()));
        LiveHandle {
            outgoing: tx,
            shutdown,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }
}
