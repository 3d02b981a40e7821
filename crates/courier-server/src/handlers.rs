//! Bridge handlers for the Courier server.
//!
//! A transport adapter connects over WebSocket, says `Hello`, then streams
//! transport events. Commands for the connections it opened are written
//! back on the same socket.

use crate::config::Config;
use crate::engine::{self, EngineHandle, SessionRegistry};
use crate::metrics::{self, SessionMetricsGuard};
use anyhow::{bail, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use bytes::BytesMut;
use courier_core::Broker;
use courier_protocol::{
    frames::error_codes, ConnectionId, Event, Frame, FrameCodec, PROTOCOL_VERSION,
};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Shared server state.
pub struct AppState {
    /// The broker engine.
    pub engine: EngineHandle,
    /// Outbound queues of live sessions, by AMQP connection.
    pub sessions: SessionRegistry,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state and spawn the broker engine.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let sessions = SessionRegistry::default();
        let (engine, _task) = engine::spawn(
            Broker::with_config(config.broker_config()),
            sessions.clone(),
        );

        Self {
            engine,
            sessions,
            config,
        }
    }
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.bridge.path, get(bridge_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let path = config.bridge.path.clone();
    let state = Arc::new(AppState::new(config));

    let listener = TcpListener::bind(addr).await?;

    info!("Courier server listening on {}", addr);
    info!("Bridge endpoint: ws://{}{}", addr, path);

    axum::serve(listener, app(state)).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Broker statistics handler.
async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.engine.stats().await {
        Ok(stats) => axum::Json(stats).into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

/// WebSocket upgrade handler.
async fn bridge_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_bridge(socket, state))
}

/// Handle a bridge session.
async fn handle_bridge(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = SessionMetricsGuard::new();

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();
    let mut session = Session::new(state.clone(), outbound_tx);
    let codec = FrameCodec::new(state.config.bridge.max_frame_size);
    debug!(session = %session.id, "Bridge connected");

    let (mut sender, mut receiver) = socket.split();
    let mut read_buffer = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            biased;

            Some(frame) = outbound_rx.recv() => {
                let closing = matches!(frame, Frame::Error { .. }) && session.closing;
                match codec.encode(&frame) {
                    Ok(data) => {
                        if sender.send(Message::Binary(data.to_vec())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(session = %session.id, error = %e, frame = frame.kind(), "Failed to encode frame");
                        metrics::record_error("encode");
                    }
                }
                if closing {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        read_buffer.extend_from_slice(&data);
                        loop {
                            match codec.decode_from(&mut read_buffer) {
                                Ok(Some(frame)) => session.on_frame(frame),
                                Ok(None) => break,
                                Err(e) => {
                                    warn!(session = %session.id, error = %e, "Malformed frame");
                                    metrics::record_error("decode");
                                    session.fail(error_codes::MALFORMED_FRAME, e.to_string());
                                    break;
                                }
                            }
                            if session.closing {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Text(_))) => {
                        session.fail(error_codes::MALFORMED_FRAME, "Text messages are not supported");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        debug!(session = %session.id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(session = %session.id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(session = %session.id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    session.close();
}

/// Per-socket bridge state.
struct Session {
    id: String,
    state: Arc<AppState>,
    outbound: mpsc::UnboundedSender<Frame>,
    ready: bool,
    closing: bool,
    /// Connections opened through this session and not yet closed.
    connections: HashSet<ConnectionId>,
}

impl Session {
    fn new(state: Arc<AppState>, outbound: mpsc::UnboundedSender<Frame>) -> Self {
        Self {
            id: format!("session-{}", Uuid::new_v4()),
            state,
            outbound,
            ready: false,
            closing: false,
            connections: HashSet::new(),
        }
    }

    fn reply(&self, frame: Frame) {
        // The receiver lives as long as the socket loop.
        let _ = self.outbound.send(frame);
    }

    /// Report a fatal error and end the session once it is written.
    fn fail(&mut self, code: u16, message: impl Into<String>) {
        self.closing = true;
        self.reply(Frame::error(code, message));
    }

    fn on_frame(&mut self, frame: Frame) {
        match frame {
            Frame::Hello { version } => self.on_hello(version),
            Frame::Event { event } if self.ready && !self.owns(&event) => {
                warn!(session = %self.id, connection = %event.connection(), event = event.kind(), "Event for connection not opened by this session");
                metrics::record_error("unowned_connection");
                self.reply(Frame::error(
                    error_codes::UNEXPECTED_FRAME,
                    format!("Connection {} is not open on this session", event.connection()),
                ));
            }
            Frame::Event { event } if self.ready => {
                if let Err(e) = self.on_event(event) {
                    error!(session = %self.id, error = %e, "Event submission failed");
                    self.fail(error_codes::UNEXPECTED_FRAME, e.to_string());
                }
            }
            Frame::Ping { timestamp } => self.reply(Frame::pong(timestamp)),
            Frame::Pong { .. } => {}
            other => {
                warn!(session = %self.id, frame = other.kind(), ready = self.ready, "Unexpected frame");
                metrics::record_error("unexpected_frame");
                self.reply(Frame::error(
                    error_codes::UNEXPECTED_FRAME,
                    format!("Unexpected {} frame", other.kind()),
                ));
            }
        }
    }

    fn on_hello(&mut self, offered: courier_protocol::Version) {
        if self.ready {
            warn!(session = %self.id, "Duplicate hello");
            return;
        }

        match PROTOCOL_VERSION.negotiate(&offered) {
            Some(version) => {
                self.ready = true;
                info!(session = %self.id, version = %version, "Bridge ready");
                self.reply(Frame::ready(self.id.clone(), version));
            }
            None => {
                warn!(session = %self.id, offered = %offered, "Incompatible bridge version");
                self.fail(
                    error_codes::INCOMPATIBLE_VERSION,
                    format!("Unsupported version {offered}, server speaks {PROTOCOL_VERSION}"),
                );
            }
        }
    }

    /// Whether the event's connection was opened through this session.
    fn owns(&self, event: &Event) -> bool {
        matches!(event, Event::ConnectionOpening { .. })
            || self.connections.contains(event.connection())
    }

    fn on_event(&mut self, event: Event) -> Result<()> {
        match &event {
            Event::ConnectionOpening { connection } => {
                let claimed = self
                    .state
                    .sessions
                    .get(connection)
                    .is_some_and(|owner| !owner.same_channel(&self.outbound));
                if claimed {
                    bail!("Connection {connection} belongs to another session");
                }
                self.connections.insert(connection.clone());
            }
            Event::ConnectionClosing { connection }
            | Event::ConnectionDisconnected { connection } => {
                self.connections.remove(connection);
            }
            _ => {}
        }

        self.state.engine.submit_from(event, &self.outbound)?;
        Ok(())
    }

    /// Tear down connections the adapter left open.
    fn close(self) {
        for connection in self.connections {
            debug!(session = %self.id, connection = %connection, "Synthesizing disconnect");
            if self
                .state
                .engine
                .submit_from(Event::ConnectionDisconnected { connection }, &self.outbound)
                .is_err()
            {
                break;
            }
        }
        debug!(session = %self.id, "Bridge disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_protocol::{codec, Command, LinkId, Role, Terminus, TerminusKind, Version};
    use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

    async fn serve() -> (Arc<AppState>, String) {
        let state = Arc::new(AppState::new(Config::default()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = app(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (state, format!("ws://{addr}/bridge"))
    }

    async fn send(client: &mut Client, frame: &Frame) {
        let data = codec::encode(frame).unwrap();
        client
            .send(tungstenite::Message::Binary(data.to_vec()))
            .await
            .unwrap();
    }

    async fn recv(client: &mut Client) -> Frame {
        loop {
            match client.next().await {
                Some(Ok(tungstenite::Message::Binary(data))) => return codec::decode(&data).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("Expected frame, got {:?}", other),
            }
        }
    }

    async fn handshake(url: &str) -> Client {
        let (mut client, _) = connect_async(url).await.unwrap();
        send(&mut client, &Frame::hello()).await;
        assert!(matches!(recv(&mut client).await, Frame::Ready { .. }));
        client
    }

    #[tokio::test]
    async fn test_incompatible_version_rejected() {
        let (_state, url) = serve().await;
        let (mut client, _) = connect_async(&url).await.unwrap();

        send(&mut client, &Frame::Hello { version: Version::new(9, 0) }).await;
        match recv(&mut client).await {
            Frame::Error { code, .. } => assert_eq!(code, error_codes::INCOMPATIBLE_VERSION),
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_event_before_hello_rejected() {
        let (_state, url) = serve().await;
        let (mut client, _) = connect_async(&url).await.unwrap();

        send(
            &mut client,
            &Frame::event(Event::ConnectionOpening {
                connection: "conn-1".into(),
            }),
        )
        .await;
        match recv(&mut client).await {
            Frame::Error { code, .. } => assert_eq!(code, error_codes::UNEXPECTED_FRAME),
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (_state, url) = serve().await;
        let mut client = handshake(&url).await;

        send(&mut client, &Frame::Ping { timestamp: Some(42) }).await;
        assert_eq!(recv(&mut client).await, Frame::pong(Some(42)));
    }

    #[tokio::test]
    async fn test_connection_opening_round_trip() {
        let (_state, url) = serve().await;
        let mut client = handshake(&url).await;

        send(
            &mut client,
            &Frame::event(Event::ConnectionOpening {
                connection: "conn-1".into(),
            }),
        )
        .await;
        match recv(&mut client).await {
            Frame::Command {
                command: Command::OfferCapabilities { capabilities, .. },
            } => assert_eq!(capabilities.len(), 1),
            other => panic!("Expected capabilities, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_session_end_tears_down_connections() {
        let (state, url) = serve().await;
        let mut client = handshake(&url).await;

        send(
            &mut client,
            &Frame::event(Event::ConnectionOpening {
                connection: "conn-1".into(),
            }),
        )
        .await;
        let _offer = recv(&mut client).await;
        send(
            &mut client,
            &Frame::event(Event::LinkOpening {
                link: LinkId::new("conn-1", "consumer"),
                role: Role::Sender,
                source: Terminus::address(TerminusKind::Source, "q1"),
                target: Terminus::default(),
                credit: 0,
            }),
        )
        .await;
        let _source = recv(&mut client).await;
        assert_eq!(state.engine.stats().await.unwrap().link_count, 1);

        client.close(None).await.unwrap();
        drop(client);

        let mut stats = state.engine.stats().await.unwrap();
        for _ in 0..50 {
            if stats.link_count == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            stats = state.engine.stats().await.unwrap();
        }
        assert_eq!(stats.link_count, 0);
        assert_eq!(stats.router.queue_count, 0);
        assert!(state.sessions.is_empty());
    }

    async fn wait_for_links(state: &AppState, expected: usize) -> courier_core::BrokerStats {
        let mut stats = state.engine.stats().await.unwrap();
        for _ in 0..50 {
            if stats.link_count == expected {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            stats = state.engine.stats().await.unwrap();
        }
        stats
    }

    #[tokio::test]
    async fn test_event_on_unopened_connection_rejected() {
        let (state, url) = serve().await;
        let mut client = handshake(&url).await;

        send(
            &mut client,
            &Frame::event(Event::LinkOpening {
                link: LinkId::new("conn-x", "consumer"),
                role: Role::Sender,
                source: Terminus::address(TerminusKind::Source, "q1"),
                target: Terminus::default(),
                credit: 0,
            }),
        )
        .await;
        match recv(&mut client).await {
            Frame::Error { code, .. } => assert_eq!(code, error_codes::UNEXPECTED_FRAME),
            other => panic!("Expected error, got {:?}", other),
        }

        // The session stays usable.
        send(&mut client, &Frame::Ping { timestamp: Some(7) }).await;
        assert_eq!(recv(&mut client).await, Frame::pong(Some(7)));

        client.close(None).await.unwrap();
        drop(client);

        let stats = wait_for_links(&state, 0).await;
        assert_eq!(stats.link_count, 0);
        assert_eq!(stats.router.queue_count, 0);
    }

    #[tokio::test]
    async fn test_foreign_connection_left_alone() {
        let (state, url) = serve().await;
        let mut owner = handshake(&url).await;
        let mut intruder = handshake(&url).await;

        send(
            &mut owner,
            &Frame::event(Event::ConnectionOpening {
                connection: "conn-1".into(),
            }),
        )
        .await;
        let _offer = recv(&mut owner).await;
        send(
            &mut owner,
            &Frame::event(Event::LinkOpening {
                link: LinkId::new("conn-1", "consumer"),
                role: Role::Sender,
                source: Terminus::address(TerminusKind::Source, "q1"),
                target: Terminus::default(),
                credit: 0,
            }),
        )
        .await;
        let _source = recv(&mut owner).await;

        send(
            &mut intruder,
            &Frame::event(Event::ConnectionDisconnected {
                connection: "conn-1".into(),
            }),
        )
        .await;
        match recv(&mut intruder).await {
            Frame::Error { code, .. } => assert_eq!(code, error_codes::UNEXPECTED_FRAME),
            other => panic!("Expected error, got {:?}", other),
        }

        let stats = state.engine.stats().await.unwrap();
        assert_eq!(stats.link_count, 1);
        assert!(state.sessions.contains_key(&ConnectionId::from("conn-1")));
    }

    #[tokio::test]
    async fn test_reopen_after_close_keeps_routing() {
        let (_state, url) = serve().await;
        let mut client = handshake(&url).await;
        let opening = Frame::event(Event::ConnectionOpening {
            connection: "conn-1".into(),
        });

        send(&mut client, &opening).await;
        let _offer = recv(&mut client).await;
        send(
            &mut client,
            &Frame::event(Event::ConnectionClosing {
                connection: "conn-1".into(),
            }),
        )
        .await;
        send(&mut client, &opening).await;

        match recv(&mut client).await {
            Frame::Command {
                command: Command::OfferCapabilities { connection, .. },
            } => assert_eq!(connection.as_str(), "conn-1"),
            other => panic!("Expected capabilities, got {:?}", other),
        }
    }
}
