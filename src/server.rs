//! HTTP and WebSocket front end.
//!
//! Each WebSocket connection owns one [`Session`] and runs at most one turn
//! at a time. Outbound frames go through a per-connection writer task so
//! that an `assistant.audio` header and its binary payload are always sent
//! back to back.

use crate::audio::{FfmpegConverter, RhubarbExtractor};
use crate::backend;
use crate::config::Config;
use crate::error::Result;
use crate::pipeline::orchestrator::{Orchestrator, PipelineConfig, TurnEvents};
use crate::pipeline::types::{Segment, TurnOutcome};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::Session;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// State shared by every connection.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    history_limit: usize,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, history_limit: usize) -> Self {
        Self {
            orchestrator,
            history_limit,
        }
    }
}

/// Create the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        handle_socket(socket, state).instrument(tracing::info_span!("connection", id))
    })
}

/// Frames queued for the writer task.
enum Outbound {
    Text(String),
    Audio { header: String, audio: Vec<u8> },
}

/// Client input waiting for the current turn to finish.
enum Inbound {
    Audio(Vec<u8>),
    Reset,
}

enum Frame {
    Input(Inbound),
    Ignored,
    Closed,
}

fn classify(frame: Option<std::result::Result<Message, axum::Error>>) -> Frame {
    match frame {
        Some(Ok(Message::Binary(audio))) => Frame::Input(Inbound::Audio(audio)),
        Some(Ok(Message::Text(text))) => match ClientMessage::decode(&text) {
            Some(ClientMessage::Reset) => Frame::Input(Inbound::Reset),
            None => {
                tracing::trace!("discarding unrecognized text frame");
                Frame::Ignored
            }
        },
        Some(Ok(Message::Ping(_) | Message::Pong(_))) => Frame::Ignored,
        Some(Ok(Message::Close(_))) | None => Frame::Closed,
        Some(Err(e)) => {
            tracing::debug!(error = %e, "websocket read failed");
            Frame::Closed
        }
    }
}

/// Turns orchestrator callbacks into protocol frames.
struct SocketEvents {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl SocketEvents {
    fn push(&self, outbound: Outbound) {
        if self.tx.send(outbound).is_err() {
            tracing::trace!("writer gone, dropping frame");
        }
    }

    fn send(&self, message: &ServerMessage) {
        match message.to_json() {
            Ok(json) => self.push(Outbound::Text(json)),
            Err(e) => tracing::warn!(error = %e, "failed to encode server message"),
        }
    }
}

impl TurnEvents for SocketEvents {
    fn on_start(&self) {
        self.send(&ServerMessage::AssistantStart);
    }

    fn on_audio(&self, segment: Segment) {
        match ServerMessage::audio(&segment).to_json() {
            Ok(header) => self.push(Outbound::Audio {
                header,
                audio: segment.audio,
            }),
            Err(e) => tracing::warn!(error = %e, "failed to encode segment header"),
        }
    }

    fn on_done(&self) {
        self.send(&ServerMessage::AssistantDone);
    }

    fn on_empty(&self) {
        self.send(&ServerMessage::AssistantEmpty);
    }

    fn on_error(&self, error: &crate::error::MouthpieceError) {
        self.send(&ServerMessage::error(error));
    }
}

async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(outbound) = rx.recv().await {
        let written = match outbound {
            Outbound::Text(text) => sink.send(Message::Text(text)).await,
            Outbound::Audio { header, audio } => match sink.send(Message::Text(header)).await {
                Ok(()) => sink.send(Message::Binary(audio)).await,
                Err(e) => Err(e),
            },
        };
        if let Err(e) = written {
            tracing::debug!(error = %e, "websocket write failed");
            return;
        }
    }
    if let Err(e) = sink.close().await {
        tracing::trace!(error = %e, "websocket close failed");
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    tracing::info!("client connected");
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_frames(sink, rx));

    let events = SocketEvents { tx };
    let mut session = Session::new(state.history_limit);
    let mut pending: VecDeque<Inbound> = VecDeque::new();

    loop {
        let input = match pending.pop_front() {
            Some(input) => input,
            None => match classify(stream.next().await) {
                Frame::Input(input) => input,
                Frame::Ignored => continue,
                Frame::Closed => break,
            },
        };

        let audio = match input {
            Inbound::Audio(audio) => audio,
            Inbound::Reset => {
                tracing::debug!("history reset by client");
                session.reset();
                continue;
            }
        };

        tracing::debug!(bytes = audio.len(), "turn started");
        let turn = state
            .orchestrator
            .process_turn(&audio, session.history(), &events);
        let Some(outcome) = run_turn(turn, &mut stream, &mut pending).await else {
            tracing::info!("client disconnected mid-turn, turn cancelled");
            break;
        };
        session.record(&outcome);
    }

    drop(events);
    if let Err(e) = writer.await {
        tracing::debug!(error = %e, "writer task failed");
    }
    tracing::info!(turns = session.turns(), "client disconnected");
}

/// Drive a turn while still reading the socket.
///
/// Input that arrives mid-turn is queued. Returns `None` if the client went
/// away, in which case the turn future has been dropped.
async fn run_turn<F>(
    turn: F,
    stream: &mut SplitStream<WebSocket>,
    pending: &mut VecDeque<Inbound>,
) -> Option<TurnOutcome>
where
    F: Future<Output = TurnOutcome>,
{
    tokio::pin!(turn);
    loop {
        tokio::select! {
            outcome = &mut turn => return Some(outcome),
            frame = stream.next() => match classify(frame) {
                Frame::Input(input) => pending.push_back(input),
                Frame::Ignored => {}
                Frame::Closed => return None,
            },
        }
    }
}

/// Wire the configured provider and external tools into an orchestrator.
pub fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let backend = backend::from_config(&config.backend)?;
    let converter = FfmpegConverter::new(&config.tools.ffmpeg);
    let extractor =
        RhubarbExtractor::new(&config.tools.rhubarb).with_timeout(config.tools.phoneme_timeout());
    Ok(Orchestrator::new(backend, Arc::new(converter), Arc::new(extractor)).with_config(
        PipelineConfig {
            max_sentences: config.pipeline.max_sentences,
        },
    ))
}

/// Bind to the configured address and serve until Ctrl+C or SIGTERM.
pub async fn serve(config: &Config, orchestrator: Arc<Orchestrator>) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    let local: SocketAddr = listener.local_addr()?;
    tracing::info!(
        %local,
        provider = orchestrator.backend().name(),
        "listening (ws://{local}/ws)"
    );

    let state = AppState::new(orchestrator, config.pipeline.max_history);
    serve_with_shutdown(listener, state, shutdown_signal()).await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Serve on an already-bound listener until `shutdown` resolves.
pub async fn serve_with_shutdown<S>(listener: TcpListener, state: AppState, shutdown: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
