//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications of
//! volume events to subscribed clients. Controller calls block on device
//! round trips, so they run on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::ducking::DuckingController;
use crate::events::VolumeEvent;

use super::protocol::{DaemonStatus, Request, Response};

/// Largest accepted message body
const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
}

/// State shared with every client handler
struct Shared {
    controller: Arc<DuckingController>,
    start_time: Instant,
    /// Source of notifications for subscribed clients
    events: broadcast::Sender<VolumeEvent>,
}

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        controller: Arc<DuckingController>,
        events: broadcast::Sender<VolumeEvent>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path)
                .context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path)
            .context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let shared = Arc::new(Shared {
            controller,
            start_time: Instant::now(),
            events,
        });

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            shared,
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref()
            .context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let shared = Arc::clone(&self.shared);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, shared) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    ///
    /// Responses and pushed events share one outgoing queue so frames from
    /// the two sources never interleave on the wire.
    async fn handle_client(stream: UnixStream, shared: Arc<Shared>) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();
        let (out_tx, mut out_rx) = mpsc::channel::<Response>(32);

        let writer_task = tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                if let Err(e) = Self::send_message(&mut writer, &message).await {
                    debug!(?e, "failed to write to client");
                    break;
                }
            }
        });

        let mut forwarder = None;
        let mut result = Ok(());

        loop {
            let body = match Self::read_message(&mut reader).await {
                Ok(Some(body)) => body,
                Ok(None) => break,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            };

            let request = match serde_json::from_slice::<Request>(&body) {
                Ok(request) => request,
                Err(e) => {
                    warn!(%e, "invalid request");
                    let response = Response::error("INVALID_ARGUMENTS", e.to_string());
                    if out_tx.send(response).await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            debug!(?request, "received request");

            // Subscribe before acknowledging so no event after the ack is missed
            let events = (matches!(request, Request::Subscribe) && forwarder.is_none())
                .then(|| shared.events.subscribe());

            let response = Self::process_request(request, &shared).await;
            if out_tx.send(response).await.is_err() {
                break;
            }

            if let Some(events) = events {
                debug!("client subscribed to notifications");
                forwarder = Some(tokio::spawn(Self::forward_events(events, out_tx.clone())));
            }
        }

        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }
        drop(out_tx);
        let _ = writer_task.await;

        result
    }

    /// Relay volume events to one subscribed client
    async fn forward_events(
        mut events: broadcast::Receiver<VolumeEvent>,
        out_tx: mpsc::Sender<Response>,
    ) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if out_tx.send(Response::Event { event }).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "subscriber lagged behind volume events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Read one length-prefixed message body
    ///
    /// Returns `None` when the client disconnects or sends an oversized frame.
    async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
        let mut len_buf = [0u8; 4];

        // Read message length (4-byte little-endian)
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("client disconnected");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_MESSAGE_LEN {
            warn!(len, "message too large, disconnecting");
            return Ok(None);
        }

        let mut msg_buf = vec![0u8; len];
        reader.read_exact(&mut msg_buf).await?;
        Ok(Some(msg_buf))
    }

    /// Send a length-prefixed JSON message
    async fn send_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
    where
        W: AsyncWrite + Unpin,
        T: serde::Serialize,
    {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        writer.write_all(&msg_len).await?;
        writer.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Process a request and return a response
    async fn process_request(request: Request, shared: &Arc<Shared>) -> Response {
        let shared = Arc::clone(shared);

        match tokio::task::spawn_blocking(move || Self::execute(request, &shared)).await {
            Ok(response) => response,
            Err(e) => {
                error!(?e, "request handler panicked");
                Response::error("INTERNAL", "request handler failed")
            }
        }
    }

    /// Map a request onto the controller
    fn execute(request: Request, shared: &Shared) -> Response {
        let controller = &shared.controller;

        let result = match request {
            Request::Ping => return Response::Pong,

            Request::Subscribe => return Response::Subscribed,

            Request::GetStatus => {
                return Response::Status(DaemonStatus {
                    state: controller.state(),
                    snapshot: controller.snapshot(),
                    backend: controller.accessor().backend().to_string(),
                    uptime_secs: shared.start_time.elapsed().as_secs(),
                    ..DaemonStatus::default()
                });
            }

            Request::GetVolume => controller.volume().map(|volume| Response::Volume { volume }),

            Request::SetVolume { volume } => controller.set_volume(volume).map(|()| Response::Ok),

            Request::IsMuted => controller.is_muted().map(|muted| Response::Muted { muted }),

            Request::SetMuted { muted } => controller.set_muted(muted).map(|()| Response::Ok),

            Request::DuckVolume { percentage, persistent } => {
                info!(percentage, persistent, "duck requested via IPC");
                controller.duck(percentage, persistent).map(|()| Response::Ok)
            }

            Request::RestoreVolume { clear_persistent } => {
                info!(clear_persistent, "restore requested via IPC");
                controller.restore(clear_persistent).map(|outcome| {
                    debug!(?outcome, "restore finished");
                    Response::Ok
                })
            }
        };

        result.unwrap_or_else(|e| {
            warn!(%e, code = e.code(), "volume request failed");
            Response::from(e)
        })
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{SimulatedDevice, SimulatedHardware, VolumeAccessor};
    use crate::ducking::{DuckState, SnapshotKeys};
    use crate::store::MemoryStore;

    struct Fixture {
        _dir: tempfile::TempDir,
        socket_path: PathBuf,
        server: Arc<Server>,
        hardware: Arc<SimulatedHardware>,
    }

    fn start_server() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("daemon.sock");

        let hardware = Arc::new(SimulatedHardware::new(SimulatedDevice {
            volume: 0.5,
            ..SimulatedDevice::default()
        }));
        let (event_tx, _) = broadcast::channel(16);
        let controller = Arc::new(
            DuckingController::new(
                VolumeAccessor::new(hardware.clone()),
                Box::new(MemoryStore::new()),
                SnapshotKeys::default(),
            )
            .with_events(event_tx.clone()),
        );

        let server = Arc::new(Server::new(&socket_path, controller, event_tx).unwrap());
        let running = Arc::clone(&server);
        tokio::spawn(async move {
            let _ = running.run().await;
        });

        Fixture {
            _dir: dir,
            socket_path,
            server,
            hardware,
        }
    }

    async fn request(stream: &mut UnixStream, json: &str) -> Response {
        let body = json.as_bytes();
        stream.write_all(&(body.len() as u32).to_le_bytes()).await.unwrap();
        stream.write_all(body).await.unwrap();
        read_response(stream).await
    }

    async fn read_response(stream: &mut UnixStream) -> Response {
        let body = Server::read_message(stream).await.unwrap().unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let fixture = start_server();
        let mut stream = UnixStream::connect(&fixture.socket_path).await.unwrap();

        assert_eq!(request(&mut stream, r#"{"type":"ping"}"#).await, Response::Pong);
    }

    #[tokio::test]
    async fn test_duck_and_restore_over_socket() {
        let fixture = start_server();
        let mut stream = UnixStream::connect(&fixture.socket_path).await.unwrap();

        let resp = request(&mut stream, r#"{"type":"duck_volume","percentage":0.1}"#).await;
        assert_eq!(resp, Response::Ok);
        assert!((fixture.hardware.volume() - 0.05).abs() < 1e-6);

        match request(&mut stream, r#"{"type":"get_status"}"#).await {
            Response::Status(status) => {
                assert_eq!(status.state, DuckState::Ducked);
                assert_eq!(status.backend, "simulated");
                assert_eq!(status.snapshot.map(|s| s.volume), Some(0.5));
            }
            other => panic!("unexpected response: {other:?}"),
        }

        let resp = request(&mut stream, r#"{"type":"restore_volume"}"#).await;
        assert_eq!(resp, Response::Ok);
        assert_eq!(fixture.hardware.volume(), 0.5);

        match request(&mut stream, r#"{"type":"restore_volume"}"#).await {
            Response::Error { code, .. } => assert_eq!(code, "NO_SAVED_STATE"),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_volume_and_mute_commands() {
        let fixture = start_server();
        let mut stream = UnixStream::connect(&fixture.socket_path).await.unwrap();

        let resp = request(&mut stream, r#"{"type":"set_volume","volume":1.7}"#).await;
        assert_eq!(resp, Response::Ok);
        assert_eq!(
            request(&mut stream, r#"{"type":"get_volume"}"#).await,
            Response::Volume { volume: 1.0 }
        );

        let resp = request(&mut stream, r#"{"type":"set_muted","muted":true}"#).await;
        assert_eq!(resp, Response::Ok);
        assert_eq!(
            request(&mut stream, r#"{"type":"is_muted"}"#).await,
            Response::Muted { muted: true }
        );
    }

    #[tokio::test]
    async fn test_device_errors_are_reported() {
        let fixture = start_server();
        fixture.hardware.disconnect();
        let mut stream = UnixStream::connect(&fixture.socket_path).await.unwrap();

        match request(&mut stream, r#"{"type":"get_volume"}"#).await {
            Response::Error { code, message } => {
                assert_eq!(code, "DEVICE_UNAVAILABLE");
                assert_eq!(message, "no output device available");
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_request_keeps_connection() {
        let fixture = start_server();
        let mut stream = UnixStream::connect(&fixture.socket_path).await.unwrap();

        match request(&mut stream, r#"{"type":"set_volume"}"#).await {
            Response::Error { code, .. } => assert_eq!(code, "INVALID_ARGUMENTS"),
            other => panic!("unexpected response: {other:?}"),
        }

        assert_eq!(request(&mut stream, r#"{"type":"ping"}"#).await, Response::Pong);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let fixture = start_server();
        let mut subscriber = UnixStream::connect(&fixture.socket_path).await.unwrap();
        let mut client = UnixStream::connect(&fixture.socket_path).await.unwrap();

        assert_eq!(
            request(&mut subscriber, r#"{"type":"subscribe"}"#).await,
            Response::Subscribed
        );

        let resp = request(
            &mut client,
            r#"{"type":"duck_volume","percentage":0.1,"persistent":false}"#,
        )
        .await;
        assert_eq!(resp, Response::Ok);

        match read_response(&mut subscriber).await {
            Response::Event { event: VolumeEvent::Ducked { from, .. } } => assert_eq!(from, 0.5),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_removes_socket() {
        let fixture = start_server();
        assert!(fixture.socket_path.exists());

        fixture.server.shutdown().await;
        assert!(!fixture.socket_path.exists());
    }
}
