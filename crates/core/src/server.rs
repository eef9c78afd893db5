use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use parking_lot::Mutex;

use crate::adapt::{BitrateController, EncoderControl, NetworkQuality};
use crate::error::{Result, ServerError};
use crate::media::Packetizer;
use crate::session::SessionRegistry;
use crate::transport::tcp;

/// Server-wide configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address for the RTSP listener (default port 8554).
    pub bind_addr: String,
    /// SDP session name (`s=` line).
    pub stream_name: String,
    /// RTP payload type (dynamic range; H.264 conventionally 96).
    pub payload_type: u8,
    /// Nominal frame rate; derives the per-frame RTP timestamp step.
    pub fps: u32,
    /// H.264 profile-level-id hex for the SDP fmtp line.
    pub profile_level_id: String,
    /// Public host advertised in SDP `o=`/`c=` lines. When `None`, the
    /// host is inferred from the request URI or client address.
    pub public_host: Option<String>,
    /// Encoder target bitrate at startup, bits per second.
    pub initial_bitrate: u32,
    /// Lower edge of the adaptive bitrate band.
    pub min_bitrate: u32,
    /// Upper edge of the adaptive bitrate band.
    pub max_bitrate: u32,
    /// Whether network-quality notifications retune the encoder.
    pub adaptive_bitrate: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8554".to_string(),
            stream_name: "Live Stream".to_string(),
            payload_type: 96,
            fps: 30,
            profile_level_id: "42c01f".to_string(),
            public_host: None,
            initial_bitrate: 2_000_000,
            min_bitrate: 300_000,
            max_bitrate: 8_000_000,
            adaptive_bitrate: true,
        }
    }
}

/// The streaming server: RTSP acceptor, session registry, packetizer,
/// and adaptive bitrate loop under one lifecycle.
///
/// The external encoder feeds frames in through [`send_frame`](Self::send_frame)
/// (its completion callback) and receives bitrate retunes through the
/// [`EncoderControl`] handle attached at startup. The server holds the only
/// owning reference to that handle; the encoder never references the server.
pub struct Server {
    registry: SessionRegistry,
    running: Arc<AtomicBool>,
    packetizer: Arc<Mutex<Packetizer>>,
    bitrate: BitrateController,
    config: Arc<ServerConfig>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let packetizer =
            Packetizer::with_random_ssrc(config.payload_type, config.fps);
        let bitrate = BitrateController::new(
            config.initial_bitrate,
            config.min_bitrate,
            config.max_bitrate,
            config.adaptive_bitrate,
        );
        Self {
            registry: SessionRegistry::new(),
            running: Arc::new(AtomicBool::new(false)),
            packetizer: Arc::new(Mutex::new(packetizer)),
            bitrate,
            config: Arc::new(config),
        }
    }

    /// Bind, listen, and spawn the accept loop.
    ///
    /// Idempotent: calling while already running is a no-op. Listener
    /// failures surface as the distinct setup-fatal error kinds; nothing
    /// past this point terminates the server.
    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            tracing::debug!("start called while already running");
            return Ok(());
        }

        let listener =
            TcpListener::bind(&self.config.bind_addr).map_err(ServerError::from_bind)?;
        listener
            .set_nonblocking(true)
            .map_err(ServerError::SocketListen)?;

        self.running.store(true, Ordering::SeqCst);

        let registry = self.registry.clone();
        let packetizer = self.packetizer.clone();
        let config = self.config.clone();
        let running = self.running.clone();

        tracing::info!(addr = %self.config.bind_addr, "RTSP server listening");

        thread::spawn(move || {
            tcp::accept_loop(listener, registry, packetizer, config, running);
        });

        Ok(())
    }

    /// Stop accepting, force-close every client, release the encoder.
    /// Safe to call when already stopped.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.registry.clear();
        self.bitrate.detach_encoder();
        tracing::info!("server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Deliver one encoded access unit to every playing client.
    ///
    /// This is the encoder's completion-callback entry point: it runs on
    /// the encoder's thread, never blocks on a congested client, and never
    /// propagates errors — a failed frame is logged and dropped, a failed
    /// client is removed. The packetizer lock is held across the broadcast
    /// so sequence numbers from concurrent frames cannot interleave.
    ///
    /// `pts_us` is the frame's presentation timestamp in microseconds;
    /// the RTP timestamp itself advances by the fixed per-frame step.
    /// Returns the number of per-client packet deliveries.
    pub fn send_frame(&self, access_unit: &[u8], pts_us: u64) -> usize {
        if !self.running.load(Ordering::SeqCst) {
            return 0;
        }

        let mut packetizer = self.packetizer.lock();
        let packets = packetizer.packetize(access_unit);

        let mut delivered = 0usize;
        for packet in &packets {
            delivered += self.registry.broadcast(packet);
        }

        tracing::trace!(
            pts_us,
            frame_bytes = access_unit.len(),
            rtp_packets = packets.len(),
            delivered,
            "frame dispatched"
        );
        delivered
    }

    /// Forward a coarse network-quality notification to the bitrate loop.
    pub fn network_changed(&self, quality: NetworkQuality) {
        self.bitrate.on_network_quality(quality);
    }

    /// Attach the external encoder's control handle and push the initial
    /// target bitrate to it.
    pub fn attach_encoder(&self, encoder: Arc<dyn EncoderControl>) {
        self.bitrate.attach_encoder(encoder);
    }

    /// Toggle adaptive bitrate at runtime.
    pub fn set_adaptive_bitrate(&self, enabled: bool) {
        self.bitrate.set_enabled(enabled);
    }

    /// Current encoder target bitrate in bits per second.
    pub fn current_bitrate(&self) -> u32 {
        self.bitrate.current_bitrate()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }

    /// Clients currently in the `Playing` state.
    pub fn viewers(&self) -> Vec<Viewer> {
        self.registry
            .playing_sessions()
            .iter()
            .filter_map(|session| {
                session.media().map(|ep| Viewer {
                    session: session.token.clone(),
                    client_addr: ep.transport.client_addr.to_string(),
                    client_rtp_port: ep.transport.client_rtp_port,
                })
            })
            .collect()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Information about a connected viewer (client in `Playing` state).
#[derive(Debug, Clone)]
pub struct Viewer {
    pub session: String,
    pub client_addr: String,
    pub client_rtp_port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn start_is_idempotent() {
        let mut server = Server::new(local_config());
        server.start().expect("first start");
        assert!(server.is_running());
        server.start().expect("second start is a no-op");
        server.stop();
    }

    #[test]
    fn stop_when_never_started_is_noop() {
        let mut server = Server::new(local_config());
        server.stop();
        assert!(!server.is_running());
    }

    #[test]
    fn stop_twice_is_noop() {
        let mut server = Server::new(local_config());
        server.start().unwrap();
        server.stop();
        server.stop();
        assert!(!server.is_running());
    }

    #[test]
    fn bind_conflict_is_setup_fatal() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = occupied.local_addr().unwrap();

        let mut server = Server::new(ServerConfig {
            bind_addr: addr.to_string(),
            ..ServerConfig::default()
        });
        match server.start() {
            Err(ServerError::SocketBind(_)) => {}
            other => panic!("expected SocketBind error, got {:?}", other.map(|_| ())),
        }
        assert!(!server.is_running());
    }

    #[test]
    fn send_frame_with_no_clients_delivers_nothing() {
        let mut server = Server::new(local_config());
        server.start().unwrap();
        assert_eq!(server.send_frame(&[0u8; 3000], 0), 0);
        server.stop();
    }

    #[test]
    fn send_frame_while_stopped_is_dropped() {
        let server = Server::new(local_config());
        assert_eq!(server.send_frame(&[0u8; 100], 0), 0);
    }
}
