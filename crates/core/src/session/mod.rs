//! Per-client session state and the registry that owns it.
//!
//! One [`ClientSession`] exists per accepted TCP connection, created at
//! accept time in the `Init` state and destroyed on TEARDOWN, socket error,
//! or server shutdown. Media is delivered to a session if and only if it is
//! `Playing`, which is reachable only after SETUP has completed.
//!
//! ## Session lifecycle (RFC 2326 §A.1)
//!
//! ```text
//! accept          -> Init
//! SETUP           -> Ready
//! PLAY            -> Playing   (from Ready or Paused)
//! PAUSE           -> Paused    (from Playing; idempotent)
//! TEARDOWN        -> TornDown  (terminal; removed from registry)
//! TCP disconnect  -> (removed)
//! ```

pub mod transport;

use std::collections::HashMap;
use std::io::{self, Write};
use std::net::{IpAddr, Shutdown, TcpStream, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rand::RngExt;

pub use transport::{Transport, TransportHeader};

/// Opaque identifier for a registered session, assigned at accept time.
///
/// Deliberately not derived from the socket descriptor — handles are unique
/// for the server's lifetime and carry no platform meaning.
pub type SessionHandle = u64;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Default session timeout in seconds (RFC 2326 §12.37).
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 60;

/// RTSP session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection accepted, no SETUP yet.
    Init,
    /// SETUP succeeded; media transport negotiated.
    Ready,
    /// Media is being delivered.
    Playing,
    /// Delivery suspended; PLAY resumes.
    Paused,
    /// Terminal: TEARDOWN received or unrecoverable I/O error.
    TornDown,
}

/// The session's negotiated media path: transport parameters plus the
/// per-session UDP socket bound during SETUP.
#[derive(Debug, Clone)]
pub struct MediaEndpoint {
    pub transport: Transport,
    pub socket: Arc<UdpSocket>,
}

/// State for one connected client.
///
/// Interior mutability via `RwLock` fields; the registry hands out
/// `Arc<ClientSession>` so the control-connection task and the broadcast
/// path can share it without copying.
#[derive(Debug)]
pub struct ClientSession {
    /// Registry handle, unique per accepted connection.
    pub handle: SessionHandle,
    /// Remote IP of the control connection; RTP is addressed here.
    pub peer_ip: IpAddr,
    /// Opaque session token returned in the `Session` header.
    pub token: String,
    /// Session timeout advertised in the `Session` header.
    pub timeout_secs: u64,
    state: RwLock<SessionState>,
    /// Last CSeq seen from this client, echoed into every response.
    cseq: RwLock<String>,
    /// Client RTP/RTCP ports parsed from the most recent `Transport` header.
    client_ports: RwLock<(u16, u16)>,
    media: RwLock<Option<MediaEndpoint>>,
    /// Writer clone of the control socket; also used to force-close the
    /// connection during removal and shutdown.
    control: TcpStream,
}

impl ClientSession {
    fn new(handle: SessionHandle, peer_ip: IpAddr, control: TcpStream) -> Self {
        let token = format!("{:016X}", rand::rng().random::<u64>());
        Self {
            handle,
            peer_ip,
            token,
            timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            state: RwLock::new(SessionState::Init),
            cseq: RwLock::new(String::from("0")),
            client_ports: RwLock::new((0, 0)),
            media: RwLock::new(None),
            control,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Transition to a new state.
    pub fn set_state(&self, state: SessionState) {
        tracing::debug!(
            session = %self.token,
            old_state = ?*self.state.read(),
            new_state = ?state,
            "state transition"
        );
        *self.state.write() = state;
    }

    /// Whether this session is actively receiving media.
    pub fn is_playing(&self) -> bool {
        *self.state.read() == SessionState::Playing
    }

    /// Record the CSeq of the request currently being handled.
    pub fn set_cseq(&self, cseq: &str) {
        *self.cseq.write() = cseq.to_string();
    }

    /// Last CSeq seen from this client.
    pub fn cseq(&self) -> String {
        self.cseq.read().clone()
    }

    /// Update client RTP/RTCP ports from a parsed `Transport` header.
    pub fn set_client_ports(&self, rtp: u16, rtcp: u16) {
        *self.client_ports.write() = (rtp, rtcp);
    }

    /// Most recently parsed client (RTP, RTCP) port pair; zeros until a
    /// valid `Transport` header has been seen.
    pub fn client_ports(&self) -> (u16, u16) {
        *self.client_ports.read()
    }

    /// Install the media endpoint created during SETUP, replacing any
    /// previous one (re-SETUP re-derives the transport).
    pub fn configure_media(&self, endpoint: MediaEndpoint) {
        tracing::debug!(
            session = %self.token,
            client_addr = %endpoint.transport.client_addr,
            server_rtp_port = endpoint.transport.server_rtp_port,
            "media transport configured"
        );
        *self.media.write() = Some(endpoint);
    }

    /// Negotiated media endpoint, if SETUP has completed.
    pub fn media(&self) -> Option<MediaEndpoint> {
        self.media.read().clone()
    }

    /// Send one RTP packet to this client's negotiated endpoint.
    ///
    /// Best-effort and non-blocking: a full socket buffer surfaces as an
    /// error, and the caller drops the client rather than queueing.
    pub fn send_media(&self, packet: &[u8]) -> io::Result<usize> {
        let media = self.media.read();
        match media.as_ref() {
            Some(ep) => ep.socket.send_to(packet, ep.transport.client_addr),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "media transport not configured",
            )),
        }
    }

    /// Write raw response bytes to the control socket.
    pub fn send_control(&self, bytes: &[u8]) -> io::Result<()> {
        (&self.control).write_all(bytes)
    }

    /// Format the `Session` response header value (RFC 2326 §12.37),
    /// e.g. `"5C49F1A2B3D4E5F6;timeout=60"`.
    pub fn session_header_value(&self) -> String {
        format!("{};timeout={}", self.token, self.timeout_secs)
    }

    /// Release all sockets owned by the session: drop the UDP media socket
    /// and shut the control connection down so its read loop unblocks.
    fn close(&self) {
        *self.media.write() = None;
        let _ = self.control.shutdown(Shutdown::Both);
        self.set_state(SessionState::TornDown);
    }
}

/// Thread-safe registry mapping session handles to client sessions.
///
/// The only shared-mutable structure besides the packetizer counters.
/// Cloning is cheap; all clones share the same map.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionHandle, Arc<ClientSession>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a session in the `Init` state for a freshly accepted
    /// connection and insert it.
    pub fn register(&self, peer_ip: IpAddr, control: TcpStream) -> Arc<ClientSession> {
        let handle = NEXT_HANDLE.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(ClientSession::new(handle, peer_ip, control));
        self.sessions.write().insert(handle, session.clone());

        tracing::debug!(
            handle,
            session = %session.token,
            %peer_ip,
            total_sessions = self.len(),
            "session registered"
        );
        session
    }

    /// Look up a session by handle.
    pub fn lookup(&self, handle: SessionHandle) -> Option<Arc<ClientSession>> {
        self.sessions.read().get(&handle).cloned()
    }

    /// Look up a session by its opaque token (the `Session` header value,
    /// timeout suffix already stripped).
    pub fn lookup_by_token(&self, token: &str) -> Option<Arc<ClientSession>> {
        self.sessions
            .read()
            .values()
            .find(|s| s.token == token)
            .cloned()
    }

    /// Remove a session and release every socket it owns.
    pub fn remove(&self, handle: SessionHandle) -> Option<Arc<ClientSession>> {
        let removed = self.sessions.write().remove(&handle);
        if let Some(session) = &removed {
            session.close();
            tracing::debug!(
                handle,
                session = %session.token,
                total_sessions = self.len(),
                "session removed"
            );
        }
        removed
    }

    /// Send one RTP packet to every `Playing` session.
    ///
    /// Sends are independent: a failure on one client marks it for removal
    /// but never prevents delivery to the rest. Failed clients are removed
    /// only after the full pass, since mutating the set mid-iteration is
    /// forbidden. Returns the number of successful deliveries.
    pub fn broadcast(&self, packet: &[u8]) -> usize {
        let playing: Vec<Arc<ClientSession>> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.is_playing())
            .cloned()
            .collect();

        let mut delivered = 0usize;
        let mut failed: Vec<SessionHandle> = Vec::new();

        for session in &playing {
            match session.send_media(packet) {
                Ok(_) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        session = %session.token,
                        error = %e,
                        "RTP send failed, dropping client"
                    );
                    failed.push(session.handle);
                }
            }
        }

        for handle in failed {
            self.remove(handle);
        }

        delivered
    }

    /// Deliver an RTSP response over a session's control socket.
    ///
    /// A write failure is treated as client disconnection: the session is
    /// removed and `false` returned.
    pub fn send_control(&self, handle: SessionHandle, bytes: &[u8]) -> bool {
        let Some(session) = self.lookup(handle) else {
            return false;
        };
        match session.send_control(bytes) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(session = %session.token, error = %e, "control send failed");
                self.remove(handle);
                false
            }
        }
    }

    /// Forcibly close and drop every session (server shutdown).
    pub fn clear(&self) {
        let drained: Vec<Arc<ClientSession>> =
            self.sessions.write().drain().map(|(_, s)| s).collect();
        for session in &drained {
            session.close();
        }
        if !drained.is_empty() {
            tracing::info!(closed = drained.len(), "all sessions closed");
        }
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Snapshot of sessions currently in the `Playing` state.
    pub fn playing_sessions(&self) -> Vec<Arc<ClientSession>> {
        self.sessions
            .read()
            .values()
            .filter(|s| s.is_playing())
            .cloned()
            .collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{SocketAddr, TcpListener};
    use std::time::Duration;

    /// A connected TCP pair; the accepted end stands in for the client.
    fn control_stream() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server_side, _) = listener.accept().unwrap();
        (server_side, client)
    }

    fn endpoint_to(addr: SocketAddr) -> MediaEndpoint {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let server_rtp_port = socket.local_addr().unwrap().port();
        MediaEndpoint {
            transport: Transport {
                client_rtp_port: addr.port(),
                client_rtcp_port: addr.port() + 1,
                server_rtp_port,
                server_rtcp_port: server_rtp_port.wrapping_add(1),
                client_addr: addr,
            },
            socket: Arc::new(socket),
        }
    }

    fn udp_receiver() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    #[test]
    fn register_starts_in_init_with_unique_identity() {
        let registry = SessionRegistry::new();
        let (a, _ka) = control_stream();
        let (b, _kb) = control_stream();
        let s1 = registry.register("127.0.0.1".parse().unwrap(), a);
        let s2 = registry.register("127.0.0.1".parse().unwrap(), b);

        assert_eq!(s1.state(), SessionState::Init);
        assert_ne!(s1.handle, s2.handle);
        assert_ne!(s1.token, s2.token);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn lookup_by_token_matches_register() {
        let registry = SessionRegistry::new();
        let (a, _k) = control_stream();
        let session = registry.register("127.0.0.1".parse().unwrap(), a);
        let found = registry.lookup_by_token(&session.token).unwrap();
        assert_eq!(found.handle, session.handle);
        assert!(registry.lookup_by_token("FFFFFFFFFFFFFFFF").is_none());
    }

    #[test]
    fn remove_releases_session() {
        let registry = SessionRegistry::new();
        let (a, _k) = control_stream();
        let session = registry.register("127.0.0.1".parse().unwrap(), a);
        let removed = registry.remove(session.handle).unwrap();
        assert_eq!(removed.state(), SessionState::TornDown);
        assert!(removed.media().is_none());
        assert!(registry.lookup(session.handle).is_none());
    }

    #[test]
    fn broadcast_reaches_only_playing_sessions() {
        let registry = SessionRegistry::new();

        let (rx_playing, addr_playing) = udp_receiver();
        let (rx_ready, addr_ready) = udp_receiver();

        let (a, _ka) = control_stream();
        let playing = registry.register("127.0.0.1".parse().unwrap(), a);
        playing.configure_media(endpoint_to(addr_playing));
        playing.set_state(SessionState::Playing);

        let (b, _kb) = control_stream();
        let ready = registry.register("127.0.0.1".parse().unwrap(), b);
        ready.configure_media(endpoint_to(addr_ready));
        ready.set_state(SessionState::Ready);

        let delivered = registry.broadcast(b"packet");
        assert_eq!(delivered, 1);

        let mut buf = [0u8; 64];
        let (n, _) = rx_playing.recv_from(&mut buf).expect("playing receives");
        assert_eq!(&buf[..n], b"packet");
        assert!(rx_ready.recv_from(&mut buf).is_err(), "ready receives nothing");
    }

    #[test]
    fn failed_client_removed_after_pass_without_blocking_others() {
        let registry = SessionRegistry::new();

        let (rx, addr) = udp_receiver();
        let (a, _ka) = control_stream();
        let healthy = registry.register("127.0.0.1".parse().unwrap(), a);
        healthy.configure_media(endpoint_to(addr));
        healthy.set_state(SessionState::Playing);

        // Playing but never configured a media endpoint: every send fails.
        let (b, _kb) = control_stream();
        let broken = registry.register("127.0.0.1".parse().unwrap(), b);
        broken.set_state(SessionState::Playing);

        let delivered = registry.broadcast(b"frame");
        assert_eq!(delivered, 1);

        let mut buf = [0u8; 64];
        let (n, _) = rx.recv_from(&mut buf).expect("healthy client receives");
        assert_eq!(&buf[..n], b"frame");

        assert!(registry.lookup(broken.handle).is_none(), "broken removed");
        assert!(registry.lookup(healthy.handle).is_some(), "healthy kept");
    }

    #[test]
    fn clear_closes_everything() {
        let registry = SessionRegistry::new();
        let (a, _ka) = control_stream();
        let (b, _kb) = control_stream();
        registry.register("127.0.0.1".parse().unwrap(), a);
        registry.register("127.0.0.1".parse().unwrap(), b);
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn transport_header_updates_client_ports() {
        let registry = SessionRegistry::new();
        let (a, _k) = control_stream();
        let session = registry.register("127.0.0.1".parse().unwrap(), a);
        assert_eq!(session.client_ports(), (0, 0));

        let th = TransportHeader::parse("RTP/AVP;unicast;client_port=6000-6001").unwrap();
        session.set_client_ports(th.client_rtp_port, th.client_rtcp_port);
        assert_eq!(session.client_ports(), (6000, 6001));
    }
}
