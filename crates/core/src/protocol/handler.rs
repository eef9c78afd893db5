use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::media::Packetizer;
use crate::protocol::request::RtspRequest;
use crate::protocol::response::RtspResponse;
use crate::protocol::sdp;
use crate::server::ServerConfig;
use crate::session::{SessionHandle, SessionRegistry, SessionState, TransportHeader};
use crate::transport::udp;

/// Methods advertised in the OPTIONS `Public` header.
const SUPPORTED_METHODS: &str = "OPTIONS, DESCRIBE, SETUP, PLAY, PAUSE, TEARDOWN";

/// Drives the RTSP state machine for a single client connection.
///
/// The connection's session is registered before the first request arrives;
/// the handler mutates it through the registry. Every response echoes the
/// request's CSeq, including errors, and the session's tracked CSeq is
/// updated before dispatch.
pub struct MethodHandler {
    registry: SessionRegistry,
    handle: SessionHandle,
    client_addr: SocketAddr,
    packetizer: Arc<Mutex<Packetizer>>,
    config: Arc<ServerConfig>,
    finished: bool,
}

impl MethodHandler {
    pub fn new(
        registry: SessionRegistry,
        handle: SessionHandle,
        client_addr: SocketAddr,
        packetizer: Arc<Mutex<Packetizer>>,
        config: Arc<ServerConfig>,
    ) -> Self {
        MethodHandler {
            registry,
            handle,
            client_addr,
            packetizer,
            config,
            finished: false,
        }
    }

    /// True once TEARDOWN has been answered; the connection loop should
    /// remove the session and exit.
    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn handle(&mut self, request: &RtspRequest) -> RtspResponse {
        let cseq = request.cseq().unwrap_or("0").to_string();

        let Some(session) = self.registry.lookup(self.handle) else {
            // Session already removed (server shutting down, or raced with
            // a broadcast failure); nothing left to mutate.
            return RtspResponse::session_not_found().add_header("CSeq", &cseq);
        };
        session.set_cseq(&cseq);

        // Transport headers are parsed wherever they appear; an
        // unparseable client_port leaves the previous ports in place.
        if let Some(value) = request.get_header("Transport") {
            match TransportHeader::parse(value) {
                Some(th) => session.set_client_ports(th.client_rtp_port, th.client_rtcp_port),
                None => {
                    tracing::debug!(transport = %value, "Transport header without usable client_port")
                }
            }
        }

        match request.method.as_str() {
            "PLAY" | "PAUSE" | "TEARDOWN" if !self.session_token_valid(request) => {
                tracing::warn!(
                    method = %request.method,
                    presented = ?request.session_token(),
                    "Session header does not name this connection's session"
                );
                RtspResponse::session_not_found().add_header("CSeq", &cseq)
            }
            "OPTIONS" => self.handle_options(&cseq),
            "DESCRIBE" => self.handle_describe(&cseq, &request.uri),
            "SETUP" => self.handle_setup(&cseq),
            "PLAY" => self.handle_play(&cseq, &request.uri),
            "PAUSE" => self.handle_pause(&cseq),
            "TEARDOWN" => self.handle_teardown(&cseq),
            other => {
                tracing::warn!(method = %other, %cseq, "unsupported RTSP method");
                RtspResponse::method_not_allowed()
                    .add_header("CSeq", &cseq)
                    .add_header("Allow", SUPPORTED_METHODS)
            }
        }
    }

    /// A `Session` header, when present, must name this connection's
    /// session. An unknown or foreign token answers 454; requests without
    /// the header fall back to the connection's own session.
    fn session_token_valid(&self, request: &RtspRequest) -> bool {
        match request.session_token() {
            Some(token) => self
                .registry
                .lookup_by_token(token)
                .is_some_and(|s| s.handle == self.handle),
            None => true,
        }
    }

    fn handle_options(&self, cseq: &str) -> RtspResponse {
        tracing::debug!(%cseq, "OPTIONS");
        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Public", SUPPORTED_METHODS)
    }

    /// Host advertised in the SDP `o=`/`c=` lines: configured public host,
    /// else the host part of the request URI, else the peer's view of us
    /// via its own address. `None` when no observable address exists.
    fn observable_host(&self, uri: &str) -> Option<String> {
        if let Some(host) = &self.config.public_host {
            return Some(host.clone());
        }

        if let Some(after_scheme) = uri.strip_prefix("rtsp://") {
            let host = after_scheme
                .split('/')
                .next()
                .and_then(|host_port| host_port.split(':').next())
                .unwrap_or("")
                .trim();
            if !host.is_empty() {
                return Some(host.to_string());
            }
        }

        let ip = self.client_addr.ip();
        if ip.is_unspecified() {
            return None;
        }
        Some(ip.to_string())
    }

    fn handle_describe(&self, cseq: &str, uri: &str) -> RtspResponse {
        tracing::debug!(%cseq, uri, "DESCRIBE");

        let Some(host) = self.observable_host(uri) else {
            tracing::error!(uri, "no observable address for session description");
            return RtspResponse::internal_error().add_header("CSeq", cseq);
        };

        let payload_type = self.packetizer.lock().payload_type();
        let body = sdp::generate_sdp(
            &host,
            &self.config.stream_name,
            payload_type,
            &self.config.profile_level_id,
        );

        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Content-Type", "application/sdp")
            .add_header("Content-Base", uri)
            .with_body(body)
    }

    fn handle_setup(&mut self, cseq: &str) -> RtspResponse {
        let Some(session) = self.registry.lookup(self.handle) else {
            return RtspResponse::session_not_found().add_header("CSeq", cseq);
        };

        match session.state() {
            SessionState::Playing | SessionState::TornDown => {
                tracing::warn!(%cseq, state = ?session.state(), "SETUP in invalid state");
                return RtspResponse::not_valid_in_state().add_header("CSeq", cseq);
            }
            // Init performs the initial setup; Ready/Paused re-derive the
            // transport deterministically.
            SessionState::Init | SessionState::Ready | SessionState::Paused => {}
        }

        let (client_rtp, client_rtcp) = session.client_ports();
        if client_rtp == 0 || client_rtcp == 0 {
            tracing::warn!(%cseq, "SETUP without valid client ports");
            return RtspResponse::bad_request().add_header("CSeq", cseq);
        }

        let endpoint =
            match udp::open_media_endpoint(self.client_addr.ip(), client_rtp, client_rtcp) {
                Ok(ep) => ep,
                Err(e) => {
                    tracing::error!(error = %e, "failed to bind media socket");
                    return RtspResponse::internal_error().add_header("CSeq", cseq);
                }
            };

        let transport_echo = format!(
            "RTP/AVP;unicast;client_port={}-{};server_port={}-{}",
            client_rtp,
            client_rtcp,
            endpoint.transport.server_rtp_port,
            endpoint.transport.server_rtcp_port
        );

        tracing::info!(
            session = %session.token,
            client_rtp = %endpoint.transport.client_addr,
            server_rtp_port = endpoint.transport.server_rtp_port,
            "transport negotiated via SETUP"
        );

        session.configure_media(endpoint);
        session.set_state(SessionState::Ready);

        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Transport", &transport_echo)
            .add_header("Session", &session.session_header_value())
    }

    fn handle_play(&mut self, cseq: &str, uri: &str) -> RtspResponse {
        let Some(session) = self.registry.lookup(self.handle) else {
            return RtspResponse::session_not_found().add_header("CSeq", cseq);
        };

        match session.state() {
            SessionState::Ready | SessionState::Paused | SessionState::Playing => {
                session.set_state(SessionState::Playing);
                tracing::info!(session = %session.token, "session playing");

                let (seq, rtptime) = {
                    let p = self.packetizer.lock();
                    (p.next_sequence(), p.next_rtp_timestamp())
                };
                let rtp_info = format!("url={};seq={};rtptime={}", uri, seq, rtptime);

                RtspResponse::ok()
                    .add_header("CSeq", cseq)
                    .add_header("Session", &session.session_header_value())
                    .add_header("Range", "npt=0.000-")
                    .add_header("RTP-Info", &rtp_info)
            }
            SessionState::Init | SessionState::TornDown => {
                tracing::warn!(%cseq, state = ?session.state(), "PLAY before SETUP");
                RtspResponse::not_valid_in_state().add_header("CSeq", cseq)
            }
        }
    }

    fn handle_pause(&mut self, cseq: &str) -> RtspResponse {
        let Some(session) = self.registry.lookup(self.handle) else {
            return RtspResponse::session_not_found().add_header("CSeq", cseq);
        };

        match session.state() {
            SessionState::Playing | SessionState::Paused => {
                session.set_state(SessionState::Paused);
                tracing::info!(session = %session.token, "session paused");
                RtspResponse::ok()
                    .add_header("CSeq", cseq)
                    .add_header("Session", &session.session_header_value())
            }
            SessionState::Init | SessionState::Ready | SessionState::TornDown => {
                tracing::warn!(%cseq, state = ?session.state(), "PAUSE in invalid state");
                RtspResponse::not_valid_in_state().add_header("CSeq", cseq)
            }
        }
    }

    /// TEARDOWN is valid from any state; the connection loop removes the
    /// session after the response send, whether or not the send succeeds.
    fn handle_teardown(&mut self, cseq: &str) -> RtspResponse {
        self.finished = true;

        if let Some(session) = self.registry.lookup(self.handle) {
            session.set_state(SessionState::TornDown);
            tracing::info!(session = %session.token, "session torn down");
        }

        RtspResponse::ok().add_header("CSeq", cseq)
    }
}
