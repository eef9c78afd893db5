use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Arc;

use crate::error::Result;
use crate::session::{MediaEndpoint, Transport};

/// Bind a per-session outbound RTP socket and assemble the media endpoint.
///
/// The socket is bound ephemerally; its local port becomes the advertised
/// `server_port`, so every client gets a distinct server-side pair without
/// a shared allocator. The advertised RTCP port is `server_rtp_port + 1`
/// and is not bound — RTCP is negotiated but not processed.
///
/// The socket is non-blocking: a full send buffer surfaces as an immediate
/// error and the broadcast path drops the client instead of queueing.
pub fn open_media_endpoint(
    client_ip: IpAddr,
    client_rtp_port: u16,
    client_rtcp_port: u16,
) -> Result<MediaEndpoint> {
    let socket = UdpSocket::bind(("0.0.0.0", 0))?;
    socket.set_nonblocking(true)?;

    let server_rtp_port = socket.local_addr()?.port();

    let transport = Transport {
        client_rtp_port,
        client_rtcp_port,
        server_rtp_port,
        server_rtcp_port: server_rtp_port.wrapping_add(1),
        client_addr: SocketAddr::new(client_ip, client_rtp_port),
    };

    tracing::trace!(
        client_addr = %transport.client_addr,
        server_rtp_port,
        "media socket bound"
    );

    Ok(MediaEndpoint {
        transport,
        socket: Arc::new(socket),
    })
}
