use std::net::SocketAddr;

/// Negotiated RTP/RTCP transport parameters for a session (RFC 2326 §12.39).
///
/// Built during SETUP from the client's `Transport` header and the port of
/// the per-session UDP socket the server binds for it.
///
/// ```text
/// Client → Server:
///   Transport: RTP/AVP;unicast;client_port=6000-6001
///
/// Server → Client:
///   Transport: RTP/AVP;unicast;client_port=6000-6001;server_port=50124-50125
/// ```
#[derive(Debug, Clone)]
pub struct Transport {
    /// Client's RTP receive port.
    pub client_rtp_port: u16,
    /// Client's RTCP receive port (typically `client_rtp_port + 1`).
    pub client_rtcp_port: u16,
    /// Local port of the session's bound RTP send socket.
    pub server_rtp_port: u16,
    /// Advertised RTCP port (`server_rtp_port + 1`, not bound — RTCP is
    /// negotiated but not processed).
    pub server_rtcp_port: u16,
    /// Destination for RTP delivery (`client_ip:client_rtp_port`).
    pub client_addr: SocketAddr,
}

/// Client port pair parsed from the RTSP `Transport` header.
#[derive(Debug, Clone, Copy)]
pub struct TransportHeader {
    pub client_rtp_port: u16,
    pub client_rtcp_port: u16,
}

impl TransportHeader {
    /// Parse the `client_port=<rtp>-<rtcp>` component of a `Transport`
    /// header value (RFC 2326 §12.39).
    ///
    /// Returns `None` when the component is absent or either port fails to
    /// parse as a 16-bit integer; callers leave previously negotiated ports
    /// untouched in that case.
    pub fn parse(header: &str) -> Option<Self> {
        for part in header.split(';') {
            if let Some(ports) = part.trim().strip_prefix("client_port=") {
                let (rtp, rtcp) = ports.split_once('-')?;
                return Some(TransportHeader {
                    client_rtp_port: rtp.trim().parse().ok()?,
                    client_rtcp_port: rtcp.trim().parse().ok()?,
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_client_port() {
        let th = TransportHeader::parse("RTP/AVP;unicast;client_port=6000-6001").unwrap();
        assert_eq!(th.client_rtp_port, 6000);
        assert_eq!(th.client_rtcp_port, 6001);
    }

    #[test]
    fn parse_missing_client_port() {
        assert!(TransportHeader::parse("RTP/AVP;unicast").is_none());
    }

    #[test]
    fn parse_non_numeric_ports() {
        assert!(TransportHeader::parse("RTP/AVP;client_port=abc-def").is_none());
    }

    #[test]
    fn parse_out_of_range_port() {
        assert!(TransportHeader::parse("RTP/AVP;client_port=70000-70001").is_none());
    }

    #[test]
    fn parse_malformed_pair() {
        assert!(TransportHeader::parse("RTP/AVP;client_port=6000").is_none());
    }
}
