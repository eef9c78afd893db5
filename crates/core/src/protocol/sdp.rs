//! SDP session description generation (RFC 4566 / RFC 8866).
//!
//! Produces the DESCRIBE response body:
//!
//! ```text
//! v=0                                       ← protocol version
//! o=- <timestamp> 1 IN IP4 <addr>           ← origin
//! s=<stream name>                           ← session name
//! c=IN IP4 <addr>                           ← connection address
//! t=0 0                                     ← timing (live stream)
//! m=video 0 RTP/AVP 96                      ← media description
//! a=rtpmap:96 H264/90000                    ← codec/clock rate
//! a=fmtp:96 profile-level-id=..;packetization-mode=1
//! a=control:trackID=1                       ← track control URL
//! ```
//!
//! The media port is 0 — actual ports are negotiated per-client via SETUP.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::media::packetizer::CLOCK_RATE;

/// Generate the session description for the server's single video stream.
pub fn generate_sdp(host: &str, stream_name: &str, payload_type: u8, profile_level_id: &str) -> String {
    let origin_ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let lines = [
        "v=0".to_string(),
        format!("o=- {} 1 IN IP4 {}", origin_ts, host),
        format!("s={}", stream_name),
        format!("c=IN IP4 {}", host),
        "t=0 0".to_string(),
        format!("m=video 0 RTP/AVP {}", payload_type),
        format!("a=rtpmap:{} H264/{}", payload_type, CLOCK_RATE),
        format!(
            "a=fmtp:{} profile-level-id={};packetization-mode=1",
            payload_type, profile_level_id
        ),
        "a=control:trackID=1".to_string(),
    ];

    tracing::debug!("SDP: {}", lines.join("\r\n"));

    format!("{}\r\n", lines.join("\r\n"))
}
