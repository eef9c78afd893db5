//! RTP packetization of encoded video access units.
//!
//! One encoded frame (access unit) becomes one or more RTP packets, each
//! carrying the 12-byte fixed header from RFC 3550 §5.1:
//!
//! - **Sequence number** (16-bit, wrapping) — incremented once per packet,
//!   shared across all clients (a single stream fanned out).
//! - **Timestamp** (32-bit on the wire) — 90 kHz media clock, advanced by a
//!   fixed per-frame increment (`90000 / fps`).
//! - **SSRC** (32-bit) — chosen randomly once at server startup.
//! - **Marker bit** — set on the last packet of each access unit.

pub mod packetizer;
pub mod rtp;

pub use packetizer::Packetizer;
pub use rtp::RtpHeader;
