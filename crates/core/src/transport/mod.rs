//! Network transport: RTSP signaling over TCP, RTP media over UDP.
//!
//! - **TCP** ([`tcp`]): one control connection per client, thread per
//!   connection, blocking reads. Carries RTSP requests and responses.
//!
//! - **UDP** ([`udp`]): one outbound media socket per client, bound during
//!   SETUP and owned by the session for its lifetime. Delivery is
//!   connectionless and best-effort; lost packets are not retransmitted.

pub mod tcp;
pub mod udp;
