//! RTSP protocol implementation (RFC 2326).
//!
//! Text-based signaling: parsing requests, building responses, dispatching
//! methods against the session state machine, and generating the SDP body
//! for DESCRIBE.
//!
//! ## Message format (RFC 2326 §4)
//!
//! RTSP follows HTTP/1.1 syntax with a different method set and stateful
//! sessions:
//!
//! ```text
//! SETUP rtsp://server/stream RTSP/1.0\r\n
//! CSeq: 2\r\n
//! Transport: RTP/AVP;unicast;client_port=6000-6001\r\n
//! \r\n
//! ```
//!
//! ## Supported methods
//!
//! | Method | RFC section | Purpose |
//! |--------|-------------|---------|
//! | OPTIONS | §10.1 | Capability discovery |
//! | DESCRIBE | §10.2 | Retrieve SDP session description |
//! | SETUP | §10.4 | Negotiate transport (UDP ports) |
//! | PLAY | §10.5 | Start media delivery |
//! | PAUSE | §10.6 | Suspend media delivery |
//! | TEARDOWN | §10.7 | Destroy session |
//!
//! Any other method receives `405 Method Not Allowed`.

pub mod handler;
pub mod request;
pub mod response;
pub mod sdp;

pub use handler::MethodHandler;
pub use request::RtspRequest;
pub use response::RtspResponse;
