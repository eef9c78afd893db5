//! Error types for the streaming server.

use std::fmt;
use std::io;

/// Errors that can occur in the streaming server.
///
/// The setup-fatal variants ([`SocketCreate`](Self::SocketCreate),
/// [`SocketBind`](Self::SocketBind), [`SocketListen`](Self::SocketListen))
/// are the only errors surfaced from [`Server::start`](crate::Server::start);
/// everything else stays below the per-client boundary and is handled with
/// an RTSP error response or session removal.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listening socket could not be created.
    #[error("socket creation failed: {0}")]
    SocketCreate(#[source] io::Error),

    /// The listening socket could not be bound to the configured address.
    #[error("socket bind failed: {0}")]
    SocketBind(#[source] io::Error),

    /// The bound socket could not be put into listening mode.
    #[error("socket listen failed: {0}")]
    SocketListen(#[source] io::Error),

    /// Underlying I/O or socket error on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to parse an RTSP request message (RFC 2326 §6).
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },
}

impl ServerError {
    /// Classify a `TcpListener::bind` failure into the setup-fatal taxonomy.
    ///
    /// The standard library performs socket creation and bind in one call;
    /// address-level failures map to [`SocketBind`](Self::SocketBind) and
    /// everything else to [`SocketCreate`](Self::SocketCreate).
    pub(crate) fn from_bind(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::AddrInUse
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::PermissionDenied => Self::SocketBind(e),
            _ => Self::SocketCreate(e),
        }
    }
}

/// Specific kind of RTSP parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no request line).
    EmptyRequest,
    /// Request line did not have the expected `Method URI Version` format.
    InvalidRequestLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRequest => write!(f, "empty request"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidHeader => write!(f, "invalid header"),
        }
    }
}

/// Convenience alias for `Result<T, ServerError>`.
pub type Result<T> = std::result::Result<T, ServerError>;
