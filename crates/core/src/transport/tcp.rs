use std::io::{BufRead, BufReader};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::media::Packetizer;
use crate::protocol::request::{RtspRequest, scavenge_cseq};
use crate::protocol::response::RtspResponse;
use crate::protocol::MethodHandler;
use crate::server::ServerConfig;
use crate::session::{SessionHandle, SessionRegistry};

/// Non-blocking TCP accept loop.
///
/// Checks the `running` flag between accepts with a 50ms poll interval so
/// that [`Server::stop`](crate::Server::stop) terminates it promptly.
/// Transient accept errors are logged and never stop the loop.
pub fn accept_loop(
    listener: TcpListener,
    registry: SessionRegistry,
    packetizer: Arc<Mutex<Packetizer>>,
    config: Arc<ServerConfig>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let reg = registry.clone();
                let p = packetizer.clone();
                let c = config.clone();
                let r = running.clone();
                thread::spawn(move || {
                    Connection::handle(stream, reg, p, c, r);
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

/// A single RTSP control connection with its own lifecycle.
///
/// The connection's session is registered at accept time (state `Init`)
/// and removed on every exit path, so no partial RTSP state survives a
/// disconnect.
struct Connection {
    reader: BufReader<TcpStream>,
    handle: SessionHandle,
    registry: SessionRegistry,
    handler: MethodHandler,
    peer_addr: SocketAddr,
}

impl Connection {
    pub fn handle(
        stream: TcpStream,
        registry: SessionRegistry,
        packetizer: Arc<Mutex<Packetizer>>,
        config: Arc<ServerConfig>,
        running: Arc<AtomicBool>,
    ) {
        let peer_addr = match stream.peer_addr() {
            Ok(addr) => addr,
            Err(_) => return,
        };

        tracing::info!(%peer_addr, "client connected");

        let reader_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(_) => return,
        };

        // The registry keeps the original stream as the control writer;
        // this task reads requests from the clone.
        let session = registry.register(peer_addr.ip(), stream);
        let handle = session.handle;

        let handler = MethodHandler::new(
            registry.clone(),
            handle,
            peer_addr,
            packetizer,
            config,
        );

        let mut conn = Connection {
            reader: BufReader::new(reader_stream),
            handle,
            registry: registry.clone(),
            handler,
            peer_addr,
        };

        let reason = conn.run(&running);
        registry.remove(handle);

        tracing::info!(%peer_addr, reason, "client disconnected");
    }

    /// RTSP request/response loop. Returns the reason for exiting.
    fn run(&mut self, running: &Arc<AtomicBool>) -> &'static str {
        while running.load(Ordering::SeqCst) {
            let mut request_text = String::new();
            loop {
                let mut line = String::new();
                match self.reader.read_line(&mut line) {
                    Ok(0) => return "connection closed by client",
                    Ok(_) => {
                        request_text.push_str(&line);
                        if line == "\r\n" || line == "\n" {
                            break;
                        }
                    }
                    Err(_) => return "read error",
                }
            }

            if request_text.trim().is_empty() {
                continue;
            }

            let response = match RtspRequest::parse(&request_text) {
                Ok(request) => {
                    tracing::debug!(
                        peer = %self.peer_addr,
                        method = %request.method,
                        uri = %request.uri,
                        "request"
                    );
                    self.handler.handle(&request)
                }
                Err(e) => {
                    tracing::warn!(peer = %self.peer_addr, error = %e, "malformed request");
                    let cseq = scavenge_cseq(&request_text).unwrap_or("0");
                    RtspResponse::bad_request().add_header("CSeq", cseq)
                }
            };

            tracing::debug!(peer = %self.peer_addr, status = response.status_code, "response");

            if !self
                .registry
                .send_control(self.handle, response.serialize().as_bytes())
            {
                return "write error";
            }

            if self.handler.finished() {
                return "teardown";
            }
        }

        "server shutting down"
    }
}
