use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use livecast::{EncoderControl, Server, ServerConfig};

#[derive(Parser)]
#[command(
    name = "livecast-server",
    about = "RTSP live streaming server with adaptive bitrate"
)]
struct Args {
    /// Bind address (host:port)
    #[arg(long, short, default_value = "0.0.0.0:8554")]
    bind: String,

    /// SDP session name
    #[arg(long, default_value = "Live Stream")]
    stream_name: String,

    /// Nominal frame rate
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Initial encoder target bitrate (bps)
    #[arg(long, default_value_t = 2_000_000)]
    bitrate: u32,

    /// Adaptive bitrate band lower edge (bps)
    #[arg(long, default_value_t = 300_000)]
    min_bitrate: u32,

    /// Adaptive bitrate band upper edge (bps)
    #[arg(long, default_value_t = 8_000_000)]
    max_bitrate: u32,

    /// Disable adaptive bitrate (ignore network-quality signals)
    #[arg(long)]
    no_adapt: bool,

    /// Stream a synthetic test pattern instead of waiting for an encoder
    #[arg(long)]
    test_source: bool,
}

/// Stand-in encoder for manual testing: just logs retune requests.
struct LoggingEncoder;

impl EncoderControl for LoggingEncoder {
    fn set_target_bitrate(&self, bps: u32) {
        tracing::info!(target_bps = bps, "encoder target bitrate set");
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: args.bind.clone(),
        stream_name: args.stream_name,
        fps: args.fps,
        initial_bitrate: args.bitrate,
        min_bitrate: args.min_bitrate,
        max_bitrate: args.max_bitrate,
        adaptive_bitrate: !args.no_adapt,
        ..ServerConfig::default()
    };

    let mut server = Server::new(config);
    server.attach_encoder(Arc::new(LoggingEncoder));

    if let Err(e) = server.start() {
        eprintln!("Failed to start server: {}", e);
        return;
    }

    let server = Arc::new(server);

    if args.test_source {
        let frame_interval = Duration::from_millis(1000 / u64::from(args.fps.max(1)));
        let producer = server.clone();
        thread::spawn(move || {
            // Roughly bitrate-sized dummy frames; enough to exercise the
            // fan-out path with real packet counts.
            let mut pts_us: u64 = 0;
            loop {
                let frame_bytes = (producer.current_bitrate() / 8 / producer.config().fps.max(1))
                    .max(1) as usize;
                let frame = vec![0u8; frame_bytes];
                producer.send_frame(&frame, pts_us);
                pts_us += frame_interval.as_micros() as u64;
                thread::sleep(frame_interval);
            }
        });
    }

    println!("RTSP server on {} — press Enter to stop", args.bind);
    let mut input = String::new();
    let _ = io::stdin().read_line(&mut input);

    // Drop stops the server; Arc may still be held by the test source.
    if let Some(server) = Arc::into_inner(server) {
        drop(server);
    }
}
