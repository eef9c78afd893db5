pub mod adapt;
pub mod error;
pub mod media;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

pub use adapt::{BitrateController, EncoderControl, NetworkQuality};
pub use error::{Result, ServerError};
pub use media::Packetizer;
pub use server::{Server, ServerConfig, Viewer};
