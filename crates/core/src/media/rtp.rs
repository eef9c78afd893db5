use rand::RngExt;

/// Length of the RTP fixed header (RFC 3550 §5.1).
pub const RTP_HEADER_LEN: usize = 12;

/// RTP fixed-header state (RFC 3550 §5.1).
///
/// Owns the per-stream counters shared by every outgoing packet:
///
/// - **Sequence number**: 16-bit, wrapping, advanced on every
///   [`write`](Self::write).
/// - **Timestamp**: kept as u64 internally so duration arithmetic never
///   wraps; the lower 32 bits go on the wire. Advanced once per access
///   unit via [`advance_timestamp`](Self::advance_timestamp).
/// - **SSRC**: constant for the stream's lifetime, randomly chosen per
///   RFC 3550 §8.1.
///
/// Version is always 2; padding, extension, and CSRC count are always 0.
#[derive(Debug)]
pub struct RtpHeader {
    /// RTP payload type (7-bit, RFC 3551).
    pub pt: u8,
    /// Synchronization source identifier.
    pub ssrc: u32,
    sequence: u16,
    timestamp: u64,
}

impl RtpHeader {
    /// Create header state with an explicit SSRC.
    pub fn new(pt: u8, ssrc: u32) -> Self {
        tracing::debug!(
            pt,
            ssrc = format_args!("{:#010X}", ssrc),
            "RTP header state created"
        );
        Self {
            pt,
            ssrc,
            sequence: 0,
            timestamp: 0,
        }
    }

    /// Create with a random SSRC (RFC 3550 §8.1).
    pub fn with_random_ssrc(pt: u8) -> Self {
        Self::new(pt, rand::rng().random::<u32>())
    }

    /// Sequence number the next [`write`](Self::write) will emit.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Current timestamp (internal u64 representation).
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Serialize a 12-byte RTP fixed header and advance the sequence number.
    ///
    /// `marker` signals the last packet of an access unit.
    pub fn write(&mut self, marker: bool) -> [u8; RTP_HEADER_LEN] {
        let mut header = [0u8; RTP_HEADER_LEN];
        header[0] = 2 << 6;
        header[1] = ((marker as u8) << 7) | self.pt;
        header[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        header[4..8].copy_from_slice(&(self.timestamp as u32).to_be_bytes());
        header[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        self.sequence = self.sequence.wrapping_add(1);
        header
    }

    /// Advance the RTP timestamp.
    ///
    /// At the 90 kHz video clock the per-frame increment is `90000 / fps`
    /// (3000 for 30 fps, 3600 for 25 fps).
    pub fn advance_timestamp(&mut self, increment: u32) {
        self.timestamp = self.timestamp.wrapping_add(increment as u64);
    }

    #[cfg(test)]
    pub(crate) fn set_sequence(&mut self, seq: u16) {
        self.sequence = seq;
    }
}
