use super::rtp::{RTP_HEADER_LEN, RtpHeader};

/// Maximum RTP payload bytes per packet, kept below the typical MTU.
pub const MAX_PAYLOAD: usize = 1400;

/// Video RTP clock rate in Hz (RFC 3551 §4).
pub const CLOCK_RATE: u32 = 90_000;

/// Fragments encoded access units into RTP packets.
///
/// One call to [`packetize`](Self::packetize) covers exactly one access
/// unit: the payload is split at [`MAX_PAYLOAD`], the marker bit is set on
/// the final fragment only, the sequence number advances by one per packet
/// regardless of frame boundaries, and the timestamp advances by a fixed
/// per-frame increment after the whole unit is emitted.
///
/// The packetizer owns the stream-global counters; callers serialize access
/// through the same lock that covers the broadcast path so sequence numbers
/// from concurrent frames never interleave.
#[derive(Debug)]
pub struct Packetizer {
    header: RtpHeader,
    max_payload: usize,
    timestamp_increment: u32,
}

impl Packetizer {
    /// Create with an explicit payload type and SSRC.
    ///
    /// `fps` determines the per-frame timestamp increment
    /// (`CLOCK_RATE / fps`, 3000 at 30 fps).
    pub fn new(pt: u8, ssrc: u32, fps: u32) -> Self {
        Self {
            header: RtpHeader::new(pt, ssrc),
            max_payload: MAX_PAYLOAD,
            timestamp_increment: CLOCK_RATE / fps.max(1),
        }
    }

    /// Create with a random SSRC (RFC 3550 §8.1).
    pub fn with_random_ssrc(pt: u8, fps: u32) -> Self {
        Self {
            header: RtpHeader::with_random_ssrc(pt),
            max_payload: MAX_PAYLOAD,
            timestamp_increment: CLOCK_RATE / fps.max(1),
        }
    }

    /// Split one access unit into complete RTP packets.
    ///
    /// Each returned `Vec<u8>` is a 12-byte header followed by up to
    /// [`MAX_PAYLOAD`] payload bytes. An empty access unit produces no
    /// packets and does not advance the timestamp.
    pub fn packetize(&mut self, access_unit: &[u8]) -> Vec<Vec<u8>> {
        if access_unit.is_empty() {
            return Vec::new();
        }

        let mut packets = Vec::with_capacity(access_unit.len().div_ceil(self.max_payload));
        let mut offset = 0usize;

        while offset < access_unit.len() {
            let end = usize::min(offset + self.max_payload, access_unit.len());
            let last = end == access_unit.len();

            let hdr = self.header.write(last);
            let mut packet = Vec::with_capacity(RTP_HEADER_LEN + (end - offset));
            packet.extend_from_slice(&hdr);
            packet.extend_from_slice(&access_unit[offset..end]);
            packets.push(packet);

            offset = end;
        }

        self.header.advance_timestamp(self.timestamp_increment);

        tracing::trace!(
            frame_bytes = access_unit.len(),
            rtp_packets = packets.len(),
            seq = self.header.sequence(),
            ts = self.header.timestamp(),
            "access unit packetized"
        );

        packets
    }

    /// RTP payload type (for SDP generation).
    pub fn payload_type(&self) -> u8 {
        self.header.pt
    }

    /// SSRC carried by every packet of this stream.
    pub fn ssrc(&self) -> u32 {
        self.header.ssrc
    }

    /// Sequence number of the next packet (for the `RTP-Info` PLAY header).
    pub fn next_sequence(&self) -> u16 {
        self.header.sequence()
    }

    /// Timestamp of the next access unit (for the `RTP-Info` PLAY header).
    pub fn next_rtp_timestamp(&self) -> u32 {
        self.header.timestamp() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_packetizer() -> Packetizer {
        Packetizer::new(96, 0xAABBCCDD, 30)
    }

    fn seq_of(packet: &[u8]) -> u16 {
        u16::from_be_bytes([packet[2], packet[3]])
    }

    fn marker_of(packet: &[u8]) -> bool {
        packet[1] & 0x80 != 0
    }

    #[test]
    fn three_kilobyte_frame_yields_three_packets() {
        let mut p = make_packetizer();
        let frame = vec![0x42u8; 3000];
        let packets = p.packetize(&frame);
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].len(), 12 + 1400);
        assert_eq!(packets[1].len(), 12 + 1400);
        assert_eq!(packets[2].len(), 12 + 200);
    }

    #[test]
    fn marker_only_on_final_fragment() {
        let mut p = make_packetizer();
        let packets = p.packetize(&vec![0u8; 3000]);
        assert!(!marker_of(&packets[0]));
        assert!(!marker_of(&packets[1]));
        assert!(marker_of(&packets[2]));
    }

    #[test]
    fn single_fragment_frame_has_marker() {
        let mut p = make_packetizer();
        let packets = p.packetize(&[1, 2, 3]);
        assert_eq!(packets.len(), 1);
        assert!(marker_of(&packets[0]));
    }

    #[test]
    fn exact_cap_is_one_packet() {
        let mut p = make_packetizer();
        let packets = p.packetize(&vec![0u8; MAX_PAYLOAD]);
        assert_eq!(packets.len(), 1);
        assert!(marker_of(&packets[0]));
    }

    #[test]
    fn sequence_monotonic_across_frames() {
        let mut p = make_packetizer();
        let mut all = Vec::new();
        all.extend(p.packetize(&vec![0u8; 3000]));
        all.extend(p.packetize(&[0u8; 10]));
        all.extend(p.packetize(&vec![0u8; 2801]));

        let first = seq_of(&all[0]);
        for (n, packet) in all.iter().enumerate() {
            assert_eq!(seq_of(packet), first.wrapping_add(n as u16));
        }
    }

    #[test]
    fn timestamp_advances_once_per_frame() {
        let mut p = make_packetizer();
        assert_eq!(p.next_rtp_timestamp(), 0);
        p.packetize(&vec![0u8; 3000]);
        assert_eq!(p.next_rtp_timestamp(), 3000);
        p.packetize(&[0u8; 1]);
        assert_eq!(p.next_rtp_timestamp(), 6000);
    }

    #[test]
    fn empty_frame_produces_nothing() {
        let mut p = make_packetizer();
        assert!(p.packetize(&[]).is_empty());
        assert_eq!(p.next_rtp_timestamp(), 0);
        assert_eq!(p.next_sequence(), 0);
    }

    #[test]
    fn fragment_payloads_reassemble() {
        let mut p = make_packetizer();
        let frame: Vec<u8> = (0..3000u32).map(|i| i as u8).collect();
        let packets = p.packetize(&frame);
        let rebuilt: Vec<u8> = packets.iter().flat_map(|pk| pk[12..].to_vec()).collect();
        assert_eq!(rebuilt, frame);
    }

    #[test]
    fn fps_derives_increment() {
        let mut p = Packetizer::new(96, 1, 25);
        p.packetize(&[0u8; 4]);
        assert_eq!(p.next_rtp_timestamp(), 3600);
    }
}
