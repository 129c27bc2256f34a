//! Wire format constants and the packet header codec.
//!
//! NetFlow v9 packet header (20 bytes):
//! ```text
//! ┌─────────┬─────────┬────────────┬───────────┬──────────┬───────────┐
//! │ Version │ Count   │ SysUptime  │ Unix secs │ Sequence │ Source ID │
//! │ 2 bytes │ 2 bytes │ 4 bytes    │ 4 bytes   │ 4 bytes  │ 4 bytes   │
//! └─────────┴─────────┴────────────┴───────────┴──────────┴───────────┘
//! ```
//!
//! All multi-byte integers are Big Endian (network order).

/// Protocol version carried in every packet header.
pub const VERSION: u16 = 9;

/// Packet header size in bytes (fixed, exactly 20).
pub const HEADER_SIZE: usize = 20;

/// Flowset id of a template flowset.
pub const TEMPLATE_FLOWSET_ID: u16 = 0;

/// First template id; data flowset ids below this are reserved.
pub const MIN_TEMPLATE_ID: u16 = 256;

/// Flowset header size (flowset id + length).
pub const FLOWSET_HEADER_SIZE: usize = 4;

/// Default maximum packet size (UDP payload on a 1500 byte MTU).
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1472;

/// Largest packet whose lengths fit the 16-bit wire fields.
pub const MAX_PACKET_SIZE: usize = u16::MAX as usize;

/// Default source id.
pub const DEFAULT_SOURCE_ID: u32 = 1;

/// IANA protocol numbers that get the ICMP port encoding.
pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_ICMPV6: u8 = 58;

/// NetFlow v9 field type codes used by the exporter.
pub mod field_types {
    pub const IN_BYTES: u16 = 1;
    pub const IN_PKTS: u16 = 2;
    pub const FLOWS: u16 = 3;
    pub const PROTOCOL: u16 = 4;
    pub const SRC_TOS: u16 = 5;
    pub const TCP_FLAGS: u16 = 6;
    pub const L4_SRC_PORT: u16 = 7;
    pub const IPV4_SRC_ADDR: u16 = 8;
    pub const SRC_MASK: u16 = 9;
    pub const INPUT_SNMP: u16 = 10;
    pub const L4_DST_PORT: u16 = 11;
    pub const IPV4_DST_ADDR: u16 = 12;
    pub const DST_MASK: u16 = 13;
    pub const OUTPUT_SNMP: u16 = 14;
    pub const IPV4_NEXT_HOP: u16 = 15;
    pub const SRC_AS: u16 = 16;
    pub const DST_AS: u16 = 17;
    pub const BGP_IPV4_NEXT_HOP: u16 = 18;
    pub const OUT_BYTES: u16 = 23;
    pub const OUT_PKTS: u16 = 24;
    pub const IPV6_SRC_ADDR: u16 = 27;
    pub const IPV6_DST_ADDR: u16 = 28;
    pub const IPV6_SRC_MASK: u16 = 29;
    pub const IPV6_DST_MASK: u16 = 30;
    pub const ICMP_TYPE: u16 = 32;
    pub const ENGINE_TYPE: u16 = 38;
    pub const ENGINE_ID: u16 = 39;
    pub const DST_TOS: u16 = 55;
    pub const IN_SRC_MAC: u16 = 56;
    pub const OUT_DST_MAC: u16 = 57;
    pub const SRC_VLAN: u16 = 58;
    pub const DST_VLAN: u16 = 59;
    pub const DIRECTION: u16 = 61;
    pub const IPV6_NEXT_HOP: u16 = 62;
    pub const BGP_IPV6_NEXT_HOP: u16 = 63;
    pub const MPLS_LABEL_1: u16 = 70;
    pub const MPLS_LABEL_2: u16 = 71;
    pub const MPLS_LABEL_3: u16 = 72;
    pub const MPLS_LABEL_4: u16 = 73;
    pub const MPLS_LABEL_5: u16 = 74;
    pub const MPLS_LABEL_6: u16 = 75;
    pub const MPLS_LABEL_7: u16 = 76;
    pub const MPLS_LABEL_8: u16 = 77;
    pub const MPLS_LABEL_9: u16 = 78;
    pub const MPLS_LABEL_10: u16 = 79;
    pub const IN_DST_MAC: u16 = 80;
    pub const OUT_SRC_MAC: u16 = 81;
    pub const FORWARDING_STATUS: u16 = 89;
    pub const BGP_NEXT_ADJACENT_AS: u16 = 128;
    pub const BGP_PREV_ADJACENT_AS: u16 = 129;
    pub const FLOW_START_MILLISECONDS: u16 = 152;
    pub const FLOW_END_MILLISECONDS: u16 = 153;

    /// Type code of a mask field whose address family is unknown.
    pub const UNKNOWN: u16 = 0;
}

/// Round `len` up to the next multiple of 4.
#[inline]
pub fn align4(len: usize) -> usize {
    (len + 3) & !3
}

/// Packet header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Protocol version (always 9 when encoded by this crate).
    pub version: u16,
    /// Records + templates carried in the packet.
    pub count: u16,
    /// Milliseconds since exporter boot.
    pub sys_uptime: u32,
    /// Seconds since the UNIX epoch.
    pub unix_secs: u32,
    /// Packet sequence number.
    pub sequence: u32,
    /// Exporter observation domain.
    pub source_id: u32,
}

impl PacketHeader {
    /// Create a v9 header.
    pub fn new(count: u16, unix_secs: u32, sequence: u32, source_id: u32) -> Self {
        Self {
            version: VERSION,
            count,
            sys_uptime: 0,
            unix_secs,
            sequence,
            source_id,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use nfv9_export::protocol::PacketHeader;
    ///
    /// let header = PacketHeader::new(2, 1_700_000_000, 1, 1);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 20);
    /// assert_eq!(&bytes[0..2], &[0, 9]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (20 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..2].copy_from_slice(&self.version.to_be_bytes());
        buf[2..4].copy_from_slice(&self.count.to_be_bytes());
        buf[4..8].copy_from_slice(&self.sys_uptime.to_be_bytes());
        buf[8..12].copy_from_slice(&self.unix_secs.to_be_bytes());
        buf[12..16].copy_from_slice(&self.sequence.to_be_bytes());
        buf[16..20].copy_from_slice(&self.source_id.to_be_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            version: u16::from_be_bytes([buf[0], buf[1]]),
            count: u16::from_be_bytes([buf[2], buf[3]]),
            sys_uptime: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            unix_secs: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            sequence: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
            source_id: u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size_is_exactly_20() {
        assert_eq!(HEADER_SIZE, 20);
        assert_eq!(PacketHeader::new(0, 0, 0, 0).encode().len(), 20);
    }

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = PacketHeader {
            version: VERSION,
            count: 0x0102,
            sys_uptime: 0x03040506,
            unix_secs: 0x0708090A,
            sequence: 0x0B0C0D0E,
            source_id: 0x0F101112,
        };
        let bytes = header.encode();

        assert_eq!(
            bytes,
            [
                0x00, 0x09, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B,
                0x0C, 0x0D, 0x0E, 0x0F, 0x10, 0x11, 0x12
            ]
        );
    }

    #[test]
    fn test_header_decode() {
        let header = PacketHeader::new(7, 1_700_000_000, 42, 1);
        let decoded = PacketHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.version, 9);
        assert_eq!(decoded.sys_uptime, 0);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; 19];
        assert!(PacketHeader::decode(&buf).is_none());
    }

    #[test]
    fn test_align4() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(1), 4);
        assert_eq!(align4(3), 4);
        assert_eq!(align4(4), 4);
        assert_eq!(align4(57), 60);
        assert_eq!(align4(60), 60);
    }

    #[test]
    fn test_template_id_range() {
        assert!(MIN_TEMPLATE_ID > TEMPLATE_FLOWSET_ID);
        assert_eq!(MIN_TEMPLATE_ID, 256);
    }
}
