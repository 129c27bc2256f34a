//! Flow records and the record serializer.
//!
//! A [`FlowRecord`] carries every field value the exporter knows about,
//! plus the ordered list of extensions that select which of them go on
//! the wire. Serialization writes the engine fields, then each extension's
//! fields in the order of [`ExtensionId::fields`], Big Endian, truncated to
//! the field width without range checks.
//!
//! # Example
//!
//! ```
//! use nfv9_export::{ExtensionId, FlowRecord};
//! use std::net::Ipv4Addr;
//!
//! let record = FlowRecord {
//!     proto: 6,
//!     src_port: 443,
//!     dst_port: 51000,
//!     src_addr: Ipv4Addr::new(10, 0, 0, 1).into(),
//!     dst_addr: Ipv4Addr::new(10, 0, 0, 2).into(),
//!     ..FlowRecord::new(vec![ExtensionId::GenericFlow, ExtensionId::Ipv4Flow])
//! };
//! assert_eq!(record.wire_length(), 52);
//! ```

use std::net::{IpAddr, Ipv4Addr};

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::{ExportBuffer, IPPROTO_ICMP, IPPROTO_ICMPV6};
use crate::schema::{ExtensionId, ENGINE_WIDTH};

/// Number of MPLS labels in the label stack extension.
pub const MPLS_LABELS: usize = 10;

/// One flow, as handed to the exporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowRecord {
    /// Extensions present, in record order.
    pub extensions: Vec<ExtensionId>,
    /// Declared record size; part of the template signature.
    pub size: u32,

    pub engine_type: u8,
    pub engine_id: u8,

    // GenericFlow
    pub msec_first: u64,
    pub msec_last: u64,
    pub in_packets: u64,
    pub in_bytes: u64,
    pub src_port: u16,
    /// Destination port, or `type << 8 | code` for ICMP.
    pub dst_port: u16,
    pub proto: u8,
    pub tcp_flags: u8,
    pub fwd_status: u8,
    pub tos: u8,

    // Ipv4Flow / Ipv6Flow
    pub src_addr: IpAddr,
    pub dst_addr: IpAddr,

    // FlowMisc
    pub input: u32,
    pub output: u32,
    pub src_mask: u8,
    pub dst_mask: u8,
    pub dir: u8,
    pub dst_tos: u8,

    // CntFlow
    pub aggr_flows: u64,
    pub out_packets: u64,
    pub out_bytes: u64,

    // VLan
    pub src_vlan: u16,
    pub dst_vlan: u16,

    // AsRouting
    pub src_as: u32,
    pub dst_as: u32,

    // BgpNextHopV4 / BgpNextHopV6
    pub bgp_next_hop: IpAddr,
    // IpNextHopV4 / IpNextHopV6
    pub ip_next_hop: IpAddr,

    /// Low 24 bits of each label are exported.
    pub mpls_labels: [u32; MPLS_LABELS],

    // MacAddr, low 48 bits exported
    pub in_src_mac: u64,
    pub out_dst_mac: u64,
    pub in_dst_mac: u64,
    pub out_src_mac: u64,

    // AsAdjacent
    pub next_adjacent_as: u32,
    pub prev_adjacent_as: u32,
}

impl Default for FlowRecord {
    fn default() -> Self {
        let unspecified = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        Self {
            extensions: Vec::new(),
            size: 0,
            engine_type: 0,
            engine_id: 0,
            msec_first: 0,
            msec_last: 0,
            in_packets: 0,
            in_bytes: 0,
            src_port: 0,
            dst_port: 0,
            proto: 0,
            tcp_flags: 0,
            fwd_status: 0,
            tos: 0,
            src_addr: unspecified,
            dst_addr: unspecified,
            input: 0,
            output: 0,
            src_mask: 0,
            dst_mask: 0,
            dir: 0,
            dst_tos: 0,
            aggr_flows: 0,
            out_packets: 0,
            out_bytes: 0,
            src_vlan: 0,
            dst_vlan: 0,
            src_as: 0,
            dst_as: 0,
            bgp_next_hop: unspecified,
            ip_next_hop: unspecified,
            mpls_labels: [0; MPLS_LABELS],
            in_src_mac: 0,
            out_dst_mac: 0,
            in_dst_mac: 0,
            out_src_mac: 0,
            next_adjacent_as: 0,
            prev_adjacent_as: 0,
        }
    }
}

/// Address value as an integer; IPv4 occupies the low 32 bits.
fn ip_bits(addr: &IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u32::from(*v4) as u128,
        IpAddr::V6(v6) => u128::from(*v6),
    }
}

impl FlowRecord {
    /// Create a record with the given extensions and all values zeroed.
    ///
    /// The declared size defaults to the wire length.
    pub fn new(extensions: Vec<ExtensionId>) -> Self {
        let mut record = Self {
            extensions,
            ..Self::default()
        };
        record.size = record.wire_length() as u32;
        record
    }

    /// Check whether the ICMP port encoding applies.
    #[inline]
    pub fn is_icmp(&self) -> bool {
        self.proto == IPPROTO_ICMP || self.proto == IPPROTO_ICMPV6
    }

    /// Bytes this record occupies on the wire.
    pub fn wire_length(&self) -> usize {
        ENGINE_WIDTH + self.extensions.iter().map(|e| e.width()).sum::<usize>()
    }

    /// Serialize the record into `buf`.
    ///
    /// Either the whole record is written or nothing is.
    ///
    /// # Errors
    ///
    /// Returns `BufferOverflow` if the record does not fit.
    pub fn append_to(&self, buf: &mut ExportBuffer) -> Result<()> {
        buf.ensure(self.wire_length())?;

        buf.put_group(ENGINE_WIDTH, |out| {
            out.put_u8(self.engine_type);
            out.put_u8(self.engine_id);
        })?;
        for &ext in &self.extensions {
            buf.put_group(ext.width(), |out| self.encode_extension(ext, out))?;
        }
        Ok(())
    }

    /// Write the fields of one extension.
    fn encode_extension(&self, ext: ExtensionId, out: &mut BytesMut) {
        match ext {
            ExtensionId::GenericFlow => {
                out.put_u64(self.msec_first);
                out.put_u64(self.msec_last);
                out.put_u64(self.in_packets);
                out.put_u64(self.in_bytes);
                out.put_u16(self.src_port);
                if self.is_icmp() {
                    out.put_u16(0);
                    out.put_u16(self.dst_port);
                } else {
                    out.put_u16(self.dst_port);
                    out.put_u16(0);
                }
                out.put_u8(self.proto);
                out.put_u8(self.tcp_flags);
                out.put_u8(self.fwd_status);
                out.put_u8(self.tos);
            }
            ExtensionId::Ipv4Flow => {
                out.put_u32(ip_bits(&self.src_addr) as u32);
                out.put_u32(ip_bits(&self.dst_addr) as u32);
            }
            ExtensionId::Ipv6Flow => {
                out.put_u128(ip_bits(&self.src_addr));
                out.put_u128(ip_bits(&self.dst_addr));
            }
            ExtensionId::FlowMisc => {
                out.put_u32(self.input);
                out.put_u32(self.output);
                out.put_u8(self.src_mask);
                out.put_u8(self.dst_mask);
                out.put_u8(self.dir);
                out.put_u8(self.dst_tos);
            }
            ExtensionId::CntFlow => {
                out.put_u64(self.aggr_flows);
                out.put_u64(self.out_packets);
                out.put_u64(self.out_bytes);
            }
            ExtensionId::VLan => {
                out.put_u16(self.src_vlan);
                out.put_u16(self.dst_vlan);
            }
            ExtensionId::AsRouting => {
                out.put_u32(self.src_as);
                out.put_u32(self.dst_as);
            }
            ExtensionId::BgpNextHopV4 => out.put_u32(ip_bits(&self.bgp_next_hop) as u32),
            ExtensionId::BgpNextHopV6 => out.put_u128(ip_bits(&self.bgp_next_hop)),
            ExtensionId::IpNextHopV4 => out.put_u32(ip_bits(&self.ip_next_hop) as u32),
            ExtensionId::IpNextHopV6 => out.put_u128(ip_bits(&self.ip_next_hop)),
            ExtensionId::MplsLabel => {
                for label in &self.mpls_labels {
                    out.put_uint(u64::from(*label & 0x00FF_FFFF), 3);
                }
            }
            ExtensionId::MacAddr => {
                for mac in [
                    self.in_src_mac,
                    self.out_dst_mac,
                    self.in_dst_mac,
                    self.out_src_mac,
                ] {
                    out.put_uint(mac & 0x0000_FFFF_FFFF_FFFF, 6);
                }
            }
            ExtensionId::AsAdjacent => {
                out.put_u32(self.next_adjacent_as);
                out.put_u32(self.prev_adjacent_as);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;
    use std::net::Ipv6Addr;

    fn serialize(record: &FlowRecord) -> Vec<u8> {
        let mut buf = ExportBuffer::with_capacity(512);
        record.append_to(&mut buf).unwrap();
        buf.as_slice().to_vec()
    }

    #[test]
    fn test_every_extension_writes_its_width() {
        for ext in ExtensionId::ALL {
            let record = FlowRecord::new(vec![ext]);
            let bytes = serialize(&record);
            assert_eq!(bytes.len(), ENGINE_WIDTH + ext.width(), "{:?}", ext);
        }
    }

    #[test]
    fn test_new_declares_wire_length() {
        let record = FlowRecord::new(vec![ExtensionId::GenericFlow, ExtensionId::Ipv6Flow]);
        assert_eq!(record.size, 2 + 42 + 32);
    }

    #[test]
    fn test_engine_fields_first() {
        let record = FlowRecord {
            engine_type: 7,
            engine_id: 9,
            ..FlowRecord::new(vec![ExtensionId::VLan])
        };
        assert_eq!(serialize(&record), vec![7, 9, 0, 0, 0, 0]);
    }

    #[test]
    fn test_generic_flow_layout() {
        let record = FlowRecord {
            msec_first: 0x0102030405060708,
            msec_last: 2,
            in_packets: 3,
            in_bytes: 4,
            src_port: 0x1111,
            dst_port: 0x2222,
            proto: 6,
            tcp_flags: 0x12,
            fwd_status: 1,
            tos: 0x20,
            ..FlowRecord::new(vec![ExtensionId::GenericFlow])
        };
        let bytes = serialize(&record);

        assert_eq!(&bytes[2..10], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&bytes[34..36], &[0x11, 0x11]); // src port
        assert_eq!(&bytes[36..38], &[0x22, 0x22]); // dst port
        assert_eq!(&bytes[38..40], &[0, 0]); // icmp type
        assert_eq!(&bytes[40..44], &[6, 0x12, 1, 0x20]);
    }

    #[test]
    fn test_icmp_moves_dst_port_to_icmp_field() {
        for proto in [IPPROTO_ICMP, IPPROTO_ICMPV6] {
            let record = FlowRecord {
                src_port: 0,
                dst_port: 0x0800, // echo request
                proto,
                ..FlowRecord::new(vec![ExtensionId::GenericFlow])
            };
            let bytes = serialize(&record);
            assert_eq!(&bytes[34..36], &[0, 0]);
            assert_eq!(&bytes[36..38], &[0, 0]);
            assert_eq!(&bytes[38..40], &[0x08, 0x00]);
        }
    }

    #[test]
    fn test_ipv4_addresses() {
        let record = FlowRecord {
            src_addr: Ipv4Addr::new(192, 168, 1, 10).into(),
            dst_addr: Ipv4Addr::new(10, 0, 0, 1).into(),
            ..FlowRecord::new(vec![ExtensionId::Ipv4Flow])
        };
        assert_eq!(serialize(&record)[2..], [192, 168, 1, 10, 10, 0, 0, 1]);
    }

    #[test]
    fn test_ipv6_addresses() {
        let src: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let dst: Ipv6Addr = "fe80::2".parse().unwrap();
        let record = FlowRecord {
            src_addr: src.into(),
            dst_addr: dst.into(),
            ..FlowRecord::new(vec![ExtensionId::Ipv6Flow])
        };
        let bytes = serialize(&record);
        assert_eq!(&bytes[2..18], &src.octets());
        assert_eq!(&bytes[18..34], &dst.octets());
    }

    #[test]
    fn test_v6_address_in_v4_slot_is_truncated() {
        let record = FlowRecord {
            src_addr: "::a00:1".parse::<Ipv6Addr>().unwrap().into(),
            ..FlowRecord::new(vec![ExtensionId::Ipv4Flow])
        };
        assert_eq!(&serialize(&record)[2..6], &[10, 0, 0, 1]);
    }

    #[test]
    fn test_mpls_labels_are_24_bit() {
        let mut labels = [0u32; MPLS_LABELS];
        labels[0] = 0x00ABCDEF;
        labels[9] = 0xFF123456;
        let record = FlowRecord {
            mpls_labels: labels,
            ..FlowRecord::new(vec![ExtensionId::MplsLabel])
        };
        let bytes = serialize(&record);
        assert_eq!(&bytes[2..5], &[0xAB, 0xCD, 0xEF]);
        assert_eq!(&bytes[29..32], &[0x12, 0x34, 0x56]);
    }

    #[test]
    fn test_mac_addresses_are_48_bit() {
        let record = FlowRecord {
            in_src_mac: 0xFFFF_0011_2233_4455,
            out_dst_mac: 1,
            in_dst_mac: 2,
            out_src_mac: 3,
            ..FlowRecord::new(vec![ExtensionId::MacAddr])
        };
        let bytes = serialize(&record);
        assert_eq!(&bytes[2..8], &[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        assert_eq!(&bytes[8..14], &[0, 0, 0, 0, 0, 1]);
        assert_eq!(&bytes[14..20], &[0, 0, 0, 0, 0, 2]);
        assert_eq!(&bytes[20..26], &[0, 0, 0, 0, 0, 3]);
    }

    #[test]
    fn test_fields_follow_record_order() {
        let record = FlowRecord {
            src_vlan: 0x0A0B,
            src_as: 0x01020304,
            ..FlowRecord::new(vec![ExtensionId::AsRouting, ExtensionId::VLan])
        };
        let bytes = serialize(&record);
        assert_eq!(&bytes[2..6], &[1, 2, 3, 4]);
        assert_eq!(&bytes[10..12], &[0x0A, 0x0B]);
    }

    #[test]
    fn test_record_is_all_or_nothing() {
        let record = FlowRecord::new(vec![ExtensionId::GenericFlow, ExtensionId::Ipv4Flow]);
        let mut buf = ExportBuffer::with_capacity(51);

        let result = record.append_to(&mut buf);

        assert!(matches!(
            result,
            Err(ExportError::BufferOverflow {
                needed: 52,
                remaining: 51
            })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_record_from_json() {
        let record: FlowRecord = serde_json::from_str(
            r#"{"extensions": ["generic_flow", "ipv4_flow"], "size": 52, "proto": 17,
                "src_addr": "10.1.1.1", "dst_addr": "10.2.2.2", "dst_port": 53}"#,
        )
        .unwrap();
        assert_eq!(record.extensions.len(), 2);
        assert_eq!(record.dst_port, 53);
        assert_eq!(record.src_addr, IpAddr::V4(Ipv4Addr::new(10, 1, 1, 1)));
        assert_eq!(record.in_bytes, 0);
    }
}
