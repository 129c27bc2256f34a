//! Protocol module - wire format and the export buffer.
//!
//! This module implements the NetFlow v9 packet framing:
//! - 20-byte packet header encoding
//! - Field type codes and flowset constants
//! - Fixed-capacity export buffer handed to the transport

mod export_buffer;
mod wire_format;

pub use export_buffer::ExportBuffer;
pub use wire_format::{
    align4, field_types, PacketHeader, DEFAULT_MAX_PACKET_SIZE, DEFAULT_SOURCE_ID,
    FLOWSET_HEADER_SIZE, HEADER_SIZE, IPPROTO_ICMP, IPPROTO_ICMPV6, MAX_PACKET_SIZE, MIN_TEMPLATE_ID,
    TEMPLATE_FLOWSET_ID, VERSION,
};
