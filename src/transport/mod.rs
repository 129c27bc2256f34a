//! Transport module - sending finished packets to a collector.
//!
//! The session only fills buffers; this module owns the socket:
//! - UDP datagrams over `tokio::net::UdpSocket`
//! - one connected socket per collector

mod udp;

pub use udp::{ExportStats, UdpExporter};
