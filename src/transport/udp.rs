//! UDP exporter: drives an [`ExportSession`] and sends finished packets.
//!
//! # Example
//!
//! ```no_run
//! use nfv9_export::transport::UdpExporter;
//! use nfv9_export::{ExportSession, ExtensionId, FlowRecord};
//!
//! # async fn run() -> nfv9_export::Result<()> {
//! let session = ExportSession::builder().source_id(10).build();
//! let mut exporter = UdpExporter::connect("192.0.2.10:2055", session).await?;
//!
//! let record = FlowRecord::new(vec![ExtensionId::GenericFlow, ExtensionId::Ipv4Flow]);
//! exporter.export(&record).await?;
//! exporter.flush().await?;
//! # Ok(())
//! # }
//! ```

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::{lookup_host, ToSocketAddrs, UdpSocket};

use crate::error::{ExportError, Result};
use crate::protocol::ExportBuffer;
use crate::record::FlowRecord;
use crate::session::{AddOutcome, CloseOutcome, ExportSession};

/// Counters of an exporter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub records_exported: u64,
    pub records_skipped: u64,
}

/// Sends the packets of one session to one collector.
pub struct UdpExporter {
    socket: UdpSocket,
    session: ExportSession,
    buffer: ExportBuffer,
    stats: ExportStats,
}

impl UdpExporter {
    /// Bind an ephemeral local port and connect it to `collector`.
    pub async fn connect<A: ToSocketAddrs>(collector: A, session: ExportSession) -> Result<Self> {
        let peer = lookup_host(collector).await?.next().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "collector address resolved to nothing",
            )
        })?;
        let local = if peer.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };

        let socket = UdpSocket::bind(local).await?;
        socket.connect(peer).await?;
        tracing::debug!("Exporting to collector {}", peer);

        Ok(Self::from_socket(socket, session))
    }

    /// Use an already connected socket.
    pub fn from_socket(socket: UdpSocket, session: ExportSession) -> Self {
        let buffer = session.new_buffer();
        Self {
            socket,
            session,
            buffer,
            stats: ExportStats::default(),
        }
    }

    /// Add one record, sending the current packet first if it is full.
    ///
    /// Returns [`AddOutcome::Appended`] or [`AddOutcome::Skipped`].
    pub async fn export(&mut self, record: &FlowRecord) -> Result<AddOutcome> {
        loop {
            match self.session.add_record(record, &mut self.buffer)? {
                AddOutcome::FlushRequired => self.send_buffer().await?,
                AddOutcome::Appended => {
                    self.stats.records_exported += 1;
                    return Ok(AddOutcome::Appended);
                }
                AddOutcome::Skipped => {
                    self.stats.records_skipped += 1;
                    return Ok(AddOutcome::Skipped);
                }
            }
        }
    }

    /// Close and send the pending packet.
    ///
    /// Returns `false` if there was nothing to send.
    pub async fn flush(&mut self) -> Result<bool> {
        if self.buffer.flush_requested() {
            self.send_buffer().await?;
        }
        match self.session.close_packet(&mut self.buffer)? {
            CloseOutcome::Ready { .. } => {
                self.send_buffer().await?;
                Ok(true)
            }
            CloseOutcome::Empty => {
                // a failed first record can leave a bare header behind
                self.buffer.clear();
                Ok(false)
            }
        }
    }

    async fn send_buffer(&mut self) -> Result<()> {
        let packet = self.buffer.take();
        let sent = match self.socket.send(&packet).await {
            Ok(sent) => sent,
            Err(e) => {
                tracing::error!("Send failed: {}", e);
                return Err(e.into());
            }
        };
        if sent != packet.len() {
            tracing::warn!("Short send: {} of {} bytes", sent, packet.len());
            return Err(ExportError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "datagram truncated",
            )));
        }

        self.stats.packets_sent += 1;
        self.stats.bytes_sent += sent as u64;
        tracing::debug!(
            "Sent packet {}: {} bytes",
            self.session.sequence(),
            sent
        );
        Ok(())
    }

    /// Exporter counters.
    pub fn stats(&self) -> ExportStats {
        self.stats
    }

    /// The driven session.
    pub fn session(&self) -> &ExportSession {
        &self.session
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.peer_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::protocol::PacketHeader;
    use crate::schema::ExtensionId;

    async fn collector() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    fn session() -> ExportSession {
        ExportSession::builder()
            .clock(ManualClock::new(1_700_000_000))
            .source_id(5)
            .build()
    }

    fn record() -> FlowRecord {
        FlowRecord {
            msec_first: 1_700_000_000_000,
            ..FlowRecord::new(vec![ExtensionId::GenericFlow, ExtensionId::Ipv4Flow])
        }
    }

    #[tokio::test]
    async fn test_flush_sends_one_datagram() {
        let (collector, addr) = collector().await;
        let mut exporter = UdpExporter::connect(addr, session()).await.unwrap();
        assert_eq!(exporter.peer_addr().unwrap(), addr);

        exporter.export(&record()).await.unwrap();
        exporter.export(&record()).await.unwrap();
        assert!(exporter.flush().await.unwrap());

        let mut buf = [0u8; 2048];
        let len = collector.recv(&mut buf).await.unwrap();
        assert_eq!(len, 20 + 68 + 4 + 2 * 52);

        let header = PacketHeader::decode(&buf[..len]).unwrap();
        assert_eq!(header.count, 3);
        assert_eq!(header.sequence, 1);
        assert_eq!(header.source_id, 5);

        let stats = exporter.stats();
        assert_eq!(stats.packets_sent, 1);
        assert_eq!(stats.bytes_sent, len as u64);
        assert_eq!(stats.records_exported, 2);
    }

    #[tokio::test]
    async fn test_flush_without_records() {
        let (_collector, addr) = collector().await;
        let mut exporter = UdpExporter::connect(addr, session()).await.unwrap();

        assert!(!exporter.flush().await.unwrap());
        assert_eq!(exporter.stats().packets_sent, 0);
    }

    #[tokio::test]
    async fn test_full_packet_is_sent_before_next_record() {
        let (collector, addr) = collector().await;
        let mut exporter = UdpExporter::connect(addr, session()).await.unwrap();

        // 1472 - 20 - 68 - 4 = 1380 bytes hold 26 records of 52 bytes
        for _ in 0..27 {
            exporter.export(&record()).await.unwrap();
        }
        assert_eq!(exporter.stats().packets_sent, 1);
        exporter.flush().await.unwrap();

        let mut buf = [0u8; 2048];
        let first = collector.recv(&mut buf).await.unwrap();
        let header = PacketHeader::decode(&buf[..first]).unwrap();
        assert_eq!(header.count, 27);
        assert_eq!(header.sequence, 1);

        let second = collector.recv(&mut buf).await.unwrap();
        let header = PacketHeader::decode(&buf[..second]).unwrap();
        assert_eq!(header.count, 2);
        assert_eq!(header.sequence, 2);
    }

    #[tokio::test]
    async fn test_skipped_record_counted() {
        let (_collector, addr) = collector().await;
        let mut exporter = UdpExporter::connect(addr, session()).await.unwrap();

        let outcome = exporter.export(&FlowRecord::default()).await.unwrap();
        assert_eq!(outcome, AddOutcome::Skipped);
        assert_eq!(exporter.stats().records_skipped, 1);
    }
}
