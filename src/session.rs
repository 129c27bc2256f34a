//! Export session: packet assembly state machine.
//!
//! One session serves exactly one collector. It owns the template cache,
//! the packet counters and the sequence number, and writes into an
//! [`ExportBuffer`] owned by the caller.
//!
//! States:
//! - `Idle`: no data flowset open
//! - `FlowsetOpen`: records for one template are being appended
//!
//! A record whose template differs from the open flowset (or whose
//! template is due for refresh) closes the flowset, re-emits the template
//! and opens a new flowset.
//!
//! # Flush contract
//!
//! When a record does not fit, the session finalizes the packet, raises
//! the buffer's flush flag and returns [`AddOutcome::FlushRequired`]
//! without writing any part of the record. The caller sends
//! `buffer.take()` and calls `add_record` again with the same record.
//!
//! # Example
//!
//! ```
//! use nfv9_export::{AddOutcome, CloseOutcome, ExportSession, ExtensionId, FlowRecord};
//!
//! let mut session = ExportSession::builder().source_id(3).build();
//! let mut buffer = session.new_buffer();
//!
//! let record = FlowRecord::new(vec![ExtensionId::GenericFlow, ExtensionId::Ipv4Flow]);
//! assert_eq!(session.add_record(&record, &mut buffer).unwrap(), AddOutcome::Appended);
//!
//! let outcome = session.close_packet(&mut buffer).unwrap();
//! assert_eq!(outcome, CloseOutcome::Ready { sequence: 1, count: 2 });
//! let packet = buffer.take();
//! assert_eq!(&packet[0..2], &[0, 9]);
//! ```

use crate::clock::{Clock, SystemClock};
use crate::config::ExportConfig;
use crate::error::{ExportError, Result};
use crate::protocol::{
    align4, ExportBuffer, PacketHeader, FLOWSET_HEADER_SIZE, HEADER_SIZE, MAX_PACKET_SIZE,
};
use crate::record::FlowRecord;
use crate::template::TemplateCache;

/// Result of [`ExportSession::add_record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The record was serialized into the buffer.
    Appended,
    /// The record has no extensions and was ignored.
    Skipped,
    /// The packet is finalized; send the buffer and retry the record.
    FlushRequired,
}

/// Result of [`ExportSession::close_packet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The packet is finalized and the buffer is ready to send.
    Ready { sequence: u32, count: u16 },
    /// Nothing to send.
    Empty,
}

/// Data flowset state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// No data flowset open.
    Idle,
    /// A data flowset for `template_id` starts at `offset` in the buffer.
    FlowsetOpen { template_id: u16, offset: usize },
}

/// Per-packet counters.
#[derive(Debug, Clone, Copy, Default)]
struct PacketState {
    record_count: u32,
    template_count: u32,
    /// Header unix seconds, set by the first record of the packet.
    unix_secs: Option<u32>,
}

impl PacketState {
    fn is_empty(&self) -> bool {
        self.record_count + self.template_count == 0
    }
}

/// Builder for an [`ExportSession`].
pub struct SessionBuilder {
    config: ExportConfig,
    clock: Box<dyn Clock>,
}

impl SessionBuilder {
    /// Create a builder with default configuration and the system clock.
    pub fn new() -> Self {
        Self {
            config: ExportConfig::default(),
            clock: Box::new(SystemClock),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ExportConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the packet size.
    ///
    /// Clamped to 65535, the limit of the 16-bit length fields.
    ///
    /// Default: 1472
    pub fn max_packet_size(mut self, size: usize) -> Self {
        self.config.max_packet_size = size;
        self
    }

    /// Set the header source id.
    ///
    /// Default: 1
    pub fn source_id(mut self, source_id: u32) -> Self {
        self.config.source_id = source_id;
        self
    }

    /// Set the template staleness bound in seconds.
    ///
    /// Default: 60
    pub fn refresh_interval_secs(mut self, secs: u64) -> Self {
        self.config.refresh_interval_secs = secs;
        self
    }

    /// Set the record count between template re-announcements (0 disables).
    ///
    /// Default: 4096
    pub fn refresh_every_records(mut self, records: u64) -> Self {
        self.config.refresh_every_records = records;
        self
    }

    /// Set the backward skew of the packet time anchor.
    ///
    /// Default: 86400
    pub fn boot_time_skew_secs(mut self, secs: u64) -> Self {
        self.config.boot_time_skew_secs = secs;
        self
    }

    /// Set the bound on distinct templates.
    ///
    /// Default: 65280 (the whole template id space)
    pub fn max_templates(mut self, limit: usize) -> Self {
        self.config.max_templates = limit;
        self
    }

    /// Use a custom clock.
    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Build the session.
    pub fn build(mut self) -> ExportSession {
        if self.config.max_packet_size > MAX_PACKET_SIZE {
            tracing::warn!(
                "Packet size {} clamped to {}",
                self.config.max_packet_size,
                MAX_PACKET_SIZE
            );
            self.config.max_packet_size = MAX_PACKET_SIZE;
        }
        ExportSession {
            templates: TemplateCache::with_limits(
                self.config.max_templates,
                self.config.max_packet_size,
            ),
            config: self.config,
            clock: self.clock,
            state: State::Idle,
            packet: PacketState::default(),
            sequence: 0,
        }
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Export state for one collector.
pub struct ExportSession {
    config: ExportConfig,
    templates: TemplateCache,
    clock: Box<dyn Clock>,
    state: State,
    packet: PacketState,
    /// Sequence number of the last finalized packet.
    sequence: u32,
}

impl ExportSession {
    /// Create a session with the given configuration and the system clock.
    pub fn new(config: ExportConfig) -> Self {
        SessionBuilder::new().config(config).build()
    }

    /// Create a session builder.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Create a buffer sized for this session's packets.
    pub fn new_buffer(&self) -> ExportBuffer {
        ExportBuffer::with_capacity(self.config.max_packet_size)
    }

    /// Session configuration.
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Templates created so far.
    pub fn templates(&self) -> &TemplateCache {
        &self.templates
    }

    /// Sequence number of the last finalized packet (0 before the first).
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Records in the packet being assembled.
    pub fn record_count(&self) -> u32 {
        self.packet.record_count
    }

    /// Templates in the packet being assembled.
    pub fn template_count(&self) -> u32 {
        self.packet.template_count
    }

    /// Id of the open data flowset, if any.
    pub fn open_flowset(&self) -> Option<u16> {
        match self.state {
            State::Idle => None,
            State::FlowsetOpen { template_id, .. } => Some(template_id),
        }
    }

    /// Add one record to the packet in `buf`.
    ///
    /// # Errors
    ///
    /// - `TemplateTooLarge` / `TemplateIdsExhausted` from the template cache
    /// - `PacketTooSmall` if an empty packet cannot hold the template and
    ///   the record
    ///
    /// All of these are unrecoverable for the record's signature.
    pub fn add_record(&mut self, record: &FlowRecord, buf: &mut ExportBuffer) -> Result<AddOutcome> {
        if record.extensions.is_empty() {
            tracing::debug!("Skip record with 0 extensions");
            return Ok(AddOutcome::Skipped);
        }

        if buf.flush_requested() {
            // finalized packet not yet drained by the caller
            return Ok(AddOutcome::FlushRequired);
        }

        if buf.is_empty() {
            self.begin_packet(buf)?;
        }

        if self.packet.unix_secs.is_none() {
            let skew_ms = self.config.boot_time_skew_secs.saturating_mul(1000);
            let anchor = record.msec_first.saturating_sub(skew_ms) / 1000;
            self.packet.unix_secs = Some(anchor as u32);
        }

        let now = self.clock.now_secs();
        let pos = self.templates.resolve(record.size, &record.extensions)?;
        let (template_id, needs_refresh, record_length, flowset_length, template_bytes) = {
            let t = &self.templates[pos];
            (
                t.template_id,
                t.needs_refresh,
                t.record_length,
                t.flowset_length,
                t.template_bytes.clone(),
            )
        };

        if self.open_flowset() != Some(template_id) || needs_refresh {
            self.close_flowset(buf)?;

            let needed = flowset_length + align4(FLOWSET_HEADER_SIZE + record_length);
            if self.available(buf) < needed {
                return self.flush_required(buf, needed);
            }

            buf.put_slice(&template_bytes)?;
            self.packet.template_count += 1;
            if let Some(t) = self.templates.get_mut(pos) {
                t.last_sent_at = now;
                t.needs_refresh = false;
            }
            tracing::debug!("Add template {}, bytes: {}", template_id, flowset_length);

            let offset = buf.len();
            let mut flowset_header = [0u8; FLOWSET_HEADER_SIZE];
            flowset_header[0..2].copy_from_slice(&template_id.to_be_bytes());
            buf.put_slice(&flowset_header)?;
            self.state = State::FlowsetOpen {
                template_id,
                offset,
            };
        }

        let needed = self.record_space(buf, record_length);
        if self.available(buf) < needed {
            return self.flush_required(buf, needed);
        }

        record.append_to(buf)?;
        self.packet.record_count += 1;

        if let Some(t) = self.templates.get_mut(pos) {
            t.records_since_refresh += 1;
            let every = self.config.refresh_every_records;
            let volume_due = every > 0 && t.records_since_refresh % every == 0;
            let age_due = now.saturating_sub(t.last_sent_at) > self.config.refresh_interval_secs;
            if volume_due || age_due {
                t.needs_refresh = true;
                tracing::debug!("Schedule refresh of template {}", t.template_id);
            }
        }

        Ok(AddOutcome::Appended)
    }

    /// Finalize the packet in `buf` for sending.
    ///
    /// Closes the open flowset, assigns the next sequence number and writes
    /// the header. Raises the buffer's flush flag. An empty packet is left
    /// alone and reported as [`CloseOutcome::Empty`].
    pub fn close_packet(&mut self, buf: &mut ExportBuffer) -> Result<CloseOutcome> {
        if self.packet.is_empty() {
            return Ok(CloseOutcome::Empty);
        }
        let (sequence, count) = self.finalize_packet(buf)?;
        buf.request_flush();
        Ok(CloseOutcome::Ready { sequence, count })
    }

    /// Reserve the header of a new packet and reset per-packet state.
    fn begin_packet(&mut self, buf: &mut ExportBuffer) -> Result<()> {
        self.state = State::Idle;
        self.packet = PacketState::default();
        buf.put_zeros(HEADER_SIZE).map_err(|_| ExportError::PacketTooSmall {
            needed: HEADER_SIZE,
            capacity: buf.capacity(),
        })
    }

    /// Packet size limit for `buf`: its capacity, capped by the session's
    /// packet size.
    fn packet_limit(&self, buf: &ExportBuffer) -> usize {
        buf.capacity().min(self.config.max_packet_size)
    }

    /// Bytes left in the packet being assembled.
    fn available(&self, buf: &ExportBuffer) -> usize {
        self.packet_limit(buf).saturating_sub(buf.len())
    }

    /// Bytes needed to append a record, including the padding the open
    /// flowset will need when it is closed.
    fn record_space(&self, buf: &ExportBuffer, record_length: usize) -> usize {
        match self.state {
            State::FlowsetOpen { offset, .. } => {
                let current = buf.len() - offset;
                align4(current + record_length) - current
            }
            State::Idle => align4(FLOWSET_HEADER_SIZE + record_length),
        }
    }

    fn flush_required(&mut self, buf: &mut ExportBuffer, needed: usize) -> Result<AddOutcome> {
        if self.packet.is_empty() {
            let capacity = self.packet_limit(buf);
            buf.clear();
            self.state = State::Idle;
            self.packet = PacketState::default();
            return Err(ExportError::PacketTooSmall {
                needed: HEADER_SIZE + needed,
                capacity,
            });
        }

        tracing::debug!("Buffer full, {} bytes needed. Flush first", needed);
        self.finalize_packet(buf)?;
        buf.request_flush();
        Ok(AddOutcome::FlushRequired)
    }

    /// Close the open data flowset: zero-pad to 4 bytes and patch its length.
    fn close_flowset(&mut self, buf: &mut ExportBuffer) -> Result<()> {
        if let State::FlowsetOpen { offset, .. } = self.state {
            let length = buf.len() - offset;
            let padded = align4(length);
            let wire_length = u16::try_from(padded).map_err(|_| ExportError::FieldOverflow {
                field: "flowset length",
                value: padded,
            })?;
            buf.put_zeros(padded - length)?;
            buf.patch_u16(offset + 2, wire_length);
            self.state = State::Idle;
            tracing::debug!("Close flowset: length {}, padding {}", padded, padded - length);
        }
        Ok(())
    }

    fn finalize_packet(&mut self, buf: &mut ExportBuffer) -> Result<(u32, u16)> {
        self.close_flowset(buf)?;

        let total = (self.packet.record_count + self.packet.template_count) as usize;
        let count = u16::try_from(total).map_err(|_| ExportError::FieldOverflow {
            field: "packet count",
            value: total,
        })?;
        self.sequence = self.sequence.wrapping_add(1);
        let header = PacketHeader::new(
            count,
            self.packet.unix_secs.unwrap_or(0),
            self.sequence,
            self.config.source_id,
        );
        buf.patch(0, &header.encode());

        tracing::debug!(
            "Prepare buffer: sequence: {}, records: {}, templates: {}",
            self.sequence,
            self.packet.record_count,
            self.packet.template_count
        );
        self.packet = PacketState::default();
        Ok((self.sequence, count))
    }
}
