//! Error types for nfv9-export.

use thiserror::Error;

/// Main error type for all export operations.
///
/// Buffer exhaustion during normal operation is *not* an error: it is
/// reported as [`AddOutcome::FlushRequired`](crate::AddOutcome).
#[derive(Debug, Error)]
pub enum ExportError {
    /// I/O error while sending a packet.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A template flowset does not fit into a single packet.
    ///
    /// Too many extensions for the configured packet size. Not retryable.
    #[error("template {template_id}: flowset length {length} exceeds packet size {max}")]
    TemplateTooLarge {
        template_id: u16,
        length: usize,
        max: usize,
    },

    /// No template id is left for a new signature.
    #[error("template limit reached: {limit} templates")]
    TemplateIdsExhausted { limit: usize },

    /// A write would pass the end boundary of the export buffer.
    #[error("buffer overflow: need {needed} bytes, {remaining} remaining")]
    BufferOverflow { needed: usize, remaining: usize },

    /// A length or count does not fit its 16-bit wire field.
    #[error("{field} {value} exceeds the 16-bit wire field")]
    FieldOverflow { field: &'static str, value: usize },

    /// An empty packet cannot hold even one template and one record.
    #[error("packet capacity {capacity} too small: need {needed} bytes")]
    PacketTooSmall { needed: usize, capacity: usize },
}

/// Result type alias using ExportError.
pub type Result<T> = std::result::Result<T, ExportError>;
