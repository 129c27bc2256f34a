//! Template builder.
//!
//! Lays out a template from a record's ordered extension list and
//! pre-serializes its template flowset:
//! ```text
//! ┌────────────┬─────────┬─────────────┬─────────────┬────────────────────┐
//! │ Flowset ID │ Length  │ Template ID │ Field count │ (type, length) ... │
//! │ 0          │ 2 bytes │ 2 bytes     │ 2 bytes     │ 4 bytes per field  │
//! └────────────┴─────────┴─────────────┴─────────────┴────────────────────┘
//! ```
//! The flowset is padded with one zero `(type, length)` pair when its
//! length is not 4-byte aligned. The padding pair is not counted.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ExportError, Result};
use crate::protocol::{align4, TEMPLATE_FLOWSET_ID};
use crate::schema::{ExtensionId, Field, MaskTypes, ENGINE_FIELDS, ENGINE_WIDTH};

/// Field layout derived from an extension list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateLayout {
    /// Engine fields followed by each extension's fields in record order.
    pub fields: Vec<Field>,
    /// Bytes one data record occupies.
    pub record_length: usize,
}

impl TemplateLayout {
    /// Lay out the fields for `extensions`, in the given order.
    pub fn new(extensions: &[ExtensionId]) -> Self {
        let mut fields = Vec::with_capacity(ENGINE_FIELDS.len() + extensions.len() * 4);
        fields.extend_from_slice(&ENGINE_FIELDS);
        let mut record_length = ENGINE_WIDTH;

        let mut masks = MaskTypes::unknown();
        for &ext in extensions {
            fields.extend(ext.fields().iter().map(|spec| masks.resolve(spec)));
            record_length += ext.width();
            masks.observe(ext);
        }

        Self {
            fields,
            record_length,
        }
    }

    /// Number of announced fields (padding excluded).
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Length of the template flowset, 4-byte aligned.
    pub fn flowset_length(&self) -> usize {
        flowset_length(self.field_count())
    }
}

/// Template flowset length for `field_count` fields.
///
/// Four bytes of flowset header, four bytes of template header and four
/// bytes per field, rounded up to a multiple of 4.
#[inline]
pub fn flowset_length(field_count: usize) -> usize {
    align4(4 * (2 + field_count))
}

/// A laid out and serialized template.
#[derive(Debug, Clone)]
pub struct BuiltTemplate {
    pub layout: TemplateLayout,
    pub flowset_length: usize,
    /// Wire bytes of the template flowset, `flowset_length` long.
    pub flowset: Bytes,
}

/// Build the template flowset for `extensions` under `template_id`.
///
/// # Errors
///
/// Returns `TemplateTooLarge` if the flowset cannot fit into a packet of
/// `max_packet_size` bytes.
pub fn build_template(
    template_id: u16,
    extensions: &[ExtensionId],
    max_packet_size: usize,
) -> Result<BuiltTemplate> {
    let layout = TemplateLayout::new(extensions);
    let length = layout.flowset_length();

    if length > max_packet_size {
        return Err(ExportError::TemplateTooLarge {
            template_id,
            length,
            max: max_packet_size,
        });
    }

    let mut buf = BytesMut::with_capacity(length);
    buf.put_u16(TEMPLATE_FLOWSET_ID);
    buf.put_u16(length as u16);
    buf.put_u16(template_id);
    buf.put_u16(layout.field_count() as u16);
    for field in &layout.fields {
        buf.put_u16(field.field_type);
        buf.put_u16(field.length);
    }
    // padding pair
    if buf.len() < length {
        buf.put_bytes(0, length - buf.len());
    }
    debug_assert_eq!(buf.len(), length);

    Ok(BuiltTemplate {
        layout,
        flowset_length: length,
        flowset: buf.freeze(),
    })
}
