//! Template cache.
//!
//! One descriptor per distinct signature, kept for the lifetime of the
//! session. Ids are assigned sequentially starting from 256.
//!
//! Signatures compare the declared record size and the *ordered* extension
//! list: the same extensions in a different order get their own template.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use bytes::Bytes;

use super::builder::build_template;
use crate::error::{ExportError, Result};
use crate::protocol::{DEFAULT_MAX_PACKET_SIZE, MIN_TEMPLATE_ID};
use crate::schema::ExtensionId;

/// Number of template ids available (256..=65535).
pub const TEMPLATE_ID_SPACE: usize = (u16::MAX - MIN_TEMPLATE_ID) as usize + 1;

/// Identity of a template.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub size: u32,
    pub extensions: Vec<ExtensionId>,
}

impl Signature {
    fn matches(&self, size: u32, extensions: &[ExtensionId]) -> bool {
        self.size == size && self.extensions == extensions
    }
}

/// A cached template and its refresh bookkeeping.
#[derive(Debug, Clone)]
pub struct TemplateDescriptor {
    pub signature: Signature,
    pub template_id: u16,
    pub field_count: usize,
    pub record_length: usize,
    pub flowset_length: usize,
    /// Pre-built template flowset.
    pub template_bytes: Bytes,
    /// Seconds timestamp of the last emission (0 = never sent).
    pub last_sent_at: u64,
    pub records_since_refresh: u64,
    pub needs_refresh: bool,
}

/// Cache of output templates.
#[derive(Debug)]
pub struct TemplateCache {
    /// Descriptors in creation order.
    templates: Vec<TemplateDescriptor>,
    /// Signature hash to candidate positions in `templates`.
    index: HashMap<u64, Vec<usize>>,
    max_templates: usize,
    max_packet_size: usize,
}

fn signature_hash(size: u32, extensions: &[ExtensionId]) -> u64 {
    let mut hasher = DefaultHasher::new();
    size.hash(&mut hasher);
    extensions.hash(&mut hasher);
    hasher.finish()
}

/// Cache size at which a near-full warning is logged (90%, at least 1).
fn warn_threshold(max_templates: usize) -> usize {
    (max_templates * 9 / 10).max(1)
}

impl TemplateCache {
    /// Create an empty cache with default limits.
    pub fn new() -> Self {
        Self::with_limits(TEMPLATE_ID_SPACE, DEFAULT_MAX_PACKET_SIZE)
    }

    /// Create an empty cache.
    ///
    /// `max_templates` is clamped to the template id space.
    pub fn with_limits(max_templates: usize, max_packet_size: usize) -> Self {
        Self {
            templates: Vec::new(),
            index: HashMap::new(),
            max_templates: max_templates.min(TEMPLATE_ID_SPACE),
            max_packet_size,
        }
    }

    /// Find the template for a signature, creating it on a miss.
    ///
    /// Returns the position of the descriptor, usable with [`get`](Self::get)
    /// and [`get_mut`](Self::get_mut).
    ///
    /// # Errors
    ///
    /// - `TemplateTooLarge` if the template flowset exceeds the packet size
    /// - `TemplateIdsExhausted` if the cache is full
    ///
    /// Neither error registers a template.
    pub fn resolve(&mut self, size: u32, extensions: &[ExtensionId]) -> Result<usize> {
        let hash = signature_hash(size, extensions);
        if let Some(candidates) = self.index.get(&hash) {
            if let Some(&pos) = candidates
                .iter()
                .find(|&&pos| self.templates[pos].signature.matches(size, extensions))
            {
                return Ok(pos);
            }
        }

        if self.templates.len() >= self.max_templates {
            return Err(ExportError::TemplateIdsExhausted {
                limit: self.max_templates,
            });
        }

        let template_id = self
            .templates
            .last()
            .map_or(MIN_TEMPLATE_ID, |t| t.template_id + 1);
        let built = build_template(template_id, extensions, self.max_packet_size)?;

        tracing::debug!(
            "Created template {}: {} fields, record length {}",
            template_id,
            built.layout.field_count(),
            built.layout.record_length
        );

        let pos = self.templates.len();
        self.templates.push(TemplateDescriptor {
            signature: Signature {
                size,
                extensions: extensions.to_vec(),
            },
            template_id,
            field_count: built.layout.field_count(),
            record_length: built.layout.record_length,
            flowset_length: built.flowset_length,
            template_bytes: built.flowset,
            last_sent_at: 0,
            records_since_refresh: 0,
            needs_refresh: false,
        });
        self.index.entry(hash).or_default().push(pos);

        if self.templates.len() == warn_threshold(self.max_templates) {
            tracing::warn!(
                "Template cache at {} of {} templates",
                self.templates.len(),
                self.max_templates
            );
        }

        Ok(pos)
    }

    /// Get a descriptor by position.
    pub fn get(&self, pos: usize) -> Option<&TemplateDescriptor> {
        self.templates.get(pos)
    }

    /// Get a mutable descriptor by position.
    pub fn get_mut(&mut self, pos: usize) -> Option<&mut TemplateDescriptor> {
        self.templates.get_mut(pos)
    }

    /// Find a descriptor by template id.
    pub fn by_id(&self, template_id: u16) -> Option<&TemplateDescriptor> {
        let pos = template_id.checked_sub(MIN_TEMPLATE_ID)? as usize;
        self.templates.get(pos)
    }

    /// Number of cached templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Check if no template was created yet.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Iterate over templates in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &TemplateDescriptor> {
        self.templates.iter()
    }
}

impl std::ops::Index<usize> for TemplateCache {
    type Output = TemplateDescriptor;

    fn index(&self, pos: usize) -> &TemplateDescriptor {
        &self.templates[pos]
    }
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::new()
    }
}
