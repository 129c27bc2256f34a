//! Extension field schema.
//!
//! Every flow record carries an ordered list of extensions. Each extension
//! maps to a fixed, ordered list of `(field type, byte width)` pairs that
//! the template builder announces and the record serializer fills.
//!
//! ```text
//! GenericFlow   42 bytes  11 fields
//! Ipv4Flow       8 bytes   2 fields
//! Ipv6Flow      32 bytes   2 fields
//! FlowMisc      12 bytes   6 fields  (mask type codes depend on address family)
//! CntFlow       24 bytes   3 fields
//! VLan           4 bytes   2 fields
//! AsRouting      8 bytes   2 fields
//! BgpNextHopV4   4 bytes   1 field
//! BgpNextHopV6  16 bytes   1 field
//! IpNextHopV4    4 bytes   1 field
//! IpNextHopV6   16 bytes   1 field
//! MplsLabel     30 bytes  10 fields
//! MacAddr       24 bytes   4 fields
//! AsAdjacent     8 bytes   2 fields
//! ```

use serde::{Deserialize, Serialize};

use crate::protocol::field_types as ft;

/// Logical group of flow fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u16)]
pub enum ExtensionId {
    GenericFlow = 1,
    Ipv4Flow = 2,
    Ipv6Flow = 3,
    FlowMisc = 4,
    CntFlow = 5,
    VLan = 6,
    AsRouting = 7,
    BgpNextHopV4 = 8,
    BgpNextHopV6 = 9,
    IpNextHopV4 = 10,
    IpNextHopV6 = 11,
    MplsLabel = 14,
    MacAddr = 15,
    AsAdjacent = 16,
}

/// Type code of a template field.
///
/// Mask fields are contextual: their code depends on the address family
/// extension seen earlier in the same record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCode {
    Fixed(u16),
    SrcMask,
    DstMask,
}

/// One entry of the static field table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub type_code: TypeCode,
    pub length: u16,
}

/// A template field with its type code resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub field_type: u16,
    pub length: u16,
}

const fn fixed(code: u16, length: u16) -> FieldSpec {
    FieldSpec {
        type_code: TypeCode::Fixed(code),
        length,
    }
}

/// Engine type and engine id, present in every template.
pub const ENGINE_FIELDS: [Field; 2] = [
    Field {
        field_type: ft::ENGINE_TYPE,
        length: 1,
    },
    Field {
        field_type: ft::ENGINE_ID,
        length: 1,
    },
];

/// Byte width of the engine fields.
pub const ENGINE_WIDTH: usize = 2;

const GENERIC_FLOW: [FieldSpec; 11] = [
    fixed(ft::FLOW_START_MILLISECONDS, 8),
    fixed(ft::FLOW_END_MILLISECONDS, 8),
    fixed(ft::IN_PKTS, 8),
    fixed(ft::IN_BYTES, 8),
    fixed(ft::L4_SRC_PORT, 2),
    fixed(ft::L4_DST_PORT, 2),
    fixed(ft::ICMP_TYPE, 2),
    fixed(ft::PROTOCOL, 1),
    fixed(ft::TCP_FLAGS, 1),
    fixed(ft::FORWARDING_STATUS, 1),
    fixed(ft::SRC_TOS, 1),
];

const IPV4_FLOW: [FieldSpec; 2] = [fixed(ft::IPV4_SRC_ADDR, 4), fixed(ft::IPV4_DST_ADDR, 4)];

const IPV6_FLOW: [FieldSpec; 2] = [fixed(ft::IPV6_SRC_ADDR, 16), fixed(ft::IPV6_DST_ADDR, 16)];

const FLOW_MISC: [FieldSpec; 6] = [
    fixed(ft::INPUT_SNMP, 4),
    fixed(ft::OUTPUT_SNMP, 4),
    FieldSpec {
        type_code: TypeCode::SrcMask,
        length: 1,
    },
    FieldSpec {
        type_code: TypeCode::DstMask,
        length: 1,
    },
    fixed(ft::DIRECTION, 1),
    fixed(ft::DST_TOS, 1),
];

const CNT_FLOW: [FieldSpec; 3] = [
    fixed(ft::FLOWS, 8),
    fixed(ft::OUT_PKTS, 8),
    fixed(ft::OUT_BYTES, 8),
];

const VLAN: [FieldSpec; 2] = [fixed(ft::SRC_VLAN, 2), fixed(ft::DST_VLAN, 2)];

const AS_ROUTING: [FieldSpec; 2] = [fixed(ft::SRC_AS, 4), fixed(ft::DST_AS, 4)];

const BGP_NEXT_HOP_V4: [FieldSpec; 1] = [fixed(ft::BGP_IPV4_NEXT_HOP, 4)];

const BGP_NEXT_HOP_V6: [FieldSpec; 1] = [fixed(ft::BGP_IPV6_NEXT_HOP, 16)];

const IP_NEXT_HOP_V4: [FieldSpec; 1] = [fixed(ft::IPV4_NEXT_HOP, 4)];

const IP_NEXT_HOP_V6: [FieldSpec; 1] = [fixed(ft::IPV6_NEXT_HOP, 16)];

const MPLS_LABEL: [FieldSpec; 10] = [
    fixed(ft::MPLS_LABEL_1, 3),
    fixed(ft::MPLS_LABEL_2, 3),
    fixed(ft::MPLS_LABEL_3, 3),
    fixed(ft::MPLS_LABEL_4, 3),
    fixed(ft::MPLS_LABEL_5, 3),
    fixed(ft::MPLS_LABEL_6, 3),
    fixed(ft::MPLS_LABEL_7, 3),
    fixed(ft::MPLS_LABEL_8, 3),
    fixed(ft::MPLS_LABEL_9, 3),
    fixed(ft::MPLS_LABEL_10, 3),
];

const MAC_ADDR: [FieldSpec; 4] = [
    fixed(ft::IN_SRC_MAC, 6),
    fixed(ft::OUT_DST_MAC, 6),
    fixed(ft::IN_DST_MAC, 6),
    fixed(ft::OUT_SRC_MAC, 6),
];

const AS_ADJACENT: [FieldSpec; 2] = [
    fixed(ft::BGP_NEXT_ADJACENT_AS, 4),
    fixed(ft::BGP_PREV_ADJACENT_AS, 4),
];

impl ExtensionId {
    /// Every extension, in identifier order.
    pub const ALL: [ExtensionId; 14] = [
        ExtensionId::GenericFlow,
        ExtensionId::Ipv4Flow,
        ExtensionId::Ipv6Flow,
        ExtensionId::FlowMisc,
        ExtensionId::CntFlow,
        ExtensionId::VLan,
        ExtensionId::AsRouting,
        ExtensionId::BgpNextHopV4,
        ExtensionId::BgpNextHopV6,
        ExtensionId::IpNextHopV4,
        ExtensionId::IpNextHopV6,
        ExtensionId::MplsLabel,
        ExtensionId::MacAddr,
        ExtensionId::AsAdjacent,
    ];

    /// Ordered field list of this extension.
    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            ExtensionId::GenericFlow => &GENERIC_FLOW,
            ExtensionId::Ipv4Flow => &IPV4_FLOW,
            ExtensionId::Ipv6Flow => &IPV6_FLOW,
            ExtensionId::FlowMisc => &FLOW_MISC,
            ExtensionId::CntFlow => &CNT_FLOW,
            ExtensionId::VLan => &VLAN,
            ExtensionId::AsRouting => &AS_ROUTING,
            ExtensionId::BgpNextHopV4 => &BGP_NEXT_HOP_V4,
            ExtensionId::BgpNextHopV6 => &BGP_NEXT_HOP_V6,
            ExtensionId::IpNextHopV4 => &IP_NEXT_HOP_V4,
            ExtensionId::IpNextHopV6 => &IP_NEXT_HOP_V6,
            ExtensionId::MplsLabel => &MPLS_LABEL,
            ExtensionId::MacAddr => &MAC_ADDR,
            ExtensionId::AsAdjacent => &AS_ADJACENT,
        }
    }

    /// Total byte width of this extension on the wire.
    pub fn width(self) -> usize {
        self.fields().iter().map(|f| f.length as usize).sum()
    }

    /// Numeric identifier.
    #[inline]
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Look up an extension by its numeric identifier.
    pub fn from_u16(value: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|ext| ext.as_u16() == value)
    }
}

/// Mask type codes in effect while walking a record's extensions.
///
/// Starts out unknown; an address family extension switches both codes
/// for every extension that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskTypes {
    pub src: u16,
    pub dst: u16,
}

impl MaskTypes {
    pub const fn unknown() -> Self {
        Self {
            src: ft::UNKNOWN,
            dst: ft::UNKNOWN,
        }
    }

    /// Update the codes after `ext` has been laid out.
    pub fn observe(&mut self, ext: ExtensionId) {
        match ext {
            ExtensionId::Ipv4Flow => {
                self.src = ft::SRC_MASK;
                self.dst = ft::DST_MASK;
            }
            ExtensionId::Ipv6Flow => {
                self.src = ft::IPV6_SRC_MASK;
                self.dst = ft::IPV6_DST_MASK;
            }
            _ => {}
        }
    }

    /// Resolve a table entry to a concrete field.
    pub fn resolve(&self, spec: &FieldSpec) -> Field {
        let field_type = match spec.type_code {
            TypeCode::Fixed(code) => code,
            TypeCode::SrcMask => self.src,
            TypeCode::DstMask => self.dst,
        };
        Field {
            field_type,
            length: spec.length,
        }
    }
}

impl Default for MaskTypes {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Resolved fields of `ext` under the given mask context.
pub fn fields_for(ext: ExtensionId, masks: &MaskTypes) -> Vec<Field> {
    ext.fields().iter().map(|spec| masks.resolve(spec)).collect()
}
