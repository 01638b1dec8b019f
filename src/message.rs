//! Decoded message model: the caller-owned output of one parse call.
//!
//! Everything in here is built fresh per parse and handed to the caller by
//! value. Field value bytes are copied out of the input buffer at decode
//! time, so a returned [`Message`] never borrows from the buffer (or the
//! framing scratch buffer) it was decoded from.

use crate::template::FieldSpecifier;

/// Fixed 16-byte message header. All integers big-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Protocol version; this decoder accepts only [`crate::codec::VERSION`].
    pub version: u16,
    /// Total message length in octets, header included.
    pub length: u16,
    /// Export timestamp, seconds since the UNIX epoch.
    pub export_time: u32,
    /// Exporter's running data-record sequence counter.
    pub sequence: u32,
    /// Observation domain id scoping all template ids in this message.
    pub domain_id: u32,
}

impl MessageHeader {
    pub const SIZE: usize = 16;
}

/// Identity of one information element: the 15-bit element id plus the
/// enterprise number when the enterprise bit was set on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId {
    pub id: u16,
    pub enterprise: Option<u32>,
}

/// One decoded field value, tagged with its element identity. `bytes` is an
/// owned copy of the value's wire octets, uninterpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValue {
    pub element: ElementId,
    pub bytes: Vec<u8>,
}

/// A template record as transmitted: the nominal wire id plus its field
/// layout. A withdrawal decodes to an empty field list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRecord {
    pub template_id: u16,
    pub fields: Vec<FieldSpecifier>,
}

impl TemplateRecord {
    /// A zero-field record withdraws the template instead of defining one.
    pub fn is_withdrawal(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One decoded data record: values in template field order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRecord {
    /// Set id of the data set this record came from.
    pub template_id: u16,
    pub values: Vec<FieldValue>,
}

/// One decoded protocol unit: the header plus every template record and data
/// record the message carried, in wire order. Template records are reported
/// for every definition and withdrawal the wire sent, independent of what
/// the session's template store retained.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: MessageHeader,
    pub template_records: Vec<TemplateRecord>,
    pub data_records: Vec<DataRecord>,
}

impl Message {
    pub(crate) fn new(header: MessageHeader) -> Message {
        Message {
            header,
            template_records: Vec::new(),
            data_records: Vec::new(),
        }
    }
}
