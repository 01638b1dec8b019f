//! Decode one IPFIX message: header, set loop, template and data records.
//!
//! The central discipline is byte-count driven: every set consumes exactly
//! the span its header declares, whatever its contents decoded to, and the
//! message cursor only ever advances by declared set lengths. One corrupt
//! set therefore cannot desynchronize the sets after it, and one corrupt
//! message cannot desynchronize the next message on the stream.

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};
use parking_lot::RwLock;
use tracing::debug;

use crate::message::{DataRecord, FieldValue, Message, MessageHeader, TemplateRecord};
use crate::template::{FieldSpecifier, TemplateStore};

/// Protocol version this decoder accepts (IPFIX, the NetFlow v10 family).
pub const VERSION: u16 = 10;

/// Set id framing a template set.
const TEMPLATE_SET_ID: u16 = 2;
/// Set id framing an options template set.
const OPTIONS_TEMPLATE_SET_ID: u16 = 3;

const SET_HEADER_LEN: usize = 4;
const TEMPLATE_RECORD_HEADER_LEN: usize = 4;

/// Everything a parse call can fail with. No variant is fatal to the
/// session: the template store keeps the state it had before the failing
/// set, and the next framed message decodes normally.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// The stream ended before one complete message could be framed.
    /// Recoverable: re-attempt when more bytes arrive.
    #[error("end of input before a complete message")]
    EndOfInput,
    /// The header version field did not match [`VERSION`]. On a live stream
    /// this usually means a previous message was mis-framed.
    #[error("unsupported message version {0}")]
    UnsupportedVersion(u16),
    /// A set, template record, or field specifier claimed more bytes than
    /// remained in its bounded slice.
    #[error("truncated input reading {0}")]
    TruncatedInput(&'static str),
    /// A field value ran past the end of its record's bytes.
    #[error("truncated field value")]
    TruncatedField,
    /// Sets did not tile the declared message length exactly.
    #[error("sets do not tile the message: declared length {declared}, sets end at {actual}")]
    LengthMismatch { declared: u16, actual: usize },
}

/// Decode the message starting at `bytes[0]`, resolving data sets against
/// `store`. Bytes beyond the declared message length are ignored, so a
/// caller may hand in a buffer holding several concatenated messages and
/// advance by `header.length` itself.
pub(crate) fn decode_message(
    bytes: &[u8],
    store: &RwLock<TemplateStore>,
) -> Result<Message, DecodeError> {
    let header = decode_header(bytes)?;
    let declared = header.length as usize;
    if declared < MessageHeader::SIZE {
        return Err(DecodeError::LengthMismatch {
            declared: header.length,
            actual: MessageHeader::SIZE,
        });
    }
    if bytes.len() < declared {
        return Err(DecodeError::TruncatedInput("message body"));
    }

    let mut message = Message::new(header);
    let mut cursor = MessageHeader::SIZE;
    while cursor < declared {
        if declared - cursor < SET_HEADER_LEN {
            return Err(DecodeError::LengthMismatch { declared: header.length, actual: cursor });
        }
        let set_id = u16::from_be_bytes([bytes[cursor], bytes[cursor + 1]]);
        let set_len = u16::from_be_bytes([bytes[cursor + 2], bytes[cursor + 3]]) as usize;
        if set_len < SET_HEADER_LEN || cursor + set_len > declared {
            return Err(DecodeError::LengthMismatch {
                declared: header.length,
                actual: cursor + set_len,
            });
        }
        let body = &bytes[cursor + SET_HEADER_LEN..cursor + set_len];
        decode_set(set_id, body, store, &mut message)?;
        cursor += set_len;
    }
    Ok(message)
}

/// Decode the fixed 16-byte header. The version is checked before anything
/// else so desynchronized input fails loudly instead of yielding a garbage
/// length.
pub(crate) fn decode_header(bytes: &[u8]) -> Result<MessageHeader, DecodeError> {
    if bytes.len() < MessageHeader::SIZE {
        return Err(DecodeError::TruncatedInput("message header"));
    }
    let mut r = Cursor::new(bytes);
    let version = r.read_u16::<BigEndian>()?;
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    Ok(MessageHeader {
        version,
        length: r.read_u16::<BigEndian>()?,
        export_time: r.read_u32::<BigEndian>()?,
        sequence: r.read_u32::<BigEndian>()?,
        domain_id: r.read_u32::<BigEndian>()?,
    })
}

fn decode_set(
    set_id: u16,
    body: &[u8],
    store: &RwLock<TemplateStore>,
    message: &mut Message,
) -> Result<(), DecodeError> {
    match set_id {
        TEMPLATE_SET_ID => decode_template_set(body, false, store, message),
        OPTIONS_TEMPLATE_SET_ID => decode_template_set(body, true, store, message),
        // Every other set id names a data set template, reserved ranges
        // included: those can only match if the wire actually defined them.
        _ => decode_data_set(set_id, body, store, message),
    }
}

/// Decode every template record in the set, then apply them to the store in
/// one write-locked pass. A record that fails to parse leaves the store
/// untouched for this whole set; records of earlier sets stay applied.
fn decode_template_set(
    body: &[u8],
    options: bool,
    store: &RwLock<TemplateStore>,
    message: &mut Message,
) -> Result<(), DecodeError> {
    let mut records = Vec::new();
    let mut r = Cursor::new(body);
    // Less than one record header left is trailing padding.
    while body.len() - r.position() as usize >= TEMPLATE_RECORD_HEADER_LEN {
        let template_id = r.read_u16::<BigEndian>()?;
        let field_count = r.read_u16::<BigEndian>()?;
        if options {
            // Scope field count. The scope/option subdivision is not
            // retained: scope fields decode as ordinary specifiers in
            // sequence.
            r.read_u16::<BigEndian>()
                .map_err(|_| DecodeError::TruncatedInput("options template header"))?;
        }
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            fields.push(FieldSpecifier::decode(&mut r)?);
        }
        records.push(TemplateRecord { template_id, fields });
    }

    let domain_id = message.header.domain_id;
    {
        let mut store = store.write();
        for record in &records {
            if record.is_withdrawal() {
                store.withdraw(domain_id, record.template_id);
            } else {
                store.define(domain_id, record.template_id, record.fields.clone());
            }
        }
    }
    message.template_records.extend(records);
    Ok(())
}

/// Slice the set body into consecutive records using the live template, or
/// skip the body silently when no template is known for this set id yet,
/// the expected steady state after joining a stream mid-flight.
fn decode_data_set(
    set_id: u16,
    body: &[u8],
    store: &RwLock<TemplateStore>,
    message: &mut Message,
) -> Result<(), DecodeError> {
    let domain_id = message.header.domain_id;
    let store = store.read();
    let Some(template) = store.lookup(domain_id, set_id) else {
        debug!(domain_id, template_id = set_id, "data set references unknown template, skipping");
        return Ok(());
    };
    let min_len = template.min_record_len();
    if min_len == 0 {
        // A template of only zero-length fields cannot carve the body into
        // records; treat the whole set as padding.
        return Ok(());
    }
    let mut offset = 0;
    while body.len() - offset >= min_len {
        let (values, consumed) = decode_record(&template.fields, &body[offset..])?;
        message.data_records.push(DataRecord { template_id: set_id, values });
        offset += consumed;
    }
    Ok(())
}

/// Decode one record's worth of field values. Fixed-length fields consume
/// exactly their declared length; a variable-length field reads a one-byte
/// length prefix, escaping to a big-endian u16 length when the prefix byte
/// is 255. Returns the values (bytes copied out of `buf`) and the number of
/// bytes consumed.
fn decode_record(
    fields: &[FieldSpecifier],
    buf: &[u8],
) -> Result<(Vec<FieldValue>, usize), DecodeError> {
    let mut values = Vec::with_capacity(fields.len());
    let mut offset = 0usize;
    for spec in fields {
        let len = if spec.is_variable() {
            let first = *buf.get(offset).ok_or(DecodeError::TruncatedField)?;
            offset += 1;
            if first == 255 {
                if buf.len() < offset + 2 {
                    return Err(DecodeError::TruncatedField);
                }
                let long = u16::from_be_bytes([buf[offset], buf[offset + 1]]) as usize;
                offset += 2;
                long
            } else {
                first as usize
            }
        } else {
            spec.length as usize
        };
        if buf.len() < offset + len {
            return Err(DecodeError::TruncatedField);
        }
        values.push(FieldValue {
            element: spec.element,
            bytes: buf[offset..offset + len].to_vec(),
        });
        offset += len;
    }
    Ok((values, offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ElementId;
    use crate::template::VARIABLE_LENGTH;

    fn spec(id: u16, length: u16) -> FieldSpecifier {
        FieldSpecifier {
            element: ElementId { id, enterprise: None },
            length,
        }
    }

    #[test]
    fn record_fixed_lengths() {
        let fields = [spec(1, 2), spec(2, 4)];
        let buf = [0xde, 0xad, 1, 2, 3, 4, 0xff];
        let (values, consumed) = decode_record(&fields, &buf).expect("decode");
        assert_eq!(consumed, 6);
        assert_eq!(values[0].bytes, vec![0xde, 0xad]);
        assert_eq!(values[1].bytes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn record_variable_short_form() {
        let fields = [spec(1, VARIABLE_LENGTH)];
        let buf = [3, b'a', b'b', b'c'];
        let (values, consumed) = decode_record(&fields, &buf).expect("decode");
        assert_eq!(consumed, 4);
        assert_eq!(values[0].bytes, b"abc");
    }

    #[test]
    fn record_variable_long_form() {
        let fields = [spec(1, VARIABLE_LENGTH)];
        let mut buf = vec![255, 0x01, 0x2c];
        buf.extend(std::iter::repeat(0xaa).take(300));
        let (values, consumed) = decode_record(&fields, &buf).expect("decode");
        assert_eq!(consumed, 303);
        assert_eq!(values[0].bytes.len(), 300);
    }

    #[test]
    fn record_variable_overrun_is_truncated_field() {
        let fields = [spec(1, VARIABLE_LENGTH)];
        let buf = [5, b'a', b'b'];
        assert!(matches!(
            decode_record(&fields, &buf),
            Err(DecodeError::TruncatedField)
        ));
    }

    #[test]
    fn record_long_form_prefix_cut_short() {
        let fields = [spec(1, VARIABLE_LENGTH)];
        let buf = [255, 0x00];
        assert!(matches!(
            decode_record(&fields, &buf),
            Err(DecodeError::TruncatedField)
        ));
    }

    #[test]
    fn header_rejects_wrong_version() {
        let mut bytes = [0u8; 16];
        bytes[1] = 9; // NetFlow v9, not IPFIX
        bytes[3] = 16;
        assert!(matches!(
            decode_header(&bytes),
            Err(DecodeError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn header_rejects_short_buffer() {
        assert!(matches!(
            decode_header(&[0x00, 0x0a, 0x00]),
            Err(DecodeError::TruncatedInput(_))
        ));
    }
}
