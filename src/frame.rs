//! Length-prefixed framing: pull exactly one message's bytes off a stream.
//!
//! The decoder proper works on in-memory slices; this is the collaborator
//! that feeds it from an [`std::io::Read`]. Kept public so callers driving a
//! socket or file can reuse one scratch buffer across messages instead of
//! going through [`Session::parse_reader`](crate::Session::parse_reader).

use std::io::{ErrorKind, Read};

use crate::codec::{DecodeError, VERSION};
use crate::message::MessageHeader;

/// Read one message into `buf`, reusing its capacity across calls. On
/// return `buf` holds exactly the message's declared bytes, header included.
///
/// The 16-byte header is read first and its version checked *before* the
/// declared length is trusted: after a framing desync the next "header" is
/// arbitrary bytes, and a wrong version must surface as
/// [`DecodeError::UnsupportedVersion`] rather than drive a read of garbage
/// length. Returns [`DecodeError::EndOfInput`] when the stream ends before a
/// full message is available.
pub fn read_message<R: Read>(reader: &mut R, buf: &mut Vec<u8>) -> Result<(), DecodeError> {
    buf.clear();
    buf.resize(MessageHeader::SIZE, 0);
    read_full(reader, &mut buf[..])?;

    let version = u16::from_be_bytes([buf[0], buf[1]]);
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let length = u16::from_be_bytes([buf[2], buf[3]]) as usize;
    if length < MessageHeader::SIZE {
        return Err(DecodeError::LengthMismatch {
            declared: length as u16,
            actual: MessageHeader::SIZE,
        });
    }

    buf.resize(length, 0);
    read_full(reader, &mut buf[MessageHeader::SIZE..])
}

fn read_full<R: Read>(reader: &mut R, out: &mut [u8]) -> Result<(), DecodeError> {
    reader.read_exact(out).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => DecodeError::EndOfInput,
        _ => DecodeError::Io(e),
    })
}
