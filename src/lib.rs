//! # ipfix-session: stateful IPFIX message decoder
//!
//! Decodes IPFIX (NetFlow v10 family) export messages. Exporters announce
//! the on-wire layout of their flow records as **templates** and later emit
//! **data sets** that can only be interpreted by replaying the matching
//! template, so decoding is stateful across messages: a [`Session`] keeps a
//! template cache scoped per observation domain and uses it to slice data
//! sets into records.
//!
//! ## Wire structure
//!
//! - **Message**: 16-byte header (version 10, length, export time,
//!   sequence, observation domain id) followed by sets; big-endian
//!   throughout.
//! - **Set**: 4-byte header (set id, total length). Id 2 carries template
//!   records, id 3 options template records, anything else is a data set
//!   whose template id is the set id itself.
//! - **Template record**: nominal id, field count, then field specifiers
//!   (element id, length, optional enterprise number). A zero-field record
//!   withdraws the template. Field length 0xFFFF means variable length with
//!   an in-band prefix (one byte, 255 escaping to a u16).
//!
//! ## Usage
//!
//! ```no_run
//! use ipfix_session::Session;
//!
//! let session = Session::new();
//! let mut stream: &[u8] = &[]; // bytes from a socket or file
//! while let Ok(message) = session.parse_reader(&mut stream) {
//!     for record in &message.data_records {
//!         for value in &record.values {
//!             let _ = (value.element.id, &value.bytes);
//!         }
//!     }
//! }
//! ```
//!
//! Data sets referencing a template the session has not seen decode to zero
//! records without error (the normal case when joining a stream mid-flight).
//! A malformed message returns an error for that call only; because sets and
//! messages are advanced strictly by their declared lengths, the next call
//! picks up at the correct offset and decodes normally.
//!
//! Returned [`Message`]s own all of their bytes; nothing borrows from the
//! input buffer after `parse_buffer` returns.

pub mod codec;
pub mod frame;
pub mod message;
pub mod session;
pub mod template;

pub use codec::{DecodeError, VERSION};
pub use frame::read_message;
pub use message::{DataRecord, ElementId, FieldValue, Message, MessageHeader, TemplateRecord};
pub use session::{Session, SessionConfig};
pub use template::{FieldSpecifier, VARIABLE_LENGTH};
