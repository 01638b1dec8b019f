//! The public entry point: a [`Session`] owns the template store and
//! serializes access to it across concurrent parse calls.

use std::io::Read;

use parking_lot::RwLock;

use crate::codec::{self, DecodeError};
use crate::frame;
use crate::message::Message;
use crate::template::TemplateStore;

/// Construction-time options, fixed for the session's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionConfig {
    /// Keep structurally distinct redefinitions of one template id
    /// independently decodable instead of letting the latest definition
    /// evict its predecessor. Off by default: plain per-domain scoping,
    /// last definition wins.
    pub id_aliasing: bool,
}

/// A stateful decoding session for one exporter stream (or several
/// multiplexed ones; templates are scoped per observation domain).
///
/// Templates announced in earlier messages are remembered for the session's
/// lifetime and used to decode later data sets; nothing is ever expired.
/// `parse_buffer` and `parse_reader` may be called concurrently from any
/// number of threads on one shared `Session`. The returned [`Message`] is
/// exclusively owned by the caller and shares nothing with session state:
/// field values are copied out of the input buffer at decode time.
#[derive(Debug)]
pub struct Session {
    store: RwLock<TemplateStore>,
}

impl Session {
    /// A session with the default configuration.
    pub fn new() -> Session {
        Session::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Session {
        Session {
            store: RwLock::new(TemplateStore::new(config.id_aliasing)),
        }
    }

    /// Decode the message starting at `bytes[0]`. Bytes past the declared
    /// message length are ignored, so callers batching several messages in
    /// one buffer can advance by `message.header.length` themselves.
    ///
    /// On error the template store is left exactly as the already-processed
    /// sets of this message put it; no partial [`Message`] is returned.
    pub fn parse_buffer(&self, bytes: &[u8]) -> Result<Message, DecodeError> {
        codec::decode_message(bytes, &self.store)
    }

    /// Frame one message off `reader` (see [`frame::read_message`]) and
    /// decode it. Allocates a fresh buffer per call; callers that want to
    /// reuse a scratch buffer across messages should call
    /// [`frame::read_message`] and [`Session::parse_buffer`] themselves.
    pub fn parse_reader<R: Read>(&self, reader: &mut R) -> Result<Message, DecodeError> {
        let mut buf = Vec::new();
        frame::read_message(reader, &mut buf)?;
        self.parse_buffer(&buf)
    }
}

impl Default for Session {
    fn default() -> Session {
        Session::new()
    }
}
