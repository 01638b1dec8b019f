//! Templates: the field-specifier wire codec, the per-session template
//! store, and the identity resolver behind template-id aliasing.
//!
//! A template id is only unique within its (exporter, observation domain)
//! namespace, and exporters redefine ids at will. The store therefore keys
//! templates by [`TemplateKey`]: observation domain, nominal id, and (when
//! id aliasing is enabled) a generation discriminator minted per
//! structurally distinct field layout, so an incompatible redefinition does
//! not evict a layout that earlier data sets were announced against.

use std::collections::HashMap;
use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};
use tracing::trace;

use crate::codec::DecodeError;
use crate::message::ElementId;

/// Sentinel field length meaning "variable length, prefixed in-band".
pub const VARIABLE_LENGTH: u16 = 0xffff;

const ENTERPRISE_BIT: u16 = 0x8000;

/// One template field descriptor as carried in a template record: element
/// identity plus the declared value length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpecifier {
    pub element: ElementId,
    pub length: u16,
}

impl FieldSpecifier {
    /// Decode one 4- or 8-byte specifier. Bit 15 of the first word is the
    /// enterprise flag, the low 15 bits the element id; a 32-bit enterprise
    /// number follows only when the flag is set. Element id 0 and length 0
    /// are structurally legal and passed through unvalidated.
    pub(crate) fn decode(r: &mut Cursor<&[u8]>) -> Result<FieldSpecifier, DecodeError> {
        let word = r
            .read_u16::<BigEndian>()
            .map_err(|_| DecodeError::TruncatedInput("field specifier"))?;
        let length = r
            .read_u16::<BigEndian>()
            .map_err(|_| DecodeError::TruncatedInput("field specifier"))?;
        let enterprise = if word & ENTERPRISE_BIT != 0 {
            Some(
                r.read_u32::<BigEndian>()
                    .map_err(|_| DecodeError::TruncatedInput("enterprise number"))?,
            )
        } else {
            None
        };
        Ok(FieldSpecifier {
            element: ElementId {
                id: word & !ENTERPRISE_BIT,
                enterprise,
            },
            length,
        })
    }

    pub fn is_variable(&self) -> bool {
        self.length == VARIABLE_LENGTH
    }
}

/// An ordered field layout announced by an exporter, as retained by the
/// store for decoding later data sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Template {
    pub fields: Vec<FieldSpecifier>,
}

impl Template {
    /// Smallest number of octets one record of this layout can occupy:
    /// fixed lengths summed, one length-prefix byte per variable field.
    /// Record iteration stops when less than this remains in a set, which
    /// is also what tolerates trailing padding.
    pub fn min_record_len(&self) -> usize {
        self.fields
            .iter()
            .map(|f| if f.is_variable() { 1 } else { f.length as usize })
            .sum()
    }
}

/// Store lookup key. `generation` is always 0 under the default policy; with
/// aliasing it discriminates structurally distinct layouts sharing one
/// nominal id. Never visible to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TemplateKey {
    domain_id: u32,
    template_id: u16,
    generation: u16,
}

/// Which generations exist for one (domain, nominal id) pair, and which one
/// data sets currently resolve to. Aliasing only.
#[derive(Debug, Default)]
struct Generations {
    count: u16,
    current: u16,
}

/// Per-session mapping from template identity to field layout. Mutated only
/// by set decoding, never expired; lives as long as the session.
#[derive(Debug, Default)]
pub(crate) struct TemplateStore {
    aliasing: bool,
    templates: HashMap<TemplateKey, Template>,
    generations: HashMap<(u32, u16), Generations>,
}

impl TemplateStore {
    pub fn new(aliasing: bool) -> TemplateStore {
        TemplateStore {
            aliasing,
            ..TemplateStore::default()
        }
    }

    /// Insert or replace the layout for `template_id` within `domain_id`.
    pub fn define(&mut self, domain_id: u32, template_id: u16, fields: Vec<FieldSpecifier>) {
        let generation = if self.aliasing {
            self.resolve_generation(domain_id, template_id, &fields)
        } else {
            0
        };
        trace!(domain_id, template_id, generation, field_count = fields.len(), "template defined");
        let key = TemplateKey { domain_id, template_id, generation };
        self.templates.insert(key, Template { fields });
    }

    /// Remove the template for a nominal id; absent ids are a no-op. Under
    /// aliasing every generation is dropped: the wire names only the nominal
    /// id, so older generations would otherwise become unreachable.
    pub fn withdraw(&mut self, domain_id: u32, template_id: u16) {
        if self.aliasing {
            if let Some(gens) = self.generations.remove(&(domain_id, template_id)) {
                for generation in 0..gens.count {
                    self.templates.remove(&TemplateKey { domain_id, template_id, generation });
                }
            }
        } else {
            self.templates.remove(&TemplateKey { domain_id, template_id, generation: 0 });
        }
        trace!(domain_id, template_id, "template withdrawn");
    }

    /// The layout currently authoritative for data sets with this set id.
    pub fn lookup(&self, domain_id: u32, template_id: u16) -> Option<&Template> {
        let generation = if self.aliasing {
            self.generations.get(&(domain_id, template_id))?.current
        } else {
            0
        };
        self.templates.get(&TemplateKey { domain_id, template_id, generation })
    }

    /// Aliasing resolver: a byte-identical layout re-uses its existing
    /// generation (a redefinition refresh is a cheap overwrite), a
    /// structurally different one gets the next free discriminator. Earlier
    /// generations stay in the store.
    fn resolve_generation(
        &mut self,
        domain_id: u32,
        template_id: u16,
        fields: &[FieldSpecifier],
    ) -> u16 {
        let gens = self.generations.entry((domain_id, template_id)).or_default();
        for generation in 0..gens.count {
            let key = TemplateKey { domain_id, template_id, generation };
            if self.templates.get(&key).map_or(false, |t| t.fields == fields) {
                gens.current = generation;
                return generation;
            }
        }
        let generation = gens.count;
        gens.count += 1;
        gens.current = generation;
        generation
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.templates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: u16, length: u16) -> FieldSpecifier {
        FieldSpecifier {
            element: ElementId { id, enterprise: None },
            length,
        }
    }

    #[test]
    fn define_lookup_withdraw() {
        let mut store = TemplateStore::new(false);
        assert!(store.lookup(7, 256).is_none());

        store.define(7, 256, vec![spec(1, 4), spec(2, 8)]);
        assert_eq!(store.lookup(7, 256).expect("defined").fields.len(), 2);
        // Same nominal id in another domain is a different template.
        assert!(store.lookup(8, 256).is_none());

        store.withdraw(7, 256);
        assert!(store.lookup(7, 256).is_none());
        // Withdrawing an absent id is not an error.
        store.withdraw(7, 256);
    }

    #[test]
    fn default_policy_overwrites() {
        let mut store = TemplateStore::new(false);
        store.define(7, 256, vec![spec(1, 4)]);
        store.define(7, 256, vec![spec(2, 2), spec(3, 2)]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup(7, 256).expect("live").fields.len(), 2);
    }

    #[test]
    fn aliasing_keeps_distinct_generations() {
        let mut store = TemplateStore::new(true);
        store.define(7, 256, vec![spec(1, 4)]);
        store.define(7, 256, vec![spec(2, 2), spec(3, 2)]);
        // Both layouts remain stored; lookups resolve to the latest.
        assert_eq!(store.len(), 2);
        assert_eq!(store.lookup(7, 256).expect("live").fields.len(), 2);

        // Redefining the first layout byte-identically re-uses its
        // generation instead of minting a third.
        store.define(7, 256, vec![spec(1, 4)]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.lookup(7, 256).expect("live").fields.len(), 1);
    }

    #[test]
    fn aliasing_withdraw_drops_every_generation() {
        let mut store = TemplateStore::new(true);
        store.define(7, 256, vec![spec(1, 4)]);
        store.define(7, 256, vec![spec(2, 2), spec(3, 2)]);
        store.withdraw(7, 256);
        assert_eq!(store.len(), 0);
        assert!(store.lookup(7, 256).is_none());

        // A fresh definition after withdrawal starts over at generation 0.
        store.define(7, 256, vec![spec(9, 4)]);
        assert_eq!(store.lookup(7, 256).expect("redefined").fields.len(), 1);
    }

    #[test]
    fn min_record_len_counts_variable_prefix() {
        let t = Template {
            fields: vec![spec(1, 4), spec(2, VARIABLE_LENGTH), spec(3, 8)],
        };
        assert_eq!(t.min_record_len(), 13);
    }
}
